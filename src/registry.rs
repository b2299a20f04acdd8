//! Реестр типов ключей.
//!
//! Собирается побочным наблюдателем декодера: на каждое событие
//! [`ParseEvent::NewKey`] в реестр добавляется пара (ключ, код типа) в
//! порядке появления. Сериализуется в JSON-объект `{"ключ": код, ...}`,
//! который становится секцией `__types__` итогового документа.

use rdbjson_error::{RdbJsonResult, SnapshotError};
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::decoder::{DataType, ParseEvent, ParseHandler};

/// Запись реестра: ключ и числовой код его типа.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub key: String,
    pub type_code: u8,
}

/// Упорядоченный список записей (ключ, код типа).
///
/// Дубликаты не схлопываются: формат RDB не допускает повторов ключей в
/// одной базе, а ключи из разных баз идут подряд как есть.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTypeRegistry {
    records: Vec<TypeRecord>,
}

impl KeyTypeRegistry {
    /// Создаёт пустой реестр.
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет запись в конец реестра.
    pub fn record(
        &mut self,
        key: impl Into<String>,
        data_type: DataType,
    ) {
        self.records.push(TypeRecord {
            key: key.into(),
            type_code: data_type.code(),
        });
    }

    /// Сериализует реестр в компактный JSON-объект.
    ///
    /// Пустой реестр даёт `{}`. Ключи экранируются по правилам JSON.
    pub fn serialize(&self) -> RdbJsonResult<String> {
        serde_json::to_string(self).map_err(|e| {
            SnapshotError::IoFailure {
                reason: format!("Failed to serialize key type registry: {e}"),
            }
            .into()
        })
    }

    /// Кол-во записей.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Пуст ли реестр.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Итератор по записям в порядке добавления.
    pub fn iter(&self) -> impl Iterator<Item = &TypeRecord> {
        self.records.iter()
    }

    /// Код типа для первого вхождения ключа.
    pub fn get(
        &self,
        key: &str,
    ) -> Option<u8> {
        self.records
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.type_code)
    }

    /// Ключи в порядке добавления.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.key.as_str())
    }
}

impl Serialize for KeyTypeRegistry {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(&record.key, &record.type_code)?;
        }
        map.end()
    }
}

impl ParseHandler for KeyTypeRegistry {
    fn handle_event(
        &mut self,
        event: &ParseEvent,
    ) -> RdbJsonResult<()> {
        if let ParseEvent::NewKey { key, data_type, .. } = event {
            self.record(key.as_str(), *data_type);
        }
        Ok(())
    }
}
