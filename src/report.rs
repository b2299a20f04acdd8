//! Сводка по итоговому документу: тип и длина каждого ключа.
//!
//! Ключи сортируются по длине значения по убыванию; при равной длине
//! сохраняется порядок из документа.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    decoder::DataType,
    document::{AUX_FIELD_KEY, DB_SIZE_KEY, TYPES_KEY},
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to parse assembled document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Assembled document must be a JSON array of objects")]
    UnexpectedShape,
}

/// Сводка по одному ключу.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub length: usize,
}

/// Сводка по снимку.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub db_size: Option<Map<String, Value>>,
    pub aux: Option<Map<String, Value>>,
    pub keys: Vec<KeySummary>,
}

impl SnapshotSummary {
    /// Оставляет только первые `limit` ключей.
    pub fn truncate(
        &mut self,
        limit: usize,
    ) {
        self.keys.truncate(limit);
    }
}

/// Имя типа по числовому коду.
pub fn type_name(code: u64) -> &'static str {
    u8::try_from(code)
        .ok()
        .and_then(|code| DataType::try_from(code).ok())
        .map_or("unknown", DataType::name)
}

/// Строит сводку по тексту итогового документа.
pub fn summarize(document: &str) -> Result<SnapshotSummary, ReportError> {
    let Value::Array(sections) = serde_json::from_str::<Value>(document)? else {
        return Err(ReportError::UnexpectedShape);
    };

    let mut summary = SnapshotSummary::default();
    let mut types = Map::new();
    let mut entries = Map::new();

    for section in sections {
        let Value::Object(mut object) = section else {
            return Err(ReportError::UnexpectedShape);
        };
        if let Some(Value::Object(db_size)) = object.remove(DB_SIZE_KEY) {
            summary.db_size = Some(db_size);
        } else if let Some(Value::Object(aux)) = object.remove(AUX_FIELD_KEY) {
            summary.aux = Some(aux);
        } else if let Some(Value::Object(t)) = object.remove(TYPES_KEY) {
            types = t;
        } else {
            entries = object;
        }
    }

    summary.keys = entries
        .iter()
        .map(|(key, value)| KeySummary {
            key: key.clone(),
            type_name: types
                .get(key)
                .and_then(Value::as_u64)
                .map_or("unknown", type_name),
            length: value_length(value),
        })
        .collect();
    summary.keys.sort_by(|a, b| b.length.cmp(&a.length));

    Ok(summary)
}

/// Длина значения: элементы массива, длина строки в UTF-16 единицах (как
/// `String.length` в JS), длина `entries` у объектов-стримов, иначе
/// кол-во полей объекта.
fn value_length(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::String(s) => s.encode_utf16().count(),
        Value::Object(fields) => fields
            .get("entries")
            .and_then(Value::as_array)
            .map_or(fields.len(), Vec::len),
        _ => 0,
    }
}

impl fmt::Display for SnapshotSummary {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "DB details: {}", optional_object(&self.db_size))?;
        writeln!(f, "AUX details: {}", optional_object(&self.aux))?;
        for key in &self.keys {
            writeln!(f, "{}:", key.key)?;
            writeln!(f, "    Type: {}", key.type_name)?;
            writeln!(f, "    Length: {}", key.length)?;
        }
        Ok(())
    }
}

fn optional_object(object: &Option<Map<String, Value>>) -> String {
    match object {
        Some(map) => Value::Object(map.clone()).to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const DOCUMENT: &str = r#"[{"__aux__":{"redis-ver":"7.0"}},{"__dbsize__":{"size":4,"expires":0}},{"s":"hello","l":["a","b"],"h":{"f1":"1","f2":"2","f3":"3"},"x":{"entries":[1]}},{"__types__":{"s":0,"l":1,"h":4,"x":6}}]"#;

    /// Тест проверяет сводку и сортировку по длине.
    #[test]
    fn test_summarize() {
        let summary = summarize(DOCUMENT).unwrap();

        assert_eq!(summary.aux.as_ref().unwrap()["redis-ver"], "7.0");
        assert_eq!(summary.db_size.as_ref().unwrap()["size"], 4);

        let keys: Vec<_> = summary
            .keys
            .iter()
            .map(|k| (k.key.as_str(), k.type_name, k.length))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("s", "string", 5),
                ("h", "hash", 3),
                ("l", "list", 2),
                ("x", "stream", 1),
            ]
        );
    }

    /// Тест проверяет длину строк вне BMP: суррогатная пара считается за два.
    #[rstest]
    #[case::ascii("hello", 5)]
    #[case::cyrillic("ключ", 4)]
    #[case::emoji("😀", 2)]
    #[case::mixed("a😀b", 4)]
    fn test_string_length_utf16(
        #[case] value: &str,
        #[case] expected: usize,
    ) {
        let document = serde_json::json!([{ "k": value }, { "__types__": { "k": 0 } }]);
        let summary = summarize(&document.to_string()).unwrap();

        assert_eq!(summary.keys[0].length, expected);
    }

    /// Тест проверяет неизвестные и отсутствующие коды типов.
    #[test]
    fn test_unknown_types() {
        assert_eq!(type_name(3), "zset");
        assert_eq!(type_name(5), "module");
        assert_eq!(type_name(42), "unknown");
        assert_eq!(type_name(u64::MAX), "unknown");

        let summary = summarize(r#"[{"k":"v"}]"#).unwrap();
        assert_eq!(summary.keys[0].type_name, "unknown");
        assert!(summary.db_size.is_none());
    }

    /// Тест проверяет текстовый вывод.
    #[test]
    fn test_display() {
        let mut summary = summarize(DOCUMENT).unwrap();
        summary.truncate(1);

        assert_eq!(
            summary.to_string(),
            "DB details: {\"size\":4,\"expires\":0}\n\
             AUX details: {\"redis-ver\":\"7.0\"}\n\
             s:\n    Type: string\n    Length: 5\n"
        );
    }

    /// Тест проверяет ошибки разбора.
    #[test]
    fn test_invalid_documents() {
        assert!(matches!(summarize("not json"), Err(ReportError::Parse(_))));
        assert!(matches!(summarize("{}"), Err(ReportError::UnexpectedShape)));
        assert!(matches!(summarize("[1]"), Err(ReportError::UnexpectedShape)));
        assert_eq!(summarize("[]").unwrap(), SnapshotSummary::default());
    }
}
