//! Контракт декодера снимка и встроенная реализация для RDB.
//!
//! ## Архитектура
//!
//! Декодер работает по pull-протоколу: вызывающий код в цикле вызывает
//! [`SnapshotDecoder::parse_step`], пока тот не вернёт терминальный
//! [`ParseStatus`]. На каждом шаге декодер отдаёт события ([`ParseEvent`])
//! в [`ParseHandler`]. Несколько независимых обработчиков подключаются к
//! одному проходу через [`HandlerSet`].
//!
//! ```no_run
//! use rdbjson::decoder::{ParseStatus, RdbDecoder, SnapshotDecoder};
//! use rdbjson::KeyTypeRegistry;
//!
//! let mut decoder = RdbDecoder::open("dump.rdb")?;
//! let mut registry = KeyTypeRegistry::new();
//! while let ParseStatus::WaitMoreData = decoder.parse_step(&mut registry) {}
//! # Ok::<(), rdbjson_error::StackError>(())
//! ```
//!
//! ## Модули
//!
//! - [`rdb`] — встроенный декодер RDB (framing и plain-кодирования)
//! - [`lzf`] — распаковка LZF-строк
//! - [`opcodes`] — константы опкодов и типов объектов RDB

pub mod lzf;
pub mod opcodes;
pub mod rdb;

use num_enum::TryFromPrimitive;
use rdbjson_error::{RdbJsonResult, StackError};
use serde::Serialize;

pub use rdb::{DecodeStats, RdbDecoder};

use self::opcodes::*;

/// Логический тип данных ключа.
///
/// Числовые коды совпадают с тем, что уходит в секцию `__types__`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String = 0,
    List = 1,
    Set = 2,
    ZSet = 3,
    Hash = 4,
    Module = 5,
    Stream = 6,
}

impl DataType {
    /// Числовой код типа.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Человекочитаемое имя типа.
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List => "list",
            Self::Set => "set",
            Self::ZSet => "zset",
            Self::Hash => "hash",
            Self::Module => "module",
            Self::Stream => "stream",
        }
    }

    /// Логический тип по байту типа объекта RDB (с учётом всех вариантов
    /// компактных кодирований).
    pub fn from_rdb_type(rdb_type: u8) -> Option<Self> {
        let data_type = match rdb_type {
            RDB_TYPE_STRING => Self::String,
            RDB_TYPE_LIST
            | RDB_TYPE_LIST_ZIPLIST
            | RDB_TYPE_LIST_QUICKLIST
            | RDB_TYPE_LIST_QUICKLIST_2 => Self::List,
            RDB_TYPE_SET | RDB_TYPE_SET_INTSET | RDB_TYPE_SET_LISTPACK => Self::Set,
            RDB_TYPE_ZSET | RDB_TYPE_ZSET_2 | RDB_TYPE_ZSET_ZIPLIST | RDB_TYPE_ZSET_LISTPACK => {
                Self::ZSet
            }
            RDB_TYPE_HASH
            | RDB_TYPE_HASH_ZIPMAP
            | RDB_TYPE_HASH_ZIPLIST
            | RDB_TYPE_HASH_LISTPACK
            | RDB_TYPE_HASH_METADATA_PRE_GA
            | RDB_TYPE_HASH_LISTPACK_EX_PRE_GA
            | RDB_TYPE_HASH_METADATA
            | RDB_TYPE_HASH_LISTPACK_EX => Self::Hash,
            RDB_TYPE_MODULE_PRE_GA | RDB_TYPE_MODULE_2 => Self::Module,
            RDB_TYPE_STREAM_LISTPACKS
            | RDB_TYPE_STREAM_LISTPACKS_2
            | RDB_TYPE_STREAM_LISTPACKS_3 => Self::Stream,
            _ => return None,
        };
        Some(data_type)
    }
}

/// Значение ключа в plain-кодировании.
///
/// Строки хранятся как байты: RDB не гарантирует UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub enum RdbValue {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Set(Vec<Vec<u8>>),
    ZSet(Vec<(Vec<u8>, f64)>),
    Hash(Vec<(Vec<u8>, Vec<u8>)>),
}

impl RdbValue {
    /// Логический тип значения.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::List(_) => DataType::List,
            Self::Set(_) => DataType::Set,
            Self::ZSet(_) => DataType::ZSet,
            Self::Hash(_) => DataType::Hash,
        }
    }
}

/// События, генерируемые декодером во время прохода по снимку.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    /// Заголовок снимка с версией формата
    Header { version: u32 },
    /// Вспомогательное поле снимка (`redis-ver`, `ctime` и т.д.)
    Aux { name: String, value: String },
    /// Переключение базы данных
    SelectDb { db: u64 },
    /// Размеры текущей базы
    DbSize { size: u64, expires: u64 },
    /// Новый ключ; приходит ровно один раз на ключ, до его значения
    NewKey {
        key: String,
        data_type: DataType,
        expire_ms: Option<i64>,
    },
    /// Значение ранее объявленного ключа
    Value { key: String, value: RdbValue },
    /// Конец снимка
    End,
}

/// Статус одного шага декодирования.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    /// Нужен ещё один вызов `parse_step`
    WaitMoreData,
    /// Снимок прочитан полностью
    Ok,
    /// Терминальная ошибка с диагностическим сообщением декодера
    Error(String),
}

impl ParseStatus {
    /// Является ли статус терминальным.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::WaitMoreData)
    }
}

/// Трейт для обработки событий декодирования.
pub trait ParseHandler {
    /// Вызывается для каждого события.
    fn handle_event(
        &mut self,
        event: &ParseEvent,
    ) -> RdbJsonResult<()>;

    /// Вызывается после успешного завершения прохода.
    fn finalize(&mut self) -> RdbJsonResult<()> {
        Ok(())
    }
}

/// Декодер снимка с pull-протоколом.
pub trait SnapshotDecoder {
    /// Выполняет один шаг декодирования, отдавая события в `handler`.
    ///
    /// После терминального статуса повторные вызовы возвращают его же.
    fn parse_step(
        &mut self,
        handler: &mut dyn ParseHandler,
    ) -> ParseStatus;
}

/// Набор обработчиков, подключённых к одному проходу декодера.
///
/// Каждое событие получает каждый обработчик в порядке подключения. Первая
/// ошибка обработчика прерывает рассылку и запоминается, чтобы вызывающий
/// код мог отличить сбой обработчика от ошибки самого снимка.
#[derive(Default)]
pub struct HandlerSet<'a> {
    handlers: Vec<&'a mut dyn ParseHandler>,
    failure: Option<StackError>,
}

impl<'a> HandlerSet<'a> {
    /// Создаёт пустой набор.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            failure: None,
        }
    }

    /// Подключает обработчик.
    pub fn attach(
        &mut self,
        handler: &'a mut dyn ParseHandler,
    ) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Кол-во подключённых обработчиков.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Пуст ли набор.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Забирает первую ошибку обработчика, если она была.
    pub fn take_failure(&mut self) -> Option<StackError> {
        self.failure.take()
    }
}

impl ParseHandler for HandlerSet<'_> {
    fn handle_event(
        &mut self,
        event: &ParseEvent,
    ) -> RdbJsonResult<()> {
        for handler in self.handlers.iter_mut() {
            if let Err(e) = handler.handle_event(event) {
                if self.failure.is_none() {
                    self.failure = Some(e.clone());
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> RdbJsonResult<()> {
        for handler in self.handlers.iter_mut() {
            handler.finalize()?;
        }
        Ok(())
    }
}
