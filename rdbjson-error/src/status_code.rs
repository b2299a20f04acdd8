use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde")]
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки входных данных
/// - 5xxx: Снимок и промежуточный документ
/// - 6xxx: IO
/// - 8xxx: Формат RDB
///
/// `num_enum::TryFromPrimitive` даёт реализацию `TryFrom<u32>`, что удобно
/// для exit-кодов и машиночитаемых ответов CLI.
#[cfg_attr(feature = "serde", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Входные данные ===
    NotFound = 2000,
    InvalidData = 2009,

    // === 5xxx: Снимок ===
    InitFailed = 5000,
    CorruptedData = 5002,
    DecodeFailed = 5004,
    MalformedDocument = 5008,

    // === 6xxx: IO ===
    Io = 6000,
    PermissionDenied = 6001,
    UnexpectedEof = 6007,

    // === 8xxx: Формат ===
    UnsupportedVersion = 8002,
    SizeLimit = 8007,
    ParseError = 8009,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::InvalidArgs | Self::NotFound | Self::InvalidData => LogLevel::Info,
            Self::Internal | Self::MalformedDocument | Self::CorruptedData => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }

    /// Код завершения процесса для CLI.
    ///
    /// Значения следуют `sysexits.h`: 64 — неверное использование,
    /// 65 — некорректные данные, 66 — нет входного файла, 74 — IO.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InvalidArgs => 64,
            Self::DecodeFailed
            | Self::CorruptedData
            | Self::InvalidData
            | Self::MalformedDocument
            | Self::UnsupportedVersion
            | Self::SizeLimit
            | Self::ParseError
            | Self::UnexpectedEof => 65,
            Self::NotFound | Self::InitFailed => 66,
            Self::Io | Self::PermissionDenied => 74,
            _ => 70,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
