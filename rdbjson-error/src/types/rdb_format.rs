use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибка разбора бинарного RDB-снимка с контекстом для диагностики.
///
/// Встроенный декодер превращает её в текст статуса `Error`, который затем
/// дословно попадает в `SnapshotError::DecodeFailure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdbFormatError {
    /// Неожиданный конец файла
    UnexpectedEof {
        context: String,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Файл не начинается с `REDIS`
    InvalidMagic { got: [u8; 5] },

    /// Версия RDB вне поддерживаемого диапазона
    UnsupportedVersion { found: String, max: u32 },

    /// Неизвестный опкод или тип объекта
    InvalidOpcode {
        opcode: u8,
        offset: Option<u64>,
    },

    /// Кодирование значения, которое встроенный декодер не разбирает
    UnsupportedEncoding {
        encoding: String,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Ошибка распаковки LZF-строки
    CompressionError {
        reason: String,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Превышен лимит размера
    SizeLimit {
        what: String,
        size: u64,
        limit: u64,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Ошибка разбора структуры
    ParseError {
        structure: String,
        reason: String,
        offset: Option<u64>,
        key: Option<String>,
    },
}

impl RdbFormatError {
    /// Добавляет контекст offset к ошибке.
    pub fn with_offset(
        mut self,
        offset: u64,
    ) -> Self {
        match &mut self {
            Self::UnexpectedEof { offset: o, .. }
            | Self::InvalidOpcode { offset: o, .. }
            | Self::UnsupportedEncoding { offset: o, .. }
            | Self::CompressionError { offset: o, .. }
            | Self::SizeLimit { offset: o, .. }
            | Self::ParseError { offset: o, .. } => {
                if o.is_none() {
                    *o = Some(offset);
                }
            }
            Self::InvalidMagic { .. } | Self::UnsupportedVersion { .. } => {}
        }
        self
    }

    /// Добавляет контекст ключа к ошибке.
    pub fn with_key(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        let k = Some(key.into());
        match &mut self {
            Self::UnexpectedEof { key: k2, .. }
            | Self::UnsupportedEncoding { key: k2, .. }
            | Self::CompressionError { key: k2, .. }
            | Self::SizeLimit { key: k2, .. }
            | Self::ParseError { key: k2, .. } => {
                *k2 = k;
            }
            _ => {}
        }
        self
    }

    /// Подсказка для пользователя.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::UnexpectedEof { .. } => Some("File may be truncated. Check file integrity"),
            Self::InvalidMagic { .. } => Some("The input does not look like an RDB snapshot"),
            Self::UnsupportedEncoding { .. } => {
                Some("Re-save the dataset with compact encodings disabled")
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RdbFormatError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof {
                context,
                offset,
                key,
            } => {
                write!(f, "Unexpected EOF: {context}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::InvalidMagic { got } => {
                write!(
                    f,
                    "Invalid magic number: expected \"REDIS\", got {:?}",
                    String::from_utf8_lossy(got)
                )
            }
            Self::UnsupportedVersion { found, max } => {
                write!(f, "Unsupported RDB version {found:?} (supported: 1..={max})")
            }
            Self::InvalidOpcode { opcode, offset } => {
                write!(f, "Invalid opcode 0x{opcode:02X}")?;
                write_context(f, *offset, None)
            }
            Self::UnsupportedEncoding {
                encoding,
                offset,
                key,
            } => {
                write!(f, "Unsupported RDB encoding: {encoding}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::CompressionError {
                reason,
                offset,
                key,
            } => {
                write!(f, "LZF decompression error: {reason}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::SizeLimit {
                what,
                size,
                limit,
                offset,
                key,
            } => {
                write!(f, "{what} size {size} exceeds limit {limit}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::ParseError {
                structure,
                reason,
                offset,
                key,
            } => {
                write!(f, "Failed to parse {structure}: {reason}")?;
                write_context(f, *offset, key.as_deref())
            }
        }
    }
}

/// Вспомогательная ф-я для форматирования контекста (offset, key).
fn write_context(
    f: &mut std::fmt::Formatter<'_>,
    offset: Option<u64>,
    key: Option<&str>,
) -> std::fmt::Result {
    let mut parts = Vec::new();
    if let Some(o) = offset {
        parts.push(format!("offset: 0x{o:X}"));
    }
    if let Some(k) = key {
        parts.push(format!("key: {k}"));
    }
    if !parts.is_empty() {
        write!(f, " [{}]", parts.join(", "))?;
    }
    Ok(())
}

impl std::error::Error for RdbFormatError {}

impl ErrorExt for RdbFormatError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnexpectedEof { .. } => StatusCode::UnexpectedEof,
            Self::InvalidMagic { .. } => StatusCode::InvalidData,
            Self::UnsupportedVersion { .. } => StatusCode::UnsupportedVersion,
            Self::InvalidOpcode { .. } => StatusCode::CorruptedData,
            Self::UnsupportedEncoding { .. } => StatusCode::Unsupported,
            Self::CompressionError { .. } => StatusCode::CorruptedData,
            Self::SizeLimit { .. } => StatusCode::SizeLimit,
            Self::ParseError { .. } => StatusCode::ParseError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_message(&self) -> String {
        let mut msg = format!("{self:?}");
        if let Some(hint) = self.recovery_hint() {
            msg.push_str(&format!(" | Hint: {hint}"));
        }
        msg
    }
}

impl From<std::io::Error> for RdbFormatError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RdbFormatError::UnexpectedEof {
                context: e.to_string(),
                offset: None,
                key: None,
            },
            _ => RdbFormatError::ParseError {
                structure: "I/O".to_string(),
                reason: e.to_string(),
                offset: None,
                key: None,
            },
        }
    }
}
