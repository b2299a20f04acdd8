//! Промежуточный плоский документ и его преобразование в итоговый.
//!
//! Конвейер:
//! 1. [`writer::FlatDocumentWriter`] пишет плоский документ во время прохода
//!    декодера: `[{"__aux__":{...},"__dbsize__":{...},"k1":v1,...}]`;
//! 2. [`extract::extract`] нарезает из него три секции по меткам;
//! 3. [`assemble::assemble`] собирает упорядоченный массив из четырёх секций,
//!    пропуская пустые.

pub mod assemble;
pub mod extract;
pub mod writer;

pub use assemble::assemble;
pub use extract::{extract, strip_separators, Sections};
pub use writer::{FlatDocumentWriter, WriterConfig, WriterStats};

/// Метка секции метаданных (aux-поля снимка).
pub const AUX_FIELD_KEY: &str = "__aux__";
/// Метка секции статистики размеров.
pub const DB_SIZE_KEY: &str = "__dbsize__";
/// Метка секции реестра типов.
pub const TYPES_KEY: &str = "__types__";

/// Текст промежуточного документа, полученный от декодера.
///
/// Только для чтения: после извлечения секций документ отбрасывается.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatDocument {
    text: String,
}

impl FlatDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Длина текста в байтах.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<String> for FlatDocument {
    fn from(text: String) -> Self {
        Self { text }
    }
}
