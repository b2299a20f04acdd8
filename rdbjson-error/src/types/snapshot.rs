use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки одного вызова конвертации снимка.
///
/// Каждый неуспешный вызов возвращает ровно одну такую ошибку (первую
/// встреченную), повторных попыток нигде нет.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Путь к снимку не передан или пуст.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Декодер не удалось создать или он не смог открыть источник.
    #[error("{reason}")]
    InitializationFailure { reason: String },

    /// Декодер завершился ошибкой; сообщение передаётся без изменений.
    #[error("{message}")]
    DecodeFailure { message: String },

    /// Промежуточный документ не удалось прочитать после декодирования.
    #[error("{reason}")]
    IoFailure { reason: String },

    /// Метка секции найдена, но за ней нет сбалансированного JSON-объекта.
    #[error("Malformed intermediate document: section {label}: {reason}")]
    MalformedIntermediateDocument { label: String, reason: String },
}

impl SnapshotError {
    /// Короткое имя вида ошибки (для логов).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InitializationFailure { .. } => "InitializationFailure",
            Self::DecodeFailure { .. } => "DecodeFailure",
            Self::IoFailure { .. } => "IOFailure",
            Self::MalformedIntermediateDocument { .. } => "MalformedIntermediateDocument",
        }
    }
}

impl ErrorExt for SnapshotError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { .. } => StatusCode::InvalidArgs,
            Self::InitializationFailure { .. } => StatusCode::InitFailed,
            Self::DecodeFailure { .. } => StatusCode::DecodeFailed,
            Self::IoFailure { .. } => StatusCode::Io,
            Self::MalformedIntermediateDocument { .. } => StatusCode::MalformedDocument,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    // Сообщение декодера пользователь должен видеть дословно.
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn log_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("error_kind", self.kind().to_string()),
            ("status_code", self.status_code().to_string()),
        ]
    }
}
