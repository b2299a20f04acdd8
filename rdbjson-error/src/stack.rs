use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{ErrorExt, LogLevel, StatusCode};

/// Основная структура ошибки с поддержкой контекста.
///
/// Контекст добавляется по мере распространения ошибки вверх по стеку
/// вызовов. `Display` без контекстов выводит корневую ошибку как есть.
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Arc<Vec<ErrorContext>>,
}

/// Контекст ошибки с location tracking.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

/// Машиночитаемое представление ошибки (`rdbjson --error-format json`).
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    /// Создаёт новую ошибку.
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Arc::new(Vec::new()),
        }
    }

    /// Добавляет контекст к ошибке.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        let mut new_contexts = (*self.contexts).clone();
        new_contexts.push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        self.contexts = Arc::new(new_contexts);
        self
    }

    /// Возвращает код статуса.
    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    /// Возвращает сообщение для пользователя.
    pub fn user_message(&self) -> String {
        self.inner.user_message()
    }

    /// Возвращает корневую ошибку.
    pub fn root(&self) -> &dyn ErrorExt {
        self.inner.as_ref()
    }

    /// Возвращает все контексты.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    /// Теги для полей tracing-событий.
    pub fn log_tags(&self) -> Vec<(&'static str, String)> {
        self.inner.log_tags()
    }

    /// Попытка downcast к конкретному типу ошибки.
    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Сериализация для машиночитаемого вывода (требует feature = "serde").
    #[cfg(feature = "serde")]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.status_code().code(),
            message: self.user_message(),
            contexts: if self.contexts.is_empty() {
                None
            } else {
                Some(self.format_contexts())
            },
        }
    }

    fn format_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| {
                if let Some(loc) = ctx.location {
                    format!("{} ({}:{})", ctx.message, loc.file(), loc.line())
                } else {
                    ctx.message.clone()
                }
            })
            .collect()
    }

    /// Возвращает уровень логирования.
    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.to_string());
        debug.field("status_code", &self.status_code());

        if !self.contexts.is_empty() {
            debug.field("contexts", &self.format_contexts());
        }

        debug.finish()
    }
}

impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if !self.contexts.is_empty() {
            let contexts: Vec<&str> = self.contexts.iter().map(|c| c.message.as_str()).collect();
            write!(f, "{}: {}", contexts.join(" → "), self.inner)
        } else {
            write!(f, "{}", self.inner)
        }
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

impl From<StackError> for std::io::Error {
    fn from(e: StackError) -> Self {
        std::io::Error::other(e.to_string())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnapshotError;

    #[test]
    fn test_context_chain() {
        let err = SnapshotError::InitializationFailure {
            reason: "Failed to create reader file".to_string(),
        };
        let stack = StackError::new(err)
            .context("opening snapshot")
            .context("dump command");

        assert_eq!(stack.contexts().len(), 2);
        assert_eq!(stack.contexts()[0].message, "opening snapshot");
        assert!(stack.contexts()[0].location.is_some());
    }

    #[test]
    fn test_downcast() {
        let stack = StackError::new(SnapshotError::InvalidArgument {
            reason: "empty path".to_string(),
        });

        assert!(stack.downcast_ref::<SnapshotError>().is_some());
    }

    #[test]
    fn test_display_without_context_is_root_message() {
        let stack = StackError::new(SnapshotError::DecodeFailure {
            message: "Unexpected EOF at offset 0x1F".to_string(),
        });

        assert_eq!(stack.to_string(), "Unexpected EOF at offset 0x1F");
    }

    #[test]
    fn test_display_with_context() {
        let stack = StackError::new(SnapshotError::IoFailure {
            reason: "stream did not contain valid UTF-8".to_string(),
        })
        .context("reading flat document");

        let display = stack.to_string();
        assert!(display.starts_with("reading flat document: "));
        assert!(display.contains("valid UTF-8"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialization() {
        let stack = StackError::new(SnapshotError::MalformedIntermediateDocument {
            label: "__aux__".to_string(),
            reason: "unbalanced braces".to_string(),
        });

        let response = stack.to_response();
        assert_eq!(response.code, StatusCode::MalformedDocument as u32);
        assert!(response.contexts.is_none());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("__aux__"));
    }
}
