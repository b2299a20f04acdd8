//! Логирование на базе `tracing`.
//!
//! События пишутся в stderr в выбранном формате (compact, pretty, json) и,
//! по желанию, дублируются в файл через неблокирующий `tracing-appender`.
//! Фильтр берётся из `RUST_LOG`, а если переменная не задана, из
//! [`LoggingConfig::level`].

pub mod config;
mod filters;
mod formatter;
pub mod handle;

use std::path::PathBuf;

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to open log file '{}': {source}", .path.display())]
    FileSink {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Logging is already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Инициализация глобального subscriber'а.
///
/// Повторный вызов возвращает `LoggingError::AlreadyInitialized`.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingHandle, LoggingError> {
    config.validate()?;

    let env_filter = filters::build_filter(config);
    let mut layers = Vec::new();
    layers.push(formatter::console_layer(config));

    let file_guard = match &config.file {
        Some(path) => {
            let (file_layer, guard) =
                formatter::file_layer(path).map_err(|source| LoggingError::FileSink {
                    path: path.clone(),
                    source,
                })?;
            layers.push(file_layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = ?config.format,
        file = ?config.file,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что некорректная конфигурация отклоняется до
    /// установки subscriber'а.
    #[test]
    fn test_init_rejects_invalid_config() {
        let cfg = LoggingConfig {
            level: String::new(),
            ..Default::default()
        };
        assert!(matches!(init_logging(&cfg), Err(LoggingError::InvalidConfig(_))));
    }

    /// Тест проверяет ошибку открытия файла логов.
    #[test]
    fn test_init_rejects_unwritable_file() {
        let cfg = LoggingConfig {
            file: Some(PathBuf::from("/nonexistent/dir/rdbjson.log")),
            ..Default::default()
        };
        assert!(matches!(init_logging(&cfg), Err(LoggingError::FileSink { .. })));
    }
}
