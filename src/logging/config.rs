use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use super::LoggingError;

/// Формат вывода логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень (`info`) или полная директива `EnvFilter` (`rdbjson=debug,warn`)
    pub level: String,
    /// Формат вывода в stderr
    pub format: LogFormat,
    /// Цветной вывод
    pub with_ansi: bool,
    /// Печатать target события
    pub with_target: bool,
    /// Дополнительный файл для логов в формате JSON
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Директива фильтра для `EnvFilter`.
    ///
    /// Простой уровень применяется только к событиям этого крейта, для
    /// остальных остаётся `warn`.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("warn,rdbjson={level}")
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        if self.level.trim().is_empty() {
            return Err(LoggingError::InvalidConfig("log level is empty".to_string()));
        }
        let directive = self.build_filter_directive();
        EnvFilter::try_new(&directive).map_err(|e| {
            LoggingError::InvalidConfig(format!("invalid log level '{}': {e}", self.level))
        })?;
        Ok(())
    }
}
