use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;

/// Где хранится промежуточный документ во время декодирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Буфер в памяти сессии
    #[default]
    Memory,
    /// Временный файл с уникальным именем, удаляется при выходе
    File,
}

/// Настройки конвертера.
///
/// Источники (по возрастанию приоритета): значения по умолчанию, файл
/// `rdbjson.toml` (или явно указанный), переменные окружения `RDBJSON_*`.
/// Вложенные поля задаются через `__`: `RDBJSON_LOG__LEVEL=debug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub staging: StagingMode,
    pub staging_dir: Option<PathBuf>,
    pub include_aux_fields: bool,
    pub log: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            staging: StagingMode::Memory,
            staging_dir: None,
            include_aux_fields: true,
            log: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Загружает настройки из `./rdbjson.toml` (если есть) и окружения.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(None)
    }

    /// Загружает настройки; явно указанный файл обязан существовать.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("rdbjson").required(false),
        };

        let cfg = Config::builder()
            .set_default("staging", "memory")?
            .set_default("include_aux_fields", true)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("RDBJSON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Проверяет согласованность настроек.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.staging == StagingMode::File {
            if let Some(dir) = &self.staging_dir {
                if !dir.is_dir() {
                    return Err(SettingsError::Invalid(format!(
                        "staging_dir '{}' is not a directory",
                        dir.display()
                    )));
                }
            }
        }
        self.log
            .validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    const ENV_VARS: [&str; 4] = [
        "RDBJSON_STAGING",
        "RDBJSON_STAGING_DIR",
        "RDBJSON_INCLUDE_AUX_FIELDS",
        "RDBJSON_LOG__LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    /// Тест проверяет значения по умолчанию.
    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::load().unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.staging, StagingMode::Memory);
        assert!(settings.include_aux_fields);
        assert_eq!(settings.log.level, "info");
    }

    /// Тест проверяет переопределение через переменные окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        env::set_var("RDBJSON_STAGING", "file");
        env::set_var("RDBJSON_STAGING_DIR", dir.path());
        env::set_var("RDBJSON_INCLUDE_AUX_FIELDS", "false");
        env::set_var("RDBJSON_LOG__LEVEL", "debug");

        let settings = Settings::load();
        clear_env();
        let settings = settings.unwrap();

        assert_eq!(settings.staging, StagingMode::File);
        assert_eq!(settings.staging_dir.as_deref(), Some(dir.path()));
        assert!(!settings.include_aux_fields);
        assert_eq!(settings.log.level, "debug");
    }

    /// Тест проверяет загрузку из явно указанного TOML-файла.
    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "staging = \"memory\"\ninclude_aux_fields = false\n\n[log]\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path())).unwrap();
        assert!(!settings.include_aux_fields);
        assert_eq!(settings.log.format, LogFormat::Json);
    }

    /// Тест проверяет ошибку на отсутствующий явный файл.
    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        clear_env();
        let err = Settings::load_from(Some(Path::new("/nonexistent/rdbjson.toml"))).unwrap_err();
        assert!(matches!(err, SettingsError::Load(_)));
    }

    /// Тест проверяет, что каталог для временного файла обязан существовать.
    #[test]
    fn test_validate_staging_dir() {
        let settings = Settings {
            staging: StagingMode::File,
            staging_dir: Some(PathBuf::from("/nonexistent/staging")),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(msg)) if msg.contains("not a directory")
        ));

        // В режиме memory каталог не используется
        let settings = Settings {
            staging: StagingMode::Memory,
            ..settings
        };
        assert!(settings.validate().is_ok());
    }

    /// Тест проверяет ошибку на неизвестное значение режима.
    #[test]
    #[serial]
    fn test_invalid_staging_value() {
        clear_env();
        env::set_var("RDBJSON_STAGING", "tape");
        let result = Settings::load();
        clear_env();
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }
}
