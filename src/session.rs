//! Сессия декодирования: один источник, один проход декодера.
//!
//! К проходу подключаются два независимых обработчика: реестр типов ключей
//! и writer плоского документа. Цикл тянет шаги декодера, пока тот не
//! вернёт терминальный статус; частичных результатов нет.

use std::{
    io::{BufWriter, Read},
    path::{Path, PathBuf},
};

use rdbjson_error::{ensure, RdbJsonResult, SnapshotError};
use tracing::{debug, info, info_span};

use crate::{
    config::{Settings, StagingMode},
    decoder::{HandlerSet, ParseHandler, ParseStatus, RdbDecoder, SnapshotDecoder},
    document::{FlatDocument, FlatDocumentWriter, WriterConfig, WriterStats},
    registry::KeyTypeRegistry,
};

/// Настройки сессии.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub staging: StagingMode,
    /// Каталог для временного файла (по умолчанию системный temp)
    pub staging_dir: Option<PathBuf>,
    pub writer: WriterConfig,
}

/// Результат успешной сессии.
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub document: FlatDocument,
    pub registry: KeyTypeRegistry,
    pub stats: WriterStats,
}

/// Сессия декодирования одного снимка.
#[derive(Debug, Clone, Default)]
pub struct DecodeSession {
    config: SessionConfig,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            staging: settings.staging,
            staging_dir: settings.staging_dir.clone(),
            writer: WriterConfig {
                include_aux_fields: settings.include_aux_fields,
            },
        }
    }
}

impl DecodeSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Декодирует снимок по пути встроенным декодером RDB.
    ///
    /// Путь передаётся в ОС как есть, без перекодирования в UTF-8.
    pub fn run(
        &self,
        source: &Path,
    ) -> RdbJsonResult<DecodeOutput> {
        ensure!(
            !is_blank(source),
            SnapshotError::InvalidArgument {
                reason: "snapshot path is required".to_string(),
            }
        );

        let decoder = RdbDecoder::open(source)?;
        let span = info_span!("decode_session", source = %source.display());
        let _enter = span.enter();
        self.run_with(decoder)
    }

    /// Декодирует снимок произвольным декодером.
    ///
    /// Декодер принадлежит сессии и освобождается при выходе, в том числе
    /// при ошибке.
    pub fn run_with<D: SnapshotDecoder>(
        &self,
        mut decoder: D,
    ) -> RdbJsonResult<DecodeOutput> {
        debug!(staging = ?self.config.staging, "Decode session started");

        let output = match self.config.staging {
            StagingMode::Memory => self.run_in_memory(&mut decoder)?,
            StagingMode::File => self.run_file_staged(&mut decoder)?,
        };

        info!(
            keys = output.registry.len(),
            entries = output.stats.entries,
            expiring_keys = output.stats.expiring_keys,
            merged_fields = output.stats.merged_fields,
            document_bytes = output.document.len(),
            "Decode session finished"
        );
        Ok(output)
    }

    fn run_in_memory<D: SnapshotDecoder>(
        &self,
        decoder: &mut D,
    ) -> RdbJsonResult<DecodeOutput> {
        let mut registry = KeyTypeRegistry::new();
        let mut writer = FlatDocumentWriter::with_config(Vec::new(), self.config.writer);

        drive(decoder, &mut registry, &mut writer)?;

        let stats = writer.stats().clone();
        let bytes = writer
            .finish()
            .map_err(|e| io_failure("Failed to write flat document", e))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| io_failure("Failed to read flat document", e))?;

        Ok(DecodeOutput {
            document: FlatDocument::from(text),
            registry,
            stats,
        })
    }

    /// Промежуточный документ во временном файле; файл удаляется при drop
    /// на любом пути выхода.
    fn run_file_staged<D: SnapshotDecoder>(
        &self,
        decoder: &mut D,
    ) -> RdbJsonResult<DecodeOutput> {
        let dir = self
            .config
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let staging = tempfile::Builder::new()
            .prefix("rdbjson-")
            .suffix(".json")
            .tempfile_in(&dir)
            .map_err(|e| SnapshotError::InitializationFailure {
                reason: format!(
                    "Failed to create JSON handlers: cannot create staging file in '{}': {e}",
                    dir.display()
                ),
            })?;
        debug!(path = %staging.path().display(), "Staging flat document on disk");

        let mut registry = KeyTypeRegistry::new();
        let stats = {
            let mut writer = FlatDocumentWriter::with_config(
                BufWriter::new(staging.as_file()),
                self.config.writer,
            );
            drive(decoder, &mut registry, &mut writer)?;

            let stats = writer.stats().clone();
            writer
                .finish()
                .map_err(|e| io_failure("Failed to write flat document", e))?
                .into_inner()
                .map_err(|e| io_failure("Failed to write flat document", e.error()))?;
            stats
        };

        let mut text = String::new();
        staging
            .reopen()
            .and_then(|mut file| file.read_to_string(&mut text))
            .map_err(|e| io_failure("Failed to open output JSON file", e))?;
        staging
            .close()
            .map_err(|e| io_failure("Failed to remove staging file", e))?;

        Ok(DecodeOutput {
            document: FlatDocument::from(text),
            registry,
            stats,
        })
    }
}

/// Пустой путь или путь из одних пробелов.
fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.to_str().is_some_and(|s| s.trim().is_empty())
}

/// Цикл pull-протокола с двумя обработчиками на одном проходе.
fn drive<D, H>(
    decoder: &mut D,
    registry: &mut KeyTypeRegistry,
    writer: &mut H,
) -> RdbJsonResult<()>
where
    D: SnapshotDecoder,
    H: ParseHandler,
{
    let mut handlers = HandlerSet::new();
    handlers.attach(registry).attach(writer);

    let mut steps: u64 = 0;
    loop {
        match decoder.parse_step(&mut handlers) {
            ParseStatus::WaitMoreData => steps += 1,
            ParseStatus::Ok => break,
            ParseStatus::Error(message) => {
                // Сбой обработчика (запись документа) отличаем от ошибки снимка
                if let Some(failure) = handlers.take_failure() {
                    return Err(io_failure("Failed to write flat document", failure).into());
                }
                debug!(steps, %message, "Decoder reported an error");
                return Err(SnapshotError::DecodeFailure { message }.into());
            }
        }
    }
    debug!(steps, "Decoder finished");

    handlers
        .finalize()
        .map_err(|e| io_failure("Failed to write flat document", e))?;
    Ok(())
}

fn io_failure(
    what: &str,
    err: impl std::fmt::Display,
) -> SnapshotError {
    SnapshotError::IoFailure {
        reason: format!("{what}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rdbjson_error::StatusCode;
    use rstest::rstest;

    use super::*;
    use crate::decoder::{DataType, ParseEvent, RdbValue};

    /// Декодер, выдающий заранее заданные события по одному на шаг.
    struct Scripted {
        events: VecDeque<ParseEvent>,
        fail_with: Option<String>,
    }

    impl Scripted {
        fn new(events: Vec<ParseEvent>) -> Self {
            Self {
                events: events.into(),
                fail_with: None,
            }
        }
    }

    impl SnapshotDecoder for Scripted {
        fn parse_step(
            &mut self,
            handler: &mut dyn ParseHandler,
        ) -> ParseStatus {
            match self.events.pop_front() {
                Some(event) => match handler.handle_event(&event) {
                    Ok(()) => ParseStatus::WaitMoreData,
                    Err(e) => ParseStatus::Error(e.to_string()),
                },
                None => match &self.fail_with {
                    Some(msg) => ParseStatus::Error(msg.clone()),
                    None => ParseStatus::Ok,
                },
            }
        }
    }

    fn key_events(
        key: &str,
        value: &str,
    ) -> Vec<ParseEvent> {
        vec![
            ParseEvent::NewKey {
                key: key.into(),
                data_type: DataType::String,
                expire_ms: None,
            },
            ParseEvent::Value {
                key: key.into(),
                value: RdbValue::String(value.as_bytes().to_vec()),
            },
        ]
    }

    fn script() -> Vec<ParseEvent> {
        let mut events = vec![
            ParseEvent::Aux {
                name: "redis-ver".into(),
                value: "7.0".into(),
            },
            ParseEvent::DbSize {
                size: 1,
                expires: 0,
            },
        ];
        events.extend(key_events("foo", "bar"));
        events.push(ParseEvent::End);
        events
    }

    /// Тест проверяет, что оба обработчика получают события одного прохода.
    #[test]
    fn test_memory_session() {
        let session = DecodeSession::default();
        let output = session.run_with(Scripted::new(script())).unwrap();

        assert_eq!(
            output.document.as_str(),
            r#"[{"__aux__":{"redis-ver":"7.0"},"__dbsize__":{"size":1,"expires":0},"foo":"bar"}]"#
        );
        assert_eq!(output.registry.serialize().unwrap(), r#"{"foo":0}"#);
        assert_eq!(output.stats.entries, 1);
    }

    /// Тест проверяет, что файловый режим даёт тот же документ и не
    /// оставляет файлов.
    #[test]
    fn test_file_staged_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = DecodeSession::new(SessionConfig {
            staging: StagingMode::File,
            staging_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });

        let output = session.run_with(Scripted::new(script())).unwrap();
        let memory = DecodeSession::default()
            .run_with(Scripted::new(script()))
            .unwrap();

        assert_eq!(output.document, memory.document);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Тест проверяет, что сообщение декодера передаётся без изменений и
    /// временный файл удаляется.
    #[test]
    fn test_decode_failure_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let session = DecodeSession::new(SessionConfig {
            staging: StagingMode::File,
            staging_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        let mut decoder = Scripted::new(key_events("a", "1"));
        decoder.fail_with = Some("Unexpected EOF: reading string bytes [offset: 0x2A]".into());

        let err = session.run_with(decoder).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DecodeFailed);
        assert_eq!(
            err.to_string(),
            "Unexpected EOF: reading string bytes [offset: 0x2A]"
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Тест проверяет проверку пустого пути.
    #[rstest]
    #[case::empty("")]
    #[case::spaces("  ")]
    #[case::tab("\t")]
    fn test_blank_source_rejected(#[case] source: &str) {
        let err = DecodeSession::default().run(Path::new(source)).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
    }

    /// Тест проверяет, что путь не в UTF-8 открывается как есть.
    #[cfg(unix)]
    #[test]
    fn test_non_utf8_source_opened() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"snap-\xfe.rdb"));
        std::fs::write(&path, b"REDIS0011\xff\0\0\0\0\0\0\0\0").unwrap();

        let output = DecodeSession::default().run(&path).unwrap();
        assert!(output.registry.is_empty());
        assert_eq!(output.stats.entries, 0);
    }

    /// Тест проверяет ошибку создания временного файла.
    #[test]
    fn test_staging_dir_missing() {
        let session = DecodeSession::new(SessionConfig {
            staging: StagingMode::File,
            staging_dir: Some(PathBuf::from("/nonexistent/staging")),
            ..Default::default()
        });
        let err = session.run_with(Scripted::new(script())).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InitFailed);
        assert!(err.to_string().starts_with("Failed to create JSON handlers"));
    }

    /// Тест проверяет, что ошибка записи документа становится IoFailure.
    #[test]
    fn test_writer_failure_is_io_failure() {
        struct BrokenSink;

        impl std::io::Write for BrokenSink {
            fn write(
                &mut self,
                _buf: &[u8],
            ) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut decoder = Scripted::new(script());
        let mut registry = KeyTypeRegistry::new();
        let mut writer = FlatDocumentWriter::new(BrokenSink);

        let err = drive(&mut decoder, &mut registry, &mut writer).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Io);
        assert!(err.to_string().contains("disk full"));
    }
}
