//! Публичная точка входа: снимок → итоговый документ.

use std::path::Path;

use rdbjson_error::{RdbJsonResult, ResultExt};
use tracing::debug;

use crate::{
    config::Settings,
    decoder::SnapshotDecoder,
    document::{assemble, extract},
    session::{DecodeOutput, DecodeSession, SessionConfig},
};

/// Конвертирует снимок по пути с настройками по умолчанию.
///
/// Возвращает JSON-массив из (до) четырёх секций в фиксированном порядке:
/// `__aux__`, `__dbsize__`, записи, `__types__`.
///
/// ```no_run
/// let json = rdbjson::parse_snapshot("dump.rdb")?;
/// assert!(json.starts_with('['));
/// # Ok::<(), rdbjson_error::StackError>(())
/// ```
pub fn parse_snapshot(path: impl AsRef<Path>) -> RdbJsonResult<String> {
    SnapshotConverter::default().convert(path)
}

/// Конвертирует снимок с явными настройками.
pub fn parse_snapshot_with(
    path: impl AsRef<Path>,
    settings: &Settings,
) -> RdbJsonResult<String> {
    SnapshotConverter::new(settings).convert(path)
}

/// Конвертер с зафиксированными настройками.
///
/// Состояние каждого вызова (реестр, промежуточный документ) создаётся
/// заново, так что один конвертер можно вызывать многократно.
#[derive(Debug, Clone, Default)]
pub struct SnapshotConverter {
    session: DecodeSession,
}

impl SnapshotConverter {
    pub fn new(settings: &Settings) -> Self {
        Self {
            session: DecodeSession::new(SessionConfig::from(settings)),
        }
    }

    /// Конвертирует снимок по пути встроенным декодером RDB.
    pub fn convert(
        &self,
        path: impl AsRef<Path>,
    ) -> RdbJsonResult<String> {
        let output = self.session.run(path.as_ref())?;
        finish(output)
    }

    /// Конвертирует снимок произвольным декодером.
    pub fn convert_with_decoder<D: SnapshotDecoder>(
        &self,
        decoder: D,
    ) -> RdbJsonResult<String> {
        let output = self.session.run_with(decoder)?;
        finish(output)
    }
}

fn finish(output: DecodeOutput) -> RdbJsonResult<String> {
    let sections = extract(&output.document)?;
    let types = output
        .registry
        .serialize()
        .context("serializing key type registry")?;

    debug!(
        metadata_bytes = sections.metadata.len(),
        size_stats_bytes = sections.size_stats.len(),
        entries_bytes = sections.entries.len(),
        "Sections extracted"
    );
    Ok(assemble(
        sections.metadata,
        sections.size_stats,
        sections.entries,
        &types,
    ))
}
