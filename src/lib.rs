/// Settings loading (defaults, `rdbjson.toml`, `RDBJSON_*` environment).
pub mod config;
/// Public conversion entry points.
pub mod convert;
/// Snapshot decoder contract and the built-in RDB decoder.
pub mod decoder;
/// Intermediate flat document: writer, section extractor, assembler.
pub mod document;
/// Logging on top of `tracing` (formats, filters, file sink).
pub mod logging;
/// Per-key type registry collected during the decode pass.
pub mod registry;
/// Summary report over an assembled document.
pub mod report;
/// Decode session: one source, one decode pass, two observers.
pub mod session;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Settings.
pub use config::{Settings, SettingsError, StagingMode};
/// Conversion API.
pub use convert::{parse_snapshot, parse_snapshot_with, SnapshotConverter};
/// Decoder contract.
pub use decoder::{
    DataType, HandlerSet, ParseEvent, ParseHandler, ParseStatus, RdbDecoder, RdbValue,
    SnapshotDecoder,
};
/// Document pipeline.
pub use document::{assemble, extract, FlatDocument, FlatDocumentWriter, Sections};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingHandle};
/// Errors shared with the `rdbjson-error` crate.
pub use rdbjson_error::{RdbJsonResult, SnapshotError, StackError, StatusCode};
/// Key type registry.
pub use registry::{KeyTypeRegistry, TypeRecord};
/// Summary report.
pub use report::{summarize, KeySummary, SnapshotSummary};
/// Decode session.
pub use session::{DecodeOutput, DecodeSession, SessionConfig};
