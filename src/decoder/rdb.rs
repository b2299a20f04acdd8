//! Встроенный потоковый декодер RDB.
//!
//! Разбирает framing снимка (заголовок, служебные опкоды, EOF) и значения в
//! plain-кодированиях: строки (включая int- и LZF-кодирование), списки,
//! множества, отсортированные множества (оба формата score) и хэши.
//! Компактные кодирования (ziplist, listpack, intset, quicklist), модули и
//! стримы распознаются, но завершают проход ошибкой `UnsupportedEncoding`.
//!
//! Один вызов [`SnapshotDecoder::parse_step`] разбирает одну запись: заголовок,
//! один опкод или один ключ со значением.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use rdbjson_error::{RdbFormatError, RdbJsonResult, SnapshotError};
use tracing::{debug, info, trace, warn};

use super::{
    lzf,
    opcodes::*,
    DataType, ParseEvent, ParseHandler, ParseStatus, RdbValue, SnapshotDecoder,
};

/// Максимальная длина одной строки в снимке (как `proto-max-bulk-len`).
const MAX_STRING_SIZE: u64 = 512 * 1024 * 1024;

/// Верхняя граница предварительного резервирования для коллекций.
const MAX_PREALLOC: usize = 1024;

/// Обёртка над `Read`, считающая прочитанные байты.
///
/// Смещение используется в сообщениях об ошибках.
pub struct OffsetRead<R: Read> {
    inner: R,
    bytes_read: u64,
}

/// Статистика прохода декодера.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Версия формата (после чтения заголовка)
    pub version: Option<u32>,
    /// Кол-во разобранных записей (опкодов и ключей)
    pub records: u64,
    /// Кол-во ключей
    pub keys: u64,
    /// Кол-во вспомогательных полей
    pub aux_fields: u64,
    /// Кол-во прочитанных байт
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Header,
    Body,
    Done,
}

/// Потоковый декодер RDB с pull-протоколом.
pub struct RdbDecoder<R: Read> {
    reader: OffsetRead<BufReader<R>>,
    state: DecoderState,
    version: u32,
    pending_expire: Option<i64>,
    stats: DecodeStats,
    terminal: Option<ParseStatus>,
}

impl<R: Read> OffsetRead<R> {
    /// Создаёт новый OffsetRead.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    /// Возвращает текущее кол-во прочитанных байт.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for OffsetRead<R> {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl RdbDecoder<File> {
    /// Открывает файл снимка.
    ///
    /// Ошибка открытия (нет файла, нет прав, это каталог) возвращается как
    /// `SnapshotError::InitializationFailure`.
    pub fn open(path: impl AsRef<Path>) -> RdbJsonResult<Self> {
        let path = path.as_ref();
        let init_failure = |reason: String| SnapshotError::InitializationFailure {
            reason: format!("Failed to create reader file '{}': {reason}", path.display()),
        };

        let file = File::open(path).map_err(|e| init_failure(e.to_string()))?;
        let metadata = file.metadata().map_err(|e| init_failure(e.to_string()))?;
        if metadata.is_dir() {
            return Err(init_failure("is a directory".to_string()).into());
        }

        debug!(path = %path.display(), size = metadata.len(), "Opened snapshot file");
        Ok(Self::new(file))
    }
}

impl<R: Read> RdbDecoder<R> {
    /// Создаёт декодер поверх произвольного источника байт.
    pub fn new(reader: R) -> Self {
        Self {
            reader: OffsetRead::new(BufReader::with_capacity(64 * 1024, reader)),
            state: DecoderState::Header,
            version: 0,
            pending_expire: None,
            stats: DecodeStats::default(),
            terminal: None,
        }
    }

    /// Возвращает статистику прохода.
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    fn step(
        &mut self,
        handler: &mut dyn ParseHandler,
    ) -> RdbJsonResult<bool> {
        match self.state {
            DecoderState::Header => {
                let version = self.read_header()?;
                self.version = version;
                self.stats.version = Some(version);
                self.state = DecoderState::Body;
                debug!(version, "RDB header parsed");
                handler.handle_event(&ParseEvent::Header { version })?;
                Ok(false)
            }
            DecoderState::Body => self.read_record(handler),
            DecoderState::Done => Ok(true),
        }
    }

    fn read_header(&mut self) -> Result<u32, RdbFormatError> {
        let mut magic = [0u8; 5];
        self.read_exact_ctx(&mut magic, "reading magic string")
            .map_err(|e| e.with_offset(0))?;
        if &magic != RDB_MAGIC {
            return Err(RdbFormatError::InvalidMagic { got: magic });
        }

        let mut digits = [0u8; 4];
        self.read_exact_ctx(&mut digits, "reading version digits")
            .map_err(|e| e.with_offset(5))?;
        let found = String::from_utf8_lossy(&digits).into_owned();
        let version = found
            .parse::<u32>()
            .ok()
            .filter(|v| (1..=RDB_MAX_VERSION).contains(v))
            .ok_or(RdbFormatError::UnsupportedVersion {
                found,
                max: RDB_MAX_VERSION,
            })?;
        Ok(version)
    }

    fn read_record(
        &mut self,
        handler: &mut dyn ParseHandler,
    ) -> RdbJsonResult<bool> {
        let offset = self.reader.bytes_read();
        let opcode = self
            .read_u8_ctx("expecting next opcode")
            .map_err(|e| e.with_offset(offset))?;
        self.stats.records += 1;

        match opcode {
            RDB_OPCODE_EOF => {
                self.read_checksum()?;
                self.state = DecoderState::Done;
                handler.handle_event(&ParseEvent::End)?;
                return Ok(true);
            }
            RDB_OPCODE_AUX => {
                let name = self.read_lossy_string().map_err(|e| e.with_offset(offset))?;
                let value = self
                    .read_lossy_string()
                    .map_err(|e| e.with_offset(offset).with_key(name.clone()))?;
                self.stats.aux_fields += 1;
                trace!(%name, %value, "Aux field");
                handler.handle_event(&ParseEvent::Aux { name, value })?;
            }
            RDB_OPCODE_SELECTDB => {
                let db = self.read_length().map_err(|e| e.with_offset(offset))?;
                handler.handle_event(&ParseEvent::SelectDb { db })?;
            }
            RDB_OPCODE_RESIZEDB => {
                let size = self.read_length().map_err(|e| e.with_offset(offset))?;
                let expires = self.read_length().map_err(|e| e.with_offset(offset))?;
                handler.handle_event(&ParseEvent::DbSize { size, expires })?;
            }
            RDB_OPCODE_EXPIRETIME_MS => {
                let ms = self
                    .reader
                    .read_i64::<LittleEndian>()
                    .map_err(|e| io_error(e, "reading millisecond expire time").with_offset(offset))?;
                self.pending_expire = Some(ms);
            }
            RDB_OPCODE_EXPIRETIME => {
                let secs = self
                    .reader
                    .read_i32::<LittleEndian>()
                    .map_err(|e| io_error(e, "reading expire time").with_offset(offset))?;
                self.pending_expire = Some(i64::from(secs) * 1000);
            }
            RDB_OPCODE_IDLE => {
                self.read_length().map_err(|e| e.with_offset(offset))?;
            }
            RDB_OPCODE_FREQ => {
                self.read_u8_ctx("reading LFU frequency")
                    .map_err(|e| e.with_offset(offset))?;
            }
            RDB_OPCODE_SLOT_INFO => {
                for _ in 0..3 {
                    self.read_length().map_err(|e| e.with_offset(offset))?;
                }
            }
            RDB_OPCODE_FUNCTION2 => {
                let code = self.read_string().map_err(|e| e.with_offset(offset))?;
                debug!(bytes = code.len(), "Skipped function library");
            }
            RDB_OPCODE_FUNCTION_PRE_GA | RDB_OPCODE_MODULE_AUX => {
                let encoding = if opcode == RDB_OPCODE_MODULE_AUX {
                    "module-aux"
                } else {
                    "function-pre-ga"
                };
                return Err(RdbFormatError::UnsupportedEncoding {
                    encoding: encoding.to_string(),
                    offset: Some(offset),
                    key: None,
                }
                .into());
            }
            rdb_type => {
                let data_type = DataType::from_rdb_type(rdb_type).ok_or(
                    RdbFormatError::InvalidOpcode {
                        opcode: rdb_type,
                        offset: Some(offset),
                    },
                )?;
                self.read_entry(handler, rdb_type, data_type, offset)?;
            }
        }

        self.stats.bytes_read = self.reader.bytes_read();
        Ok(false)
    }

    fn read_entry(
        &mut self,
        handler: &mut dyn ParseHandler,
        rdb_type: u8,
        data_type: DataType,
        offset: u64,
    ) -> RdbJsonResult<()> {
        let key = self.read_lossy_string().map_err(|e| e.with_offset(offset))?;
        let expire_ms = self.pending_expire.take();

        handler.handle_event(&ParseEvent::NewKey {
            key: key.clone(),
            data_type,
            expire_ms,
        })?;
        self.stats.keys += 1;

        let value = self
            .read_value(rdb_type)
            .map_err(|e| e.with_offset(offset).with_key(key.clone()))?;
        handler.handle_event(&ParseEvent::Value { key, value })?;
        Ok(())
    }

    fn read_value(
        &mut self,
        rdb_type: u8,
    ) -> Result<RdbValue, RdbFormatError> {
        match rdb_type {
            RDB_TYPE_STRING => Ok(RdbValue::String(self.read_string()?)),
            RDB_TYPE_LIST => Ok(RdbValue::List(self.read_string_seq()?)),
            RDB_TYPE_SET => Ok(RdbValue::Set(self.read_string_seq()?)),
            RDB_TYPE_ZSET | RDB_TYPE_ZSET_2 => {
                let len = self.read_length()?;
                let mut members = Vec::with_capacity(prealloc(len));
                for _ in 0..len {
                    let member = self.read_string()?;
                    let score = if rdb_type == RDB_TYPE_ZSET {
                        self.read_ascii_double()?
                    } else {
                        self.reader
                            .read_f64::<LittleEndian>()
                            .map_err(|e| io_error(e, "reading binary score"))?
                    };
                    members.push((member, score));
                }
                Ok(RdbValue::ZSet(members))
            }
            RDB_TYPE_HASH => {
                let len = self.read_length()?;
                let mut fields = Vec::with_capacity(prealloc(len));
                for _ in 0..len {
                    let field = self.read_string()?;
                    let value = self.read_string()?;
                    fields.push((field, value));
                }
                Ok(RdbValue::Hash(fields))
            }
            other => Err(RdbFormatError::UnsupportedEncoding {
                encoding: rdb_type_name(other).to_string(),
                offset: None,
                key: None,
            }),
        }
    }

    fn read_checksum(&mut self) -> Result<(), RdbFormatError> {
        if self.version < RDB_CHECKSUM_MIN_VERSION {
            return Ok(());
        }
        let mut checksum = [0u8; 8];
        match self.reader.read_exact(&mut checksum) {
            Ok(()) => {
                trace!(checksum = u64::from_le_bytes(checksum), "RDB checksum");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(version = self.version, "RDB checksum is missing after EOF marker");
                Ok(())
            }
            Err(e) => Err(io_error(e, "reading checksum")),
        }
    }

    fn read_string_seq(&mut self) -> Result<Vec<Vec<u8>>, RdbFormatError> {
        let len = self.read_length()?;
        let mut items = Vec::with_capacity(prealloc(len));
        for _ in 0..len {
            items.push(self.read_string()?);
        }
        Ok(items)
    }

    /// Читает длину и признак специального кодирования.
    fn read_length_with_encoding(&mut self) -> Result<(u64, bool), RdbFormatError> {
        let first = self.read_u8_ctx("reading length")?;
        match (first & 0xC0) >> 6 {
            RDB_6BITLEN => Ok((u64::from(first & 0x3F), false)),
            RDB_14BITLEN => {
                let next = self.read_u8_ctx("reading 14-bit length")?;
                Ok(((u64::from(first & 0x3F) << 8) | u64::from(next), false))
            }
            RDB_ENCVAL => Ok((u64::from(first & 0x3F), true)),
            _ => match first {
                RDB_32BITLEN => self
                    .reader
                    .read_u32::<BigEndian>()
                    .map(|len| (u64::from(len), false))
                    .map_err(|e| io_error(e, "reading 32-bit length")),
                RDB_64BITLEN => self
                    .reader
                    .read_u64::<BigEndian>()
                    .map(|len| (len, false))
                    .map_err(|e| io_error(e, "reading 64-bit length")),
                other => Err(RdbFormatError::ParseError {
                    structure: "length".to_string(),
                    reason: format!("invalid length prefix 0x{other:02X}"),
                    offset: None,
                    key: None,
                }),
            },
        }
    }

    fn read_length(&mut self) -> Result<u64, RdbFormatError> {
        match self.read_length_with_encoding()? {
            (len, false) => Ok(len),
            (enc, true) => Err(RdbFormatError::ParseError {
                structure: "length".to_string(),
                reason: format!("unexpected special encoding {enc}"),
                offset: None,
                key: None,
            }),
        }
    }

    fn read_string(&mut self) -> Result<Vec<u8>, RdbFormatError> {
        let (len, encoded) = self.read_length_with_encoding()?;
        if encoded {
            return match len as u8 {
                RDB_ENC_INT8 => self
                    .reader
                    .read_i8()
                    .map(|v| v.to_string().into_bytes())
                    .map_err(|e| io_error(e, "reading 8-bit integer string")),
                RDB_ENC_INT16 => self
                    .reader
                    .read_i16::<LittleEndian>()
                    .map(|v| v.to_string().into_bytes())
                    .map_err(|e| io_error(e, "reading 16-bit integer string")),
                RDB_ENC_INT32 => self
                    .reader
                    .read_i32::<LittleEndian>()
                    .map(|v| v.to_string().into_bytes())
                    .map_err(|e| io_error(e, "reading 32-bit integer string")),
                RDB_ENC_LZF => self.read_lzf_string(),
                other => Err(RdbFormatError::UnsupportedEncoding {
                    encoding: format!("string encoding {other}"),
                    offset: None,
                    key: None,
                }),
            };
        }

        let len = checked_size(len, "string")?;
        let mut buf = vec![0u8; len];
        self.read_exact_ctx(&mut buf, "reading string bytes")?;
        Ok(buf)
    }

    fn read_lzf_string(&mut self) -> Result<Vec<u8>, RdbFormatError> {
        let compressed_len = checked_size(self.read_length()?, "compressed string")?;
        let len = checked_size(self.read_length()?, "string")?;
        let mut compressed = vec![0u8; compressed_len];
        self.read_exact_ctx(&mut compressed, "reading compressed string")?;
        lzf::decompress(&compressed, len)
    }

    fn read_lossy_string(&mut self) -> Result<String, RdbFormatError> {
        let bytes = self.read_string()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Score в формате ZSET v1: длина + ASCII, 253..255 — специальные значения.
    fn read_ascii_double(&mut self) -> Result<f64, RdbFormatError> {
        let len = self.read_u8_ctx("reading score length")?;
        match len {
            253 => Ok(f64::NAN),
            254 => Ok(f64::INFINITY),
            255 => Ok(f64::NEG_INFINITY),
            _ => {
                let mut buf = vec![0u8; usize::from(len)];
                self.read_exact_ctx(&mut buf, "reading score")?;
                let text = String::from_utf8_lossy(&buf);
                text.parse::<f64>()
                    .map_err(|e| RdbFormatError::ParseError {
                        structure: "zset score".to_string(),
                        reason: format!("{text:?}: {e}"),
                        offset: None,
                        key: None,
                    })
            }
        }
    }

    fn read_u8_ctx(
        &mut self,
        context: &str,
    ) -> Result<u8, RdbFormatError> {
        self.reader.read_u8().map_err(|e| io_error(e, context))
    }

    fn read_exact_ctx(
        &mut self,
        buf: &mut [u8],
        context: &str,
    ) -> Result<(), RdbFormatError> {
        self.reader.read_exact(buf).map_err(|e| io_error(e, context))
    }
}

impl<R: Read> SnapshotDecoder for RdbDecoder<R> {
    fn parse_step(
        &mut self,
        handler: &mut dyn ParseHandler,
    ) -> ParseStatus {
        if let Some(status) = &self.terminal {
            return status.clone();
        }

        let result = self.step(handler);
        self.stats.bytes_read = self.reader.bytes_read();
        let status = match result {
            Ok(false) => return ParseStatus::WaitMoreData,
            Ok(true) => {
                info!(
                    version = self.stats.version,
                    records = self.stats.records,
                    keys = self.stats.keys,
                    aux_fields = self.stats.aux_fields,
                    bytes_read = self.stats.bytes_read,
                    "RDB snapshot decoded"
                );
                ParseStatus::Ok
            }
            Err(e) => {
                warn!(
                    error = %e,
                    offset = self.stats.bytes_read,
                    hint = e
                        .downcast_ref::<RdbFormatError>()
                        .and_then(RdbFormatError::recovery_hint),
                    "RDB decoding stopped"
                );
                ParseStatus::Error(e.to_string())
            }
        };
        self.terminal = Some(status.clone());
        status
    }
}

fn io_error(
    e: io::Error,
    context: &str,
) -> RdbFormatError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        RdbFormatError::UnexpectedEof {
            context: context.to_string(),
            offset: None,
            key: None,
        }
    } else {
        RdbFormatError::ParseError {
            structure: "I/O".to_string(),
            reason: format!("{context}: {e}"),
            offset: None,
            key: None,
        }
    }
}

fn checked_size(
    len: u64,
    what: &str,
) -> Result<usize, RdbFormatError> {
    if len > MAX_STRING_SIZE {
        return Err(RdbFormatError::SizeLimit {
            what: what.to_string(),
            size: len,
            limit: MAX_STRING_SIZE,
            offset: None,
            key: None,
        });
    }
    Ok(len as usize)
}

fn prealloc(len: u64) -> usize {
    usize::try_from(len).map_or(MAX_PREALLOC, |len| len.min(MAX_PREALLOC))
}
