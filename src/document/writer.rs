use std::io::{self, Write};

use rdbjson_error::RdbJsonResult;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use super::{AUX_FIELD_KEY, DB_SIZE_KEY};
use crate::decoder::{ParseEvent, ParseHandler, RdbValue};

/// Настройки записи плоского документа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Писать ли объект `__aux__`
    pub include_aux_fields: bool,
}

/// Статистика записанного документа.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Кол-во записанных пар ключ-значение
    pub entries: u64,
    /// Кол-во ключей со временем истечения
    pub expiring_keys: u64,
    /// Кол-во собранных aux-полей
    pub aux_fields: u64,
    /// Поля хэшей и члены zset, потерянные из-за совпадения имён после
    /// замены невалидного UTF-8
    pub merged_fields: u64,
}

/// Обработчик событий декодера, пишущий плоский документ в `W`.
///
/// Aux-поля буферизуются и выводятся одним объектом перед первым событием
/// уровня базы. Статистика размеров пишется только для первой базы.
pub struct FlatDocumentWriter<W: Write> {
    sink: W,
    config: WriterConfig,
    aux: Map<String, Value>,
    opened: bool,
    preamble_written: bool,
    db_size_written: bool,
    need_separator: bool,
    closed: bool,
    stats: WriterStats,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            include_aux_fields: true,
        }
    }
}

impl<W: Write> FlatDocumentWriter<W> {
    /// Создаёт writer с настройками по умолчанию.
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    pub fn with_config(
        sink: W,
        config: WriterConfig,
    ) -> Self {
        Self {
            sink,
            config,
            aux: Map::new(),
            opened: false,
            preamble_written: false,
            db_size_written: false,
            need_separator: false,
            closed: false,
            stats: WriterStats::default(),
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Закрывает документ и возвращает приёмник.
    pub fn finish(mut self) -> RdbJsonResult<W> {
        self.close()?;
        Ok(self.sink)
    }

    fn open(&mut self) -> io::Result<()> {
        if !self.opened {
            self.sink.write_all(b"[{")?;
            self.opened = true;
        }
        Ok(())
    }

    /// Открывает документ и сбрасывает буфер aux-полей (один раз).
    fn write_preamble(&mut self) -> io::Result<()> {
        self.open()?;
        if self.preamble_written {
            return Ok(());
        }
        self.preamble_written = true;

        if self.config.include_aux_fields && !self.aux.is_empty() {
            let aux = Value::Object(std::mem::take(&mut self.aux));
            self.write_field(AUX_FIELD_KEY, &aux)?;
        }
        Ok(())
    }

    fn write_db_size(
        &mut self,
        stats: Value,
    ) -> io::Result<()> {
        self.write_field(DB_SIZE_KEY, &stats)?;
        self.db_size_written = true;
        Ok(())
    }

    fn write_field(
        &mut self,
        name: &str,
        value: &Value,
    ) -> io::Result<()> {
        if self.need_separator {
            self.sink.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.sink, name)?;
        self.sink.write_all(b":")?;
        serde_json::to_writer(&mut self.sink, value)?;
        self.need_separator = true;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.write_preamble()?;
        self.sink.write_all(b"}]")?;
        self.sink.flush()?;
        self.closed = true;
        debug!(
            entries = self.stats.entries,
            expiring_keys = self.stats.expiring_keys,
            "Flat document closed"
        );
        Ok(())
    }
}

impl<W: Write> ParseHandler for FlatDocumentWriter<W> {
    fn handle_event(
        &mut self,
        event: &ParseEvent,
    ) -> RdbJsonResult<()> {
        match event {
            ParseEvent::Aux { name, value } => {
                self.stats.aux_fields += 1;
                if self.preamble_written {
                    debug!(%name, "Aux field after database section, skipped");
                } else {
                    self.aux.insert(name.clone(), Value::String(value.clone()));
                }
            }
            ParseEvent::SelectDb { .. } => self.write_preamble()?,
            ParseEvent::DbSize { size, expires } => {
                self.write_preamble()?;
                if !self.db_size_written {
                    let mut stats = Map::new();
                    stats.insert("size".into(), Value::from(*size));
                    stats.insert("expires".into(), Value::from(*expires));
                    self.write_db_size(Value::Object(stats))?;
                }
            }
            ParseEvent::NewKey { expire_ms, .. } => {
                if expire_ms.is_some() {
                    self.stats.expiring_keys += 1;
                }
            }
            ParseEvent::Value { key, value } => {
                self.write_preamble()?;
                if !self.db_size_written {
                    warn!("Key record before RESIZEDB, writing empty size statistics");
                    self.write_db_size(Value::Object(Map::new()))?;
                }
                let rendered = render_value(value);
                let merged = merged_fields(value, &rendered);
                if merged > 0 {
                    warn!(
                        key = %key,
                        merged,
                        "Distinct fields collapsed into one after lossy UTF-8 conversion"
                    );
                    self.stats.merged_fields += merged;
                }
                self.write_field(key, &rendered)?;
                self.stats.entries += 1;
            }
            ParseEvent::Header { .. } | ParseEvent::End => {}
        }
        Ok(())
    }

    fn finalize(&mut self) -> RdbJsonResult<()> {
        self.close()?;
        Ok(())
    }
}

/// JSON-представление значения ключа.
pub fn render_value(value: &RdbValue) -> Value {
    match value {
        RdbValue::String(bytes) => Value::String(lossy(bytes)),
        RdbValue::List(items) | RdbValue::Set(items) => {
            Value::Array(items.iter().map(|i| Value::String(lossy(i))).collect())
        }
        RdbValue::Hash(fields) => Value::Object(
            fields
                .iter()
                .map(|(f, v)| (lossy(f), Value::String(lossy(v))))
                .collect(),
        ),
        RdbValue::ZSet(members) => Value::Object(
            members
                .iter()
                .map(|(m, score)| (lossy(m), render_score(*score)))
                .collect(),
        ),
    }
}

/// Сколько полей исходного значения не попало в JSON-объект.
fn merged_fields(
    value: &RdbValue,
    rendered: &Value,
) -> u64 {
    let source = match value {
        RdbValue::Hash(fields) => fields.len(),
        RdbValue::ZSet(members) => members.len(),
        _ => return 0,
    };
    let written = rendered.as_object().map_or(source, Map::len);
    source.saturating_sub(written) as u64
}

/// Score как число; бесконечности и NaN в JSON не представимы, поэтому
/// пишутся строками.
fn render_score(score: f64) -> Value {
    match Number::from_f64(score) {
        Some(n) => Value::Number(n),
        None if score.is_nan() => Value::String("nan".into()),
        None if score > 0.0 => Value::String("inf".into()),
        None => Value::String("-inf".into()),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DataType;

    fn feed(
        writer: &mut FlatDocumentWriter<Vec<u8>>,
        events: &[ParseEvent],
    ) {
        for event in events {
            writer.handle_event(event).unwrap();
        }
    }

    fn entry(
        key: &str,
        value: RdbValue,
    ) -> [ParseEvent; 2] {
        [
            ParseEvent::NewKey {
                key: key.into(),
                data_type: value.data_type(),
                expire_ms: None,
            },
            ParseEvent::Value {
                key: key.into(),
                value,
            },
        ]
    }

    fn aux(
        name: &str,
        value: &str,
    ) -> ParseEvent {
        ParseEvent::Aux {
            name: name.into(),
            value: value.into(),
        }
    }

    fn finish(writer: FlatDocumentWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    /// Тест проверяет раскладку документа для одной базы.
    #[test]
    fn test_document_layout() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        feed(
            &mut writer,
            &[
                ParseEvent::Header { version: 11 },
                aux("redis-ver", "7.0"),
                aux("redis-bits", "64"),
                ParseEvent::SelectDb { db: 0 },
                ParseEvent::DbSize {
                    size: 2,
                    expires: 0,
                },
            ],
        );
        feed(&mut writer, &entry("foo", RdbValue::String(b"bar".to_vec())));
        feed(
            &mut writer,
            &entry("l", RdbValue::List(vec![b"a".to_vec(), b"b".to_vec()])),
        );
        feed(&mut writer, &[ParseEvent::End]);

        assert_eq!(
            finish(writer),
            r#"[{"__aux__":{"redis-ver":"7.0","redis-bits":"64"},"__dbsize__":{"size":2,"expires":0},"foo":"bar","l":["a","b"]}]"#
        );
    }

    /// Тест проверяет, что без aux-полей и ключей остаётся пустой объект.
    #[test]
    fn test_empty_document() {
        let writer = FlatDocumentWriter::new(Vec::new());
        assert_eq!(finish(writer), "[{}]");
    }

    /// Тест проверяет отключение секции `__aux__`.
    #[test]
    fn test_aux_disabled() {
        let mut writer = FlatDocumentWriter::with_config(
            Vec::new(),
            WriterConfig {
                include_aux_fields: false,
            },
        );
        feed(
            &mut writer,
            &[
                aux("redis-ver", "7.0"),
                ParseEvent::DbSize {
                    size: 0,
                    expires: 0,
                },
            ],
        );
        assert_eq!(writer.stats().aux_fields, 1);
        assert_eq!(finish(writer), r#"[{"__dbsize__":{"size":0,"expires":0}}]"#);
    }

    /// Тест проверяет, что статистика второй базы не повторяется.
    #[test]
    fn test_second_database_size_skipped() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        feed(
            &mut writer,
            &[
                ParseEvent::SelectDb { db: 0 },
                ParseEvent::DbSize {
                    size: 1,
                    expires: 1,
                },
            ],
        );
        feed(&mut writer, &entry("a", RdbValue::String(b"1".to_vec())));
        feed(
            &mut writer,
            &[
                ParseEvent::SelectDb { db: 3 },
                ParseEvent::DbSize {
                    size: 1,
                    expires: 0,
                },
            ],
        );
        feed(&mut writer, &entry("b", RdbValue::String(b"2".to_vec())));

        assert_eq!(
            finish(writer),
            r#"[{"__dbsize__":{"size":1,"expires":1},"a":"1","b":"2"}]"#
        );
    }

    /// Тест проверяет пустую статистику, если ключ пришёл до RESIZEDB.
    #[test]
    fn test_key_before_db_size() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        feed(&mut writer, &entry("k", RdbValue::String(b"v".to_vec())));
        assert_eq!(finish(writer), r#"[{"__dbsize__":{},"k":"v"}]"#);
    }

    /// Тест проверяет рендеринг хэшей, zset и нестандартных score.
    #[test]
    fn test_render_values() {
        let hash = RdbValue::Hash(vec![(b"f".to_vec(), b"v".to_vec())]);
        assert_eq!(render_value(&hash).to_string(), r#"{"f":"v"}"#);

        let zset = RdbValue::ZSet(vec![
            (b"a".to_vec(), 1.5),
            (b"b".to_vec(), f64::INFINITY),
            (b"c".to_vec(), f64::NEG_INFINITY),
            (b"d".to_vec(), f64::NAN),
        ]);
        assert_eq!(
            render_value(&zset).to_string(),
            r#"{"a":1.5,"b":"inf","c":"-inf","d":"nan"}"#
        );

        let set = RdbValue::Set(vec![vec![0xFF, b'x']]);
        assert_eq!(render_value(&set).to_string(), "[\"\u{FFFD}x\"]");
    }

    /// Тест проверяет учёт полей, совпавших после замены невалидного UTF-8.
    #[test]
    fn test_lossy_field_collision_counted() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        let mut events = vec![ParseEvent::DbSize {
            size: 2,
            expires: 0,
        }];
        events.extend(entry(
            "h",
            RdbValue::Hash(vec![
                (vec![0xFF], b"1".to_vec()),
                (vec![0xFE], b"2".to_vec()),
                (b"ok".to_vec(), b"3".to_vec()),
            ]),
        ));
        events.extend(entry(
            "z",
            RdbValue::ZSet(vec![(vec![0xC0], 1.0), (vec![0xC1], 2.0)]),
        ));
        feed(&mut writer, &events);

        assert_eq!(writer.stats().merged_fields, 2);
        assert_eq!(writer.stats().entries, 2);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc[0]["h"].as_object().unwrap().len(), 2);
        assert_eq!(doc[0]["z"].as_object().unwrap().len(), 1);
    }

    /// Тест проверяет, что валидные поля не считаются потерянными.
    #[test]
    fn test_distinct_fields_not_merged() {
        let hash = RdbValue::Hash(vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]);
        assert_eq!(merged_fields(&hash, &render_value(&hash)), 0);

        let list = RdbValue::List(vec![b"x".to_vec(), b"x".to_vec()]);
        assert_eq!(merged_fields(&list, &render_value(&list)), 0);
    }

    /// Тест проверяет экранирование ключей и значений.
    #[test]
    fn test_escaping() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        feed(
            &mut writer,
            &[ParseEvent::DbSize {
                size: 1,
                expires: 0,
            }],
        );
        feed(
            &mut writer,
            &entry("we\"ird}", RdbValue::String(b"{\"x\":1}".to_vec())),
        );
        let text = finish(writer);
        assert_eq!(text, r#"[{"__dbsize__":{"size":1,"expires":0},"we\"ird}":"{\"x\":1}"}]"#);
        let _: serde_json::Value = serde_json::from_str(&text).unwrap();
    }

    /// Тест проверяет подсчёт ключей со сроком жизни.
    #[test]
    fn test_expiring_keys_counted() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        feed(
            &mut writer,
            &[ParseEvent::NewKey {
                key: "t".into(),
                data_type: DataType::String,
                expire_ms: Some(1000),
            }],
        );
        assert_eq!(writer.stats().expiring_keys, 1);
    }

    /// Тест проверяет идемпотентность закрытия документа.
    #[test]
    fn test_finalize_then_finish() {
        let mut writer = FlatDocumentWriter::new(Vec::new());
        writer.finalize().unwrap();
        assert_eq!(finish(writer), "[{}]");
    }
}
