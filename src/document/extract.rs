//! Нарезка плоского документа на секции.
//!
//! Метки ищутся только как ключи верхнего объекта документа (строковый
//! токен на глубине `[{`, за которым следует `:`), поэтому строка
//! `"__aux__"` внутри значения не считается меткой. Метаданные ищутся только
//! до метки статистики: ключ записи с тем же именем стоит после неё. Границы
//! объектов определяются подсчётом глубины скобок с учётом строк и
//! экранирования.

use rdbjson_error::{RdbJsonResult, SnapshotError};
use serde::de::IgnoredAny;

use super::{FlatDocument, AUX_FIELD_KEY, DB_SIZE_KEY};

/// Секции, извлечённые из плоского документа.
///
/// Каждая секция либо пустая (в документе её не было), либо
/// самодостаточный JSON-фрагмент: объект для `metadata`/`size_stats` и
/// список полей через запятую для `entries`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sections<'a> {
    pub metadata: &'a str,
    pub size_stats: &'a str,
    pub entries: &'a str,
}

/// Извлекает секции метаданных, статистики и записей.
///
/// Отсутствующая метка даёт пустую секцию. Если нет статистики, записи
/// тоже считаются пустыми: без правой границы их не от чего отсчитывать.
pub fn extract(doc: &FlatDocument) -> RdbJsonResult<Sections<'_>> {
    let text = doc.as_str();
    let db_size_label = find_label(text, DB_SIZE_KEY);

    let head = match db_size_label {
        Some(label) => &text[..label.start],
        None => text,
    };
    let metadata = match find_label(head, AUX_FIELD_KEY) {
        Some(label) => {
            let (start, end) = balanced_object(text, label.value, AUX_FIELD_KEY)?;
            &text[start..end]
        }
        None => "",
    };

    let (size_stats, entries) = match db_size_label {
        Some(label) => {
            let pos = label.value;
            let (start, end) = balanced_object(text, pos, DB_SIZE_KEY)?;
            let rest = &text[end..];
            let close = rest
                .rfind('}')
                .ok_or_else(|| malformed("entries", "missing closing brace of document"))?;
            (&text[start..end], strip_separators(&rest[..close]))
        }
        None => ("", ""),
    };

    validate_object(metadata, AUX_FIELD_KEY)?;
    validate_object(size_stats, DB_SIZE_KEY)?;
    if !entries.is_empty() {
        serde_json::from_str::<IgnoredAny>(&format!("{{{entries}}}"))
            .map_err(|e| malformed("entries", &e.to_string()))?;
    }

    Ok(Sections {
        metadata,
        size_stats,
        entries,
    })
}

/// Срезает разделители (`,` и пробельные символы) с обоих концов.
///
/// Повторное применение ничего не меняет.
pub fn strip_separators(span: &str) -> &str {
    span.trim_matches(|c: char| c == ',' || c.is_whitespace())
}

/// Глубина ключей верхнего объекта: внутри `[` и `{`.
const TOP_LEVEL_DEPTH: usize = 2;

/// Найденная метка секции.
#[derive(Debug, Clone, Copy)]
struct Label {
    /// Позиция открывающей кавычки метки
    start: usize,
    /// Позиция сразу за `:`
    value: usize,
}

/// Первая метка `label` среди ключей верхнего объекта.
fn find_label(
    text: &str,
    label: &str,
) -> Option<Label> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let end = string_end(bytes, i)?;
                let after = skip_whitespace(bytes, end);
                if depth == TOP_LEVEL_DEPTH
                    && &text[i + 1..end - 1] == label
                    && bytes.get(after) == Some(&b':')
                {
                    return Some(Label {
                        start: i,
                        value: after + 1,
                    });
                }
                i = end;
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Границы сбалансированного объекта, начинающегося после `from`.
fn balanced_object(
    text: &str,
    from: usize,
    label: &str,
) -> RdbJsonResult<(usize, usize)> {
    let bytes = text.as_bytes();
    let start = skip_whitespace(bytes, from);
    if bytes.get(start) != Some(&b'{') {
        return Err(malformed(label, "expected '{' after label").into());
    }

    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = string_end(bytes, i)
                    .ok_or_else(|| malformed(label, "unterminated string"))?;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((start, i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(malformed(label, "unbalanced braces").into())
}

/// Индекс сразу за закрывающей кавычкой строки, открытой в `open`.
fn string_end(
    bytes: &[u8],
    open: usize,
) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn skip_whitespace(
    bytes: &[u8],
    mut i: usize,
) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn validate_object(
    span: &str,
    label: &str,
) -> RdbJsonResult<()> {
    if span.is_empty() {
        return Ok(());
    }
    serde_json::from_str::<IgnoredAny>(span).map_err(|e| malformed(label, &e.to_string()))?;
    Ok(())
}

fn malformed(
    label: &str,
    reason: &str,
) -> SnapshotError {
    SnapshotError::MalformedIntermediateDocument {
        label: label.to_string(),
        reason: reason.to_string(),
    }
}
