//! Распаковка LZF, которым Redis сжимает длинные строки в RDB.

use rdbjson_error::RdbFormatError;

/// Распаковывает LZF-блок в буфер ожидаемой длины.
///
/// Формат: управляющий байт `ctrl < 32` означает литерал длиной
/// `ctrl + 1`, иначе это обратная ссылка: длина в старших трёх битах
/// (7 — продолжение в следующем байте), смещение в младших пяти битах и
/// следующем байте.
pub fn decompress(
    input: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>, RdbFormatError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut ip = 0;

    while ip < input.len() {
        let ctrl = input[ip] as usize;
        ip += 1;

        if ctrl < 32 {
            let len = ctrl + 1;
            let literal = input
                .get(ip..ip + len)
                .ok_or_else(|| corrupted("literal runs past end of input"))?;
            out.extend_from_slice(literal);
            ip += len;
        } else {
            let mut len = ctrl >> 5;
            if len == 7 {
                len += *input
                    .get(ip)
                    .ok_or_else(|| corrupted("missing extended length byte"))?
                    as usize;
                ip += 1;
            }
            let low = *input
                .get(ip)
                .ok_or_else(|| corrupted("missing back-reference offset byte"))?
                as usize;
            ip += 1;

            let distance = ((ctrl & 0x1F) << 8) + low + 1;
            if distance > out.len() {
                return Err(corrupted("back-reference points before start of output"));
            }
            // Источник может перекрываться с приёмником, копируем побайтно.
            let start = out.len() - distance;
            for i in 0..len + 2 {
                let byte = out[start + i];
                out.push(byte);
            }
        }

        if out.len() > expected_len {
            return Err(corrupted("output exceeds declared length"));
        }
    }

    if out.len() != expected_len {
        return Err(RdbFormatError::CompressionError {
            reason: format!(
                "decompressed {} bytes, expected {expected_len}",
                out.len()
            ),
            offset: None,
            key: None,
        });
    }
    Ok(out)
}

fn corrupted(reason: &str) -> RdbFormatError {
    RdbFormatError::CompressionError {
        reason: reason.to_string(),
        offset: None,
        key: None,
    }
}
