//! Байтовое представление сообщения.
//!
//! ```text
//! +------+------+------------+-------------+---------------------+--------------+---------+
//! | 0xA1 | 0x60 | total: i32 | n_props:i32 | key\0value\0 (x n)  | content: i32 | content |
//! +------+------+------------+-------------+---------------------+--------------+---------+
//! ```
//!
//! Все целые в big-endian. `total` включает заголовок.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use gatemesh_error::CodecError;

use super::{Message, Properties};

/// Магические байты в начале кадра.
pub const MESSAGE_HEADER: [u8; 2] = [0xA1, 0x60];

/// Минимальный кадр: заголовок, три поля i32, без свойств и содержимого.
pub const MIN_FRAME_LEN: usize = 2 + 4 + 4 + 4;

const MAX_FRAME_LEN: usize = i32::MAX as usize;

/// Сериализует сообщение.
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    let properties = message.properties();
    let payload = message.payload();

    let mut total = MIN_FRAME_LEN + payload.len();
    for (key, value) in properties {
        if key.contains('\0') || value.contains('\0') {
            return Err(CodecError::InvalidFrame {
                reason: format!("property '{}' contains a NUL byte", key.escape_debug()),
            });
        }
        total += key.len() + 1 + value.len() + 1;
    }
    if total > MAX_FRAME_LEN {
        return Err(CodecError::TooLarge {
            size: total,
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = Vec::new();
    buf.try_reserve_exact(total)
        .map_err(|_| CodecError::OutOfMemory { size: total })?;

    buf.extend_from_slice(&MESSAGE_HEADER);
    // Запись в Vec<u8> не может завершиться ошибкой ввода-вывода.
    write_len(&mut buf, total);
    write_len(&mut buf, properties.len());
    for (key, value) in properties {
        buf.extend_from_slice(key.as_bytes());
        buf.push(0);
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
    write_len(&mut buf, payload.len());
    buf.extend_from_slice(payload);

    debug_assert_eq!(buf.len(), total);
    Ok(Bytes::from(buf))
}

/// Восстанавливает сообщение из кадра.
pub fn decode(data: &[u8]) -> Result<Message, CodecError> {
    if data.len() < MIN_FRAME_LEN {
        return Err(CodecError::Truncated {
            offset: 0,
            needed: MIN_FRAME_LEN,
        });
    }
    if data[..2] != MESSAGE_HEADER {
        return Err(CodecError::BadHeader {
            found: data[..2].to_vec(),
        });
    }

    let mut cursor = Cursor::new(data);
    cursor.set_position(2);

    let total = read_len(&mut cursor, "total size")?;
    if total != data.len() {
        return Err(CodecError::InvalidFrame {
            reason: format!("declared size {total} does not match buffer size {}", data.len()),
        });
    }

    let count = read_len(&mut cursor, "property count")?;
    // Каждое свойство занимает минимум два байта (два терминатора).
    if count > (data.len() - MIN_FRAME_LEN) / 2 {
        return Err(CodecError::InvalidFrame {
            reason: format!("property count {count} cannot fit into the frame"),
        });
    }

    let mut properties = Properties::new();
    for _ in 0..count {
        let key = read_cstr(&mut cursor)?;
        let value = read_cstr(&mut cursor)?;
        if properties.insert(key.clone(), value).is_some() {
            return Err(CodecError::InvalidFrame {
                reason: format!("duplicate property key '{key}'"),
            });
        }
    }

    let size = read_len(&mut cursor, "content size")?;
    let offset = cursor.position() as usize;
    let remaining = data.len() - offset;
    if size != remaining {
        return Err(CodecError::InvalidFrame {
            reason: format!("content size {size} does not match remaining {remaining} bytes"),
        });
    }

    let mut content = Vec::new();
    content
        .try_reserve_exact(size)
        .map_err(|_| CodecError::OutOfMemory { size })?;
    content.resize(size, 0);
    cursor
        .read_exact(&mut content)
        .map_err(|_| CodecError::Truncated {
            offset,
            needed: size,
        })?;

    Ok(Message::new(content, properties))
}

fn write_len(
    buf: &mut Vec<u8>,
    len: usize,
) {
    // `len` уже проверен против MAX_FRAME_LEN.
    let _ = buf.write_i32::<BigEndian>(len as i32);
}

fn read_len(
    cursor: &mut Cursor<&[u8]>,
    field: &str,
) -> Result<usize, CodecError> {
    let offset = cursor.position() as usize;
    let value = cursor
        .read_i32::<BigEndian>()
        .map_err(|_| CodecError::Truncated { offset, needed: 4 })?;
    usize::try_from(value).map_err(|_| CodecError::InvalidFrame {
        reason: format!("negative {field}: {value}"),
    })
}

fn read_cstr(cursor: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    let start = cursor.position() as usize;
    let data = *cursor.get_ref();
    let rest = &data[start..];
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::Truncated {
            offset: start,
            needed: rest.len() + 1,
        })?;
    let text = std::str::from_utf8(&rest[..nul]).map_err(|_| CodecError::InvalidUtf8)?;
    cursor.set_position((start + nul + 1) as u64);
    Ok(text.to_string())
}
