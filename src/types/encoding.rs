//! Fixed-width value encoding.
//!
//! Format per type:
//! ```text
//! int2/int4/int8/date/timestamp: little-endian two's complement
//! float8:                        little-endian IEEE-754 bits
//! uuid:                          16 raw bytes
//! text:                          UTF-8 bytes, zero-padded to the bucket width
//! ```

use super::{KeyType, Value, MAX_TEXT_LEN};
use crate::error::{Error, Result};

/// Map a signed integer onto an unsigned one with the same ordering.
#[inline]
pub fn ordered_u64(v: i64) -> u64 {
    (v as u64) ^ 0x8000_0000_0000_0000
}

/// Smallest text bucket (8, 16 or 32 bytes) holding `max_len` bytes.
pub fn text_bucket(max_len: usize) -> Result<usize> {
    match max_len {
        0..=8 => Ok(8),
        9..=16 => Ok(16),
        17..=32 => Ok(32),
        _ => Err(Error::unsupported(format!(
            "text value of {} bytes exceeds {} bytes",
            max_len, MAX_TEXT_LEN
        ))),
    }
}

/// Read a stored integer key of width 2, 4 or 8.
#[inline]
pub fn read_int(bytes: &[u8]) -> i64 {
    match bytes.len() {
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
        _ => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[..8]);
            i64::from_le_bytes(b)
        }
    }
}

/// Read a stored float8 key.
#[inline]
pub fn read_f64(bytes: &[u8]) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(b)
}

/// Map `-0.0` to `0.0` and every NaN to one bit pattern, so equal floats
/// are stored as equal bytes.
#[inline]
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

/// Strip the zero padding of a stored text value.
#[inline]
pub fn trim_text(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Check a text value and return its bytes.
pub fn text_bytes(s: &str) -> Result<&[u8]> {
    if s.len() > MAX_TEXT_LEN {
        return Err(Error::unsupported(format!(
            "text value of {} bytes exceeds {} bytes",
            s.len(),
            MAX_TEXT_LEN
        )));
    }
    if s.as_bytes().contains(&0) {
        return Err(Error::unsupported("text values may not contain NUL characters"));
    }
    Ok(s.as_bytes())
}

/// Append the stored form of `value` to `out`, `width` bytes long.
pub fn encode_value(ty: KeyType, width: usize, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match (ty, value) {
        (_, Value::Null) => Err(Error::unsupported("NULL values are not supported")),
        (KeyType::Int2, Value::Int(v)) => {
            let v = i16::try_from(*v)
                .map_err(|_| Error::unsupported(format!("value {} out of range for int2", v)))?;
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (KeyType::Int4 | KeyType::Date, Value::Int(v)) => {
            let v = i32::try_from(*v).map_err(|_| {
                Error::unsupported(format!("value {} out of range for {}", v, ty.name()))
            })?;
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (KeyType::Int8 | KeyType::Timestamp, Value::Int(v)) => {
            out.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        (KeyType::Float8, Value::Float(v)) => {
            out.extend_from_slice(&canonical_f64(*v).to_le_bytes());
            Ok(())
        }
        (KeyType::Float8, Value::Int(v)) => {
            out.extend_from_slice(&(*v as f64).to_le_bytes());
            Ok(())
        }
        (KeyType::Uuid, Value::Bytes(b)) if b.len() == 16 => {
            out.extend_from_slice(b);
            Ok(())
        }
        (KeyType::Text, Value::Text(s)) => {
            let bytes = text_bytes(s)?;
            if bytes.len() > width {
                return Err(Error::unsupported(format!(
                    "text value of {} bytes exceeds bucket of {}",
                    bytes.len(),
                    width
                )));
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + (width - bytes.len()), 0);
            Ok(())
        }
        (ty, value) => Err(Error::unsupported(format!(
            "value {:?} does not match column type {}",
            value,
            ty.name()
        ))),
    }
}

/// Decode a stored value.
pub fn decode_value(ty: KeyType, bytes: &[u8]) -> Result<Value> {
    if let Some(w) = ty.fixed_width() {
        if bytes.len() != w {
            return Err(Error::corruption(format!(
                "{} value has {} bytes, expected {}",
                ty.name(),
                bytes.len(),
                w
            )));
        }
    }
    Ok(match ty {
        KeyType::Int2 | KeyType::Int4 | KeyType::Int8 | KeyType::Date | KeyType::Timestamp => {
            Value::Int(read_int(bytes))
        }
        KeyType::Float8 => Value::Float(read_f64(bytes)),
        KeyType::Uuid => Value::Bytes(bytes.to_vec()),
        KeyType::Text => {
            let s = std::str::from_utf8(trim_text(bytes))
                .map_err(|e| Error::corruption(format!("stored text is not UTF-8: {}", e)))?;
            Value::Text(s.to_string())
        }
    })
}
