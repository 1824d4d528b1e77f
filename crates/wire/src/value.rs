//! Canonical dictionary serialisation.
//!
//! The format is minimal and deterministic:
//!
//! ```text
//! integer:  i<decimal>e          (unsigned)
//! bytes:    <len>:<raw bytes>    (length-prefixed)
//! list:     l<values...>e
//! dict:     d<key><value>...e    (keys are byte strings, lexicographic)
//! ```
//!
//! Dicts are kept in a `BTreeMap`, so encoding is canonical by construction;
//! decoding enforces strictly ascending keys so a payload has exactly one
//! valid encoding.

use std::collections::BTreeMap;
use thiserror::Error;

/// A dictionary payload: lexicographically ordered keys to values.
pub type WireDict = BTreeMap<String, WireValue>;

/// A value in a wire payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireValue {
    /// Unsigned integer.
    Int(u64),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Ordered list.
    List(Vec<WireValue>),
    /// Nested dictionary.
    Dict(WireDict),
}

/// Errors from wire encoding/decoding and typed-message conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated payload")]
    Truncated,

    #[error("invalid integer encoding")]
    BadInt,

    #[error("invalid length prefix")]
    BadLength,

    #[error("dict keys out of order or duplicated")]
    KeyOrder,

    #[error("trailing bytes after payload")]
    TrailingData,

    #[error("unexpected type marker 0x{0:02x}")]
    BadMarker(u8),

    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("field \"{0}\" has the wrong type")]
    WrongType(&'static str),

    #[error("field \"{0}\" has an invalid size")]
    BadSize(&'static str),

    #[error("field \"{0}\" has an invalid value")]
    BadValue(&'static str),

    #[error("parallel list fields have mismatched lengths")]
    LengthMismatch,
}

impl WireValue {
    /// Borrow as integer.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            WireValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow as list.
    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow as dict.
    pub fn as_dict(&self) -> Option<&WireDict> {
        match self {
            WireValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

/// Encode a dict to its canonical byte representation.
pub fn encode_dict(dict: &WireDict) -> Vec<u8> {
    let mut out = Vec::new();
    encode_dict_into(dict, &mut out);
    out
}

fn encode_dict_into(dict: &WireDict, out: &mut Vec<u8>) {
    out.push(b'd');
    for (key, value) in dict {
        encode_bytes_into(key.as_bytes(), out);
        encode_value_into(value, out);
    }
    out.push(b'e');
}

fn encode_bytes_into(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn encode_value_into(value: &WireValue, out: &mut Vec<u8>) {
    match value {
        WireValue::Int(v) => {
            out.push(b'i');
            out.extend_from_slice(v.to_string().as_bytes());
            out.push(b'e');
        }
        WireValue::Bytes(b) => encode_bytes_into(b, out),
        WireValue::List(items) => {
            out.push(b'l');
            for item in items {
                encode_value_into(item, out);
            }
            out.push(b'e');
        }
        WireValue::Dict(d) => encode_dict_into(d, out),
    }
}

/// Decode a canonical dict payload, rejecting trailing bytes.
pub fn decode_dict(data: &[u8]) -> Result<WireDict, WireError> {
    let mut cursor = Cursor { data, pos: 0 };
    let dict = cursor.read_dict()?;
    if cursor.pos != data.len() {
        return Err(WireError::TrailingData);
    }
    Ok(dict)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Result<u8, WireError> {
        self.data.get(self.pos).copied().ok_or(WireError::Truncated)
    }

    fn take(&mut self) -> Result<u8, WireError> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn read_dict(&mut self) -> Result<WireDict, WireError> {
        match self.take()? {
            b'd' => {}
            other => return Err(WireError::BadMarker(other)),
        }
        let mut dict = WireDict::new();
        let mut last_key: Option<Vec<u8>> = None;
        while self.peek()? != b'e' {
            let key = self.read_byte_string()?;
            if let Some(prev) = &last_key {
                if key.as_slice() <= prev.as_slice() {
                    return Err(WireError::KeyOrder);
                }
            }
            let value = self.read_value()?;
            let key_str = String::from_utf8(key.clone()).map_err(|_| WireError::KeyOrder)?;
            dict.insert(key_str, value);
            last_key = Some(key);
        }
        self.pos += 1; // consume 'e'
        Ok(dict)
    }

    fn read_value(&mut self) -> Result<WireValue, WireError> {
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let v = self.read_int_until(b'e')?;
                Ok(WireValue::Int(v))
            }
            b'0'..=b'9' => Ok(WireValue::Bytes(self.read_byte_string()?)),
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.read_value()?);
                }
                self.pos += 1;
                Ok(WireValue::List(items))
            }
            b'd' => Ok(WireValue::Dict(self.read_dict()?)),
            other => Err(WireError::BadMarker(other)),
        }
    }

    fn read_byte_string(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_int_until(b':').map_err(|_| WireError::BadLength)? as usize;
        let end = self.pos.checked_add(len).ok_or(WireError::BadLength)?;
        if end > self.data.len() {
            return Err(WireError::Truncated);
        }
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn read_int_until(&mut self, terminator: u8) -> Result<u64, WireError> {
        let start = self.pos;
        let mut value: u64 = 0;
        loop {
            let b = self.take()?;
            if b == terminator {
                if self.pos - 1 == start {
                    return Err(WireError::BadInt);
                }
                return Ok(value);
            }
            if !b.is_ascii_digit() {
                return Err(WireError::BadInt);
            }
            // Leading zeros would break canonical encoding.
            if value == 0 && self.pos - 1 > start {
                return Err(WireError::BadInt);
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as u64))
                .ok_or(WireError::BadInt)?;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Typed field accessors
// ═══════════════════════════════════════════════════════════════════════

/// Required u64 field.
pub(crate) fn require_int(dict: &WireDict, key: &'static str) -> Result<u64, WireError> {
    dict.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_int()
        .ok_or(WireError::WrongType(key))
}

/// Required byte-string field.
pub(crate) fn require_bytes<'a>(
    dict: &'a WireDict,
    key: &'static str,
) -> Result<&'a [u8], WireError> {
    dict.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_bytes()
        .ok_or(WireError::WrongType(key))
}

/// Required byte-string field of an exact size.
pub(crate) fn require_sized_bytes<'a>(
    dict: &'a WireDict,
    key: &'static str,
    size: usize,
) -> Result<&'a [u8], WireError> {
    let bytes = require_bytes(dict, key)?;
    if bytes.len() != size {
        return Err(WireError::BadSize(key));
    }
    Ok(bytes)
}

/// Required list field.
pub(crate) fn require_list<'a>(
    dict: &'a WireDict,
    key: &'static str,
) -> Result<&'a [WireValue], WireError> {
    dict.get(key)
        .ok_or(WireError::MissingField(key))?
        .as_list()
        .ok_or(WireError::WrongType(key))
}

/// Optional u64 field, defaulting when absent or mistyped.
pub(crate) fn int_or(dict: &WireDict, key: &str, fallback: u64) -> u64 {
    dict.get(key).and_then(WireValue::as_int).unwrap_or(fallback)
}
