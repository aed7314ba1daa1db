//! Self-describing binary payload model (strict CBOR subset).
//!
//! Covers exactly the forms the provisioning payloads use: unsigned
//! integers, negative integers (`-1 - unsigned`), byte strings, UTF-8 text,
//! arrays, text-keyed maps, booleans, and null. The encoder always emits the
//! shortest length prefix (inline < 24, then 1-, 2-, or 4-byte arguments).
//! The decoder accepts the same forms and nothing else: indefinite lengths,
//! 8-byte arguments, tags, and half/float forms are decode errors, as is any
//! out-of-bounds advance.
//!
//! Map keys are text strings in this protocol; a non-text key is a decode
//! error. Unknown keys are a dispatch-layer concern (skipped there, not
//! here).

use thiserror::Error;

/// Maximum nesting depth the decoder will follow.
///
/// The provisioning payloads nest three levels at most; the bound keeps a
/// hostile payload from recursing the parser off the stack.
const MAX_DEPTH: usize = 16;

/// Errors from the payload value codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Input ended inside an item.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Byte offset where more input was required.
        offset: usize,
    },

    /// Initial byte encodes a form outside the supported subset.
    #[error("unsupported header byte {byte:#04x} at offset {offset}")]
    UnsupportedHeader {
        /// The offending initial byte.
        byte: u8,
        /// Byte offset of the item.
        offset: usize,
    },

    /// Map key was not a text string.
    #[error("map key at offset {offset} is not a text string")]
    MapKeyNotText {
        /// Byte offset of the key item.
        offset: usize,
    },

    /// Text string bytes were not valid UTF-8.
    #[error("text at offset {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Byte offset of the text item.
        offset: usize,
    },

    /// Nesting exceeded [`MAX_DEPTH`].
    #[error("nesting depth exceeds {max}")]
    DepthExceeded {
        /// The depth limit.
        max: usize,
    },

    /// Input continued past the end of the root value.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Bytes left over.
        remaining: usize,
    },

    /// Integer magnitude does not fit a 4-byte argument.
    #[error("integer magnitude {magnitude} exceeds the 4-byte encodable range")]
    IntegerTooWide {
        /// The unencodable magnitude.
        magnitude: u64,
    },

    /// String/collection length does not fit a 4-byte argument.
    #[error("length {len} exceeds the 4-byte encodable range")]
    LengthTooWide {
        /// The unencodable length.
        len: usize,
    },
}

/// One payload value.
///
/// `Int` carries negative values only on the wire (major type 1); a
/// non-negative `Int` is normalized to the unsigned form when encoded, so
/// round trips canonicalize it to [`Value::Uint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer, at most `u32::MAX` (4-byte argument limit).
    Uint(u64),
    /// Negative integer, wire form `-1 - unsigned`.
    Int(i64),
    /// Byte string (unused by the provisioning payloads, kept for the model).
    Bytes(Vec<u8>),
    /// UTF-8 text string, copied by value.
    Text(String),
    /// Definite-length array.
    Array(Vec<Value>),
    /// Definite-length map with text keys, in encoded order.
    Map(Vec<(String, Value)>),
    /// Boolean simple value.
    Bool(bool),
    /// Null (also accepts the undefined simple value on decode).
    Null,
}

impl Value {
    /// Build a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Encode to wire bytes.
    ///
    /// # Errors
    ///
    /// [`ValueError::IntegerTooWide`] / [`ValueError::LengthTooWide`] when a
    /// magnitude or length needs more than a 4-byte argument.
    pub fn encode(&self) -> Result<Vec<u8>, ValueError> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Encode, appending to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ValueError> {
        match self {
            Self::Uint(n) => write_int_head(out, 0, *n),
            Self::Int(n) => {
                if *n >= 0 {
                    write_int_head(out, 0, *n as u64)
                } else {
                    // wire magnitude m encodes -1 - m
                    let magnitude = (-1i128 - i128::from(*n)) as u64;
                    write_int_head(out, 1, magnitude)
                }
            },
            Self::Bytes(b) => {
                write_len_head(out, 2, b.len())?;
                out.extend_from_slice(b);
                Ok(())
            },
            Self::Text(s) => {
                write_len_head(out, 3, s.len())?;
                out.extend_from_slice(s.as_bytes());
                Ok(())
            },
            Self::Array(items) => {
                write_len_head(out, 4, items.len())?;
                for item in items {
                    item.encode_into(out)?;
                }
                Ok(())
            },
            Self::Map(entries) => {
                write_len_head(out, 5, entries.len())?;
                for (key, value) in entries {
                    write_len_head(out, 3, key.len())?;
                    out.extend_from_slice(key.as_bytes());
                    value.encode_into(out)?;
                }
                Ok(())
            },
            Self::Bool(false) => {
                out.push(0xF4);
                Ok(())
            },
            Self::Bool(true) => {
                out.push(0xF5);
                Ok(())
            },
            Self::Null => {
                out.push(0xF6);
                Ok(())
            },
        }
    }

    /// Decode exactly one value from `bytes`.
    ///
    /// # Errors
    ///
    /// Any strictness violation listed on [`ValueError`], including
    /// [`ValueError::TrailingBytes`] when input continues past the root
    /// value.
    pub fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        let mut decoder = Decoder { buf: bytes, pos: 0 };
        let value = decoder.value(MAX_DEPTH)?;
        let remaining = decoder.buf.len() - decoder.pos;
        if remaining != 0 {
            return Err(ValueError::TrailingBytes { remaining });
        }
        Ok(value)
    }

    /// Map lookup by key. `None` for non-maps and missing keys.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text accessor.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned-integer accessor.
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean accessor.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array accessor.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Map-entry accessor.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(String, Self)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Uint(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Shortest-form head for an integer argument.
fn write_int_head(out: &mut Vec<u8>, major: u8, arg: u64) -> Result<(), ValueError> {
    if arg > u64::from(u32::MAX) {
        return Err(ValueError::IntegerTooWide { magnitude: arg });
    }
    write_head(out, major, arg);
    Ok(())
}

/// Shortest-form head for a length argument.
fn write_len_head(out: &mut Vec<u8>, major: u8, len: usize) -> Result<(), ValueError> {
    if len > u32::MAX as usize {
        return Err(ValueError::LengthTooWide { len });
    }
    write_head(out, major, len as u64);
    Ok(())
}

fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    debug_assert!(arg <= u64::from(u32::MAX));
    let major = major << 5;
    if arg < 24 {
        out.push(major | arg as u8);
    } else if arg <= 0xFF {
        out.push(major | 24);
        out.push(arg as u8);
    } else if arg <= 0xFFFF {
        out.push(major | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else {
        out.push(major | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn byte(&mut self) -> Result<u8, ValueError> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(ValueError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ValueError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ValueError::UnexpectedEof { offset: self.buf.len() })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Argument for additional-info `ai`. Only the 1/2/4-byte forms and
    /// inline values are in the subset.
    fn arg(&mut self, initial: u8, offset: usize) -> Result<u64, ValueError> {
        match initial & 0x1F {
            ai @ 0..=23 => Ok(u64::from(ai)),
            24 => Ok(u64::from(self.byte()?)),
            25 => {
                let raw = self.take(2)?;
                Ok(u64::from(u16::from_be_bytes([raw[0], raw[1]])))
            },
            26 => {
                let raw = self.take(4)?;
                Ok(u64::from(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])))
            },
            // 27 (8-byte), 28..=30 (reserved), 31 (indefinite)
            _ => Err(ValueError::UnsupportedHeader { byte: initial, offset }),
        }
    }

    fn text(&mut self, len: usize, offset: usize) -> Result<String, ValueError> {
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ValueError::InvalidUtf8 { offset })
    }

    fn value(&mut self, depth: usize) -> Result<Value, ValueError> {
        if depth == 0 {
            return Err(ValueError::DepthExceeded { max: MAX_DEPTH });
        }

        let offset = self.pos;
        let initial = self.byte()?;
        match initial >> 5 {
            0 => Ok(Value::Uint(self.arg(initial, offset)?)),
            1 => {
                let magnitude = self.arg(initial, offset)?;
                Ok(Value::Int(-1 - magnitude as i64))
            },
            2 => {
                let len = self.arg(initial, offset)? as usize;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            },
            3 => {
                let len = self.arg(initial, offset)? as usize;
                Ok(Value::Text(self.text(len, offset)?))
            },
            4 => {
                let count = self.arg(initial, offset)? as usize;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.value(depth - 1)?);
                }
                Ok(Value::Array(items))
            },
            5 => {
                let count = self.arg(initial, offset)? as usize;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key_offset = self.pos;
                    let key_initial = self.byte()?;
                    if key_initial >> 5 != 3 {
                        return Err(ValueError::MapKeyNotText { offset: key_offset });
                    }
                    let key_len = self.arg(key_initial, key_offset)? as usize;
                    let key = self.text(key_len, key_offset)?;
                    entries.push((key, self.value(depth - 1)?));
                }
                Ok(Value::Map(entries))
            },
            7 => match initial & 0x1F {
                20 => Ok(Value::Bool(false)),
                21 => Ok(Value::Bool(true)),
                22 | 23 => Ok(Value::Null),
                // simple-with-byte, half, single, double, break
                _ => Err(ValueError::UnsupportedHeader { byte: initial, offset }),
            },
            // major 6: tags
            _ => Err(ValueError::UnsupportedHeader { byte: initial, offset }),
        }
    }
}
