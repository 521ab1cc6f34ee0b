//! Canonical (recursive length-prefix) encoding of transaction fields
//!
//! Byte strings of one byte below 0x80 encode as themselves, strings shorter
//! than 56 bytes get a single `0x80 + len` prefix, longer ones get `0xb7 +
//! len(len)` followed by the big-endian length. Lists use the same scheme
//! starting at `0xc0` / `0xf7` over their concatenated encoded items.
//! Integers are written as minimal big-endian byte strings, so zero is the
//! empty string and no integer ever carries a leading zero byte.

use ethers::types::{Address, U256};
use thiserror::Error;

const SHORT_STRING: u8 = 0x80;
const LONG_STRING: u8 = 0xb7;
const SHORT_LIST: u8 = 0xc0;
const LONG_LIST: u8 = 0xf7;
const SHORT_LIMIT: usize = 56;
/// Deepest list nesting the decoder accepts
pub const MAX_DEPTH: usize = 16;

/// Errors raised while decoding canonical bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RlpError {
    #[error("input is empty")]
    Empty,

    #[error("input truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("non-canonical length prefix")]
    NonCanonicalLength,

    #[error("single byte below 0x80 carries a prefix")]
    NonCanonicalSingleByte,

    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),

    #[error("expected a list")]
    ExpectedList,

    #[error("expected a byte string")]
    ExpectedString,

    #[error("integer has leading zero bytes")]
    LeadingZero,

    #[error("integer does not fit in {0} bits")]
    Overflow(u32),

    #[error("lists nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// One field of a structured list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    /// Unsigned integer, written as its minimal big-endian bytes
    Uint(U256),
    /// Opaque byte string
    Bytes(Vec<u8>),
    /// Absent value (e.g. the recipient of a deployment); encodes as the empty string
    Null,
    /// Nested list
    List(Vec<RlpItem>),
}

impl From<u64> for RlpItem {
    fn from(value: u64) -> Self {
        RlpItem::Uint(U256::from(value))
    }
}

impl From<U256> for RlpItem {
    fn from(value: U256) -> Self {
        RlpItem::Uint(value)
    }
}

impl From<Vec<u8>> for RlpItem {
    fn from(value: Vec<u8>) -> Self {
        RlpItem::Bytes(value)
    }
}

impl From<&[u8]> for RlpItem {
    fn from(value: &[u8]) -> Self {
        RlpItem::Bytes(value.to_vec())
    }
}

impl From<Option<Address>> for RlpItem {
    fn from(value: Option<Address>) -> Self {
        match value {
            Some(address) => RlpItem::Bytes(address.as_bytes().to_vec()),
            None => RlpItem::Null,
        }
    }
}

impl RlpItem {
    /// Encode this item
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }

    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            RlpItem::Uint(value) => encode_string(&minimal_be_bytes(value), out),
            RlpItem::Bytes(bytes) => encode_string(bytes, out),
            RlpItem::Null => encode_string(&[], out),
            RlpItem::List(items) => encode_list_to(items, out),
        }
    }

    /// The shape this item takes after a decode: integers become their
    /// minimal bytes and `Null` becomes the empty string.
    pub fn normalized(&self) -> RlpItem {
        match self {
            RlpItem::Uint(value) => RlpItem::Bytes(minimal_be_bytes(value)),
            RlpItem::Bytes(bytes) => RlpItem::Bytes(bytes.clone()),
            RlpItem::Null => RlpItem::Bytes(Vec::new()),
            RlpItem::List(items) => RlpItem::List(items.iter().map(RlpItem::normalized).collect()),
        }
    }

    /// Borrow the byte string
    pub fn as_bytes(&self) -> Result<&[u8], RlpError> {
        match self {
            RlpItem::Bytes(bytes) => Ok(bytes),
            RlpItem::Null => Ok(&[]),
            _ => Err(RlpError::ExpectedString),
        }
    }

    /// Borrow the list items
    pub fn as_list(&self) -> Result<&[RlpItem], RlpError> {
        match self {
            RlpItem::List(items) => Ok(items),
            _ => Err(RlpError::ExpectedList),
        }
    }

    /// Interpret a decoded byte string as a canonical integer
    pub fn as_u256(&self) -> Result<U256, RlpError> {
        if let RlpItem::Uint(value) = self {
            return Ok(*value);
        }
        let bytes = self.as_bytes()?;
        if bytes.first() == Some(&0) {
            return Err(RlpError::LeadingZero);
        }
        if bytes.len() > 32 {
            return Err(RlpError::Overflow(256));
        }
        Ok(U256::from_big_endian(bytes))
    }

    /// Interpret a decoded byte string as a canonical 64-bit integer
    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let value = self.as_u256()?;
        if value > U256::from(u64::MAX) {
            return Err(RlpError::Overflow(64));
        }
        Ok(value.as_u64())
    }
}

/// Encode an ordered field list as one canonical list
pub fn encode_list(items: &[RlpItem]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_list_to(items, &mut out);
    out
}

/// Decode exactly one item; the input must hold nothing else
pub fn decode(bytes: &[u8]) -> Result<RlpItem, RlpError> {
    let (item, consumed) = decode_item(bytes, 0)?;
    if consumed != bytes.len() {
        return Err(RlpError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(item)
}

/// Decode a top-level list into its items
pub fn decode_list(bytes: &[u8]) -> Result<Vec<RlpItem>, RlpError> {
    match decode(bytes)? {
        RlpItem::List(items) => Ok(items),
        _ => Err(RlpError::ExpectedList),
    }
}

/// Minimal big-endian representation of an integer (empty for zero)
pub fn minimal_be_bytes(value: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    trim_leading_zeros(&buf).to_vec()
}

/// Strip leading zero bytes from a big-endian integer
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn encode_string(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.len() == 1 && bytes[0] < SHORT_STRING {
        out.push(bytes[0]);
        return;
    }
    encode_header(bytes.len(), SHORT_STRING, LONG_STRING, out);
    out.extend_from_slice(bytes);
}

fn encode_list_to(items: &[RlpItem], out: &mut Vec<u8>) {
    let mut payload = Vec::new();
    for item in items {
        item.encode_to(&mut payload);
    }
    encode_header(payload.len(), SHORT_LIST, LONG_LIST, out);
    out.extend_from_slice(&payload);
}

fn encode_header(len: usize, short_base: u8, long_base: u8, out: &mut Vec<u8>) {
    if len < SHORT_LIMIT {
        out.push(short_base + len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let len_bytes = trim_leading_zeros(&len_bytes);
        out.push(long_base + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}

fn decode_item(buf: &[u8], depth: usize) -> Result<(RlpItem, usize), RlpError> {
    let prefix = *buf.first().ok_or(RlpError::Empty)?;

    match prefix {
        0x00..=0x7f => Ok((RlpItem::Bytes(vec![prefix]), 1)),
        0x80..=0xb7 => {
            let len = (prefix - SHORT_STRING) as usize;
            let body = take(buf, 1, len)?;
            if len == 1 && body[0] < SHORT_STRING {
                return Err(RlpError::NonCanonicalSingleByte);
            }
            Ok((RlpItem::Bytes(body.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = (prefix - LONG_STRING) as usize;
            let len = read_long_length(buf, len_of_len)?;
            let body = take(buf, 1 + len_of_len, len)?;
            Ok((RlpItem::Bytes(body.to_vec()), 1 + len_of_len + len))
        }
        0xc0..=0xf7 => {
            let len = (prefix - SHORT_LIST) as usize;
            let body = take(buf, 1, len)?;
            Ok((RlpItem::List(decode_items(body, depth + 1)?), 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = (prefix - LONG_LIST) as usize;
            let len = read_long_length(buf, len_of_len)?;
            let body = take(buf, 1 + len_of_len, len)?;
            Ok((
                RlpItem::List(decode_items(body, depth + 1)?),
                1 + len_of_len + len,
            ))
        }
    }
}

fn decode_items(mut body: &[u8], depth: usize) -> Result<Vec<RlpItem>, RlpError> {
    if depth > MAX_DEPTH {
        return Err(RlpError::TooDeep);
    }
    let mut items = Vec::new();
    while !body.is_empty() {
        let (item, consumed) = decode_item(body, depth)?;
        items.push(item);
        body = &body[consumed..];
    }
    Ok(items)
}

fn read_long_length(buf: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
    let len_bytes = take(buf, 1, len_of_len)?;
    if len_bytes[0] == 0 {
        return Err(RlpError::NonCanonicalLength);
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(RlpError::Overflow(usize::BITS));
    }
    let len = len_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if len < SHORT_LIMIT {
        return Err(RlpError::NonCanonicalLength);
    }
    Ok(len)
}

fn take(buf: &[u8], start: usize, len: usize) -> Result<&[u8], RlpError> {
    let end = start.checked_add(len).ok_or(RlpError::Overflow(usize::BITS))?;
    if end > buf.len() {
        return Err(RlpError::Truncated {
            needed: end,
            available: buf.len(),
        });
    }
    Ok(&buf[start..end])
}
