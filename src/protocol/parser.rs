//! Incremental RESP Parser
//!
//! The parser works on a byte slice and returns either:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the message is incomplete, more bytes are needed
//! - `Err(ParseError)` - the data is not valid RESP
//!
//! It never consumes input itself. The caller keeps a buffer, appends
//! network data to it and advances it by `consumed` after a successful
//! parse (see [`crate::protocol::reader::RespReader`]).

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A length, count or integer field is not a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Framing violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a header or simple line, excluding prefix and CRLF
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP protocol parser.
///
/// # Example
///
/// ```
/// use respkv::protocol::{RespParser, RespValue};
/// use bytes::Bytes;
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"*1\r\n$4\r\nPING\r\n").unwrap().unwrap();
/// assert_eq!(consumed, 14);
/// assert_eq!(value, RespValue::array(vec![RespValue::bulk_string(Bytes::from("PING"))]));
///
/// assert!(parser.parse(b"*1\r\n$4\r\nPI").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::Protocol(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(parse_line(buf)?
                .map(|(s, consumed)| (RespValue::SimpleString(s.to_string()), consumed))),
            prefix::ERROR => Ok(parse_line(buf)?
                .map(|(s, consumed)| (RespValue::Error(s.to_string()), consumed))),
            prefix::INTEGER => parse_integer(buf),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, header_len) = match parse_length(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        self.depth += 1;
        let result = self.parse_elements(&buf[header_len..], count as usize);
        self.depth -= 1;

        Ok(result?.map(|(elements, consumed)| (RespValue::Array(elements), header_len + consumed)))
    }

    fn parse_elements(
        &mut self,
        buf: &[u8],
        count: usize,
    ) -> ParseResult<Option<(Vec<RespValue>, usize)>> {
        // Cap the preallocation: the count comes straight off the wire.
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = 0;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((elements, consumed)))
    }
}

/// Parses the body of a `+` or `-` line, returning it without the prefix.
///
/// Only the first `MAX_LINE_LENGTH + 2` bytes after the prefix are searched;
/// a line that has not ended by then is rejected.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let window = &buf[1..buf.len().min(1 + MAX_LINE_LENGTH + CRLF.len())];
    match find_crlf(window) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // +1 for prefix, +2 for CRLF
            Ok(Some((s, 1 + pos + 2)))
        }
        None if window.len() == MAX_LINE_LENGTH + CRLF.len() => Err(ParseError::Protocol(
            format!("line exceeds {} bytes without CRLF", MAX_LINE_LENGTH),
        )),
        None => Ok(None),
    }
}

/// Parses the decimal header shared by `:`, `$` and `*`.
///
/// Returns the number and the size of the whole header line.
fn parse_length(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match parse_line(buf)? {
        Some((s, consumed)) => {
            let n: i64 = s
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))?;
            Ok(Some((n, consumed)))
        }
        None => Ok(None),
    }
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    Ok(parse_length(buf)?.map(|(n, consumed)| (RespValue::Integer(n), consumed)))
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    debug_assert!(buf[0] == prefix::BULK_STRING);

    let (length, data_start) = match parse_length(buf)? {
        Some(parsed) => parsed,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::BulkString(None), data_start)));
    }

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + CRLF.len();
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ParseError::Protocol(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((RespValue::BulkString(Some(data)), total_needed)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Parses a single RESP message from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
