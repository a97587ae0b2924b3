//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! (RESP) the server speaks.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its wire encoding
//! - `parser`: incremental parser over a byte slice
//! - `reader`: buffered decoder over an async byte stream
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("bar"));
//! assert_eq!(response.serialize(), b"$3\r\nbar\r\n");
//! ```

pub mod parser;
pub mod reader;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser, MAX_LINE_LENGTH};
pub use reader::{DecodeError, RespReader};
pub use types::RespValue;
