//! Command Handler
//!
//! Resolves a decoded request to a command and runs it against the storage
//! engine. Every request produces exactly one reply; a request that is
//! well-formed on the wire but invalid as a command becomes an error reply
//! and never touches the store.
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `GET key`
//! - `SET key value [PX milliseconds]`

use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A request that decoded fine but cannot be executed.
///
/// The `Display` text is sent back to the client verbatim as an error reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR invalid command format")]
    InvalidFormat,

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR invalid command name")]
    InvalidCommandName,

    #[error("ERR invalid argument")]
    InvalidArgument,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR unknown option for set: {0}")]
    UnknownSetOption(String),

    #[error("ERR PX value ({0}) is not an integer")]
    NotAnInteger(String),

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::error(err.to_string())
    }
}

type CommandResult = Result<RespValue, CommandError>;

/// Executes client requests against a shared [`StorageEngine`].
///
/// Cheap to clone; every connection gets its own handle.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a request and returns the reply to send back.
    ///
    /// # Arguments
    ///
    /// * `command` - The decoded request, normally an array of bulk strings
    pub fn execute(&self, command: RespValue) -> RespValue {
        match self.try_execute(command) {
            Ok(reply) => reply,
            Err(err) => {
                debug!(error = %err, "Command rejected");
                err.into()
            }
        }
    }

    fn try_execute(&self, command: RespValue) -> CommandResult {
        let args = command.into_array().ok_or(CommandError::InvalidFormat)?;
        let (name, args) = args.split_first().ok_or(CommandError::EmptyCommand)?;

        let name = name.to_bytes().ok_or(CommandError::InvalidCommandName)?;
        self.dispatch(&String::from_utf8_lossy(&name), args)
    }

    /// Dispatches a command to its handler. Names match case-insensitively.
    fn dispatch(&self, name: &str, args: &[RespValue]) -> CommandResult {
        match name.to_ascii_uppercase().as_str() {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),
            _ => Err(CommandError::UnknownCommand(name.to_string())),
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> CommandResult {
        match args {
            [] => Ok(RespValue::pong()),
            [message] => Ok(RespValue::bulk_string(arg_bytes(message)?)),
            _ => Err(CommandError::WrongArity("ping")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> CommandResult {
        match args {
            [message] => Ok(RespValue::bulk_string(arg_bytes(message)?)),
            _ => Err(CommandError::WrongArity("echo")),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("get"));
        };

        let key = arg_bytes(key)?;
        Ok(match self.storage.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SET key value [PX milliseconds]
    ///
    /// All arguments are validated before the store is touched.
    fn cmd_set(&self, args: &[RespValue]) -> CommandResult {
        let (key, value, ttl) = match args {
            [key, value] => (key, value, None),
            [key, value, option, amount] => (key, value, Some(parse_px(option, amount)?)),
            [_, _, ..] => return Err(CommandError::Syntax),
            _ => return Err(CommandError::WrongArity("set")),
        };

        let key = arg_bytes(key)?;
        let value = arg_bytes(value)?;

        match ttl {
            Some(ttl) => self.storage.set_with_ttl(key, value, ttl),
            None => self.storage.set(key, value),
        }

        Ok(RespValue::ok())
    }
}

/// Extracts a non-null string argument.
fn arg_bytes(value: &RespValue) -> Result<Bytes, CommandError> {
    value.to_bytes().ok_or(CommandError::InvalidArgument)
}

/// Validates the `PX <milliseconds>` option of SET.
fn parse_px(option: &RespValue, amount: &RespValue) -> Result<Duration, CommandError> {
    let option = arg_bytes(option)?;
    if !option.eq_ignore_ascii_case(b"PX") {
        return Err(CommandError::UnknownSetOption(
            String::from_utf8_lossy(&option).into_owned(),
        ));
    }

    let amount = arg_bytes(amount)?;
    let text = String::from_utf8_lossy(&amount);
    let millis: i64 = text
        .parse()
        .map_err(|_| CommandError::NotAnInteger(text.to_string()))?;

    if millis < 0 {
        return Err(CommandError::InvalidExpireTime("set"));
    }

    Ok(Duration::from_millis(millis as u64))
}
