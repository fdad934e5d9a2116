//! Shared value types exchanged between the executor, the tracker and callers.

use crate::constants::ResultCode;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use std::fmt;

/// `(result code, message)` pair.
///
/// Returned synchronously by command invocation, and recorded by the tracker as
/// the outcome of a command. Serialises as `[code, "message"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub code: ResultCode,
    pub message: String,
}

impl CommandResult {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Ok, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Failed, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Rejected, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Aborted, message)
    }

    /// JSON text as published on the result feed
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("[{}, \"{}\"]", self.code as u8, self.message.escape_default())
        })
    }

    pub fn into_tuple(self) -> (ResultCode, String) {
        (self.code, self.message)
    }
}

impl From<(ResultCode, String)> for CommandResult {
    fn from((code, message): (ResultCode, String)) -> Self {
        Self { code, message }
    }
}

impl From<(ResultCode, &str)> for CommandResult {
    fn from((code, message): (ResultCode, &str)) -> Self {
        Self::new(code, message)
    }
}

impl Serialize for CommandResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.code)?;
        tuple.serialize_element(&self.message)?;
        tuple.end()
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.code, self.message)
    }
}
