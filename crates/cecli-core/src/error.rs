//! Error taxonomy shared by every cecli component.
//!
//! Failures carry a stable [`ErrorCode`] plus a human-readable message so that
//! callers can branch on the kind of failure without matching strings. Codes
//! survive layer boundaries unchanged: a TLS load failure raised while building
//! a client is still `TlsConfig` when it reaches the command layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for cecli operations.
pub type Result<T> = std::result::Result<T, EventError>;

/// Message used when a failure site does not provide one.
pub const DEFAULT_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Kind of failure, numbered from 1 in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Failure with no more specific classification.
    Unknown = 1,
    /// Payload or envelope could not be encoded or decoded.
    InvalidFormat = 2,
    /// Target URL could not be parsed.
    InvalidUrl = 3,
    /// Certificate or private key could not be loaded or parsed.
    TlsConfig = 4,
    /// Transport-level delivery failure after all retries.
    SendFailed = 5,
    /// Listener could not bind or its serve loop failed.
    ReceiveFailed = 6,
    /// Receiver explicitly rejected the event after all retries.
    NotAccepted = 7,
}

impl ErrorCode {
    /// Returns the numeric value of the code.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the snake_case name of the code.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InvalidFormat => "invalid_format",
            Self::InvalidUrl => "invalid_url",
            Self::TlsConfig => "tls_config",
            Self::SendFailed => "send_failed",
            Self::ReceiveFailed => "receive_failed",
            Self::NotAccepted => "not_accepted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Coded failure returned by every cecli operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("CloudEventError - {code}: {message}")]
pub struct EventError {
    code: ErrorCode,
    message: String,
}

impl EventError {
    /// Creates an error from a code and an optional message.
    ///
    /// A missing message falls back to [`DEFAULT_ERROR_MESSAGE`].
    pub fn new(code: ErrorCode, message: Option<String>) -> Self {
        Self { code, message: message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()) }
    }

    /// Creates an `Unknown` error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, Some(message.into()))
    }

    /// Creates an `InvalidFormat` error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, Some(message.into()))
    }

    /// Creates an `InvalidUrl` error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidUrl, Some(message.into()))
    }

    /// Creates a `TlsConfig` error.
    pub fn tls_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TlsConfig, Some(message.into()))
    }

    /// Creates a `SendFailed` error.
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SendFailed, Some(message.into()))
    }

    /// Creates a `ReceiveFailed` error.
    pub fn receive_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReceiveFailed, Some(message.into()))
    }

    /// Creates a `NotAccepted` error.
    pub fn not_accepted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotAccepted, Some(message.into()))
    }

    /// Returns the failure kind.
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_numbered_in_declaration_order() {
        assert_eq!(ErrorCode::Unknown.as_u8(), 1);
        assert_eq!(ErrorCode::InvalidFormat.as_u8(), 2);
        assert_eq!(ErrorCode::InvalidUrl.as_u8(), 3);
        assert_eq!(ErrorCode::TlsConfig.as_u8(), 4);
        assert_eq!(ErrorCode::SendFailed.as_u8(), 5);
        assert_eq!(ErrorCode::ReceiveFailed.as_u8(), 6);
        assert_eq!(ErrorCode::NotAccepted.as_u8(), 7);
    }

    #[test]
    fn missing_message_uses_default() {
        let error = EventError::new(ErrorCode::SendFailed, None);

        assert_eq!(error.code(), ErrorCode::SendFailed);
        assert_eq!(error.message(), DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn helper_constructors_keep_code() {
        assert_eq!(EventError::unknown("x").code(), ErrorCode::Unknown);
        assert_eq!(EventError::invalid_format("x").code(), ErrorCode::InvalidFormat);
        assert_eq!(EventError::invalid_url("x").code(), ErrorCode::InvalidUrl);
        assert_eq!(EventError::tls_config("x").code(), ErrorCode::TlsConfig);
        assert_eq!(EventError::send_failed("x").code(), ErrorCode::SendFailed);
        assert_eq!(EventError::receive_failed("x").code(), ErrorCode::ReceiveFailed);
        assert_eq!(EventError::not_accepted("x").code(), ErrorCode::NotAccepted);
    }

    #[test]
    fn error_display_format() {
        let error = EventError::tls_config("no such file");
        assert_eq!(error.to_string(), "CloudEventError - 4: no such file");
    }

    #[test]
    fn error_serializes_with_code_name() {
        let error = EventError::not_accepted("rejected");
        let json = serde_json::to_value(&error).unwrap();

        assert_eq!(json["code"], "not_accepted");
        assert_eq!(json["message"], "rejected");
    }
}
