// src/error.rs
use std::fmt;
use std::io;
use thiserror::Error;

use crate::endpoint::Scheme;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, ExportError>;

/// Result type returned by senders
pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;

/// Custom Error type for the graphite-report library
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Report binding is already registered")]
    AlreadyBound,

    #[error("Report host error: {0}")]
    Host(String),
}

impl ExportError {
    /// Build an `InvalidEndpoint` error for a scheme outside the recognized set
    pub fn unknown_scheme(value: impl Into<String>) -> Self {
        ExportError::InvalidEndpoint {
            value: value.into(),
            reason: format!(
                "scheme must be one of {} (ex: net.udp://graphite.myhost.com:2003)",
                Scheme::tokens().join(", ")
            ),
        }
    }

    /// Build an `InvalidEndpoint` error with a free-form reason
    pub fn invalid_endpoint(value: impl Into<String>, reason: impl Into<String>) -> Self {
        ExportError::InvalidEndpoint {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// What went wrong while delivering a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    /// Could not connect, or the connection broke mid-write
    Connection,
    /// Connect or write did not finish within the configured timeout
    Timeout,
    /// A sample could not be encoded for the wire
    Serialization,
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryErrorKind::Connection => "connection",
            DeliveryErrorKind::Timeout => "timeout",
            DeliveryErrorKind::Serialization => "serialization",
        };
        f.write_str(name)
    }
}

/// A failed send to a remote collector
#[derive(Error, Debug)]
#[error("{kind} error delivering to {target}: {message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub target: String,
    pub message: String,
    #[source]
    pub source: Option<io::Error>,
}

impl DeliveryError {
    pub fn connection(target: impl fmt::Display, err: io::Error) -> Self {
        Self {
            kind: DeliveryErrorKind::Connection,
            target: target.to_string(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn timeout(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Timeout,
            target: target.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub fn serialization(target: impl fmt::Display, message: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Serialization,
            target: target.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme_names_value_and_tokens() {
        let err = ExportError::unknown_scheme("http");
        let msg = err.to_string();
        assert!(msg.contains("'http'"));
        assert!(msg.contains("net.tcp"));
        assert!(msg.contains("net.udp"));
        assert!(msg.contains("net.pickled"));
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::connection(
            "graphite:2003",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.kind, DeliveryErrorKind::Connection);
        assert_eq!(
            err.to_string(),
            "connection error delivering to graphite:2003: refused"
        );
    }
}
