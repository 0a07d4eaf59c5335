//! Completion request failure type

use std::fmt;
use thiserror::Error;

/// Any failed completion request.
///
/// Every kind is absorbed into the same fallback message by the controller;
/// the kind only feeds diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RequestFailed {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailed {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotConfigured, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Status, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}

/// Diagnostic classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// API key or URL missing
    NotConfigured,
    /// Connection failures, timeouts, body read errors
    Network,
    /// Non-2xx HTTP status
    Status,
    /// Body was not JSON or lacked the reply path
    MalformedResponse,
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NotConfigured => "not_configured",
            FailureKind::Network => "network",
            FailureKind::Status => "status",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
