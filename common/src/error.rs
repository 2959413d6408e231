//! # Error Kinds
//!
//! Every failure the discovery pipeline can observe, grouped by how far it is
//! allowed to propagate:
//!
//! * [`InvalidTargetError`]: bad input, rejects the whole run before any scan.
//! * [`InvalidAssetIdError`]: an asset id that cannot name a collector path, rejects the request.
//! * [`ScanEngineError`]: a scan call failed, aborts only the branch that made it.
//! * [`ResolutionError`]: a single DNS lookup failed, never aborts anything.
//! * [`SinkError`]: result delivery failed, logged by the caller.

use std::process::ExitStatus;

use thiserror::Error;

/// A raw target string that could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTargetError {
    #[error("target #{position} is empty")]
    Empty { position: usize },

    #[error("invalid CIDR block '{value}': {reason}")]
    Cidr { value: String, reason: String },

    #[error("'{value}' is neither an IP address nor a valid hostname")]
    Hostname { value: String },
}

/// An asset id that cannot be used as a single collector URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid asset id '{0}': expected 1 to 128 letters, digits, '-' or '_'")]
pub struct InvalidAssetIdError(pub String);

#[derive(Debug, Error)]
pub enum ScanEngineError {
    #[error("failed to launch scanner: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("scanner exited with {status}: {stderr}")]
    Exited { status: ExitStatus, stderr: String },

    #[error("failed to parse scanner output: {0}")]
    Parse(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no records found for '{0}'")]
    NoRecords(String),

    #[error("dns query for '{0}' timed out")]
    Timeout(String),

    #[error("malformed dns exchange: {0}")]
    Malformed(String),

    #[error("resolution cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("collector request failed: {0}")]
    Transport(String),

    #[error("collector answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode results: {0}")]
    Encode(String),
}
