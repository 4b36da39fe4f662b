// src/error.rs
//! Error taxonomy for the fetch engine.
//!
//! Per-request failures are classified once, at the transport boundary, so the
//! executor can decide retry vs. abort without re-inspecting status codes.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Coarse failure class, carried into the `StopReason::Error` terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    TransientNetwork,
    RateLimited,
    ServerError,
    ClientError,
    Malformed,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::TransientNetwork => "transient_network",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ServerError => "server_error",
            ErrorClass::ClientError => "client_error",
            ErrorClass::Malformed => "malformed",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("server error (status {status})")]
    Server { status: u16 },

    /// Non-429 4xx. Usually a bad feed id or bad credentials.
    #[error("client error (status {status}): {body}")]
    Client { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => ErrorClass::TransientNetwork,
            FetchError::RateLimited { .. } => ErrorClass::RateLimited,
            FetchError::Server { .. } => ErrorClass::ServerError,
            FetchError::Client { .. } => ErrorClass::ClientError,
            FetchError::Decode(_) => ErrorClass::Malformed,
            FetchError::Exhausted { last, .. } => last.class(),
        }
    }

    /// 429, 5xx and network/timeouts are retried; everything else aborts the page.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_)
                | FetchError::Network(_)
                | FetchError::RateLimited { .. }
                | FetchError::Server { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => FetchError::RateLimited { status },
            500..=599 => FetchError::Server { status },
            _ => FetchError::Client { status, body },
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("reading config from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
