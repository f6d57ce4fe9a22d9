//! Remote completion error types.
//!
//! Every failure is local to one task: the executor turns it into a failed
//! outcome and keeps going. Nothing here is retried.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote completion call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("upstream error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Label for a `CompletionError`, kept in task outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    Auth,
    Transport,
    RateLimited,
    Upstream,
    Timeout,
    /// No agent registered for the task kind.
    Unregistered,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionErrorKind::Auth => "auth",
            CompletionErrorKind::Transport => "transport",
            CompletionErrorKind::RateLimited => "rate_limited",
            CompletionErrorKind::Upstream => "upstream",
            CompletionErrorKind::Timeout => "timeout",
            CompletionErrorKind::Unregistered => "unregistered",
        };
        f.write_str(s)
    }
}

impl CompletionError {
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            CompletionError::Auth(_) => CompletionErrorKind::Auth,
            CompletionError::Transport(_) => CompletionErrorKind::Transport,
            CompletionError::RateLimited { .. } => CompletionErrorKind::RateLimited,
            CompletionError::Upstream { .. } => CompletionErrorKind::Upstream,
            CompletionError::Timeout(_) => CompletionErrorKind::Timeout,
        }
    }

    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            body.trim().to_string()
        };
        match status {
            401 | 403 => CompletionError::Auth(message),
            429 => CompletionError::RateLimited {
                message,
                retry_after,
            },
            404 => CompletionError::Upstream {
                status: Some(status),
                message: format!("deployment not found: {}", message),
            },
            _ => CompletionError::Upstream {
                status: Some(status),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: format!("invalid response body: {}", err),
            }
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}
