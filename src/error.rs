use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy surfaced to callers of the stream engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimitOrCredit,
    Auth,
    Network,
    ServerError,
    Timeout,
    /// Malformed SSE frame. Recovered by skipping the frame.
    ParseError,
    /// Malformed fenced update block. Recovered by showing plain text.
    UpdateParseFailed,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimitOrCredit => "rate_limit_or_credit",
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::UpdateParseFailed => "update_parse_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// The single human-readable line shown to the user for this kind.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::RateLimitOrCredit => {
                "API credit limit reached. Please check your API key or add credits to continue."
            }
            ErrorKind::Auth => "API key is invalid or missing. Please check your configuration.",
            ErrorKind::Network => {
                "Network error. Please check your internet connection and try again."
            }
            ErrorKind::ServerError => {
                "Server error. The service is temporarily unavailable. Please try again later."
            }
            ErrorKind::Timeout => {
                "The response is taking too long. Please try again or rephrase your message."
            }
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::ParseError | ErrorKind::UpdateParseFailed | ErrorKind::Unknown => {
                "Sorry, I encountered an error. Please try again."
            }
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            402 | 429 => ErrorKind::RateLimitOrCredit,
            401 | 403 => ErrorKind::Auth,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    /// Best-effort classification of a free-form upstream error message.
    ///
    /// Providers do not expose a shared error taxonomy, so this matches on the
    /// wording and status codes that typically appear in their messages.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let has_any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if has_any(&[
            "credit",
            "rate limit",
            "quota",
            "insufficient",
            "402",
            "429",
        ]) {
            ErrorKind::RateLimitOrCredit
        } else if has_any(&["api key", "unauthorized", "401", "authentication"]) {
            ErrorKind::Auth
        } else if has_any(&["timed out", "timeout"]) {
            ErrorKind::Timeout
        } else if has_any(&["network", "fetch", "connection", "econnrefused"]) {
            ErrorKind::Network
        } else if has_any(&["500", "502", "503", "504"]) {
            ErrorKind::ServerError
        } else {
            ErrorKind::Unknown
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("endpoint '{url}' returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("request to '{url}' failed: {message}")]
    Transport {
        url: String,
        kind: ErrorKind,
        message: String,
    },

    #[error("stream did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("stream was cancelled")]
    Cancelled,

    #[error("server reported an error: {0}")]
    Server(String),

    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Status { status, body, .. } => match ErrorKind::from_status(*status) {
                ErrorKind::Unknown => ErrorKind::classify_message(body),
                kind => kind,
            },
            StreamError::Transport { kind, .. } => *kind,
            StreamError::Timeout(_) => ErrorKind::Timeout,
            StreamError::Cancelled => ErrorKind::Cancelled,
            StreamError::Server(message) => match ErrorKind::classify_message(message) {
                ErrorKind::Unknown => ErrorKind::ServerError,
                kind => kind,
            },
            StreamError::Body(_) => ErrorKind::Unknown,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

/// A fenced update block that could not be parsed even after repair.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("update block of {length} bytes failed to parse: {message}")]
pub struct UpdateParseError {
    /// Leading portion of the repaired candidate, for diagnostics.
    pub snippet: String,
    /// Byte length of the full candidate.
    pub length: usize,
    pub message: String,
}

impl UpdateParseError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpdateParseFailed
    }
}
