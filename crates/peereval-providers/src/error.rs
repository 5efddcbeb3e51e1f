//! Provider error types.

use thiserror::Error;

/// Errors that can occur when calling an external summarizer.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The API answered without any summary text.
    #[error("summarizer returned no content")]
    EmptyResponse,

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Errors raised while building or sending mail.
#[derive(Debug, Error)]
pub enum MailError {
    /// A sender or recipient could not be parsed as a mailbox.
    #[error("invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),

    /// The SMTP relay could not be set up.
    #[error("invalid SMTP relay '{server}': {message}")]
    Relay { server: String, message: String },

    /// The server rejected the message or could not be reached.
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}
