//! Error types for the Slack relay.

use thiserror::Error;

/// Errors from Slack API operations.
#[derive(Error, Debug)]
pub enum SlackError {
    /// The API returned a non-ok envelope.
    #[error("Slack API error: {0}")]
    Api(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type for Slack operations.
pub type Result<T> = std::result::Result<T, SlackError>;
