//! Error types for the Bambu transport.

use thiserror::Error;

/// Errors from Bambu discovery and telemetry operations.
#[derive(Error, Debug)]
pub enum BambuError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// MQTT error.
    #[error("MQTT error: {0}")]
    MqttError(String),

    /// The printer rejected the access code.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Discovery error.
    #[error("discovery error: {0}")]
    DiscoveryError(String),

    /// Timeout error.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Result type for Bambu operations.
pub type Result<T> = std::result::Result<T, BambuError>;
