//! Unified error types for the paydesk core
//!
//! All errors flow through this module for consistent handling across the
//! send pipeline and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all paydesk operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaydeskError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl PaydeskError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Indexer rejected the request; the message is passed through verbatim.
    pub fn upstream_domain(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamDomain, msg)
    }

    /// The indexer or its full node is too old for the requested operation.
    pub fn upstream_unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnsupported, msg)
    }

    /// Hard signing failure: wrong key material or a no-op signature pass.
    pub fn signing_integrity(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningIntegrity, msg)
    }

    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for PaydeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for PaydeskError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors
    InvalidInput,
    InvalidAddress,

    // Upstream (chain indexer) errors
    UpstreamDomain,
    UpstreamUnsupported,

    // Signing errors
    SigningIntegrity,

    // Network errors
    NetworkError,
    Timeout,

    // Parse errors
    ParseError,
    JsonError,
    HexError,

    // Internal
    Internal,
}

/// Result type alias for paydesk operations
pub type PaydeskResult<T> = Result<T, PaydeskError>;

// Conversions from common error types

impl From<serde_json::Error> for PaydeskError {
    fn from(e: serde_json::Error) -> Self {
        PaydeskError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for PaydeskError {
    fn from(e: hex::FromHexError) -> Self {
        PaydeskError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<std::io::Error> for PaydeskError {
    fn from(e: std::io::Error) -> Self {
        PaydeskError::new(ErrorCode::Internal, e.to_string())
    }
}

impl From<reqwest::Error> for PaydeskError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PaydeskError::new(ErrorCode::Timeout, "Request timed out")
        } else if e.is_connect() {
            PaydeskError::new(ErrorCode::NetworkError, "Connection failed")
        } else {
            PaydeskError::new(ErrorCode::NetworkError, e.to_string())
        }
    }
}

impl From<bitcoin::bip32::Error> for PaydeskError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        PaydeskError::new(ErrorCode::Internal, format!("BIP32 error: {}", e))
    }
}

impl From<bitcoin::psbt::Error> for PaydeskError {
    fn from(e: bitcoin::psbt::Error) -> Self {
        PaydeskError::new(ErrorCode::ParseError, format!("PSBT error: {}", e))
    }
}

impl From<bitcoin::secp256k1::Error> for PaydeskError {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        PaydeskError::new(ErrorCode::Internal, format!("Secp256k1 error: {}", e))
    }
}

impl From<bip39::Error> for PaydeskError {
    fn from(e: bip39::Error) -> Self {
        PaydeskError::new(ErrorCode::InvalidInput, format!("BIP39 error: {}", e))
    }
}
