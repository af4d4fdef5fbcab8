//! Common Error Types for the Bridge Core
//!
//! Every module defines its own `thiserror` enum; this module folds them
//! into the root `BridgeError` used by the pipeline driver, and carries the
//! validation errors that do not belong to any single collaborator.

use thiserror::Error;

use crate::faucet::FaucetError;
use crate::hdwallet::HdError;
use crate::insight::InsightError;
use crate::islock::IslockError;
use crate::keys::KeyError;
use crate::platform::PlatformError;
use crate::tx::{SignError, TxError};

/// Input validation errors surfaced before any network or key activity
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Identity ids are 43-44 character base58 strings
    #[error("invalid identity id: {0}")]
    InvalidIdentityId(String),

    /// Platform addresses are bech32m with the network's HRP
    #[error("invalid platform address: {0}")]
    InvalidPlatformAddress(String),
}

/// Root error type for the bridge pipeline
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("hd wallet error: {0}")]
    Hd(#[from] HdError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("transaction error: {0}")]
    Tx(#[from] TxError),

    #[error("signing error: {0}")]
    Sign(#[from] SignError),

    #[error("insight error: {0}")]
    Insight(#[from] InsightError),

    #[error("islock error: {0}")]
    Islock(#[from] IslockError),

    #[error("faucet error: {0}")]
    Faucet(#[from] FaucetError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Session disposed while an operation was in flight
    #[error("cancelled by user")]
    Cancelled,
}

impl BridgeError {
    /// Check if this error is transient and worth retrying.
    ///
    /// Transport failures and throttling/server HTTP statuses retry;
    /// application errors, validation errors and timeouts do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Insight(e) => e.is_retryable(),
            BridgeError::Islock(e) => e.is_retryable(),
            BridgeError::Faucet(e) => e.is_retryable(),
            BridgeError::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error code for presenters
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::Codec(_) => "CODEC_ERROR",
            BridgeError::Hd(_) => "HD_WALLET_ERROR",
            BridgeError::Key(_) => "KEY_ERROR",
            BridgeError::Tx(_) => "TX_ERROR",
            BridgeError::Sign(_) => "SIGN_ERROR",
            BridgeError::Insight(_) => "INSIGHT_ERROR",
            BridgeError::Islock(_) => "ISLOCK_ERROR",
            BridgeError::Faucet(_) => "FAUCET_ERROR",
            BridgeError::Platform(_) => "PLATFORM_ERROR",
            BridgeError::Validation(_) => "VALIDATION_ERROR",
            BridgeError::Cancelled => "CANCELLED",
        }
    }
}

/// Result type alias using BridgeError
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
