//! Error types for the inference pipeline.
//!
//! Errors are split by the layer that raises them. Registry and store errors
//! stay internal; callers of the prediction entrypoint only ever see a
//! [`PredictionError`].

use thiserror::Error;

/// Errors raised while resolving or loading model and scaler artifacts.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No configuration entry exists for the logical name.
    #[error("no artifact configuration for '{name}': {reason}")]
    Resolution { name: String, reason: String },

    /// The artifact could not be fetched or deserialized.
    #[error("failed to load artifact '{name}': {reason}")]
    Load { name: String, reason: String },
}

impl RegistryError {
    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying without operator intervention can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Load { .. })
    }
}

/// Errors raised by the backing document stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("write rejected: {0}")]
    Write(String),
}

/// Errors surfaced by the prediction entrypoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PredictionError {
    /// The caller could not be identified.
    #[error("request is not authenticated")]
    Unauthenticated,

    /// The sensor history did not pass the data quality gate.
    #[error("{0}")]
    FailedPrecondition(String),

    /// Inference, loading, persistence or timeout failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PredictionError {
    /// Wire code used by the callable entrypoint.
    pub fn code(&self) -> &'static str {
        match self {
            PredictionError::Unauthenticated => "unauthenticated",
            PredictionError::FailedPrecondition(_) => "failed-precondition",
            PredictionError::Internal(_) => "internal",
        }
    }

    /// Timeouts and transient load failures can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PredictionError::Internal(_))
    }
}

impl From<RegistryError> for PredictionError {
    fn from(err: RegistryError) -> Self {
        PredictionError::Internal(err.to_string())
    }
}

impl From<StoreError> for PredictionError {
    fn from(err: StoreError) -> Self {
        PredictionError::Internal(err.to_string())
    }
}

/// Errors raised by a push notification gateway.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    /// The device token is unregistered or malformed; it will never succeed.
    #[error("push token rejected: {0}")]
    InvalidToken(String),

    /// Network or server failure; the token itself may still be good.
    #[error("push delivery failed: {0}")]
    Transport(String),
}

impl PushError {
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, PushError::InvalidToken(_))
    }
}

/// Errors raised while scanning a single user for anomalies.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("failed to read records for {user_id}: {source}")]
    Records { user_id: String, source: StoreError },

    #[error("failed to persist alert for {user_id}: {source}")]
    Alert { user_id: String, source: StoreError },
}
