//! Error types used throughout calbridge

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ErrorKind;

/// Main error type for calbridge
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalbridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Backend is shutting down: {0}")]
    ShuttingDown(String),

    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for calbridge operations
pub type Result<T> = std::result::Result<T, CalbridgeError>;

/// Failure reported by a calendar store capability call.
///
/// Every variant corresponds to exactly one [`ErrorKind`], which is what ends
/// up in per-item error maps.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum StoreError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("collection busy: {0}")]
    Locked(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Error kind recorded for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidItem(_) => ErrorKind::InvalidItem,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Locked(_) => ErrorKind::Locked,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Backend(_) => ErrorKind::Unspecified,
        }
    }
}

impl From<StoreError> for CalbridgeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::InvalidItem(what) => Self::InvalidInput(what),
            other => Self::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_kinds_are_one_to_one() {
        assert_eq!(StoreError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(StoreError::InvalidItem("x".into()).kind(), ErrorKind::InvalidItem);
        assert_eq!(StoreError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::Locked("x".into()).kind(), ErrorKind::Locked);
        assert_eq!(StoreError::PermissionDenied("x".into()).kind(), ErrorKind::PermissionDenied);
        assert_eq!(StoreError::Backend("x".into()).kind(), ErrorKind::Unspecified);
    }

    #[test]
    fn store_error_converts_into_domain_error() {
        let err: CalbridgeError = StoreError::NotFound("work/abc".into()).into();
        assert_eq!(err, CalbridgeError::NotFound("work/abc".into()));

        let err: CalbridgeError = StoreError::Locked("work".into()).into();
        assert!(matches!(err, CalbridgeError::Store(msg) if msg.contains("busy")));
    }

    #[test]
    fn domain_error_serializes_with_type_tag() {
        let json = serde_json::to_string(&CalbridgeError::ShuttingDown("draining".into()))
            .unwrap();
        assert_eq!(json, r#"{"type":"ShuttingDown","message":"draining"}"#);
    }
}
