//! Error types for the interceptor

use crate::ast::StructureError;
use crate::engine::EngineError;
use crate::parser::ParseError;
use crate::store::StoreError;
use thiserror::Error;

/// Message returned to callers denied access to a single record.
pub const ACCESS_DENIED_MESSAGE: &str =
    "Access to the resource is forbidden. Contact your Microsoft Power Apps administrator for assistance.";

/// Outcome classification reported to the hosting runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// The operation was deliberately stopped.
    Canceled,
    /// Something broke.
    Failed,
}

#[derive(Debug, Error)]
pub enum RlsError {
    #[error("malformed fetch query: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid fetch query structure: {0}")]
    Structure(#[from] StructureError),

    #[error("hidden filter lookup failed: {0}")]
    Repository(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Deliberate denial; not a failure of the system.
    #[error("{message}")]
    AccessDenied {
        status: OperationStatus,
        message: String,
    },

    #[error("unsupported query kind: {kind}")]
    UnsupportedQueryKind { kind: &'static str },

    #[error("operation cancelled")]
    Cancelled,
}

impl RlsError {
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            status: OperationStatus::Canceled,
            message: message.into(),
        }
    }

    pub fn status(&self) -> OperationStatus {
        match self {
            RlsError::AccessDenied { status, .. } => *status,
            RlsError::Cancelled => OperationStatus::Canceled,
            _ => OperationStatus::Failed,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, RlsError::AccessDenied { .. })
    }
}
