//! Per-request context supplied by the hosting runtime.

use crate::error::RlsError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cooperative cancellation signal shared with the runtime.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Caller the store and engine act on behalf of.
    pub user_id: Uuid,
    /// Entity type the intercepted operation targets.
    pub primary_entity_name: String,
    pub cancellation: CancellationFlag,
}

impl ExecutionContext {
    pub fn new(user_id: Uuid, primary_entity_name: impl Into<String>) -> Self {
        Self {
            user_id,
            primary_entity_name: primary_entity_name.into(),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Same caller and cancellation, different target entity.
    pub fn for_entity(&self, entity_name: impl Into<String>) -> Self {
        Self {
            user_id: self.user_id,
            primary_entity_name: entity_name.into(),
            cancellation: self.cancellation.clone(),
        }
    }

    pub fn check_cancelled(&self) -> Result<(), RlsError> {
        if self.cancellation.is_cancelled() {
            return Err(RlsError::Cancelled);
        }
        Ok(())
    }
}

/// Best-effort diagnostic output, written on the failure path only.
pub trait DiagnosticSink {
    fn trace(&self, message: &str);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &T {
    fn trace(&self, message: &str) {
        (**self).trace(message)
    }
}

/// Forwards diagnostics to `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn trace(&self, message: &str) {
        tracing::error!(target: "fetch_rls", "{}", message);
    }
}
