//! The query engine the interceptor sits in front of.

use crate::context::ExecutionContext;
use crate::error::RlsError;
use crate::query::StructuredQuery;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A record as attribute name to value.
pub type Record = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub entity_name: String,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(entity_name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            entity_name: entity_name.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query engine error: {message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait QueryEngine {
    fn retrieve_multiple(
        &self,
        ctx: &ExecutionContext,
        query: &StructuredQuery,
    ) -> Result<RecordSet, EngineError>;
}

impl<T: QueryEngine + ?Sized> QueryEngine for &T {
    fn retrieve_multiple(
        &self,
        ctx: &ExecutionContext,
        query: &StructuredQuery,
    ) -> Result<RecordSet, EngineError> {
        (**self).retrieve_multiple(ctx, query)
    }
}

/// Runs queries for the interceptor's own components.
///
/// Unlike [`QueryEngine`], failures keep their interceptor classification,
/// so a rewrite error raised while executing stays a rewrite error.
pub trait QueryExecutor {
    fn execute(&self, ctx: &ExecutionContext, query: &StructuredQuery) -> Result<RecordSet, RlsError>;
}

/// Executes straight on an engine, without any interception.
pub struct Direct<'a, E: ?Sized>(pub &'a E);

impl<E: QueryEngine + ?Sized> QueryExecutor for Direct<'_, E> {
    fn execute(&self, ctx: &ExecutionContext, query: &StructuredQuery) -> Result<RecordSet, RlsError> {
        Ok(self.0.retrieve_multiple(ctx, query)?)
    }
}
