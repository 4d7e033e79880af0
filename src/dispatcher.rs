//! Per-operation entry point invoked by the hosting runtime.
//!
//! ```text
//! intercept()
//!   ├─ target is the definitions entity → Unmodified (never rewrite the
//!   │                                     store hidden filters live in)
//!   ├─ RetrieveMultiple(query)          → QueryRewriter::rewrite
//!   │                                     → Rewritten | Unmodified
//!   └─ Retrieve(target)                 → AccessGuard::check_access
//!                                         → Unmodified | AccessDenied
//! ```
//!
//! Every failure is written to the diagnostic sink and returned unchanged.

use crate::config::InterceptorConfig;
use crate::context::{DiagnosticSink, ExecutionContext, TracingSink};
use crate::engine::{QueryEngine, QueryExecutor, RecordSet};
use crate::error::RlsError;
use crate::guard::{lookup_query, AccessGuard};
use crate::query::{EntityReference, StructuredQuery};
use crate::rewriter::{QueryRewriter, RewriteSummary};
use crate::store::SavedQueryStore;
use crate::writer::serialize;
use tracing::debug;

/// The read operation being intercepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Bulk query; may be rewritten in place.
    RetrieveMultiple(StructuredQuery),
    /// Direct lookup of one record.
    Retrieve(EntityReference),
}

/// How the operation may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Unmodified,
    Rewritten(RewriteSummary),
}

pub struct Interceptor<S, E, D = TracingSink> {
    store: S,
    engine: E,
    sink: D,
    config: InterceptorConfig,
}

impl<S, E> Interceptor<S, E, TracingSink>
where
    S: SavedQueryStore,
    E: QueryEngine,
{
    pub fn new(store: S, engine: E, config: InterceptorConfig) -> Self {
        Self::with_sink(store, engine, TracingSink, config)
    }
}

impl<S, E, D> Interceptor<S, E, D>
where
    S: SavedQueryStore,
    E: QueryEngine,
    D: DiagnosticSink,
{
    pub fn with_sink(store: S, engine: E, sink: D, config: InterceptorConfig) -> Self {
        Self {
            store,
            engine,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rewriter(&self) -> QueryRewriter<'_, S> {
        QueryRewriter::new(&self.store, &self.config)
    }

    /// Decides whether and how `operation` may run.
    pub fn intercept(&self, ctx: &ExecutionContext, operation: &mut Operation) -> Result<Disposition, RlsError> {
        match operation {
            Operation::RetrieveMultiple(query) => self.intercept_query(ctx, query),
            Operation::Retrieve(target) => self.intercept_lookup(ctx, target),
        }
    }

    /// Intercepts a bulk query and, if allowed, executes it.
    pub fn retrieve_multiple(&self, ctx: &ExecutionContext, mut query: StructuredQuery) -> Result<RecordSet, RlsError> {
        self.intercept_query(ctx, &mut query)?;
        ctx.check_cancelled()?;
        Ok(self.engine.retrieve_multiple(ctx, &query)?)
    }

    /// Intercepts a single-record lookup and, if allowed, performs it.
    pub fn retrieve(&self, ctx: &ExecutionContext, target: &EntityReference) -> Result<RecordSet, RlsError> {
        self.intercept_lookup(ctx, target)?;
        ctx.check_cancelled()?;
        let lookup = StructuredQuery::fetch(serialize(&lookup_query(target)));
        Ok(self.engine.retrieve_multiple(ctx, &lookup)?)
    }

    fn is_excluded(&self, ctx: &ExecutionContext) -> bool {
        if ctx.primary_entity_name == self.config.definitions_entity {
            debug!(entity = %ctx.primary_entity_name, "definitions entity is never intercepted");
            return true;
        }
        false
    }

    fn intercept_query(&self, ctx: &ExecutionContext, query: &mut StructuredQuery) -> Result<Disposition, RlsError> {
        if self.is_excluded(ctx) {
            return Ok(Disposition::Unmodified);
        }
        self.rewriter()
            .rewrite(ctx, query, &ctx.primary_entity_name)
            .map(|summary| {
                if summary.appended() == 0 {
                    Disposition::Unmodified
                } else {
                    Disposition::Rewritten(summary)
                }
            })
            .map_err(|e| self.report("retrieve multiple", e))
    }

    fn intercept_lookup(&self, ctx: &ExecutionContext, target: &EntityReference) -> Result<Disposition, RlsError> {
        if self.is_excluded(ctx) {
            return Ok(Disposition::Unmodified);
        }
        let lookup_ctx = ctx.for_entity(target.logical_name.as_str());
        AccessGuard::new(self, &self.config.access_denied_message)
            .check_access(&lookup_ctx, target)
            .map(|()| Disposition::Unmodified)
            .map_err(|e| self.report("retrieve single", e))
    }

    fn report(&self, operation: &str, error: RlsError) -> RlsError {
        self.sink.trace(&format!("row level security [{}]: {}", operation, error));
        error
    }
}

/// Queries issued by the guard go through the same interception as any
/// bulk query.
impl<S, E, D> QueryExecutor for Interceptor<S, E, D>
where
    S: SavedQueryStore,
    E: QueryEngine,
    D: DiagnosticSink,
{
    fn execute(&self, ctx: &ExecutionContext, query: &StructuredQuery) -> Result<RecordSet, RlsError> {
        self.retrieve_multiple(ctx, query.clone())
    }
}
