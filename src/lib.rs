//! Row-level security for fetch queries.
//!
//! Hidden filters are public, active saved views whose name carries the
//! hidden marker. Every bulk query against an entity gets the hidden
//! filters of that entity appended to its root entity, and every direct
//! lookup is denied unless the same filtered query still finds the record.

pub mod ast;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod guard;
pub mod memory;
pub mod parser;
pub mod predicate;
pub mod query;
pub mod repository;
pub mod rewriter;
pub mod sql_compiler;
pub mod store;
pub mod writer;

pub use context::{CancellationFlag, DiagnosticSink, ExecutionContext, TracingSink};
pub use dispatcher::{Disposition, Interceptor, Operation};
pub use error::{OperationStatus, RlsError};
pub use query::{EntityReference, StructuredQuery};
