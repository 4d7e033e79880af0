//! Access decision for direct single-record lookups.
//!
//! A lookup by id bypasses the bulk query path, so the guard asks the
//! engine the equivalent question: does a fetch for exactly this record,
//! after hidden filters are applied, return anything?

use crate::ast::{Element, FetchTree, CONDITION, ENTITY, FETCH, FILTER};
use crate::context::ExecutionContext;
use crate::engine::QueryExecutor;
use crate::error::RlsError;
use crate::query::{EntityReference, StructuredQuery};
use crate::writer::serialize;
use tracing::{debug, info};

pub struct AccessGuard<'a, E: ?Sized> {
    engine: &'a E,
    denied_message: &'a str,
}

impl<'a, E: QueryExecutor + ?Sized> AccessGuard<'a, E> {
    /// `engine` is expected to apply hidden filters itself, as the
    /// `Interceptor` does; the guard never bypasses them.
    pub fn new(engine: &'a E, denied_message: &'a str) -> Self {
        Self {
            engine,
            denied_message,
        }
    }

    /// Allows the lookup when the target record is visible to the caller.
    ///
    /// Engine failures propagate unchanged; only an empty result is a denial.
    pub fn check_access(&self, ctx: &ExecutionContext, target: &EntityReference) -> Result<(), RlsError> {
        let query = StructuredQuery::fetch(serialize(&lookup_query(target)));
        debug!(entity = %target.logical_name, id = %target.id, "checking single record access");

        ctx.check_cancelled()?;
        let result = self.engine.execute(ctx, &query)?;
        if result.is_empty() {
            info!(entity = %target.logical_name, id = %target.id, user = %ctx.user_id, "single record access denied");
            return Err(RlsError::access_denied(self.denied_message));
        }
        Ok(())
    }
}

/// `<fetch><entity name=T><filter><condition attribute=Tid operator=eq value=id/></filter></entity></fetch>`
pub fn lookup_query(target: &EntityReference) -> FetchTree {
    let condition = Element::new(CONDITION)
        .with_attribute("attribute", target.id_attribute())
        .with_attribute("operator", "eq")
        .with_attribute("value", target.id.hyphenated().to_string());

    FetchTree::new(
        Element::new(FETCH).with_child(
            Element::new(ENTITY)
                .with_attribute("name", target.logical_name.as_str())
                .with_child(Element::new(FILTER).with_child(condition)),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Direct, EngineError, QueryEngine, Record, RecordSet};
    use crate::error::{OperationStatus, ACCESS_DENIED_MESSAGE};
    use std::cell::RefCell;
    use uuid::Uuid;

    /// Returns a fixed number of rows and remembers what it was asked.
    struct CannedEngine {
        rows: usize,
        seen: RefCell<Vec<String>>,
    }

    impl QueryEngine for CannedEngine {
        fn retrieve_multiple(&self, _ctx: &ExecutionContext, query: &StructuredQuery) -> Result<RecordSet, EngineError> {
            if let StructuredQuery::Fetch(fetch) = query {
                self.seen.borrow_mut().push(fetch.query.clone());
            }
            Ok(RecordSet::new("account", vec![Record::new(); self.rows]))
        }
    }

    struct FailingEngine;

    impl QueryEngine for FailingEngine {
        fn retrieve_multiple(&self, _ctx: &ExecutionContext, _query: &StructuredQuery) -> Result<RecordSet, EngineError> {
            Err(EngineError::new("sql timeout"))
        }
    }

    fn target() -> EntityReference {
        EntityReference::new("account", Uuid::parse_str("{6F9619FF-8B86-D011-B42D-00C04FC964FF}").unwrap())
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Uuid::nil(), "account")
    }

    #[test]
    fn test_lookup_query_shape() {
        let text = serialize(&lookup_query(&target()));
        assert_eq!(
            text,
            r#"<fetch><entity name="account"><filter><condition attribute="accountid" operator="eq" value="6f9619ff-8b86-d011-b42d-00c04fc964ff"/></filter></entity></fetch>"#
        );
    }

    #[test]
    fn test_visible_record_allowed() {
        let engine = CannedEngine { rows: 1, seen: RefCell::new(Vec::new()) };
        let direct = Direct(&engine);
        let guard = AccessGuard::new(&direct, ACCESS_DENIED_MESSAGE);
        assert!(guard.check_access(&ctx(), &target()).is_ok());
        assert_eq!(engine.seen.borrow().len(), 1);
        assert!(engine.seen.borrow()[0].contains("accountid"));
    }

    #[test]
    fn test_empty_result_denied() {
        let engine = CannedEngine { rows: 0, seen: RefCell::new(Vec::new()) };
        let direct = Direct(&engine);
        let guard = AccessGuard::new(&direct, ACCESS_DENIED_MESSAGE);

        let err = guard.check_access(&ctx(), &target()).unwrap_err();
        assert!(err.is_access_denied());
        assert_eq!(err.status(), OperationStatus::Canceled);
        assert_eq!(err.to_string(), ACCESS_DENIED_MESSAGE);
    }

    #[test]
    fn test_cancelled_check_never_reaches_engine() {
        let engine = CannedEngine { rows: 1, seen: RefCell::new(Vec::new()) };
        let direct = Direct(&engine);
        let guard = AccessGuard::new(&direct, ACCESS_DENIED_MESSAGE);
        let ctx = ctx();
        ctx.cancellation.cancel();

        let err = guard.check_access(&ctx, &target()).unwrap_err();
        assert!(matches!(err, RlsError::Cancelled));
        assert!(!err.is_access_denied());
        assert!(engine.seen.borrow().is_empty());
    }

    #[test]
    fn test_engine_error_not_converted_to_denial() {
        let direct = Direct(&FailingEngine);
        let guard = AccessGuard::new(&direct, ACCESS_DENIED_MESSAGE);
        let err = guard.check_access(&ctx(), &target()).unwrap_err();
        assert!(matches!(err, RlsError::Engine(ref e) if e.message == "sql timeout"));
        assert_eq!(err.status(), OperationStatus::Failed);
    }
}
