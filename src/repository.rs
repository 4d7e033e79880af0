//! Lookup of the hidden filters that apply to an entity type.
//!
//! A hidden filter is a saved view marked with `/type=hidden` in its name,
//! e.g. "Filter by high contract value /type=hidden". Administrators can
//! switch one off through its state like any other view.

use crate::config::InterceptorConfig;
use crate::context::ExecutionContext;
use crate::error::RlsError;
use crate::predicate::ConditionOperator;
use crate::query::{ConditionExpression, QueryExpression};
use crate::store::{QueryType, SavedQueryStore, SavedView, StateCode};
use tracing::{debug, warn};

/// An eligible hidden filter, snapshot of one saved view.
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenFilterDefinition {
    pub name: String,
    pub entity_type: String,
    /// Fetch query text whose filters and links get spliced.
    pub payload: String,
    pub query_type: QueryType,
    pub state: StateCode,
}

impl From<SavedView> for HiddenFilterDefinition {
    fn from(view: SavedView) -> Self {
        Self {
            name: view.name,
            entity_type: view.returned_type_code,
            payload: view.fetch_xml,
            query_type: view.query_type,
            state: view.state_code,
        }
    }
}

pub struct HiddenFilterRepository<'a, S: ?Sized> {
    store: &'a S,
    config: &'a InterceptorConfig,
}

impl<'a, S: SavedQueryStore + ?Sized> HiddenFilterRepository<'a, S> {
    pub fn new(store: &'a S, config: &'a InterceptorConfig) -> Self {
        Self { store, config }
    }

    /// The four-condition lookup issued against the definitions store.
    pub fn criteria(&self, entity_type: &str) -> QueryExpression {
        QueryExpression::new(self.config.definitions_entity.as_str())
            .with_columns(["name", "fetchxml"])
            .with_condition(ConditionExpression::new(
                "returnedtypecode",
                ConditionOperator::Equal,
                entity_type,
            ))
            .with_condition(ConditionExpression::new(
                "name",
                ConditionOperator::Like,
                format!("%{}%", self.config.hidden_marker),
            ))
            .with_condition(ConditionExpression::new(
                "querytype",
                ConditionOperator::Equal,
                QueryType::Public.code(),
            ))
            .with_condition(ConditionExpression::new(
                "statecode",
                ConditionOperator::Equal,
                StateCode::Active.code(),
            ))
    }

    /// Returns the hidden filters for `entity_type` in store order.
    ///
    /// An empty result is not an error. Store failures propagate.
    pub fn find_hidden_filters(
        &self,
        ctx: &ExecutionContext,
        entity_type: &str,
    ) -> Result<Vec<HiddenFilterDefinition>, RlsError> {
        let criteria = self.criteria(entity_type);
        let views = self.store.retrieve_saved_views(ctx, &criteria)?;

        let mut definitions = Vec::with_capacity(views.len());
        for view in views {
            if !criteria.matches(&view.attributes()) {
                warn!(
                    view = %view.name,
                    entity_type,
                    "definitions store returned a view outside the hidden filter criteria, skipping"
                );
                continue;
            }
            definitions.push(HiddenFilterDefinition::from(view));
        }

        debug!(entity_type, count = definitions.len(), "hidden filters loaded");
        Ok(definitions)
    }
}
