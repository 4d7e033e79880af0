//! The definitions store holding saved views.

use crate::context::ExecutionContext;
use crate::query::QueryExpression;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Logical name of the entity holding saved views.
pub const SAVED_QUERY_ENTITY: &str = "savedquery";

/// Saved view classification. Only public views can act as hidden filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Public,
    AdvancedSearch,
    Associated,
    QuickFind,
    Personal,
}

impl QueryType {
    pub fn code(&self) -> i64 {
        match self {
            QueryType::Public => 0,
            QueryType::AdvancedSearch => 1,
            QueryType::Associated => 2,
            QueryType::QuickFind => 4,
            QueryType::Personal => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateCode {
    Active,
    Inactive,
}

impl StateCode {
    pub fn code(&self) -> i64 {
        match self {
            StateCode::Active => 0,
            StateCode::Inactive => 1,
        }
    }
}

/// A row of the definitions store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    pub name: String,
    /// Entity type the view applies to.
    pub returned_type_code: String,
    pub fetch_xml: String,
    pub query_type: QueryType,
    pub state_code: StateCode,
}

impl SavedView {
    /// Column view of the row, keyed by the store's attribute names.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        let mut row = BTreeMap::new();
        row.insert("name".to_string(), json!(self.name));
        row.insert("returnedtypecode".to_string(), json!(self.returned_type_code));
        row.insert("fetchxml".to_string(), json!(self.fetch_xml));
        row.insert("querytype".to_string(), json!(self.query_type.code()));
        row.insert("statecode".to_string(), json!(self.state_code.code()));
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("definitions store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read access to saved views.
pub trait SavedQueryStore {
    /// Returns the views matching `query`, in store order.
    fn retrieve_saved_views(
        &self,
        ctx: &ExecutionContext,
        query: &QueryExpression,
    ) -> Result<Vec<SavedView>, StoreError>;
}

impl<T: SavedQueryStore + ?Sized> SavedQueryStore for &T {
    fn retrieve_saved_views(
        &self,
        ctx: &ExecutionContext,
        query: &QueryExpression,
    ) -> Result<Vec<SavedView>, StoreError> {
        (**self).retrieve_saved_views(ctx, query)
    }
}
