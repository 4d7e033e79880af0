//! In-memory definitions store and query engine.
//!
//! Backs the console and the test-suite. The engine evaluates fetch
//! queries over JSON records: sibling filters are conjunctive and an inner
//! `link-entity` is an existence check against the linked entity's rows.

use crate::config::Fixture;
use crate::context::ExecutionContext;
use crate::engine::{EngineError, QueryEngine, Record, RecordSet};
use crate::parser::parse;
use crate::predicate::{lower_entity, matches_value, text_of, Columns, LinkClause, LinkType, Predicate};
use crate::query::{QueryExpression, StructuredQuery};
use crate::store::{SavedQueryStore, SavedView, StoreError};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    views: Vec<SavedView>,
}

impl MemoryStore {
    pub fn new(views: Vec<SavedView>) -> Self {
        Self { views }
    }
}

impl SavedQueryStore for MemoryStore {
    fn retrieve_saved_views(
        &self,
        _ctx: &ExecutionContext,
        query: &QueryExpression,
    ) -> Result<Vec<SavedView>, StoreError> {
        Ok(self
            .views
            .iter()
            .filter(|view| query.matches(&view.attributes()))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    tables: HashMap<String, Vec<Record>>,
}

impl MemoryEngine {
    pub fn new(tables: HashMap<String, Vec<Record>>) -> Self {
        Self { tables }
    }

    pub fn insert(&mut self, entity: impl Into<String>, record: Record) {
        self.tables.entry(entity.into()).or_default().push(record);
    }

    fn rows(&self, entity: &str) -> &[Record] {
        self.tables.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    fn retrieve_fetch(&self, text: &str) -> Result<RecordSet, EngineError> {
        let tree = parse(text).map_err(|e| EngineError::new(e.to_string()))?;
        let top = match tree.root.attribute("top") {
            Some(top) => Some(
                top.parse::<usize>()
                    .map_err(|_| EngineError::new(format!("invalid top '{}'", top)))?,
            ),
            None => None,
        };
        let entity = tree.root_entity().map_err(|e| EngineError::new(e.to_string()))?;
        let plan = lower_entity(entity).map_err(|e| EngineError::new(e.to_string()))?;

        let mut records = Vec::new();
        for row in self.rows(&plan.name) {
            if self.row_matches(row, &plan.filter, &plan.links)? {
                records.push(project(row, &plan.columns));
            }
        }
        if let Some(top) = top {
            records.truncate(top);
        }
        Ok(RecordSet::new(plan.name, records))
    }

    fn retrieve_expression(&self, query: &QueryExpression) -> RecordSet {
        let columns = if query.columns.is_empty() {
            Columns::All
        } else {
            Columns::Named(query.columns.clone())
        };
        let records = self
            .rows(&query.entity_name)
            .iter()
            .filter(|row| query.matches(row))
            .map(|row| project(row, &columns))
            .collect();
        RecordSet::new(query.entity_name.as_str(), records)
    }

    fn row_matches(&self, row: &Record, filter: &Predicate, links: &[LinkClause]) -> Result<bool, EngineError> {
        if !evaluate(filter, row)? {
            return Ok(false);
        }
        for link in links {
            if !self.link_holds(row, link)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn link_holds(&self, parent: &Record, link: &LinkClause) -> Result<bool, EngineError> {
        if link.link_type == LinkType::Outer {
            return Ok(true);
        }
        let Some(key) = parent.get(&link.to).map(text_of) else {
            return Ok(false);
        };
        for candidate in self.rows(&link.name) {
            let joined = candidate
                .get(&link.from)
                .is_some_and(|v| text_of(v).eq_ignore_ascii_case(&key));
            if joined && self.row_matches(candidate, &link.filter, &link.links)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn evaluate(predicate: &Predicate, row: &Record) -> Result<bool, EngineError> {
    match predicate {
        Predicate::All(parts) => {
            for part in parts {
                if !evaluate(part, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Any(parts) => {
            if parts.is_empty() {
                return Ok(true);
            }
            for part in parts {
                if evaluate(part, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Condition(condition) => {
            if let Some(alias) = &condition.entity_alias {
                return Err(EngineError::new(format!(
                    "conditions on linked entity '{}' are not supported in memory",
                    alias
                )));
            }
            Ok(matches_value(row.get(&condition.attribute), condition.operator, &condition.values))
        }
    }
}

fn project(row: &Record, columns: &Columns) -> Record {
    match columns {
        Columns::All => row.clone(),
        Columns::Named(names) => names
            .iter()
            .filter_map(|name| row.get(name).map(|v| (name.clone(), v.clone())))
            .collect(),
    }
}

impl QueryEngine for MemoryEngine {
    fn retrieve_multiple(
        &self,
        _ctx: &ExecutionContext,
        query: &StructuredQuery,
    ) -> Result<RecordSet, EngineError> {
        match query {
            StructuredQuery::Fetch(fetch) => self.retrieve_fetch(&fetch.query),
            StructuredQuery::Expression(expr) => Ok(self.retrieve_expression(expr)),
        }
    }
}

impl Fixture {
    /// Splits the fixture into a store of its views and an engine over its records.
    pub fn into_memory(self) -> (MemoryStore, MemoryEngine) {
        (MemoryStore::new(self.views), MemoryEngine::new(self.records))
    }
}
