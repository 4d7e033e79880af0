//! Splices hidden filters into fetch queries.
//!
//! The rewrite is purely additive: caller predicates are never removed or
//! altered, hidden `filter` and `link-entity` subtrees are appended after
//! them. Sibling filters are conjunctive, so the result can only narrow.

use crate::ast::{Clause, Element, StructureError};
use crate::config::InterceptorConfig;
use crate::context::ExecutionContext;
use crate::error::RlsError;
use crate::parser::parse;
use crate::query::StructuredQuery;
use crate::repository::{HiddenFilterDefinition, HiddenFilterRepository};
use crate::store::SavedQueryStore;
use crate::writer::serialize;
use tracing::{debug, info, warn};

/// What a rewrite spliced into the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub definitions: usize,
    pub filters: usize,
    pub links: usize,
}

impl RewriteSummary {
    pub fn appended(&self) -> usize {
        self.filters + self.links
    }
}

pub struct QueryRewriter<'a, S: ?Sized> {
    repository: HiddenFilterRepository<'a, S>,
}

impl<'a, S: SavedQueryStore + ?Sized> QueryRewriter<'a, S> {
    pub fn new(store: &'a S, config: &'a InterceptorConfig) -> Self {
        Self {
            repository: HiddenFilterRepository::new(store, config),
        }
    }

    /// Merges every hidden filter for `entity_type` into `query`.
    ///
    /// Either the fully merged text is installed or `query` is left exactly
    /// as it was. When nothing is appended the text is not re-serialized.
    pub fn rewrite(
        &self,
        ctx: &ExecutionContext,
        query: &mut StructuredQuery,
        entity_type: &str,
    ) -> Result<RewriteSummary, RlsError> {
        let kind = query.kind();
        let fetch = match &mut *query {
            StructuredQuery::Fetch(fetch) => fetch,
            StructuredQuery::Expression(expr) => {
                warn!(
                    entity = %expr.entity_name,
                    "QueryExpression queries cannot carry hidden filters, refusing to run unfiltered"
                );
                return Err(RlsError::UnsupportedQueryKind { kind });
            }
        };

        let mut tree = parse(&fetch.query)?;
        let target = tree.root_entity_mut()?;
        match target.attribute("name") {
            Some(name) if name == entity_type => {}
            Some(name) => {
                warn!(query_entity = name, entity_type, "fetch entity differs from the operation target");
                return Err(StructureError::EntityMismatch {
                    query: name.to_string(),
                    target: entity_type.to_string(),
                }
                .into());
            }
            None => return Err(StructureError::UnnamedEntity.into()),
        }

        ctx.check_cancelled()?;
        let definitions = self.repository.find_hidden_filters(ctx, entity_type)?;
        let mut summary = RewriteSummary {
            definitions: definitions.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for definition in &definitions {
            ctx.check_cancelled()?;
            for clause in definition_clauses(definition)? {
                match clause {
                    Clause::Filter(_) => summary.filters += 1,
                    Clause::LinkEntity(_) => summary.links += 1,
                }
                pending.push(clause);
            }
        }

        if pending.is_empty() {
            debug!(entity_type, "no hidden filter clauses to splice");
            return Ok(summary);
        }

        for clause in pending {
            target.append_child(clause);
        }
        let rewritten = serialize(&tree);

        ctx.check_cancelled()?;
        fetch.query = rewritten;

        info!(
            entity_type,
            definitions = summary.definitions,
            filters = summary.filters,
            links = summary.links,
            "hidden filters spliced into query"
        );
        Ok(summary)
    }
}

/// Parses a definition payload and moves out its first-level clauses.
fn definition_clauses(definition: &HiddenFilterDefinition) -> Result<Vec<Clause>, RlsError> {
    let tree = parse(&definition.payload).map_err(|e| e.in_definition(&definition.name))?;
    let entity: Element = tree.into_root_entity()?;
    Ok(entity.into_clauses())
}
