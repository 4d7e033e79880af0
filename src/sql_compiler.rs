//! SQL compiler that renders a fetch query as PostgreSQL using sea-query.
//!
//! Used to inspect the effective query after hidden filters were appended:
//! sibling filters become one conjunctive `WHERE`, inner links become
//! `INNER JOIN`s whose filters join the `WHERE`, and outer links become
//! `LEFT JOIN`s carrying their filters in the `ON` clause.

use crate::ast::FetchTree;
use crate::config::InterceptorConfig;
use crate::parser::parse;
use crate::predicate::{lower_entity, Columns, ConditionClause, ConditionOperator, LinkClause, LinkType, Predicate};
use crate::query::StructuredQuery;
use sea_query::{Alias, Asterisk, Condition, Expr, JoinType, PostgresQueryBuilder, SelectStatement, SimpleExpr, Value};
use std::collections::HashMap;
use thiserror::Error;

/// SQL Compiler that converts fetch trees to SQL queries
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    /// Maps entity names to table names for schema resolution
    table_mapping: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compile to SQL: {message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

/// Result of SQL compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub sql: String,
    /// Tables referenced, in join order
    pub tables: Vec<String>,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &InterceptorConfig) -> Self {
        Self {
            table_mapping: config.table_mapping.clone(),
        }
    }

    /// Set table mapping for entity names
    pub fn set_table_mapping(&mut self, mapping: HashMap<String, String>) {
        self.table_mapping = mapping;
    }

    /// Get the actual table name for an entity
    fn get_table_name(&self, entity: &str) -> String {
        self.table_mapping
            .get(entity)
            .cloned()
            .unwrap_or_else(|| entity.to_lowercase())
    }

    /// Compiles either query form. Expression queries are rendered as-is.
    pub fn compile_query(&self, query: &StructuredQuery) -> Result<CompileResult, CompileError> {
        match query {
            StructuredQuery::Fetch(fetch) => self.compile_text(&fetch.query),
            StructuredQuery::Expression(expr) => Ok(CompileResult {
                sql: expr.to_sql(),
                tables: vec![expr.entity_name.clone()],
            }),
        }
    }

    pub fn compile_text(&self, text: &str) -> Result<CompileResult, CompileError> {
        let tree = parse(text).map_err(|e| CompileError::new(e.to_string()))?;
        self.compile(&tree)
    }

    /// Compile a fetch tree into SQL
    pub fn compile(&self, tree: &FetchTree) -> Result<CompileResult, CompileError> {
        let entity = tree.root_entity().map_err(|e| CompileError::new(e.to_string()))?;
        let plan = lower_entity(entity).map_err(|e| CompileError::new(e.to_string()))?;

        let base_table = self.get_table_name(&plan.name);
        let mut select = SelectStatement::new();
        select.from_as(Alias::new(base_table.as_str()), Alias::new(plan.name.as_str()));

        match &plan.columns {
            Columns::All => {
                select.column(Asterisk);
            }
            Columns::Named(names) => {
                select.columns(
                    names
                        .iter()
                        .map(|c| (Alias::new(plan.name.as_str()), Alias::new(c.as_str()))),
                );
            }
        }

        if tree.root.attribute("distinct") == Some("true") {
            select.distinct();
        }
        if let Some(top) = tree.root.attribute("top") {
            let limit = top
                .parse::<u64>()
                .map_err(|_| CompileError::new(format!("invalid top '{}'", top)))?;
            select.limit(limit);
        }

        let mut state = JoinState {
            tables: vec![base_table],
            where_clause: Condition::all(),
            has_where: false,
        };
        if !plan.filter.is_empty() {
            state.restrict(self.compile_predicate(&plan.filter, &plan.name));
        }
        for link in &plan.links {
            self.compile_link(&mut select, &mut state, link, &plan.name)?;
        }
        if state.has_where {
            select.cond_where(state.where_clause);
        }

        Ok(CompileResult {
            sql: select.to_string(PostgresQueryBuilder),
            tables: state.tables,
        })
    }

    fn compile_link(
        &self,
        select: &mut SelectStatement,
        state: &mut JoinState,
        link: &LinkClause,
        parent: &str,
    ) -> Result<(), CompileError> {
        let table = self.get_table_name(&link.name);
        let alias = link
            .alias
            .clone()
            .unwrap_or_else(|| format!("{}{}", link.name, state.tables.len()));

        let on = Expr::col((Alias::new(alias.as_str()), Alias::new(link.from.as_str())))
            .equals((Alias::new(parent), Alias::new(link.to.as_str())));

        match link.link_type {
            LinkType::Inner => {
                select.join_as(JoinType::InnerJoin, Alias::new(table.as_str()), Alias::new(alias.as_str()), on);
                if !link.filter.is_empty() {
                    state.restrict(self.compile_predicate(&link.filter, &alias));
                }
            }
            LinkType::Outer => {
                let mut on_clause = Condition::all().add(on);
                if !link.filter.is_empty() {
                    on_clause = on_clause.add(self.compile_predicate(&link.filter, &alias));
                }
                select.join_as(JoinType::LeftJoin, Alias::new(table.as_str()), Alias::new(alias.as_str()), on_clause);
            }
        }
        state.tables.push(table);

        for nested in &link.links {
            self.compile_link(select, state, nested, &alias)?;
        }
        Ok(())
    }

    /// Empty groups are skipped; they place no constraint.
    fn compile_predicate(&self, predicate: &Predicate, scope: &str) -> Condition {
        match predicate {
            Predicate::All(parts) | Predicate::Any(parts) => {
                let mut group = if matches!(predicate, Predicate::All(_)) {
                    Condition::all()
                } else {
                    Condition::any()
                };
                for part in parts.iter().filter(|p| !p.is_empty()) {
                    group = group.add(self.compile_predicate(part, scope));
                }
                group
            }
            Predicate::Condition(condition) => Condition::all().add(self.compile_condition(condition, scope)),
        }
    }

    /// Compile a single condition; `entityname` overrides the scope.
    fn compile_condition(&self, condition: &ConditionClause, scope: &str) -> SimpleExpr {
        let table = condition.entity_alias.as_deref().unwrap_or(scope);
        let col = Expr::col((Alias::new(table), Alias::new(condition.attribute.as_str())));
        let first = condition.values.first().map(String::as_str).unwrap_or_default();

        match condition.operator {
            ConditionOperator::Equal => col.eq(literal_to_value(first)),
            ConditionOperator::NotEqual => col.ne(literal_to_value(first)),
            ConditionOperator::GreaterThan => col.gt(literal_to_value(first)),
            ConditionOperator::GreaterEqual => col.gte(literal_to_value(first)),
            ConditionOperator::LessThan => col.lt(literal_to_value(first)),
            ConditionOperator::LessEqual => col.lte(literal_to_value(first)),
            ConditionOperator::Like => col.like(first),
            ConditionOperator::NotLike => col.not_like(first),
            ConditionOperator::BeginsWith => col.like(format!("{}%", first)),
            ConditionOperator::EndsWith => col.like(format!("%{}", first)),
            ConditionOperator::In => col.is_in(condition.values.iter().map(|v| literal_to_value(v))),
            ConditionOperator::NotIn => col.is_not_in(condition.values.iter().map(|v| literal_to_value(v))),
            ConditionOperator::Null => col.is_null(),
            ConditionOperator::NotNull => col.is_not_null(),
        }
    }
}

struct JoinState {
    tables: Vec<String>,
    where_clause: Condition,
    /// `cond_where` renders an empty condition as `WHERE TRUE`
    has_where: bool,
}

impl JoinState {
    fn restrict(&mut self, condition: Condition) {
        self.where_clause = std::mem::replace(&mut self.where_clause, Condition::all()).add(condition);
        self.has_where = true;
    }
}

/// Fetch values are untyped text: integers and decimals are rendered as
/// numbers, everything else as a string literal.
fn literal_to_value(literal: &str) -> Value {
    if let Ok(n) = literal.parse::<i64>() {
        return Value::BigInt(Some(n));
    }
    if let Ok(f) = literal.parse::<f64>() {
        if f.is_finite() {
            return Value::Double(Some(f));
        }
    }
    Value::String(Some(Box::new(literal.to_string())))
}
