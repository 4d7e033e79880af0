//! Query representations handed to the interceptor.

use crate::predicate::{matches_value, text_of, ConditionOperator};
use sea_query::{Alias, Asterisk, Expr, PostgresQueryBuilder, Query, SelectStatement, SimpleExpr, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A read query as the runtime hands it over.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredQuery {
    /// Fetch query text.
    Fetch(FetchExpression),
    /// Programmatic query; the rewriter does not support it.
    Expression(QueryExpression),
}

impl StructuredQuery {
    pub fn fetch(text: impl Into<String>) -> Self {
        StructuredQuery::Fetch(FetchExpression::new(text))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StructuredQuery::Fetch(_) => "FetchExpression",
            StructuredQuery::Expression(_) => "QueryExpression",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchExpression {
    pub query: String,
}

impl FetchExpression {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// Flat conjunctive query over a single entity.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExpression {
    pub entity_name: String,
    /// Empty means all columns.
    pub columns: Vec<String>,
    pub conditions: Vec<ConditionExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpression {
    pub attribute: String,
    pub operator: ConditionOperator,
    pub values: Vec<JsonValue>,
}

impl ConditionExpression {
    pub fn new(attribute: impl Into<String>, operator: ConditionOperator, value: impl Into<JsonValue>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            values: vec![value.into()],
        }
    }

    pub fn matches(&self, actual: Option<&JsonValue>) -> bool {
        let values: Vec<String> = self.values.iter().map(text_of).collect();
        matches_value(actual, self.operator, &values)
    }

    fn to_expr(&self) -> SimpleExpr {
        let col = Expr::col(Alias::new(self.attribute.as_str()));
        let mut values = self.values.iter().map(json_to_value);
        let first = values.next().unwrap_or(Value::String(None));
        let first_text = self.values.first().map(text_of).unwrap_or_default();

        match self.operator {
            ConditionOperator::Equal => col.eq(first),
            ConditionOperator::NotEqual => col.ne(first),
            ConditionOperator::GreaterThan => col.gt(first),
            ConditionOperator::GreaterEqual => col.gte(first),
            ConditionOperator::LessThan => col.lt(first),
            ConditionOperator::LessEqual => col.lte(first),
            ConditionOperator::Like => col.like(first_text),
            ConditionOperator::NotLike => col.not_like(first_text),
            ConditionOperator::BeginsWith => col.like(format!("{}%", first_text)),
            ConditionOperator::EndsWith => col.like(format!("%{}", first_text)),
            ConditionOperator::In => col.is_in(self.values.iter().map(json_to_value)),
            ConditionOperator::NotIn => col.is_not_in(self.values.iter().map(json_to_value)),
            ConditionOperator::Null => col.is_null(),
            ConditionOperator::NotNull => col.is_not_null(),
        }
    }
}

impl QueryExpression {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            columns: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: ConditionExpression) -> Self {
        self.conditions.push(condition);
        self
    }

    /// True when every condition holds for the row.
    pub fn matches(&self, row: &BTreeMap<String, JsonValue>) -> bool {
        self.conditions
            .iter()
            .all(|c| c.matches(row.get(&c.attribute)))
    }

    /// Builds the equivalent `SELECT` for SQL-backed stores.
    pub fn to_select_statement(&self) -> SelectStatement {
        let mut select = Query::select();
        select.from(Alias::new(self.entity_name.as_str()));
        if self.columns.is_empty() {
            select.column(Asterisk);
        } else {
            select.columns(self.columns.iter().map(|c| Alias::new(c.as_str())));
        }
        for condition in &self.conditions {
            select.and_where(condition.to_expr());
        }
        select
    }

    pub fn to_sql(&self) -> String {
        self.to_select_statement().to_string(PostgresQueryBuilder)
    }
}

fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Bool(b) => Value::Bool(Some(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(Some(i)),
            None => Value::Double(n.as_f64()),
        },
        JsonValue::Null => Value::String(None),
        other => Value::String(Some(Box::new(text_of(other)))),
    }
}

/// Reference to a single record, the target of a direct lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReference {
    pub logical_name: String,
    pub id: Uuid,
}

impl EntityReference {
    pub fn new(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into(),
            id,
        }
    }

    /// Name of the primary key attribute, `{entity}id`.
    pub fn id_attribute(&self) -> String {
        format!("{}id", self.logical_name)
    }
}
