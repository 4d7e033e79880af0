//! Typed view over the filter language of a fetch query.
//!
//! The interceptor itself never looks inside `filter` or `link-entity`
//! subtrees. Consumers that have to *execute* or *render* a query (the SQL
//! compiler, the in-memory engine) lower the entity element into an
//! [`EntityPlan`] first.

use crate::ast::{Element, CONDITION, FILTER, LINK_ENTITY};
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

/// Condition operators understood by the lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Like,
    NotLike,
    BeginsWith,
    EndsWith,
    In,
    NotIn,
    Null,
    NotNull,
}

impl ConditionOperator {
    /// Maps the `operator` attribute of a `condition` element.
    pub fn from_fetch(s: &str) -> Option<Self> {
        let op = match s {
            "eq" => Self::Equal,
            "ne" | "neq" => Self::NotEqual,
            "gt" => Self::GreaterThan,
            "ge" => Self::GreaterEqual,
            "lt" => Self::LessThan,
            "le" => Self::LessEqual,
            "like" => Self::Like,
            "not-like" => Self::NotLike,
            "begins-with" => Self::BeginsWith,
            "ends-with" => Self::EndsWith,
            "in" => Self::In,
            "not-in" => Self::NotIn,
            "null" => Self::Null,
            "not-null" => Self::NotNull,
            _ => return None,
        };
        Some(op)
    }

    /// Number of operand values the operator expects; `None` means one or more.
    fn arity(&self) -> Option<usize> {
        match self {
            Self::Null | Self::NotNull => Some(0),
            Self::In | Self::NotIn => None,
            _ => Some(1),
        }
    }
}

/// Boolean tree of conditions. An empty group places no constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Condition(ConditionClause),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionClause {
    pub attribute: String,
    pub operator: ConditionOperator,
    pub values: Vec<String>,
    /// Alias of a linked entity the condition refers to (`entityname`).
    pub entity_alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Inner,
    Outer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkClause {
    pub name: String,
    /// Attribute of the linked entity
    pub from: String,
    /// Attribute of the parent entity
    pub to: String,
    pub alias: Option<String>,
    pub link_type: LinkType,
    pub filter: Predicate,
    pub links: Vec<LinkClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Columns {
    All,
    Named(Vec<String>),
}

/// Lowered form of an `entity` element.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPlan {
    pub name: String,
    pub columns: Columns,
    /// Sibling `filter` elements, combined conjunctively.
    pub filter: Predicate,
    pub links: Vec<LinkClause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter: {message}")]
pub struct PredicateError {
    pub message: String,
}

impl PredicateError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::All(parts) | Predicate::Any(parts) => parts.iter().all(Predicate::is_empty),
            Predicate::Condition(_) => false,
        }
    }
}

pub fn lower_entity(entity: &Element) -> Result<EntityPlan, PredicateError> {
    let name = required(entity, "name")?.to_string();

    let columns = if entity.children_named("all-attributes").next().is_some() {
        Columns::All
    } else {
        let named: Vec<String> = entity
            .children_named("attribute")
            .filter_map(|a| a.attribute("name"))
            .map(str::to_string)
            .collect();
        if named.is_empty() {
            Columns::All
        } else {
            Columns::Named(named)
        }
    };

    let (filter, links) = lower_body(entity)?;
    Ok(EntityPlan {
        name,
        columns,
        filter,
        links,
    })
}

fn lower_body(element: &Element) -> Result<(Predicate, Vec<LinkClause>), PredicateError> {
    let filters = element
        .children_named(FILTER)
        .map(lower_filter)
        .collect::<Result<Vec<_>, _>>()?;
    let links = element
        .children_named(LINK_ENTITY)
        .map(lower_link)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((Predicate::All(filters), links))
}

/// Lowers a `filter` element; `type` defaults to `and`.
pub fn lower_filter(filter: &Element) -> Result<Predicate, PredicateError> {
    let mut parts = Vec::new();
    for child in filter.child_elements() {
        match child.name.as_str() {
            CONDITION => parts.push(Predicate::Condition(lower_condition(child)?)),
            FILTER => parts.push(lower_filter(child)?),
            other => {
                return Err(PredicateError::new(format!(
                    "unexpected <{}> inside <filter>",
                    other
                )))
            }
        }
    }

    match filter.attribute("type").unwrap_or("and") {
        "and" => Ok(Predicate::All(parts)),
        "or" => Ok(Predicate::Any(parts)),
        other => Err(PredicateError::new(format!("unknown filter type '{}'", other))),
    }
}

fn lower_condition(condition: &Element) -> Result<ConditionClause, PredicateError> {
    let attribute = required(condition, "attribute")?.to_string();
    let op_name = required(condition, "operator")?;
    let operator = ConditionOperator::from_fetch(op_name)
        .ok_or_else(|| PredicateError::new(format!("unsupported operator '{}'", op_name)))?;

    let mut values: Vec<String> = condition.attribute("value").map(str::to_string).into_iter().collect();
    values.extend(condition.children_named("value").map(Element::text));

    let arity_ok = match operator.arity() {
        Some(n) => values.len() == n,
        None => !values.is_empty(),
    };
    if !arity_ok {
        return Err(PredicateError::new(format!(
            "operator '{}' on '{}' got {} value(s)",
            op_name,
            attribute,
            values.len()
        )));
    }

    Ok(ConditionClause {
        attribute,
        operator,
        values,
        entity_alias: condition.attribute("entityname").map(str::to_string),
    })
}

fn lower_link(link: &Element) -> Result<LinkClause, PredicateError> {
    let link_type = match link.attribute("link-type").unwrap_or("inner") {
        "inner" => LinkType::Inner,
        "outer" => LinkType::Outer,
        other => return Err(PredicateError::new(format!("unknown link-type '{}'", other))),
    };
    let (filter, links) = lower_body(link)?;
    Ok(LinkClause {
        name: required(link, "name")?.to_string(),
        from: required(link, "from")?.to_string(),
        to: required(link, "to")?.to_string(),
        alias: link.attribute("alias").map(str::to_string),
        link_type,
        filter,
        links,
    })
}

fn required<'a>(element: &'a Element, name: &str) -> Result<&'a str, PredicateError> {
    element.attribute(name).ok_or_else(|| {
        PredicateError::new(format!("<{}> is missing the '{}' attribute", element.name, name))
    })
}

/// Evaluates one condition against an attribute value.
///
/// Missing and `null` values only satisfy `null`.
pub fn matches_value(actual: Option<&Value>, operator: ConditionOperator, values: &[String]) -> bool {
    let actual = match actual {
        None | Some(Value::Null) => return operator == ConditionOperator::Null,
        Some(v) => v,
    };
    let first = values.first().map(String::as_str).unwrap_or_default();

    match operator {
        ConditionOperator::Null => false,
        ConditionOperator::NotNull => true,
        ConditionOperator::Equal => values_equal(actual, first),
        ConditionOperator::NotEqual => !values_equal(actual, first),
        ConditionOperator::GreaterThan => compare(actual, first) == Some(Ordering::Greater),
        ConditionOperator::GreaterEqual => {
            matches!(compare(actual, first), Some(Ordering::Greater | Ordering::Equal))
        }
        ConditionOperator::LessThan => compare(actual, first) == Some(Ordering::Less),
        ConditionOperator::LessEqual => {
            matches!(compare(actual, first), Some(Ordering::Less | Ordering::Equal))
        }
        ConditionOperator::Like => like(first, &text_of(actual)),
        ConditionOperator::NotLike => !like(first, &text_of(actual)),
        ConditionOperator::BeginsWith => like(&format!("{}%", first), &text_of(actual)),
        ConditionOperator::EndsWith => like(&format!("%{}", first), &text_of(actual)),
        ConditionOperator::In => values.iter().any(|v| values_equal(actual, v)),
        ConditionOperator::NotIn => !values.iter().any(|v| values_equal(actual, v)),
    }
}

/// Renders a JSON scalar the way it appears in fetch query text.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn values_equal(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::Bool(b) => match expected {
            "1" | "true" => *b,
            "0" | "false" => !*b,
            _ => false,
        },
        _ => compare(actual, expected) == Some(Ordering::Equal),
    }
}

/// Numeric when both sides are numbers, case-insensitive text otherwise.
fn compare(actual: &Value, expected: &str) -> Option<Ordering> {
    let actual_text = text_of(actual);
    match (actual_text.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(actual_text.to_lowercase().cmp(&expected.to_lowercase())),
    }
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` exactly one.
/// Case-insensitive.
pub fn like(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    // matched[j]: pattern prefix consumed so far matches text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == *c;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn plan(input: &str) -> EntityPlan {
        let tree = parse(input).unwrap();
        lower_entity(tree.root_entity().unwrap()).unwrap()
    }

    #[test]
    fn test_lower_simple_filter() {
        let plan = plan("<fetch><entity name='account'><attribute name='name'/><filter><condition attribute='revenue' operator='gt' value='1000'/></filter></entity></fetch>");
        assert_eq!(plan.name, "account");
        assert_eq!(plan.columns, Columns::Named(vec!["name".to_string()]));
        assert_eq!(
            plan.filter,
            Predicate::All(vec![Predicate::All(vec![Predicate::Condition(ConditionClause {
                attribute: "revenue".to_string(),
                operator: ConditionOperator::GreaterThan,
                values: vec!["1000".to_string()],
                entity_alias: None,
            })])])
        );
    }

    #[test]
    fn test_lower_or_group_and_in_values() {
        let plan = plan("<fetch><entity name='account'><filter type='or'><condition attribute='a' operator='null'/><condition attribute='b' operator='in'><value>1</value><value>2</value></condition></filter></entity></fetch>");
        let Predicate::All(filters) = &plan.filter else { panic!("expected All") };
        let Predicate::Any(parts) = &filters[0] else { panic!("expected Any") };
        assert_eq!(parts.len(), 2);
        if let Predicate::Condition(c) = &parts[1] {
            assert_eq!(c.operator, ConditionOperator::In);
            assert_eq!(c.values, vec!["1", "2"]);
        } else {
            panic!("expected condition");
        }
    }

    #[test]
    fn test_lower_nested_link() {
        let plan = plan("<fetch><entity name='account'><link-entity name='contact' from='contactid' to='primarycontactid' alias='pc' link-type='outer'><filter><condition attribute='statecode' operator='eq' value='0'/></filter><link-entity name='systemuser' from='systemuserid' to='ownerid'/></link-entity></entity></fetch>");
        assert_eq!(plan.links.len(), 1);
        let link = &plan.links[0];
        assert_eq!(link.name, "contact");
        assert_eq!(link.from, "contactid");
        assert_eq!(link.to, "primarycontactid");
        assert_eq!(link.alias.as_deref(), Some("pc"));
        assert_eq!(link.link_type, LinkType::Outer);
        assert_eq!(link.links.len(), 1);
        assert_eq!(link.links[0].link_type, LinkType::Inner);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let tree = parse("<fetch><entity name='a'><filter><condition attribute='x' operator='eq-userid'/></filter></entity></fetch>").unwrap();
        let err = lower_entity(tree.root_entity().unwrap()).unwrap_err();
        assert!(err.message.contains("eq-userid"));
    }

    #[test]
    fn test_arity_checked() {
        let tree = parse("<fetch><entity name='a'><filter><condition attribute='x' operator='eq'/></filter></entity></fetch>").unwrap();
        assert!(lower_entity(tree.root_entity().unwrap()).is_err());
    }

    #[test]
    fn test_matches_value() {
        let v = |s: &str| vec![s.to_string()];
        assert!(matches_value(Some(&json!(1500)), ConditionOperator::GreaterThan, &v("1000")));
        assert!(!matches_value(Some(&json!(500)), ConditionOperator::GreaterThan, &v("1000")));
        assert!(matches_value(Some(&json!("Active")), ConditionOperator::Equal, &v("active")));
        assert!(matches_value(Some(&json!(true)), ConditionOperator::Equal, &v("1")));
        assert!(matches_value(None, ConditionOperator::Null, &[]));
        assert!(!matches_value(None, ConditionOperator::NotEqual, &v("x")));
        assert!(matches_value(Some(&json!(2)), ConditionOperator::In, &["1".to_string(), "2".to_string()]));
        assert!(matches_value(Some(&json!("Contoso Ltd")), ConditionOperator::BeginsWith, &v("contoso")));
    }

    #[test]
    fn test_like() {
        assert!(like("%/type=hidden%", "Block low value /type=hidden"));
        assert!(like("%/type=hidden%", "/type=hidden"));
        assert!(!like("%/type=hidden%", "Block low value"));
        assert!(like("a_c", "ABC"));
        assert!(!like("a_c", "abbc"));
        assert!(like("%", ""));
    }
}
