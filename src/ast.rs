//! In-memory model of a fetch query document.
//!
//! A fetch document is an owned tree: a `fetch` root holding one `entity`
//! element, whose children are `attribute`, `order`, `filter` and
//! `link-entity` elements. The interceptor only ever moves whole `filter`
//! and `link-entity` subtrees between documents, so nodes are plain owned
//! values and relocation is a move, never a pointer update.

use thiserror::Error;

pub const FETCH: &str = "fetch";
pub const ENTITY: &str = "entity";
pub const FILTER: &str = "filter";
pub const LINK_ENTITY: &str = "link-entity";
pub const CONDITION: &str = "condition";

/// A parsed fetch document.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTree {
    pub root: Element,
}

/// An element with ordered attributes and ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A subtree that can be spliced into an entity element.
///
/// The content of a clause is never inspected while splicing.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Filter(Element),
    LinkEntity(Element),
}

impl Clause {
    pub fn into_element(self) -> Element {
        match self {
            Clause::Filter(e) | Clause::LinkEntity(e) => e,
        }
    }
}

/// The document does not have exactly one usable entity element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("fetch query has no <entity> element")]
    MissingEntity,
    #[error("fetch query has {count} <entity> elements, expected exactly one")]
    AmbiguousEntity { count: usize },
    #[error("unexpected root element <{name}>, expected <fetch> or <entity>")]
    UnexpectedRoot { name: String },
    #[error("<entity> element has no 'name' attribute")]
    UnnamedEntity,
    #[error("fetch query targets '{query}' but the operation targets '{target}'")]
    EntityMismatch { query: String, target: String },
}

impl FetchTree {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Returns the entity element the query targets.
    ///
    /// Only direct `entity` children of the `fetch` root are candidates;
    /// entities nested deeper (there are none in well-formed fetch queries)
    /// are never picked. More than one candidate is rejected instead of
    /// silently rewriting the first one.
    pub fn root_entity(&self) -> Result<&Element, StructureError> {
        let index = self.root_entity_index()?;
        match index {
            None => Ok(&self.root),
            Some(i) => match &self.root.children[i] {
                Node::Element(e) => Ok(e),
                Node::Text(_) => Err(StructureError::MissingEntity),
            },
        }
    }

    pub fn root_entity_mut(&mut self) -> Result<&mut Element, StructureError> {
        let index = self.root_entity_index()?;
        match index {
            None => Ok(&mut self.root),
            Some(i) => match &mut self.root.children[i] {
                Node::Element(e) => Ok(e),
                Node::Text(_) => Err(StructureError::MissingEntity),
            },
        }
    }

    /// Consumes the document and returns its entity element.
    pub fn into_root_entity(mut self) -> Result<Element, StructureError> {
        match self.root_entity_index()? {
            None => Ok(self.root),
            Some(i) => match self.root.children.swap_remove(i) {
                Node::Element(e) => Ok(e),
                Node::Text(_) => Err(StructureError::MissingEntity),
            },
        }
    }

    /// `None` means the root itself is the entity.
    fn root_entity_index(&self) -> Result<Option<usize>, StructureError> {
        match self.root.name.as_str() {
            ENTITY => Ok(None),
            FETCH => {
                let candidates: Vec<usize> = self
                    .root
                    .children
                    .iter()
                    .enumerate()
                    .filter(|(_, node)| matches!(node, Node::Element(e) if e.name == ENTITY))
                    .map(|(i, _)| i)
                    .collect();
                match candidates.as_slice() {
                    [] => Err(StructureError::MissingEntity),
                    [only] => Ok(Some(*only)),
                    many => Err(StructureError::AmbiguousEntity { count: many.len() }),
                }
            }
            other => Err(StructureError::UnexpectedRoot {
                name: other.to_string(),
            }),
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Replaces the value of an existing attribute or appends a new one.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Concatenated text content of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Appends a clause at the end of the child list.
    pub fn append_child(&mut self, clause: Clause) {
        self.children.push(Node::Element(clause.into_element()));
    }

    /// Moves the first-level `filter` children out, followed by the
    /// first-level `link-entity` children, each group in document order.
    ///
    /// Anything nested inside those subtrees travels with them.
    pub fn into_clauses(self) -> Vec<Clause> {
        let mut filters = Vec::new();
        let mut links = Vec::new();
        for node in self.children {
            if let Node::Element(e) = node {
                match e.name.as_str() {
                    FILTER => filters.push(Clause::Filter(e)),
                    LINK_ENTITY => links.push(Clause::LinkEntity(e)),
                    _ => {}
                }
            }
        }
        filters.extend(links);
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Element {
        Element::new(ENTITY).with_attribute("name", name)
    }

    #[test]
    fn test_root_entity_under_fetch() {
        let tree = FetchTree::new(Element::new(FETCH).with_child(entity("account")));
        assert_eq!(tree.root_entity().unwrap().attribute("name"), Some("account"));
    }

    #[test]
    fn test_root_entity_is_root() {
        let tree = FetchTree::new(entity("contact"));
        assert_eq!(tree.root_entity().unwrap().attribute("name"), Some("contact"));
    }

    #[test]
    fn test_missing_entity() {
        let tree = FetchTree::new(Element::new(FETCH));
        assert_eq!(tree.root_entity(), Err(StructureError::MissingEntity));
    }

    #[test]
    fn test_ambiguous_entity_rejected() {
        let tree = FetchTree::new(
            Element::new(FETCH)
                .with_child(entity("account"))
                .with_child(entity("contact")),
        );
        assert_eq!(
            tree.root_entity(),
            Err(StructureError::AmbiguousEntity { count: 2 })
        );
    }

    #[test]
    fn test_unexpected_root() {
        let tree = FetchTree::new(Element::new("select"));
        assert!(matches!(
            tree.root_entity(),
            Err(StructureError::UnexpectedRoot { name }) if name == "select"
        ));
    }

    #[test]
    fn test_nested_entity_is_not_a_candidate() {
        let link = Element::new(LINK_ENTITY).with_child(entity("inner"));
        let tree = FetchTree::new(Element::new(FETCH).with_child(entity("account").with_child(link)));
        assert_eq!(tree.root_entity().unwrap().attribute("name"), Some("account"));
    }

    #[test]
    fn test_into_clauses_orders_filters_before_links() {
        let payload = entity("account")
            .with_child(Element::new(LINK_ENTITY).with_attribute("name", "a"))
            .with_child(Element::new(FILTER).with_attribute("type", "or"))
            .with_child(Element::new("attribute").with_attribute("name", "x"))
            .with_child(Element::new(FILTER).with_attribute("type", "and"));

        let clauses = payload.into_clauses();
        let kinds: Vec<_> = clauses
            .iter()
            .map(|c| match c {
                Clause::Filter(e) => format!("filter:{}", e.attribute("type").unwrap()),
                Clause::LinkEntity(e) => format!("link:{}", e.attribute("name").unwrap()),
            })
            .collect();
        assert_eq!(kinds, vec!["filter:or", "filter:and", "link:a"]);
    }

    #[test]
    fn test_append_child_preserves_order() {
        let mut target = entity("account").with_child(Element::new(FILTER).with_attribute("id", "1"));
        target.append_child(Clause::Filter(Element::new(FILTER).with_attribute("id", "2")));
        target.append_child(Clause::LinkEntity(Element::new(LINK_ENTITY).with_attribute("id", "3")));

        let ids: Vec<_> = target.child_elements().map(|e| e.attribute("id").unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_set_attribute_replaces() {
        let mut e = Element::new(CONDITION).with_attribute("value", "1");
        e.set_attribute("value", "2");
        assert_eq!(e.attributes.len(), 1);
        assert_eq!(e.attribute("value"), Some("2"));
    }
}
