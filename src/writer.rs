//! Serialization of fetch trees back to query text.
//!
//! Output is compact (no indentation), attribute values are double-quoted
//! and escaped. The result re-parses to an equal tree.

use crate::ast::{Element, FetchTree, Node};
use quick_xml::escape::escape;
use std::fmt;

/// Serializes a tree to fetch query text.
pub fn serialize(tree: &FetchTree) -> String {
    tree.to_string()
}

impl fmt::Display for FetchTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for attr in &self.attributes {
            write!(f, " {}=\"{}\"", attr.name, escape(attr.value.as_str()))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for child in &self.children {
            match child {
                Node::Element(e) => write!(f, "{}", e)?,
                Node::Text(t) => write!(f, "{}", escape(t.as_str()))?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CONDITION, ENTITY, FETCH, FILTER};
    use crate::parser::parse;

    #[test]
    fn test_compact_output() {
        let tree = FetchTree::new(
            Element::new(FETCH).with_child(
                Element::new(ENTITY)
                    .with_attribute("name", "account")
                    .with_child(Element::new(FILTER).with_child(
                        Element::new(CONDITION)
                            .with_attribute("attribute", "revenue")
                            .with_attribute("operator", "gt")
                            .with_attribute("value", "1000"),
                    )),
            ),
        );
        assert_eq!(
            serialize(&tree),
            r#"<fetch><entity name="account"><filter><condition attribute="revenue" operator="gt" value="1000"/></filter></entity></fetch>"#
        );
    }

    #[test]
    fn test_special_characters_escaped() {
        let tree = FetchTree::new(
            Element::new(CONDITION)
                .with_attribute("value", r#"O'Brien & "Sons" <ltd>"#),
        );
        let text = serialize(&tree);
        assert!(!text.contains("& "));
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed, tree);
    }

    #[test]
    fn test_reparse_is_semantically_equal() {
        let input = "<fetch top='5'>\n  <entity name='account'>\n    <attribute name='name'/>\n    <link-entity name='contact' from='contactid' to='primarycontactid' link-type='outer'>\n      <filter type='or'><condition attribute='x' operator='null'/></filter>\n    </link-entity>\n    <filter><condition attribute='s' operator='in'><value>1</value><value>2</value></condition></filter>\n  </entity>\n</fetch>";
        let tree = parse(input).unwrap();
        let reparsed = parse(&serialize(&tree)).unwrap();
        assert_eq!(reparsed, tree);
    }
}
