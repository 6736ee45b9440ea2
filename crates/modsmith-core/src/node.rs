use indexmap::IndexMap;
use serde::Serialize;

/// Prefix marking attribute keys inside a [`NodeMap`].
pub const ATTR_PREFIX: char = '@';

/// Reserved key holding an element's text content when it also has
/// attributes or children.
pub const TEXT_KEY: &str = "#text";

/// Ordered mapping from attribute or child-element name to its value.
pub type NodeMap = IndexMap<String, ParsedNode>;

/// Positional tree produced by the document reader.
///
/// An element with neither attributes nor children is a `Scalar` holding its
/// text (possibly empty). Repeated same-named children collapse into a
/// `Sequence` in document order; a single child is never wrapped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedNode {
    Scalar(String),
    Mapping(NodeMap),
    Sequence(Vec<ParsedNode>),
}

impl ParsedNode {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ParsedNode::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&NodeMap> {
        match self {
            ParsedNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a child element or attribute key on a mapping.
    pub fn get(&self, key: &str) -> Option<&ParsedNode> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Scalar value of the attribute `name` (without the prefix).
    pub fn attr(&self, name: &str) -> Option<&str> {
        let map = self.as_mapping()?;
        map.iter()
            .find(|(key, _)| key.strip_prefix(ATTR_PREFIX) == Some(name))
            .and_then(|(_, value)| value.as_scalar())
    }

    /// Text content: the scalar itself, or the reserved text key of a mapping.
    pub fn text(&self) -> Option<&str> {
        match self {
            ParsedNode::Scalar(value) => Some(value),
            ParsedNode::Mapping(map) => map.get(TEXT_KEY).and_then(ParsedNode::as_scalar),
            ParsedNode::Sequence(_) => None,
        }
    }

    /// Normalize single-or-many: a sequence yields its elements, anything
    /// else yields itself.
    pub fn items(&self) -> Vec<&ParsedNode> {
        match self {
            ParsedNode::Sequence(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Attributes of a mapping in document order, prefix stripped.
    pub fn attributes(&self) -> Vec<(&str, &ParsedNode)> {
        self.as_mapping()
            .map(|map| {
                map.iter()
                    .filter_map(|(key, value)| {
                        key.strip_prefix(ATTR_PREFIX).map(|name| (name, value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Child elements of a mapping in document order (attributes and text
    /// excluded).
    pub fn children(&self) -> Vec<(&str, &ParsedNode)> {
        self.as_mapping()
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| !key.starts_with(ATTR_PREFIX) && key.as_str() != TEXT_KEY)
                    .map(|(key, value)| (key.as_str(), value))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True when the node carries no text, attributes or children.
    pub fn is_blank(&self) -> bool {
        match self {
            ParsedNode::Scalar(value) => value.trim().is_empty(),
            ParsedNode::Mapping(map) => map.is_empty(),
            ParsedNode::Sequence(items) => items.is_empty(),
        }
    }

    /// Stray text on a mapping that also has attributes or children.
    pub fn stray_text(&self) -> Option<&str> {
        self.as_mapping()
            .and_then(|map| map.get(TEXT_KEY))
            .and_then(ParsedNode::as_scalar)
            .filter(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(entries: &[(&str, ParsedNode)]) -> ParsedNode {
        ParsedNode::Mapping(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn attr_and_children_are_split_by_prefix() {
        let node = mapping(&[
            ("@id", ParsedNode::Scalar("MOD_X".to_string())),
            ("Argument", ParsedNode::Scalar("5".to_string())),
            (TEXT_KEY, ParsedNode::Scalar("stray".to_string())),
        ]);

        assert_eq!(node.attr("id"), Some("MOD_X"));
        assert_eq!(node.attr("missing"), None);
        assert_eq!(node.attributes().len(), 1);
        let children: Vec<&str> = node.children().iter().map(|(key, _)| *key).collect();
        assert_eq!(children, vec!["Argument"]);
        assert_eq!(node.stray_text(), Some("stray"));
    }

    #[test]
    fn items_normalizes_single_and_sequence() {
        let single = ParsedNode::Scalar("a".to_string());
        assert_eq!(single.items().len(), 1);

        let many = ParsedNode::Sequence(vec![
            ParsedNode::Scalar("a".to_string()),
            ParsedNode::Scalar("b".to_string()),
        ]);
        let texts: Vec<Option<&str>> = many.items().iter().map(|node| node.text()).collect();
        assert_eq!(texts, vec![Some("a"), Some("b")]);
    }
}
