use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use modsmith_core::{ATTR_PREFIX, NodeMap, ParsedNode, TEXT_KEY};

/// What went wrong during a single parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Error reported by the XML tokenizer.
    Syntax,
    /// Malformed attribute list.
    Attribute,
    /// Text or attribute value with an invalid escape.
    Escape,
    /// A second top-level element named `name` starts at the failure offset.
    DuplicateRoot { name: String },
    /// End of input with elements still open.
    Unclosed,
}

/// A parse failure with the byte offset it was reported at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub kind: FailureKind,
    pub offset: usize,
    pub message: String,
}

impl ParseFailure {
    fn new(kind: FailureKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }

    /// 1-based line and column of the failure inside `text`.
    pub fn position(&self, text: &str) -> (usize, usize) {
        let offset = floor_char_boundary(text, self.offset);
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rfind('\n')
            .map(|newline| offset - newline)
            .unwrap_or(offset + 1);
        (line, column)
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

struct Frame {
    name: String,
    entries: NodeMap,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>, offset: usize) -> Result<Self, ParseFailure> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut entries = NodeMap::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|err| {
                ParseFailure::new(FailureKind::Attribute, offset, err.to_string())
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value = attr.unescape_value().map_err(|err| {
                ParseFailure::new(FailureKind::Escape, offset, err.to_string())
            })?;
            entries.insert(
                format!("{ATTR_PREFIX}{key}"),
                ParsedNode::Scalar(value.trim().to_string()),
            );
        }

        Ok(Self {
            name,
            entries,
            text: String::new(),
        })
    }

    fn close(self) -> (String, ParsedNode) {
        let Frame {
            name,
            mut entries,
            text,
        } = self;
        if entries.is_empty() {
            return (name, ParsedNode::Scalar(text));
        }
        if !text.is_empty() {
            entries.insert(TEXT_KEY.to_string(), ParsedNode::Scalar(text));
        }
        (name, ParsedNode::Mapping(entries))
    }
}

fn attach(entries: &mut NodeMap, name: String, node: ParsedNode) {
    match entries.get_mut(&name) {
        None => {
            entries.insert(name, node);
        }
        Some(ParsedNode::Sequence(items)) => items.push(node),
        Some(existing) => {
            let first = std::mem::replace(existing, ParsedNode::Sequence(Vec::new()));
            *existing = ParsedNode::Sequence(vec![first, node]);
        }
    }
}

/// Parse `text` into its root element name and tree.
///
/// Returns `Ok(None)` for documents with no element at all (whitespace or a
/// lone text node).
pub fn parse_tree(text: &str) -> Result<Option<(String, ParsedNode)>, ParseFailure> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, ParsedNode)> = None;

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|err| {
            // Never report a syntax error before the markup that raised it.
            let markup = text[before.min(text.len())..]
                .find('<')
                .map_or(before, |relative| before + relative);
            let offset = (reader.error_position() as usize).max(markup);
            ParseFailure::new(FailureKind::Syntax, offset, err.to_string())
        })?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                check_single_root(text, &root, &stack, &start, before)?;
                stack.push(Frame::open(&start, after)?);
            }
            Event::Empty(start) => {
                check_single_root(text, &root, &stack, &start, before)?;
                let frame = Frame::open(&start, after)?;
                finish(frame, &mut stack, &mut root);
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    finish(frame, &mut stack, &mut root);
                }
            }
            Event::Text(content) => {
                // Text outside the root element is ignored.
                if let Some(top) = stack.last_mut() {
                    let value = content.unescape().map_err(|err| {
                        ParseFailure::new(FailureKind::Escape, before, err.to_string())
                    })?;
                    append_text(&mut top.text, value.trim());
                }
            }
            Event::CData(content) => {
                if let Some(top) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&content.into_inner()).into_owned();
                    append_text(&mut top.text, value.trim());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseFailure::new(
            FailureKind::Unclosed,
            text.len(),
            format!("element <{}> is never closed", open.name),
        ));
    }

    Ok(root)
}

fn append_text(buffer: &mut String, value: &str) {
    if value.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(value);
}

fn check_single_root(
    text: &str,
    root: &Option<(String, ParsedNode)>,
    stack: &[Frame],
    start: &BytesStart<'_>,
    before: usize,
) -> Result<(), ParseFailure> {
    if !stack.is_empty() || root.is_none() {
        return Ok(());
    }
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let offset = text[before.min(text.len())..]
        .find('<')
        .map(|relative| before + relative)
        .unwrap_or(before);
    Err(ParseFailure::new(
        FailureKind::DuplicateRoot { name: name.clone() },
        offset,
        format!("second top-level element <{name}>"),
    ))
}

fn finish(frame: Frame, stack: &mut [Frame], root: &mut Option<(String, ParsedNode)>) {
    let (name, node) = frame.close();
    match stack.last_mut() {
        Some(parent) => attach(&mut parent.entries, name, node),
        None => *root = Some((name, node)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_children_collapse_into_sequence() {
        let (root, node) = parse_tree(
            r#"<GameInfo><Types><Row Type="A" Kind="K"/><Row Type="B" Kind="K"/></Types></GameInfo>"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(root, "GameInfo");
        let rows = node.get("Types").unwrap().get("Row").unwrap();
        let types: Vec<&str> = rows
            .items()
            .iter()
            .filter_map(|row| row.attr("Type"))
            .collect();
        assert_eq!(types, vec!["A", "B"]);
    }

    #[test]
    fn single_child_is_not_wrapped() {
        let (_, node) = parse_tree("<GameInfo><Types><Row><Type>A</Type></Row></Types></GameInfo>")
            .unwrap()
            .unwrap();
        let row = node.get("Types").unwrap().get("Row").unwrap();
        assert!(matches!(row, ParsedNode::Mapping(_)));
        assert_eq!(row.get("Type").unwrap().as_scalar(), Some("A"));
    }

    #[test]
    fn text_with_attributes_uses_reserved_key() {
        let (_, node) = parse_tree(r#"<GameEffects><Argument name="Amount">5</Argument></GameEffects>"#)
            .unwrap()
            .unwrap();
        let argument = node.get("Argument").unwrap();
        assert_eq!(argument.attr("name"), Some("Amount"));
        assert_eq!(argument.text(), Some("5"));
    }

    #[test]
    fn namespace_attributes_are_dropped() {
        let (_, node) = parse_tree(r#"<GameEffects xmlns="GameEffects"></GameEffects>"#)
            .unwrap()
            .unwrap();
        assert_eq!(node, ParsedNode::Scalar(String::new()));
    }

    #[test]
    fn whitespace_and_lone_text_have_no_root() {
        assert_eq!(parse_tree("   \n\t").unwrap(), None);
        assert_eq!(parse_tree("just some words").unwrap(), None);
    }

    #[test]
    fn second_root_is_reported_at_its_tag() {
        let text = "<GameData><A/></GameData>\n<GameData><B/></GameData>";
        let failure = parse_tree(text).unwrap_err();
        assert_eq!(
            failure.kind,
            FailureKind::DuplicateRoot {
                name: "GameData".to_string()
            }
        );
        assert_eq!(&text[failure.offset..failure.offset + 10], "<GameData>");
        assert_eq!(failure.position(text).0, 2);
    }

    #[test]
    fn unclosed_element_fails() {
        let failure = parse_tree("<GameData><Types>").unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unclosed);
    }
}
