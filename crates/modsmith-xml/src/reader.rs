use std::path::Path;

use modsmith_core::ParsedNode;

use crate::error::{ReadError, Result};
use crate::repair::{self, Repair};
use crate::tree::{ParseFailure, parse_tree};

/// Upper bound on parse attempts for one document.
pub const MAX_REPAIR_ATTEMPTS: usize = 10;

/// Recognized top-level sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// `GameInfo`, `GameData` or `Database`: table definitions and data rows.
    Data,
    /// `GameEffects`: modifiers and requirements.
    Effects,
    /// `Mod`: a package manifest.
    ModInfo,
}

impl Section {
    pub fn from_root(name: &str) -> Option<Self> {
        match name {
            "GameInfo" | "GameData" | "Database" => Some(Section::Data),
            "GameEffects" => Some(Section::Effects),
            "Mod" => Some(Section::ModInfo),
            _ => None,
        }
    }
}

/// A successfully parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub section: Section,
    pub root: String,
    pub body: ParsedNode,
    /// Repairs applied, in order, before the parse succeeded.
    pub repairs: Vec<Repair>,
}

/// Result of reading a document.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Document(Document),
    /// Nothing to compile: no element, or an unrecognized root.
    Empty,
}

/// Read and parse the file at `path`.
pub fn read_document(path: &Path) -> Result<ReadOutcome> {
    let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    read_str(text).inspect_err(|err| {
        tracing::warn!(event = "read_failed", path = %path.display(), error = %err);
    })
}

/// Parse `text`, repairing it up to [`MAX_REPAIR_ATTEMPTS`] times.
pub fn read_str(text: &str) -> Result<ReadOutcome> {
    let mut current = text.to_string();
    let mut repairs = Vec::new();
    let mut first: Option<(ParseFailure, String)> = None;

    for attempt in 0..MAX_REPAIR_ATTEMPTS {
        match parse_tree(&current) {
            Ok(Some((root, body))) => {
                let Some(section) = Section::from_root(&root) else {
                    tracing::debug!(event = "unrecognized_root", root = %root);
                    return Ok(ReadOutcome::Empty);
                };
                return Ok(ReadOutcome::Document(Document {
                    section,
                    root,
                    body,
                    repairs,
                }));
            }
            Ok(None) => return Ok(ReadOutcome::Empty),
            Err(failure) => {
                let Some((repair, patched)) = repair::apply_first(&current, &failure) else {
                    first.get_or_insert((failure, current));
                    break;
                };
                tracing::debug!(
                    event = "xml_repaired",
                    attempt = attempt + 1,
                    repair = ?repair,
                    error = %failure.message
                );
                first.get_or_insert((failure, current));
                repairs.push(repair);
                current = patched;
            }
        }
    }

    let (failure, text) = first.ok_or_else(|| ReadError::Parse {
        line: 0,
        column: 0,
        message: "repair budget exhausted".to_string(),
    })?;
    let (line, column) = failure.position(&text);
    Err(ReadError::Parse {
        line,
        column,
        message: failure.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_root_is_recognized() {
        let outcome = read_str(r#"<GameEffects><Modifier id="M"/></GameEffects>"#).unwrap();
        let ReadOutcome::Document(document) = outcome else {
            panic!("expected document");
        };
        assert_eq!(document.section, Section::Effects);
        assert!(document.repairs.is_empty());
    }

    #[test]
    fn unknown_root_is_empty() {
        assert_eq!(read_str("<Something><A/></Something>").unwrap(), ReadOutcome::Empty);
        assert_eq!(read_str("  \n ").unwrap(), ReadOutcome::Empty);
    }

    #[test]
    fn bare_ampersand_is_repaired() {
        let outcome = read_str("<GameData>\n<Types><Row Type=\"A & B\" Kind=\"K\"/></Types>\n</GameData>")
            .unwrap();
        let ReadOutcome::Document(document) = outcome else {
            panic!("expected document");
        };
        assert_eq!(document.repairs, vec![Repair::EscapeAmpersand]);
        let row = document.body.get("Types").unwrap().get("Row").unwrap();
        assert_eq!(row.attr("Type"), Some("A & B"));
    }

    #[test]
    fn duplicate_root_is_repaired() {
        let outcome =
            read_str("<GameData><Types><Row Type=\"A\"/></Types></GameData>\n<GameData><Kinds><Row Kind=\"K\"/></Kinds></GameData>")
                .unwrap();
        let ReadOutcome::Document(document) = outcome else {
            panic!("expected document");
        };
        assert_eq!(document.repairs, vec![Repair::MergeDuplicateRoot]);
        assert!(document.body.get("Types").is_some());
        assert!(document.body.get("Kinds").is_some());
    }

    #[test]
    fn unrepairable_document_surfaces_first_error() {
        let err = read_str("<GameData>\n<Types>\n</Kinds>\n</GameData>").unwrap_err();
        match err {
            ReadError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
