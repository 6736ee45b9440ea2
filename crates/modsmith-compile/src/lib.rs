//! Compiles mod content files into ordered statement records.
//!
//! XML documents go through the document reader and then the effects or data
//! compiler chosen by their root; `.sql` scripts are split into raw
//! statements. Per-file failures become diagnostics; only rendering can fail
//! outright.

mod columns;
mod data;
mod effects;
mod emit;
mod errors;
pub mod order;
pub mod resolver;
pub mod script;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use modsmith_core::{
    Diagnostic, DiagnosticReport, ParsedNode, SchemaSnapshot, SourcedStatement, StatementRecord,
    render_statement,
};
use modsmith_xml::{ReadOutcome, Section, read_document, read_str};

pub use effects::{DEFAULT_SET_TYPE, MODIFIER_KIND, OWNER_SET_SUFFIX, SUBJECT_SET_SUFFIX};
pub use errors::{CompileError, Result};
pub use order::{DEFAULT_PRIORITY_PACKAGES, SourceFile, order_sources};
pub use resolver::{DatabaseAction, ModPackage, ResolvedSources, discover_packages, resolve_sources};
pub use script::{ScriptStatement, split_statements};

/// Inputs shared by every file of a compile run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileContext<'a> {
    /// Reference schema used to flag unknown tables and columns.
    pub schema: Option<&'a SchemaSnapshot>,
    /// Modifier ids known to carry doubly-nested requirement lists.
    pub problem_modifiers: Option<&'a BTreeSet<String>>,
}

/// How a file ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Compiled,
    /// Nothing to compile; not a failure.
    Empty,
    /// The file could not be read or parsed.
    Unreadable,
}

/// A compiled record with the line it is attributed to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    /// 1-based script line for SQL files; `None` for XML, where the
    /// rendered position is used instead.
    pub line: Option<usize>,
    pub record: StatementRecord,
}

/// Everything produced from one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFile {
    pub source: String,
    pub outcome: FileOutcome,
    pub statements: Vec<CompiledStatement>,
    pub report: DiagnosticReport,
}

impl CompiledFile {
    fn empty(source: String, outcome: FileOutcome, report: DiagnosticReport) -> Self {
        Self {
            source,
            outcome,
            statements: Vec::new(),
            report,
        }
    }

    /// Render every statement, tagging each with its source and line.
    pub fn render(&self) -> Result<Vec<SourcedStatement>> {
        self.statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                Ok(SourcedStatement {
                    source: self.source.clone(),
                    line: statement.line.unwrap_or(index + 1),
                    sql: render_statement(&statement.record)?,
                    record: Some(statement.record.clone()),
                })
            })
            .collect()
    }
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("sql"))
}

/// Compile the file at `path`. Never fails: read errors are reported as an
/// `Unreadable` outcome with a `read_failure` diagnostic.
pub fn compile_file(path: &Path, ctx: &CompileContext<'_>) -> CompiledFile {
    let source = path.display().to_string();

    if is_script(path) {
        return match std::fs::read_to_string(path) {
            Ok(text) => compile_script(&source, &text),
            Err(err) => unreadable(source, err.to_string()),
        };
    }

    match read_document(path) {
        Ok(outcome) => compile_outcome(source, outcome, ctx),
        Err(err) => unreadable(source, err.to_string()),
    }
}

/// Compile XML held in memory.
pub fn compile_xml(source: &str, text: &str, ctx: &CompileContext<'_>) -> CompiledFile {
    match read_str(text) {
        Ok(outcome) => compile_outcome(source.to_string(), outcome, ctx),
        Err(err) => unreadable(source.to_string(), err.to_string()),
    }
}

/// Compile a raw SQL script held in memory.
pub fn compile_script(source: &str, text: &str) -> CompiledFile {
    let statements: Vec<CompiledStatement> = split_statements(text)
        .into_iter()
        .map(|statement| CompiledStatement {
            line: Some(statement.line),
            record: StatementRecord::Raw { sql: statement.sql },
        })
        .collect();
    let outcome = if statements.is_empty() {
        FileOutcome::Empty
    } else {
        FileOutcome::Compiled
    };
    CompiledFile {
        source: source.to_string(),
        outcome,
        statements,
        report: DiagnosticReport::default(),
    }
}

fn unreadable(source: String, message: String) -> CompiledFile {
    tracing::warn!(event = "file_unreadable", source = %source, error = %message);
    let mut report = DiagnosticReport::default();
    report.push(Diagnostic::error("read_failure", &source, message));
    CompiledFile::empty(source, FileOutcome::Unreadable, report)
}

fn compile_outcome(source: String, outcome: ReadOutcome, ctx: &CompileContext<'_>) -> CompiledFile {
    let ReadOutcome::Document(document) = outcome else {
        return CompiledFile::empty(source, FileOutcome::Empty, DiagnosticReport::default());
    };

    let mut report = DiagnosticReport::default();
    for repair in &document.repairs {
        report.push(
            Diagnostic::warning("xml_repaired", &source, format!("applied repair {repair:?}"))
                .with_hint("the game engine may reject this file"),
        );
    }
    if document.section == Section::ModInfo {
        report.push(Diagnostic::warning(
            "manifest_as_content",
            &source,
            "package manifests carry no database content",
        ));
        return CompiledFile::empty(source, FileOutcome::Empty, report);
    }

    let records = compile_body(&source, document.section, &document.body, ctx, &mut report);
    let outcome = if records.is_empty() {
        FileOutcome::Empty
    } else {
        FileOutcome::Compiled
    };
    tracing::debug!(
        event = "file_compiled",
        source = %source,
        statements = records.len(),
        warnings = report.warnings.len(),
        errors = report.errors.len()
    );
    CompiledFile {
        source,
        outcome,
        statements: records
            .into_iter()
            .map(|record| CompiledStatement { line: None, record })
            .collect(),
        report,
    }
}

fn compile_body(
    source: &str,
    section: Section,
    body: &ParsedNode,
    ctx: &CompileContext<'_>,
    report: &mut DiagnosticReport,
) -> Vec<StatementRecord> {
    let mut emitter = emit::Emitter::new(source, ctx.schema);
    match section {
        Section::Effects => {
            let empty = BTreeSet::new();
            let problems = ctx.problem_modifiers.unwrap_or(&empty);
            effects::compile_effects(body, &mut emitter, problems);
        }
        Section::Data => data::compile_data(body, &mut emitter),
        Section::ModInfo => {}
    }
    report.merge(std::mem::take(&mut emitter.report));
    emitter.records
}

/// Compile `paths` in order. `cancel` is checked before each file; once set,
/// no further file is started.
pub fn compile_sources<P: AsRef<Path>>(
    paths: &[P],
    ctx: &CompileContext<'_>,
    cancel: &AtomicBool,
) -> Vec<CompiledFile> {
    let mut compiled = Vec::with_capacity(paths.len());
    for path in paths {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!(event = "compile_cancelled", remaining = paths.len() - compiled.len());
            break;
        }
        compiled.push(compile_file(path.as_ref(), ctx));
    }
    compiled
}

/// Render a sequence of compiled files into one statement batch.
pub fn render_batch(files: &[CompiledFile]) -> Result<Vec<SourcedStatement>> {
    let mut batch = Vec::new();
    for file in files {
        batch.extend(file.render()?);
    }
    Ok(batch)
}

/// Merge every file's diagnostics.
pub fn merged_report(files: &[CompiledFile]) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();
    for file in files {
        report.merge(file.report.clone());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_document_is_empty_not_failure() {
        let ctx = CompileContext::default();
        for text in ["   \n\t ", "only a text node"] {
            let compiled = compile_xml("blank.xml", text, &ctx);
            assert_eq!(compiled.outcome, FileOutcome::Empty);
            assert!(compiled.statements.is_empty());
            assert!(compiled.report.is_ok());
        }
    }

    #[test]
    fn broken_xml_is_unreadable_with_diagnostic() {
        let compiled = compile_xml(
            "broken.xml",
            "<GameData>\n<Types>\n</Kinds>\n</GameData>",
            &CompileContext::default(),
        );
        assert_eq!(compiled.outcome, FileOutcome::Unreadable);
        assert!(compiled.report.has_code("read_failure"));
    }

    #[test]
    fn xml_lines_are_rendered_positions() {
        let compiled = compile_xml(
            "mod.xml",
            r#"<GameEffects><Modifier id="MOD_X" effect="EFFECT_Y"/></GameEffects>"#,
            &CompileContext::default(),
        );
        let rendered = compiled.render().unwrap();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].line, 1);
        assert_eq!(rendered[1].line, 2);
        assert_eq!(rendered[1].source, "mod.xml");
    }

    #[test]
    fn scripts_keep_their_lines() {
        let compiled = compile_script("patch.sql", "\n\nUPDATE Units SET Cost = 1;\n");
        let rendered = compiled.render().unwrap();
        assert_eq!(rendered[0].line, 3);
        assert_eq!(rendered[0].sql, "UPDATE Units SET Cost = 1;");
    }

    #[test]
    fn cancelled_run_starts_no_file() {
        let cancel = AtomicBool::new(true);
        let compiled = compile_sources(&["a.xml", "b.xml"], &CompileContext::default(), &cancel);
        assert!(compiled.is_empty());
    }
}
