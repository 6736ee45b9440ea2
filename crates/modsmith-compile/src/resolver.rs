//! Discovery of content files through `.modinfo` package manifests.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use modsmith_core::{Diagnostic, DiagnosticReport, ParsedNode};
use modsmith_xml::{ReadOutcome, Section, read_document};

use crate::order::{SourceFile, order_sources};

pub const MANIFEST_EXTENSION: &str = "modinfo";

/// A database update action declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseAction {
    pub id: Option<String>,
    pub load_order: i64,
    /// Files in document order, resolved against the manifest directory.
    pub files: Vec<PathBuf>,
}

/// A package manifest and the database actions it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModPackage {
    pub id: String,
    pub name: Option<String>,
    pub manifest: PathBuf,
    pub is_base: bool,
    pub actions: Vec<DatabaseAction>,
}

impl ModPackage {
    /// Files of every action, actions stably sorted by load order.
    pub fn source_files(&self) -> Vec<SourceFile> {
        let mut actions: Vec<&DatabaseAction> = self.actions.iter().collect();
        actions.sort_by_key(|action| action.load_order);
        actions
            .into_iter()
            .flat_map(|action| {
                action.files.iter().map(|path| SourceFile {
                    package_id: self.id.clone(),
                    path: path.clone(),
                    is_base: self.is_base,
                })
            })
            .collect()
    }
}

/// Parse one manifest. Returns `None` with a diagnostic when the file cannot
/// be read or is not a package manifest.
pub fn read_manifest(path: &Path, is_base: bool, report: &mut DiagnosticReport) -> Option<ModPackage> {
    let source = path.display().to_string();
    let document = match read_document(path) {
        Ok(ReadOutcome::Document(document)) if document.section == Section::ModInfo => document,
        Ok(_) => {
            report.push(Diagnostic::warning(
                "not_a_manifest",
                &source,
                "file has no <Mod> root",
            ));
            return None;
        }
        Err(err) => {
            report.push(Diagnostic::error("read_failure", &source, err.to_string()));
            return None;
        }
    };

    let body = &document.body;
    let Some(id) = body.attr("id").filter(|id| !id.is_empty()) else {
        report.push(Diagnostic::warning(
            "manifest_without_id",
            &source,
            "<Mod> has no id attribute",
        ));
        return None;
    };
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = body
        .get("Properties")
        .and_then(|properties| properties.get("Name"))
        .and_then(ParsedNode::text)
        .map(str::to_string);

    let mut actions = Vec::new();
    let update_actions = body
        .get("InGameActions")
        .and_then(|group| group.get("UpdateDatabase"))
        .map(ParsedNode::items)
        .unwrap_or_default();
    for action in update_actions {
        let load_order = match action
            .get("Properties")
            .and_then(|properties| properties.get("LoadOrder"))
            .and_then(ParsedNode::text)
        {
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                report.push(Diagnostic::warning(
                    "invalid_load_order",
                    &source,
                    format!("LoadOrder {raw:?} is not an integer; using 0"),
                ));
                0
            }),
            None => 0,
        };
        let files = action
            .get("File")
            .map(ParsedNode::items)
            .unwrap_or_default()
            .into_iter()
            .filter_map(ParsedNode::text)
            .filter(|file| !file.trim().is_empty())
            .map(|file| base_dir.join(file.trim()))
            .collect();
        actions.push(DatabaseAction {
            id: action.attr("id").map(str::to_string),
            load_order,
            files,
        });
    }

    tracing::debug!(
        event = "manifest_read",
        package = %id,
        actions = actions.len(),
        path = %source
    );
    Some(ModPackage {
        id: id.to_string(),
        name,
        manifest: path.to_path_buf(),
        is_base,
        actions,
    })
}

/// Find and read every manifest under `root`, in file-name order.
pub fn discover_packages(root: &Path, is_base: bool, report: &mut DiagnosticReport) -> Vec<ModPackage> {
    let mut packages = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                report.push(Diagnostic::warning(
                    "walk_failure",
                    root.display().to_string(),
                    err.to_string(),
                ));
                continue;
            }
        };
        let is_manifest = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case(MANIFEST_EXTENSION));
        if !is_manifest {
            continue;
        }
        if let Some(package) = read_manifest(entry.path(), is_base, report) {
            packages.push(package);
        }
    }
    packages
}

/// Resolved content files in application order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResolvedSources {
    pub packages: Vec<ModPackage>,
    pub files: Vec<SourceFile>,
    pub report: DiagnosticReport,
}

/// Discover base and mod packages and order their files.
pub fn resolve_sources(base_roots: &[PathBuf], mod_roots: &[PathBuf], priority: &[String]) -> ResolvedSources {
    let mut resolved = ResolvedSources::default();
    for (roots, is_base) in [(base_roots, true), (mod_roots, false)] {
        for root in roots {
            let packages = discover_packages(root, is_base, &mut resolved.report);
            resolved.packages.extend(packages);
        }
    }
    let files = resolved
        .packages
        .iter()
        .flat_map(ModPackage::source_files)
        .collect();
    resolved.files = order_sources(files, priority);
    tracing::info!(
        event = "sources_resolved",
        packages = resolved.packages.len(),
        files = resolved.files.len()
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Mod id="better-scouts" version="1">
  <Properties><Name>Better Scouts</Name></Properties>
  <InGameActions>
    <UpdateDatabase id="late">
      <Properties><LoadOrder>20</LoadOrder></Properties>
      <File>data/late.xml</File>
    </UpdateDatabase>
    <UpdateDatabase id="early">
      <Properties><LoadOrder>5</LoadOrder></Properties>
      <File>data/first.xml</File>
      <File>data/second.sql</File>
    </UpdateDatabase>
  </InGameActions>
</Mod>"#;

    #[test]
    fn manifest_actions_are_sorted_by_load_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scouts.modinfo");
        std::fs::write(&path, MANIFEST).unwrap();

        let mut report = DiagnosticReport::default();
        let package = read_manifest(&path, false, &mut report).unwrap();
        assert!(report.is_empty());
        assert_eq!(package.id, "better-scouts");
        assert_eq!(package.name.as_deref(), Some("Better Scouts"));

        let files: Vec<PathBuf> = package
            .source_files()
            .into_iter()
            .map(|source| source.path)
            .collect();
        assert_eq!(
            files,
            vec![
                dir.path().join("data/first.xml"),
                dir.path().join("data/second.sql"),
                dir.path().join("data/late.xml"),
            ]
        );
    }

    #[test]
    fn unreadable_manifest_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.modinfo"), "<Mod id=\"x\"><Oops></Mod>").unwrap();
        std::fs::write(dir.path().join("good.modinfo"), MANIFEST).unwrap();

        let resolved = resolve_sources(&[], &[dir.path().to_path_buf()], &[]);
        assert_eq!(resolved.packages.len(), 1);
        assert!(resolved.report.has_code("read_failure"));
        assert!(resolved.files.iter().all(|file| !file.is_base));
    }
}
