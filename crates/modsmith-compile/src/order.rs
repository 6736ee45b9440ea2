use std::path::PathBuf;

use serde::Serialize;

/// One content file to compile, with the package it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub package_id: String,
    pub path: PathBuf,
    pub is_base: bool,
}

/// Packages that always load first among base content, in this order.
pub const DEFAULT_PRIORITY_PACKAGES: &[&str] = &["Base", "Shared"];

/// Order sources for application.
///
/// Base content precedes mods. Within base content the `priority` packages
/// come first in the given order; every other file keeps its enumeration
/// order. The sort is stable.
pub fn order_sources(mut sources: Vec<SourceFile>, priority: &[String]) -> Vec<SourceFile> {
    sources.sort_by_key(|source| {
        let rank = if source.is_base {
            priority
                .iter()
                .position(|package| package.eq_ignore_ascii_case(&source.package_id))
                .unwrap_or(priority.len())
        } else {
            usize::MAX
        };
        (!source.is_base, rank)
    });
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(package: &str, file: &str, is_base: bool) -> SourceFile {
        SourceFile {
            package_id: package.to_string(),
            path: PathBuf::from(file),
            is_base,
        }
    }

    #[test]
    fn priority_packages_lead_and_others_keep_order() {
        let sources = vec![
            source("ModA", "a.xml", false),
            source("Expansion1", "e1.xml", true),
            source("Shared", "shared.xml", true),
            source("Expansion2", "e2.xml", true),
            source("Base", "base.xml", true),
            source("ModB", "b.xml", false),
        ];
        let priority = vec!["Base".to_string(), "Shared".to_string()];
        let ordered: Vec<String> = order_sources(sources, &priority)
            .into_iter()
            .map(|source| source.path.display().to_string())
            .collect();
        assert_eq!(
            ordered,
            vec!["base.xml", "shared.xml", "e1.xml", "e2.xml", "a.xml", "b.xml"]
        );
    }
}
