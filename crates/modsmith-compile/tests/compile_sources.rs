use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::AtomicBool;

use modsmith_compile::{
    CompileContext, FileOutcome, compile_sources, merged_report, render_batch, resolve_sources,
};

const MANIFEST: &str = r#"<Mod id="scouts" version="1">
  <InGameActions>
    <UpdateDatabase id="data">
      <File>effects.xml</File>
      <File>tweaks.sql</File>
      <File>empty.xml</File>
      <File>missing.xml</File>
    </UpdateDatabase>
  </InGameActions>
</Mod>"#;

const EFFECTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<GameEffects>
  <Modifier id="SCOUT_SIGHT" collection="COLLECTION_OWNER" effect="EFFECT_ADJUST_UNIT_SIGHT">
    <Argument name="Amount">1</Argument>
    <SubjectRequirements>
      <Requirement type="REQUIREMENT_UNIT_TYPE_MATCHES">
        <Argument name="UnitType">UNIT_SCOUT</Argument>
      </Requirement>
      <Requirement type="REQUIREMENT_PLOT_IS_HILLS"/>
    </SubjectRequirements>
  </Modifier>
</GameEffects>
"#;

#[test]
fn mod_directory_compiles_in_manifest_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("scouts.modinfo"), MANIFEST).unwrap();
    fs::write(dir.path().join("effects.xml"), EFFECTS).unwrap();
    fs::write(
        dir.path().join("tweaks.sql"),
        "-- sight tweak\nUPDATE Units SET BaseSightRange = 3 WHERE UnitType = 'UNIT_SCOUT';\n",
    )
    .unwrap();
    fs::write(dir.path().join("empty.xml"), "\n   \n").unwrap();

    let resolved = resolve_sources(&[], &[dir.path().to_path_buf()], &[]);
    assert!(resolved.report.is_empty());
    let paths: Vec<_> = resolved.files.iter().map(|file| file.path.clone()).collect();
    assert_eq!(paths.len(), 4);

    let problems = BTreeSet::new();
    let ctx = CompileContext {
        schema: None,
        problem_modifiers: Some(&problems),
    };
    let compiled = compile_sources(&paths, &ctx, &AtomicBool::new(false));
    let outcomes: Vec<FileOutcome> = compiled.iter().map(|file| file.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            FileOutcome::Compiled,
            FileOutcome::Compiled,
            FileOutcome::Empty,
            FileOutcome::Unreadable,
        ]
    );

    let report = merged_report(&compiled);
    assert_eq!(report.errors.len(), 1);
    assert!(report.has_code("read_failure"));

    let batch = render_batch(&compiled).unwrap();
    let tables: Vec<&str> = batch
        .iter()
        .filter_map(|statement| statement.record.as_ref().and_then(|record| record.table()))
        .collect();
    assert_eq!(
        tables,
        vec![
            "Types",
            "Modifiers",
            "ModifierArguments",
            "RequirementSets",
            "Requirements",
            "RequirementArguments",
            "RequirementSetRequirements",
            "Requirements",
            "RequirementSetRequirements",
        ]
    );
    assert_eq!(
        batch[1].sql,
        r#"INSERT INTO Modifiers (ModifierId, ModifierType, CollectionType, EffectType, SubjectRequirementSetId) VALUES ("SCOUT_SIGHT", "SCOUT_SIGHT_TYPE", "COLLECTION_OWNER", "EFFECT_ADJUST_UNIT_SIGHT", "SCOUT_SIGHT_SUBJECT_REQUIREMENTS");"#
    );
    let script = batch.last().unwrap();
    assert!(script.source.ends_with("tweaks.sql"));
    assert_eq!(script.line, 2);
    assert_eq!(
        script.sql,
        "UPDATE Units SET BaseSightRange = 3 WHERE UnitType = 'UNIT_SCOUT';"
    );
}
