use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, ensure};
use modsmith_apply::{Batch, BatchOutcome, HealAction, ScratchDatabase, Validator, ValidatorOptions};
use modsmith_compile::{CompileContext, compile_xml, render_batch};
use modsmith_core::SchemaHandle;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const FIXTURE: &str = r#"
CREATE TABLE Types (Type TEXT NOT NULL PRIMARY KEY, Kind TEXT NOT NULL);
CREATE TABLE Units (
  UnitType TEXT NOT NULL PRIMARY KEY,
  Cost INTEGER NOT NULL DEFAULT 0,
  Name TEXT,
  FOREIGN KEY (UnitType) REFERENCES Types(Type)
);
"#;

const UNITS_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<GameData>
  <Types>
    <Row Type="UNIT_X" Kind="KIND_UNIT"/>
  </Types>
  <Units>
    <Row UnitType="UNIT_X" Cost="10" Name="A"/>
    <Row UnitType="UNIT_X" Cost="20" Name="B"/>
  </Units>
</GameData>
"#;

async fn create_reference(dir: &Path) -> Result<ScratchDatabase> {
    let path = dir.join("Gameplay.sqlite");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("creating reference database")?;
    sqlx::raw_sql(FIXTURE)
        .execute(&pool)
        .await
        .context("loading fixture")?;
    pool.close().await;
    Ok(ScratchDatabase::create(&path, &dir.join("scratch.sqlite"))?)
}

#[tokio::test]
async fn compiled_rows_apply_and_conflicting_row_becomes_replace() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let scratch = create_reference(dir.path()).await?;

    let compiled = compile_xml("mod/units.xml", UNITS_XML, &CompileContext::default());
    ensure!(compiled.report.is_ok(), "unexpected diagnostics: {:?}", compiled.report);
    let statements = render_batch(std::slice::from_ref(&compiled))?;
    assert_eq!(statements.len(), 3);
    assert!(statements[1].sql.contains("\"UNIT_X\""));

    let report = Validator::new(SchemaHandle::default(), ValidatorOptions::default())
        .apply_batches(&scratch, &[Batch::new("mods", statements)], &AtomicBool::new(false))
        .await?;

    assert_eq!(report.failure_count(), 0, "{:?}", report.render_lines());
    assert_eq!(report.healed.len(), 1);
    assert_eq!(report.healed[0].action, HealAction::RewrittenToReplace);
    assert_eq!(report.healed[0].line, 3);
    assert_eq!(report.batches[0].outcome, BatchOutcome::Committed);

    let mut conn = scratch.connect().await?;
    let row: (String, String, String) = sqlx::query_as(
        "SELECT UnitType, CAST(Cost AS TEXT), Name FROM Units",
    )
    .fetch_one(&mut conn)
    .await?;
    assert_eq!(row, ("UNIT_X".to_string(), "20".to_string(), "B".to_string()));
    Ok(())
}
