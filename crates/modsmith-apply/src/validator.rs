//! Per-batch apply loop: execute, heal what can be healed, report the rest,
//! then commit or roll back on the deferred foreign-key check.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Connection, Executor, Row, Sqlite, SqliteConnection};

use modsmith_core::{SchemaHandle, SchemaSnapshot, SourcedStatement, SqlValue};

use crate::classify::{ErrorClass, FailureKind, classify};
use crate::errors::Result;
use crate::heal::{
    compared_pairs, conflict_predicate, missing_required_columns, rows_identical, splice_column,
    to_replace,
};
use crate::report::{
    BatchOutcome, BatchSummary, FkViolation, HealAction, HealedEntry, Provenance, ReportEntry,
    ValidationReport,
};
use crate::scratch::ScratchDatabase;
use crate::sqlparse::{ParsedInsert, parse_insert};
use crate::status::StatusSender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorOptions {
    /// Column ignored when locating and comparing conflicting rows.
    pub metadata_column: String,
    /// Surrogate ordering columns the validator may fill in.
    pub ordering_columns: Vec<String>,
    /// Search the batch for statements behind each foreign-key violation.
    pub deep_fk_diagnosis: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            metadata_column: "Hash".to_string(),
            ordering_columns: vec!["SortIndex".to_string(), "Index".to_string()],
            deep_fk_diagnosis: false,
        }
    }
}

/// Statements for one load phase, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub name: String,
    pub statements: Vec<SourcedStatement>,
}

impl Batch {
    pub fn new(name: impl Into<String>, statements: Vec<SourcedStatement>) -> Self {
        Self {
            name: name.into(),
            statements,
        }
    }
}

enum Attempt {
    Executed,
    Healed(HealedEntry),
    Failed(ErrorClass, ReportEntry),
}

#[derive(Default)]
struct Tally {
    executed: usize,
    healed: usize,
    failed: usize,
}

type ViolationKey = (String, Option<i64>, String, i64);

#[derive(Debug, Clone)]
pub struct Validator {
    schema: SchemaHandle,
    options: ValidatorOptions,
    status: Option<StatusSender>,
}

impl Validator {
    pub fn new(schema: SchemaHandle, options: ValidatorOptions) -> Self {
        Self {
            schema,
            options,
            status: None,
        }
    }

    pub fn with_status(mut self, status: StatusSender) -> Self {
        self.status = Some(status);
        self
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Apply each batch in order on one scratch connection. A set `cancel`
    /// flag stops before the next batch starts.
    pub async fn apply_batches(
        &self,
        scratch: &ScratchDatabase,
        batches: &[Batch],
        cancel: &AtomicBool,
    ) -> Result<ValidationReport> {
        let mut conn = scratch.connect().await?;
        let mut report = ValidationReport::default();
        for batch in batches {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(event = "apply_cancelled", next_batch = %batch.name);
                break;
            }
            self.apply_batch(&mut conn, batch, &mut report).await?;
        }
        conn.close().await?;
        Ok(report)
    }

    /// Run one batch inside a transaction with deferred foreign keys.
    ///
    /// Statement failures become report entries. The batch commits only
    /// when it introduces no foreign-key violations.
    pub async fn apply_batch(
        &self,
        conn: &mut SqliteConnection,
        batch: &Batch,
        report: &mut ValidationReport,
    ) -> Result<BatchOutcome> {
        let schema = self.schema.load();
        let mut tally = Tally::default();

        let mut tx = conn.begin().await?;
        Executor::execute(&mut *tx, sqlx::raw_sql("PRAGMA defer_foreign_keys = ON")).await?;
        let baseline: BTreeSet<ViolationKey> = foreign_key_check(&mut tx).await?.into_iter().collect();

        for statement in &batch.statements {
            for attempt in self.run_statement(&mut tx, statement, &schema).await {
                self.settle(attempt, &mut tally, report);
            }
        }

        let introduced: Vec<ViolationKey> = foreign_key_check(&mut tx)
            .await?
            .into_iter()
            .filter(|key| !baseline.contains(key))
            .collect();
        let mut violations = Vec::with_capacity(introduced.len());
        for key in introduced {
            violations.push(describe_violation(&mut tx, &batch.name, key).await?);
        }
        if self.options.deep_fk_diagnosis && !violations.is_empty() {
            attach_provenance(&mut violations, &batch.statements);
        }

        let outcome = if violations.is_empty() {
            tx.commit().await?;
            BatchOutcome::Committed
        } else {
            tx.rollback().await?;
            BatchOutcome::RolledBack
        };

        for violation in &violations {
            tracing::warn!(
                event = "fk_violation",
                batch = %batch.name,
                table = %violation.table,
                parent = %violation.parent
            );
            self.notify(violation.describe());
        }
        let summary = BatchSummary {
            name: batch.name.clone(),
            statements: batch.statements.len(),
            executed: tally.executed,
            healed: tally.healed,
            failed: tally.failed,
            fk_violations: violations.len(),
            outcome,
        };
        tracing::info!(
            event = "batch_applied",
            batch = %summary.name,
            statements = summary.statements,
            executed = summary.executed,
            healed = summary.healed,
            failed = summary.failed,
            fk_violations = summary.fk_violations,
            outcome = ?summary.outcome
        );
        self.notify(format!(
            "batch {}: {} executed, {} healed, {} failed, {:?}",
            summary.name, summary.executed, summary.healed, summary.failed, summary.outcome
        ));
        report.fk_violations.extend(violations);
        report.batches.push(summary);
        Ok(outcome)
    }

    async fn run_statement(
        &self,
        conn: &mut SqliteConnection,
        statement: &SourcedStatement,
        schema: &Arc<SchemaSnapshot>,
    ) -> Vec<Attempt> {
        let message = match execute(conn, &statement.sql).await {
            Ok(()) => return vec![Attempt::Executed],
            Err(message) => message,
        };
        match parsed_insert(statement) {
            Some(insert) if insert.row_count() > 1 => {
                tracing::debug!(
                    event = "statement_replayed",
                    source = %statement.source,
                    line = statement.line,
                    rows = insert.row_count()
                );
                let mut attempts = Vec::with_capacity(insert.row_count());
                for index in 0..insert.row_count() {
                    let Some(row) = insert.single_row(index) else {
                        continue;
                    };
                    let sql = row.to_sql();
                    let attempt = match execute(conn, &sql).await {
                        Ok(()) => Attempt::Executed,
                        Err(message) => {
                            self.recover(conn, statement, Some(row), sql, message, schema)
                                .await
                        }
                    };
                    attempts.push(attempt);
                }
                attempts
            }
            insert => {
                let sql = statement.sql.clone();
                vec![self.recover(conn, statement, insert, sql, message, schema).await]
            }
        }
    }

    async fn recover(
        &self,
        conn: &mut SqliteConnection,
        statement: &SourcedStatement,
        insert: Option<ParsedInsert>,
        sql: String,
        message: String,
        schema: &SchemaSnapshot,
    ) -> Attempt {
        match (FailureKind::from_message(&message), insert) {
            (FailureKind::Unique { table, columns }, Some(insert)) => {
                self.heal_unique(conn, statement, insert, sql, message, table, columns)
                    .await
            }
            (FailureKind::NotNull { table, column }, insert) => {
                self.heal_not_null(conn, statement, insert, sql, message, table, column, schema)
                    .await
            }
            (failure, _) => failed(classify(&failure, &sql), statement, sql, message),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn heal_unique(
        &self,
        conn: &mut SqliteConnection,
        statement: &SourcedStatement,
        insert: ParsedInsert,
        sql: String,
        message: String,
        table: Option<String>,
        columns: Vec<String>,
    ) -> Attempt {
        let unresolved = |sql: String, diagnostic: String| {
            failed(ErrorClass::Unresolved, statement, sql, diagnostic)
        };
        let Some(table) = table else {
            return unresolved(sql, format!("{message}: conflict on an unnamed index"));
        };
        let Some(insert) = with_columns(conn, insert).await else {
            return unresolved(sql, format!("{message}: statement columns unknown"));
        };
        let Some(pairs) = insert.pairs(0) else {
            return unresolved(sql, format!("{message}: statement columns unknown"));
        };
        let metadata = self.options.metadata_column.as_str();
        let Some(predicate) = conflict_predicate(&columns, &pairs, metadata) else {
            return unresolved(sql, format!("{message}: cannot derive conflict predicate"));
        };

        let compared: Vec<&(String, SqlValue)> = compared_pairs(&pairs, metadata).collect();
        let select = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 2",
            compared
                .iter()
                .map(|(column, _)| format!("CAST({} AS TEXT)", quote_ident(column)))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(&table),
            predicate
                .iter()
                .enumerate()
                .map(|(index, (column, _))| format!("{} IS ?{}", quote_ident(column), index + 1))
                .collect::<Vec<_>>()
                .join(" AND ")
        );
        let mut query = sqlx::query(&select);
        for (_, value) in &predicate {
            query = bind_value(query, value);
        }
        let rows = match query.fetch_all(&mut *conn).await {
            Ok(rows) => rows,
            Err(err) => {
                return unresolved(sql, format!("{message}: conflict lookup failed: {err}"));
            }
        };

        match rows.as_slice() {
            [] => unresolved(sql, format!("{message}: conflicting row not found")),
            [row] => {
                let stored = match (0..compared.len())
                    .map(|index| row.try_get::<Option<String>, _>(index))
                    .collect::<std::result::Result<Vec<_>, _>>()
                {
                    Ok(stored) => stored,
                    Err(err) => {
                        return unresolved(sql, format!("{message}: conflict lookup failed: {err}"));
                    }
                };
                if rows_identical(&pairs, &stored, metadata) {
                    return healed(statement, &table, HealAction::DuplicateSkipped, sql);
                }
                let replace = to_replace(&insert).to_sql();
                match execute(conn, &replace).await {
                    Ok(()) => healed(statement, &table, HealAction::RewrittenToReplace, replace),
                    Err(retry) => failed(
                        classify(&FailureKind::from_message(&retry), &replace),
                        statement,
                        replace,
                        format!("{message}; replace retry failed: {retry}"),
                    ),
                }
            }
            many => unresolved(
                sql,
                format!("{message}: ambiguous conflict, {} rows match", many.len()),
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn heal_not_null(
        &self,
        conn: &mut SqliteConnection,
        statement: &SourcedStatement,
        insert: Option<ParsedInsert>,
        sql: String,
        message: String,
        table: String,
        column: String,
        schema: &SchemaSnapshot,
    ) -> Attempt {
        let is_ordering = self
            .options
            .ordering_columns
            .iter()
            .any(|ordering| ordering.eq_ignore_ascii_case(&column));

        if is_ordering {
            if let Some(spliceable) = insert.as_ref().filter(|insert| !insert.has_column(&column)) {
                let next_sql = format!(
                    "SELECT COALESCE(MAX({}), 0) + 1 FROM {}",
                    quote_ident(&column),
                    quote_ident(&table)
                );
                let next = sqlx::query_scalar::<_, i64>(&next_sql)
                    .fetch_one(&mut *conn)
                    .await;
                if let Some(spliced) = next
                    .ok()
                    .and_then(|next| splice_column(spliceable, &column, next))
                {
                    let spliced_sql = spliced.to_sql();
                    return match execute(conn, &spliced_sql).await {
                        Ok(()) => healed(statement, &table, HealAction::OrderingSpliced, spliced_sql),
                        Err(retry) => failed(
                            classify(&FailureKind::from_message(&retry), &spliced_sql),
                            statement,
                            spliced_sql,
                            format!("{message}; spliced retry failed: {retry}"),
                        ),
                    };
                }
            }
        }

        let provided = insert.and_then(|insert| insert.columns);
        let diagnostic = match provided {
            Some(provided) => {
                let required = required_columns(conn, &table, schema).await;
                let missing = missing_required_columns(&required, &provided);
                if missing.is_empty() {
                    message
                } else {
                    format!("{message}: missing required column(s) {}", missing.join(", "))
                }
            }
            None => message,
        };
        failed(ErrorClass::BrokenInsert, statement, sql, diagnostic)
    }

    fn settle(&self, attempt: Attempt, tally: &mut Tally, report: &mut ValidationReport) {
        match attempt {
            Attempt::Executed => tally.executed += 1,
            Attempt::Healed(entry) => {
                tally.healed += 1;
                tracing::info!(
                    event = "statement_healed",
                    source = %entry.source,
                    line = entry.line,
                    table = %entry.table,
                    action = ?entry.action
                );
                self.notify(format!(
                    "{}:{}: healed {} ({:?})",
                    entry.source, entry.line, entry.table, entry.action
                ));
                report.healed.push(entry);
            }
            Attempt::Failed(class, entry) => {
                tally.failed += 1;
                tracing::warn!(
                    event = "statement_failed",
                    class = class.label(),
                    source = %entry.source,
                    line = entry.line,
                    diagnostic = %entry.diagnostic
                );
                self.notify(format!(
                    "{}:{}: [{}] {} | {}",
                    entry.source,
                    entry.line,
                    class.label(),
                    entry.diagnostic,
                    entry.sql
                ));
                report.record(class, entry);
            }
        }
    }

    fn notify(&self, message: String) {
        if let Some(status) = &self.status {
            status.send(message);
        }
    }
}

fn failed(class: ErrorClass, statement: &SourcedStatement, sql: String, diagnostic: String) -> Attempt {
    Attempt::Failed(
        class,
        ReportEntry {
            source: statement.source.clone(),
            line: statement.line,
            sql,
            diagnostic,
        },
    )
}

fn healed(statement: &SourcedStatement, table: &str, action: HealAction, sql: String) -> Attempt {
    Attempt::Healed(HealedEntry {
        source: statement.source.clone(),
        line: statement.line,
        table: table.to_string(),
        action,
        sql,
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn engine_message(err: &sqlx::Error) -> String {
    match err.as_database_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}

async fn execute(conn: &mut SqliteConnection, sql: &str) -> std::result::Result<(), String> {
    Executor::execute(&mut *conn, sqlx::raw_sql(sql))
        .await
        .map(|_| ())
        .map_err(|err| engine_message(&err))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(value) => query.bind(*value),
        SqlValue::Real(value) => query.bind(*value),
        SqlValue::Text(value) => query.bind(value.clone()),
    }
}

/// Insert view of a statement: from its record when present, else parsed
/// from the SQL text.
fn parsed_insert(statement: &SourcedStatement) -> Option<ParsedInsert> {
    statement
        .record
        .as_ref()
        .and_then(ParsedInsert::from_record)
        .or_else(|| parse_insert(&statement.sql))
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Vec<String> {
    sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .bind(table.to_string())
        .fetch_all(&mut *conn)
        .await
        .unwrap_or_default()
}

/// Fill in the column list of a positional insert from the live table.
async fn with_columns(conn: &mut SqliteConnection, mut insert: ParsedInsert) -> Option<ParsedInsert> {
    if insert.columns.is_some() {
        return Some(insert);
    }
    let columns = table_columns(conn, &insert.table).await;
    if columns.is_empty() || insert.rows.iter().any(|row| row.len() != columns.len()) {
        return None;
    }
    insert.columns = Some(columns);
    Some(insert)
}

/// Not-null columns without a default, from the snapshot when it knows the
/// table, otherwise from the live catalog.
async fn required_columns(conn: &mut SqliteConnection, table: &str, schema: &SchemaSnapshot) -> Vec<String> {
    if let Some(spec) = schema.table(table) {
        return spec.primary_columns.clone();
    }
    sqlx::query_scalar::<_, String>(
        r#"SELECT name FROM pragma_table_info(?1) WHERE "notnull" = 1 AND dflt_value IS NULL ORDER BY cid"#,
    )
    .bind(table.to_string())
    .fetch_all(&mut *conn)
    .await
    .unwrap_or_default()
}

async fn foreign_key_check(conn: &mut SqliteConnection) -> Result<Vec<ViolationKey>> {
    let rows = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&mut *conn)
        .await?;
    let mut keys = Vec::with_capacity(rows.len());
    for row in rows {
        keys.push((
            row.try_get::<String, _>(0)?,
            row.try_get::<Option<i64>, _>(1)?,
            row.try_get::<String, _>(2)?,
            row.try_get::<i64, _>(3)?,
        ));
    }
    Ok(keys)
}

async fn describe_violation(
    conn: &mut SqliteConnection,
    batch: &str,
    (table, rowid, parent, constraint): ViolationKey,
) -> Result<FkViolation> {
    let columns = sqlx::query_scalar::<_, String>(
        r#"SELECT "from" FROM pragma_foreign_key_list(?1) WHERE id = ?2 ORDER BY seq"#,
    )
    .bind(table.clone())
    .bind(constraint)
    .fetch_all(&mut *conn)
    .await?;

    let mut values = vec![None; columns.len()];
    if let (Some(rowid), false) = (rowid, columns.is_empty()) {
        let select = format!(
            "SELECT {} FROM {} WHERE rowid = ?1",
            columns
                .iter()
                .map(|column| format!("CAST({} AS TEXT)", quote_ident(column)))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(&table)
        );
        if let Some(row) = sqlx::query(&select)
            .bind(rowid)
            .fetch_optional(&mut *conn)
            .await?
        {
            for (index, slot) in values.iter_mut().enumerate() {
                *slot = row.try_get::<Option<String>, _>(index)?;
            }
        }
    }

    Ok(FkViolation {
        batch: batch.to_string(),
        table,
        rowid,
        parent,
        constraint,
        columns,
        values,
        provenance: Vec::new(),
    })
}

/// Name the statements that inserted the violating values.
fn attach_provenance(violations: &mut [FkViolation], statements: &[SourcedStatement]) {
    let parsed: Vec<(&SourcedStatement, ParsedInsert)> = statements
        .iter()
        .filter_map(|statement| parsed_insert(statement).map(|insert| (statement, insert)))
        .collect();

    for violation in violations.iter_mut() {
        let wanted: Vec<(&str, &str)> = violation
            .columns
            .iter()
            .zip(violation.values.iter())
            .filter_map(|(column, value)| value.as_deref().map(|value| (column.as_str(), value)))
            .collect();
        if wanted.is_empty() {
            continue;
        }
        for (statement, insert) in &parsed {
            if !insert.table.eq_ignore_ascii_case(&violation.table) {
                continue;
            }
            let matches = (0..insert.row_count()).any(|index| {
                insert.pairs(index).is_some_and(|pairs| {
                    wanted.iter().all(|(column, value)| {
                        pairs.iter().any(|(name, stored)| {
                            name.eq_ignore_ascii_case(column) && stored.display() == *value
                        })
                    })
                })
            });
            if matches {
                violation.provenance.push(Provenance {
                    source: statement.source.clone(),
                    line: statement.line,
                });
            }
        }
    }
}
