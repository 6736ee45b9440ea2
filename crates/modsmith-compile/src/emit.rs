use std::collections::BTreeSet;

use modsmith_core::{
    Diagnostic, DiagnosticReport, SchemaSnapshot, SqlValue, StatementKind, StatementRecord,
};

/// Collects the records and diagnostics produced while compiling one file.
pub(crate) struct Emitter<'a> {
    source: &'a str,
    schema: Option<&'a SchemaSnapshot>,
    created: BTreeSet<String>,
    unknown: BTreeSet<String>,
    pub(crate) records: Vec<StatementRecord>,
    pub(crate) report: DiagnosticReport,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(source: &'a str, schema: Option<&'a SchemaSnapshot>) -> Self {
        Self {
            source,
            schema,
            created: BTreeSet::new(),
            unknown: BTreeSet::new(),
            records: Vec::new(),
            report: DiagnosticReport::default(),
        }
    }

    pub(crate) fn warn(&mut self, code: &str, message: impl Into<String>) {
        self.report
            .push(Diagnostic::warning(code, self.source, message));
    }

    pub(crate) fn error(&mut self, code: &str, message: impl Into<String>) {
        self.report.push(Diagnostic::error(code, self.source, message));
    }

    /// Emit an insert-family record from ordered pairs.
    pub(crate) fn insert<C>(&mut self, kind: StatementKind, table: &str, pairs: Vec<(C, SqlValue)>)
    where
        C: Into<String>,
    {
        let pairs: Vec<(String, SqlValue)> = pairs
            .into_iter()
            .map(|(column, value)| (column.into(), value))
            .collect();
        self.check_columns(table, pairs.iter().map(|(column, _)| column.as_str()));
        match StatementRecord::from_pairs(kind, table, pairs) {
            Ok(record) => self.records.push(record),
            Err(err) => self.error("invalid_record", err.to_string()),
        }
    }

    /// Emit a record that was built by the caller.
    pub(crate) fn record(&mut self, record: StatementRecord) {
        if let StatementRecord::CreateTable(def) = &record {
            self.created.insert(def.name.clone());
        }
        self.records.push(record);
    }

    /// Warn about tables or columns the schema snapshot does not know.
    ///
    /// Tables created earlier in the same file are exempt; each unknown table
    /// is reported once.
    pub(crate) fn check_columns<'c>(
        &mut self,
        table: &str,
        columns: impl IntoIterator<Item = &'c str>,
    ) {
        let Some(schema) = self.schema else {
            return;
        };
        if self.created.contains(table) {
            return;
        }
        let Some(spec) = schema.table(table) else {
            if self.unknown.insert(table.to_string()) {
                self.warn(
                    "unknown_table",
                    format!("table {table} is not in the reference schema"),
                );
            }
            return;
        };
        let missing: Vec<String> = columns
            .into_iter()
            .filter(|column| !spec.has_column(column))
            .map(str::to_string)
            .collect();
        for column in missing {
            let key = format!("{table}.{column}");
            if self.unknown.insert(key) {
                self.warn(
                    "unknown_column",
                    format!("column {column} is not in table {table}"),
                );
            }
        }
    }
}
