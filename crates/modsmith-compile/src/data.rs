//! Table definitions and row operations for `GameInfo`/`GameData`/`Database`
//! documents.

use indexmap::IndexMap;

use modsmith_core::{ColumnDef, ParsedNode, SqlValue, StatementKind, StatementRecord, TableDef};

use crate::emit::Emitter;

type Pairs = Vec<(String, SqlValue)>;

/// Compile the body of a data root.
pub(crate) fn compile_data(body: &ParsedNode, emitter: &mut Emitter<'_>) {
    if let Some(stray) = body.as_scalar().filter(|text| !text.trim().is_empty()) {
        emitter.warn("stray_text", format!("text {stray:?} directly under the data root"));
        return;
    }
    if let Some(stray) = body.stray_text() {
        emitter.warn("stray_text", format!("text {stray:?} directly under the data root"));
    }

    for (tag, node) in body.children() {
        for item in node.items() {
            if tag == "Table" {
                compile_table_definition(item, emitter);
            } else {
                compile_table_section(tag, item, emitter);
            }
        }
    }
}

fn compile_table_section(table: &str, section: &ParsedNode, emitter: &mut Emitter<'_>) {
    if section.is_blank() {
        return;
    }
    if let Some(stray) = section.as_scalar() {
        emitter.warn(
            "stray_text",
            format!("{table}: text {stray:?} where rows were expected"),
        );
        return;
    }
    for (name, _) in section.attributes() {
        emitter.warn(
            "unexpected_attribute",
            format!("{table}: attribute {name} on a table section is ignored"),
        );
    }

    for (tag, node) in section.children() {
        for item in node.items() {
            match tag {
                "Row" => compile_insert(StatementKind::Insert, table, item, emitter),
                "Replace" => compile_insert(StatementKind::Replace, table, item, emitter),
                "InsertOrIgnore" => compile_insert(StatementKind::InsertIgnore, table, item, emitter),
                "Update" => compile_update(table, item, emitter),
                "Delete" => compile_delete(table, item, emitter),
                other => emitter.warn(
                    "unexpected_element",
                    format!("{table}: <{other}> is not a row operation"),
                ),
            }
        }
    }
}

/// Column/value pairs from attributes, then child elements, in document
/// order. An empty child element is NULL.
fn row_pairs(table: &str, node: &ParsedNode, emitter: &mut Emitter<'_>) -> Pairs {
    let mut pairs = Pairs::new();
    for (name, value) in node.attributes() {
        pairs.push((name.to_string(), SqlValue::text(value.text().unwrap_or(""))));
    }
    for (name, child) in node.children() {
        match child {
            ParsedNode::Scalar(value) if value.is_empty() => {
                pairs.push((name.to_string(), SqlValue::Null));
            }
            ParsedNode::Scalar(value) => pairs.push((name.to_string(), SqlValue::text(value))),
            ParsedNode::Mapping(_) => match child.text() {
                Some(value) => pairs.push((name.to_string(), SqlValue::text(value))),
                None => emitter.warn(
                    "unexpected_element",
                    format!("{table}: <{name}> has no value"),
                ),
            },
            ParsedNode::Sequence(_) => emitter.warn(
                "duplicate_column",
                format!("{table}: column {name} is given more than once"),
            ),
        }
    }
    if let Some(stray) = node.stray_text() {
        emitter.warn("stray_text", format!("{table}: stray text {stray:?} in a row"));
    }
    pairs
}

fn compile_insert(kind: StatementKind, table: &str, node: &ParsedNode, emitter: &mut Emitter<'_>) {
    let pairs = row_pairs(table, node, emitter);
    if pairs.is_empty() {
        emitter.warn("empty_row", format!("{table}: row without columns is skipped"));
        return;
    }
    emitter.insert(kind, table, pairs);
}

fn compile_update(table: &str, node: &ParsedNode, emitter: &mut Emitter<'_>) {
    let filter = node.get("Where").map(|clause| row_pairs(table, clause, emitter));
    let set = node.get("Set").map(|clause| row_pairs(table, clause, emitter));
    let (Some(filter), Some(set)) = (filter, set) else {
        emitter.warn(
            "incomplete_update",
            format!("{table}: <Update> needs both <Where> and <Set>; skipped"),
        );
        return;
    };
    if set.is_empty() || filter.is_empty() {
        emitter.warn(
            "incomplete_update",
            format!("{table}: <Update> with an empty <Where> or <Set> is skipped"),
        );
        return;
    }
    emitter.check_columns(
        table,
        filter.iter().chain(set.iter()).map(|(column, _)| column.as_str()),
    );
    emitter.record(StatementRecord::Update {
        table: table.to_string(),
        set: set.into_iter().collect::<IndexMap<_, _>>(),
        filter: filter.into_iter().collect::<IndexMap<_, _>>(),
    });
}

fn compile_delete(table: &str, node: &ParsedNode, emitter: &mut Emitter<'_>) {
    let filter = match node.get("Where") {
        Some(clause) => row_pairs(table, clause, emitter),
        None => row_pairs(table, node, emitter),
    };
    if filter.is_empty() {
        emitter.warn(
            "unconditional_delete",
            format!("{table}: <Delete> without a predicate is skipped"),
        );
        return;
    }
    emitter.check_columns(table, filter.iter().map(|(column, _)| column.as_str()));
    emitter.record(StatementRecord::Delete {
        table: table.to_string(),
        filter: filter.into_iter().collect(),
    });
}

fn flag(node: &ParsedNode, name: &str) -> bool {
    node.attr(name)
        .is_some_and(|value| matches!(value, "true" | "True" | "TRUE" | "1"))
}

fn compile_table_definition(node: &ParsedNode, emitter: &mut Emitter<'_>) {
    let Some(name) = node.attr("name").filter(|name| !name.is_empty()) else {
        emitter.warn("table_without_name", "<Table> has no name attribute");
        return;
    };

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for column in node.get("Column").map(ParsedNode::items).unwrap_or_default() {
        let Some(column_name) = column.attr("name").filter(|name| !name.is_empty()) else {
            emitter.warn("column_without_name", format!("{name}: <Column> has no name"));
            continue;
        };
        if flag(column, "primarykey") {
            primary_key.push(column_name.to_string());
        }
        columns.push(ColumnDef {
            name: column_name.to_string(),
            sql_type: column.attr("type").unwrap_or("TEXT").to_string(),
            not_null: flag(column, "notnull"),
            unique: flag(column, "unique"),
            default: column.attr("default").map(str::to_string),
            references: column.attr("reference").map(str::to_string),
        });
    }

    if let Some(keys) = node.get("PrimaryKey") {
        for key in keys.get("Key").map(ParsedNode::items).unwrap_or_default() {
            if let Some(column) = key.text().filter(|text| !text.is_empty()) {
                if !primary_key.iter().any(|existing| existing == column) {
                    primary_key.push(column.to_string());
                }
            }
        }
    }

    for foreign in node.get("ForeignKey").map(ParsedNode::items).unwrap_or_default() {
        let (Some(column), Some(target)) = (foreign.attr("column"), foreign.attr("reference")) else {
            emitter.warn(
                "incomplete_foreign_key",
                format!("{name}: <ForeignKey> needs column and reference"),
            );
            continue;
        };
        match columns.iter_mut().find(|def| def.name == column) {
            Some(def) => def.references = Some(target.to_string()),
            None => emitter.warn(
                "incomplete_foreign_key",
                format!("{name}: foreign key column {column} is not defined"),
            ),
        }
    }

    for (tag, _) in node.children() {
        if !matches!(tag, "Column" | "PrimaryKey" | "ForeignKey") {
            emitter.warn(
                "unexpected_element",
                format!("{name}: <{tag}> is not part of a table definition"),
            );
        }
    }

    if columns.is_empty() {
        emitter.warn("table_without_columns", format!("table {name} defines no columns"));
        return;
    }
    emitter.record(StatementRecord::CreateTable(TableDef {
        name: name.to_string(),
        columns,
        primary_key,
    }));
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use modsmith_core::{
        ColumnSpec, DatabaseSpec, DiagnosticReport, SchemaSnapshot, TableSpec, render_statement,
    };
    use modsmith_xml::{ReadOutcome, read_str};

    use super::*;

    fn compile(xml: &str, schema: Option<&SchemaSnapshot>) -> (Vec<String>, DiagnosticReport) {
        let ReadOutcome::Document(document) = read_str(xml).unwrap() else {
            panic!("expected a document");
        };
        let mut emitter = Emitter::new("data.xml", schema);
        compile_data(&document.body, &mut emitter);
        let sql = emitter
            .records
            .iter()
            .map(|record| render_statement(record).unwrap())
            .collect();
        (sql, emitter.report)
    }

    #[test]
    fn row_operations_render_in_document_order() {
        let (sql, report) = compile(
            r#"<GameInfo>
                <Types>
                  <Row Type="UNIT_X" Kind="KIND_UNIT"/>
                  <Replace Type="UNIT_Y" Kind="KIND_UNIT"/>
                  <InsertOrIgnore><Type>UNIT_Z</Type><Kind>KIND_UNIT</Kind></InsertOrIgnore>
                </Types>
                <Units>
                  <Update><Where UnitType="UNIT_X"/><Set Cost="10" Name="LOC_&quot;X&quot;"/></Update>
                  <Delete UnitType="UNIT_W"/>
                </Units>
              </GameInfo>"#,
            None,
        );
        assert!(report.is_empty());
        assert_eq!(
            sql,
            vec![
                r#"INSERT INTO Types (Type, Kind) VALUES ("UNIT_X", "KIND_UNIT");"#,
                r#"REPLACE INTO Types (Type, Kind) VALUES ("UNIT_Y", "KIND_UNIT");"#,
                r#"INSERT OR IGNORE INTO Types (Type, Kind) VALUES ("UNIT_Z", "KIND_UNIT");"#,
                r#"UPDATE Units SET Cost = "10", Name = "LOC_'X'" WHERE UnitType = "UNIT_X";"#,
                r#"DELETE FROM Units WHERE UnitType = "UNIT_W";"#,
            ]
        );
    }

    #[test]
    fn empty_child_element_is_null() {
        let (sql, _) = compile(
            "<GameData><Units><Row><UnitType>UNIT_X</UnitType><Description/></Row></Units></GameData>",
            None,
        );
        assert_eq!(
            sql,
            vec![r#"INSERT INTO Units (UnitType, Description) VALUES ("UNIT_X", NULL);"#]
        );
    }

    #[test]
    fn incomplete_update_and_bare_delete_are_skipped() {
        let (sql, report) = compile(
            r#"<GameData><Units><Update><Set Cost="1"/></Update><Delete/></Units></GameData>"#,
            None,
        );
        assert!(sql.is_empty());
        assert!(report.has_code("incomplete_update"));
        assert!(report.has_code("unconditional_delete"));
    }

    #[test]
    fn table_definition_renders_create_table() {
        let (sql, report) = compile(
            r#"<Database>
                <Table name="MyUnits">
                  <Column name="UnitType" type="TEXT" notnull="true" primarykey="true"/>
                  <Column name="Flavor" type="TEXT" default="NONE"/>
                  <ForeignKey column="UnitType" reference="Types(Type)"/>
                </Table>
                <MyUnits><Row UnitType="UNIT_X"/></MyUnits>
              </Database>"#,
            Some(&SchemaSnapshot::default()),
        );
        assert_eq!(
            sql[0],
            r#"CREATE TABLE IF NOT EXISTS MyUnits (UnitType TEXT NOT NULL, Flavor TEXT DEFAULT "NONE", PRIMARY KEY (UnitType), FOREIGN KEY (UnitType) REFERENCES Types(Type) ON DELETE CASCADE ON UPDATE CASCADE);"#
        );
        assert!(!report.has_code("unknown_table"), "{report:?}");
    }

    #[test]
    fn unknown_tables_and_columns_are_warned_once() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "Types".to_string(),
            TableSpec {
                name: "Types".to_string(),
                columns: ["Type", "Kind"]
                    .iter()
                    .enumerate()
                    .map(|(index, name)| ColumnSpec {
                        name: name.to_string(),
                        declared_type: "TEXT".to_string(),
                        not_null: true,
                        default: None,
                        pk_ordinal: u32::from(index == 0),
                    })
                    .collect(),
                primary_key: vec!["Type".to_string()],
                ..TableSpec::default()
            },
        );
        let snapshot = SchemaSnapshot::new(
            vec![DatabaseSpec {
                name: "gameplay".to_string(),
                tables,
            }],
            None,
        );

        let (sql, report) = compile(
            r#"<GameData>
                <Types><Row Type="A" Kind="K" Colour="red"/><Row Type="B" Kind="K" Colour="blue"/></Types>
                <Nowhere><Row Id="1"/><Row Id="2"/></Nowhere>
              </GameData>"#,
            Some(&snapshot),
        );
        assert_eq!(sql.len(), 4);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.has_code("unknown_column"));
        assert!(report.has_code("unknown_table"));
    }
}
