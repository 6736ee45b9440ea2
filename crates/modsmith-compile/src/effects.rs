//! Modifier and requirement expansion for `GameEffects` documents.

use std::collections::BTreeSet;

use modsmith_core::{ParsedNode, SqlValue, StatementKind};

use crate::columns::{argument_column, modifier_column, requirement_column};
use crate::emit::Emitter;

pub const MODIFIER_KIND: &str = "KIND_MODIFIER";
pub const DEFAULT_SET_TYPE: &str = "REQUIREMENTSET_TEST_ALL";
pub const SUBJECT_SET_SUFFIX: &str = "_SUBJECT_REQUIREMENTS";
pub const OWNER_SET_SUFFIX: &str = "_OWNER_REQUIREMENTS";

const REQUIREMENT_SLOTS: &[(&str, &str, &str)] = &[
    ("SubjectRequirements", "SubjectRequirementSetId", SUBJECT_SET_SUFFIX),
    ("OwnerRequirements", "OwnerRequirementSetId", OWNER_SET_SUFFIX),
];

type Pairs = Vec<(String, SqlValue)>;

fn text(value: &str) -> SqlValue {
    SqlValue::text(value)
}

/// Compile the body of a `GameEffects` root.
pub(crate) fn compile_effects(
    body: &ParsedNode,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) {
    if let ParsedNode::Scalar(stray) = body {
        if !stray.trim().is_empty() {
            emitter.warn(
                "stray_text",
                format!("text {stray:?} directly under <GameEffects>"),
            );
        }
        return;
    }
    if let Some(stray) = body.stray_text() {
        emitter.warn(
            "stray_text",
            format!("text {stray:?} directly under <GameEffects>"),
        );
    }

    for (tag, node) in body.children() {
        for item in node.items() {
            match tag {
                "Modifier" => compile_modifier(item, emitter, problem_modifiers),
                "RequirementSet" => compile_standalone_set(item, emitter, problem_modifiers),
                "Requirement" => compile_standalone_requirement(item, emitter, problem_modifiers),
                other => emitter.warn(
                    "unexpected_element",
                    format!("<{other}> is not expected under <GameEffects>"),
                ),
            }
        }
    }
}

/// Compile one `<Modifier>` into its Types, Modifiers and ModifierArguments
/// rows followed by any inline requirement set expansions.
pub(crate) fn compile_modifier(
    node: &ParsedNode,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) {
    let Some(id) = node.attr("id").filter(|id| !id.is_empty()) else {
        match node.as_scalar() {
            Some(stray) if !stray.trim().is_empty() => emitter.warn(
                "unexpected_text",
                format!("text {stray:?} where a <Modifier> was expected"),
            ),
            _ => emitter.warn("modifier_without_id", "<Modifier> has no id attribute"),
        }
        return;
    };
    let modifier_type = format!("{id}_TYPE");

    emitter.insert(
        StatementKind::Insert,
        "Types",
        vec![
            ("Type", text(&modifier_type)),
            ("Kind", text(MODIFIER_KIND)),
        ],
    );

    let mut columns: Pairs = vec![
        ("ModifierId".to_string(), text(id)),
        ("ModifierType".to_string(), text(&modifier_type)),
    ];
    for (name, value) in node.attributes() {
        if name == "id" {
            continue;
        }
        match modifier_column(name) {
            Some(column) => columns.push((column.to_string(), text(value.text().unwrap_or("")))),
            None => emitter.warn(
                "unknown_attribute",
                format!("modifier {id}: attribute {name} has no Modifiers column"),
            ),
        }
    }

    let mut expansions = Vec::new();
    for (tag, column, suffix) in REQUIREMENT_SLOTS {
        let Some(slot) = node.get(tag) else {
            continue;
        };
        let items = slot.items();
        if items.len() > 1 {
            emitter.warn(
                "duplicate_requirements",
                format!("modifier {id} declares <{tag}> {} times; using the first", items.len()),
            );
        }
        let set_node = items[0];
        if let Some(xref) = set_node.attr("xref") {
            if !set_node.children().is_empty() {
                emitter.warn(
                    "xref_with_children",
                    format!("modifier {id}: <{tag} xref=\"{xref}\"> children are ignored"),
                );
            }
            columns.push((column.to_string(), text(xref)));
        } else {
            let set_id = format!("{id}{suffix}");
            columns.push((column.to_string(), text(&set_id)));
            expansions.push((set_id, set_node));
        }
    }

    emitter.insert(StatementKind::Insert, "Modifiers", columns);

    if let Some(arguments) = node.get("Argument") {
        emit_arguments(arguments, "ModifierArguments", "ModifierId", id, emitter);
    }

    for (set_id, set_node) in expansions {
        expand_set(&set_id, set_node, id, emitter, problem_modifiers);
    }

    for (tag, _) in node.children() {
        match tag {
            "Argument" | "SubjectRequirements" | "OwnerRequirements" => {}
            "Requirement" => emitter.warn(
                "misplaced_requirement",
                format!("modifier {id}: <Requirement> must sit inside a requirement set"),
            ),
            other => emitter.warn(
                "unexpected_element",
                format!("modifier {id}: <{other}> is not expected under <Modifier>"),
            ),
        }
    }
    if let Some(stray) = node.stray_text() {
        emitter.warn(
            "stray_text",
            format!("modifier {id}: stray text {stray:?}"),
        );
    }
}

/// Emit the RequirementSets row, then one requirement and one
/// RequirementSetRequirements row per member.
///
/// Member ids are `{set_id}_{n}` counted from 1 in document order; a
/// cross-referenced member reuses its reference instead.
pub(crate) fn expand_set(
    set_id: &str,
    set_node: &ParsedNode,
    owner: &str,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) {
    let set_type = set_node
        .attr("type")
        .filter(|kind| !kind.is_empty())
        .unwrap_or(DEFAULT_SET_TYPE);
    emitter.insert(
        StatementKind::Insert,
        "RequirementSets",
        vec![
            ("RequirementSetId", text(set_id)),
            ("RequirementSetType", text(set_type)),
        ],
    );

    match set_node {
        ParsedNode::Scalar(stray) if !stray.trim().is_empty() => {
            emitter.warn(
                "unexpected_text",
                format!("{owner}: text {stray:?} where a <Requirement> was expected"),
            );
            return;
        }
        ParsedNode::Scalar(_) => return,
        _ => {}
    }
    if let Some(stray) = set_node.stray_text() {
        emitter.warn(
            "unexpected_text",
            format!("{owner}: text {stray:?} where a <Requirement> was expected"),
        );
    }

    let members = set_node
        .get("Requirement")
        .map(ParsedNode::items)
        .unwrap_or_default();
    for (index, member) in members.into_iter().enumerate() {
        let synthesized = format!("{set_id}_{}", index + 1);
        let Some(requirement_id) =
            build_requirement(member, synthesized, owner, emitter, problem_modifiers)
        else {
            continue;
        };
        emitter.insert(
            StatementKind::Insert,
            "RequirementSetRequirements",
            vec![
                ("RequirementSetId", text(set_id)),
                ("RequirementId", text(&requirement_id)),
            ],
        );
    }

    for (tag, _) in set_node.children() {
        if tag != "Requirement" {
            emitter.warn(
                "unexpected_element",
                format!("{owner}: <{tag}> is not expected inside a requirement set"),
            );
        }
    }
}

/// Build one requirement and return the id the set should link to.
///
/// Returns `None` when the member was skipped with a diagnostic.
pub(crate) fn build_requirement(
    node: &ParsedNode,
    id: String,
    owner: &str,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) -> Option<String> {
    match node {
        ParsedNode::Scalar(stray) if !stray.trim().is_empty() => {
            emitter.warn(
                "unexpected_text",
                format!("{owner}: text {stray:?} where a <Requirement> was expected"),
            );
            return None;
        }
        ParsedNode::Scalar(_) => {
            emitter.warn(
                "requirement_without_type",
                format!("{owner}: requirement {id} has no type"),
            );
            return None;
        }
        ParsedNode::Sequence(_) => {
            emitter.warn(
                "unexpected_element",
                format!("{owner}: requirement {id} has an unexpected shape"),
            );
            return None;
        }
        ParsedNode::Mapping(_) => {}
    }

    if let Some(xref) = node.attr("xref") {
        return Some(xref.to_string());
    }

    if let Some(nested) = node.get("Requirement") {
        if problem_modifiers.contains(owner) {
            emitter.warn(
                "nested_requirements_collapsed",
                format!(
                    "{owner} declares a doubly-nested requirement list; only its first entry is used"
                ),
            );
            let items = nested.items();
            return build_requirement(items[0], id, owner, emitter, problem_modifiers);
        }
        emitter.error(
            "unexpected_nesting",
            format!("{owner}: requirement {id} contains nested <Requirement> elements; skipped"),
        );
        return None;
    }

    let Some(requirement_type) = node.attr("type").filter(|kind| !kind.is_empty()) else {
        emitter.warn(
            "requirement_without_type",
            format!("{owner}: requirement {id} has no type"),
        );
        return None;
    };

    let mut columns: Pairs = vec![
        ("RequirementId".to_string(), text(&id)),
        ("RequirementType".to_string(), text(requirement_type)),
    ];
    for (name, value) in node.attributes() {
        if matches!(name, "id" | "type") {
            continue;
        }
        match requirement_column(name) {
            Some(column) => columns.push((column.to_string(), text(value.text().unwrap_or("")))),
            None => emitter.warn(
                "unknown_attribute",
                format!("{owner}: requirement attribute {name} has no Requirements column"),
            ),
        }
    }
    for (tag, child) in node.children() {
        if tag == "Argument" {
            continue;
        }
        match child.as_scalar() {
            Some(value) => columns.push((tag.to_string(), text(value))),
            None => emitter.warn(
                "unexpected_element",
                format!("{owner}: <{tag}> inside requirement {id} is not a column"),
            ),
        }
    }
    if let Some(stray) = node.stray_text() {
        emitter.warn(
            "stray_text",
            format!("{owner}: stray text {stray:?} in requirement {id}"),
        );
    }

    emitter.insert(StatementKind::Insert, "Requirements", columns);
    if let Some(arguments) = node.get("Argument") {
        emit_arguments(arguments, "RequirementArguments", "RequirementId", &id, emitter);
    }
    Some(id)
}

fn compile_standalone_set(
    node: &ParsedNode,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) {
    let Some(id) = node.attr("id").filter(|id| !id.is_empty()) else {
        emitter.warn("set_without_id", "<RequirementSet> has no id attribute");
        return;
    };
    expand_set(id, node, id, emitter, problem_modifiers);
}

fn compile_standalone_requirement(
    node: &ParsedNode,
    emitter: &mut Emitter<'_>,
    problem_modifiers: &BTreeSet<String>,
) {
    let Some(id) = node.attr("id").filter(|id| !id.is_empty()) else {
        emitter.warn("requirement_without_id", "top-level <Requirement> has no id attribute");
        return;
    };
    if node.attr("xref").is_some() {
        emitter.warn(
            "unexpected_element",
            format!("top-level requirement {id} cannot be a cross-reference"),
        );
        return;
    }
    build_requirement(node, id.to_string(), id, emitter, problem_modifiers);
}

fn emit_arguments(
    arguments: &ParsedNode,
    table: &str,
    key_column: &str,
    key: &str,
    emitter: &mut Emitter<'_>,
) {
    for argument in arguments.items() {
        let Some(name) = argument.attr("name").filter(|name| !name.is_empty()) else {
            emitter.warn(
                "argument_without_name",
                format!("{key}: <Argument> has no name attribute"),
            );
            continue;
        };
        let value = argument.text().unwrap_or("");
        let mut columns: Pairs = vec![
            (key_column.to_string(), text(key)),
            ("Name".to_string(), text(name)),
            ("Value".to_string(), text(value)),
        ];
        for (attribute, attribute_value) in argument.attributes() {
            if attribute == "name" {
                continue;
            }
            match argument_column(attribute) {
                Some(column) => columns.push((
                    column.to_string(),
                    text(attribute_value.text().unwrap_or("")),
                )),
                None => emitter.warn(
                    "unknown_attribute",
                    format!("{key}: argument attribute {attribute} has no column"),
                ),
            }
        }
        emitter.insert(StatementKind::Insert, table, columns);
    }
}

#[cfg(test)]
mod tests {
    use modsmith_core::{StatementRecord, render_statement};
    use modsmith_xml::{ReadOutcome, read_str};

    use super::*;

    fn compile(xml: &str, problems: &[&str]) -> (Vec<StatementRecord>, modsmith_core::DiagnosticReport) {
        let ReadOutcome::Document(document) = read_str(xml).unwrap() else {
            panic!("expected a document");
        };
        let problems: BTreeSet<String> = problems.iter().map(|id| id.to_string()).collect();
        let mut emitter = Emitter::new("test.xml", None);
        compile_effects(&document.body, &mut emitter, &problems);
        (emitter.records, emitter.report)
    }

    fn rendered(records: &[StatementRecord]) -> Vec<String> {
        records
            .iter()
            .map(|record| render_statement(record).unwrap())
            .collect()
    }

    #[test]
    fn bare_modifier_yields_types_and_modifiers_rows() {
        let (records, report) = compile(
            r#"<GameEffects><Modifier id="MOD_X" effect="EFFECT_Y"/></GameEffects>"#,
            &[],
        );
        assert!(report.is_empty());
        assert_eq!(
            rendered(&records),
            vec![
                r#"INSERT INTO Types (Type, Kind) VALUES ("MOD_X_TYPE", "KIND_MODIFIER");"#,
                r#"INSERT INTO Modifiers (ModifierId, ModifierType, EffectType) VALUES ("MOD_X", "MOD_X_TYPE", "EFFECT_Y");"#,
            ]
        );
    }

    #[test]
    fn arguments_carry_the_modifier_id() {
        let (records, _) = compile(
            r#"<GameEffects>
                <Modifier id="MOD_A" collection="COLLECTION_OWNER" effect="EFFECT_B" permanent="true">
                  <Argument name="Amount">5</Argument>
                  <Argument name="YieldType" extra="1">YIELD_FOOD</Argument>
                </Modifier>
              </GameEffects>"#,
            &[],
        );
        let arguments: Vec<&StatementRecord> = records
            .iter()
            .filter(|record| record.table() == Some("ModifierArguments"))
            .collect();
        assert_eq!(arguments.len(), 2);
        for argument in &arguments {
            assert_eq!(argument.value_of("ModifierId"), Some(&SqlValue::text("MOD_A")));
        }
        assert_eq!(arguments[1].value_of("Extra"), Some(&SqlValue::text("1")));
        assert_eq!(
            records[1].value_of("Permanent"),
            Some(&SqlValue::text("true"))
        );
    }

    #[test]
    fn inline_set_synthesizes_member_ids_and_reuses_xrefs() {
        let (records, report) = compile(
            r#"<GameEffects>
                <Modifier id="MOD_R" effect="EFFECT_R">
                  <SubjectRequirements>
                    <Requirement type="REQUIREMENT_PLOT_IS_COAST" inverse="true"/>
                    <Requirement xref="SHARED_REQ"/>
                    <Requirement type="REQUIREMENT_UNIT_TYPE">
                      <Argument name="UnitType">UNIT_SCOUT</Argument>
                    </Requirement>
                  </SubjectRequirements>
                </Modifier>
              </GameEffects>"#,
            &[],
        );
        assert!(report.is_empty(), "{report:?}");

        let modifier = &records[1];
        assert_eq!(
            modifier.value_of("SubjectRequirementSetId"),
            Some(&SqlValue::text("MOD_R_SUBJECT_REQUIREMENTS"))
        );

        let links: Vec<&SqlValue> = records
            .iter()
            .filter(|record| record.table() == Some("RequirementSetRequirements"))
            .filter_map(|record| record.value_of("RequirementId"))
            .collect();
        assert_eq!(
            links,
            vec![
                &SqlValue::text("MOD_R_SUBJECT_REQUIREMENTS_1"),
                &SqlValue::text("SHARED_REQ"),
                &SqlValue::text("MOD_R_SUBJECT_REQUIREMENTS_3"),
            ]
        );
        let sets = records
            .iter()
            .filter(|record| record.table() == Some("RequirementSets"))
            .count();
        assert_eq!(sets, 1);
        let requirement_arguments: Vec<&StatementRecord> = records
            .iter()
            .filter(|record| record.table() == Some("RequirementArguments"))
            .collect();
        assert_eq!(requirement_arguments.len(), 1);
        assert_eq!(
            requirement_arguments[0].value_of("RequirementId"),
            Some(&SqlValue::text("MOD_R_SUBJECT_REQUIREMENTS_3"))
        );
    }

    #[test]
    fn xref_set_is_not_expanded() {
        let (records, _) = compile(
            r#"<GameEffects><Modifier id="M" effect="E"><OwnerRequirements xref="EXISTING_SET"/></Modifier></GameEffects>"#,
            &[],
        );
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].value_of("OwnerRequirementSetId"),
            Some(&SqlValue::text("EXISTING_SET"))
        );
    }

    #[test]
    fn doubly_nested_list_collapses_for_known_modifiers() {
        let xml = r#"<GameEffects>
            <Modifier id="MOD_BAD" effect="E">
              <SubjectRequirements type="REQUIREMENTSET_TEST_ANY">
                <Requirement>
                  <Requirement type="REQ_FIRST"/>
                  <Requirement type="REQ_SECOND"/>
                </Requirement>
              </SubjectRequirements>
            </Modifier>
          </GameEffects>"#;

        let (records, report) = compile(xml, &["MOD_BAD"]);
        assert!(report.has_code("nested_requirements_collapsed"));
        assert!(report.is_ok());
        let requirements: Vec<&StatementRecord> = records
            .iter()
            .filter(|record| record.table() == Some("Requirements"))
            .collect();
        assert_eq!(requirements.len(), 1);
        assert_eq!(
            requirements[0].value_of("RequirementType"),
            Some(&SqlValue::text("REQ_FIRST"))
        );
        assert_eq!(
            requirements[0].value_of("RequirementId"),
            Some(&SqlValue::text("MOD_BAD_SUBJECT_REQUIREMENTS_1"))
        );
        let set = records
            .iter()
            .find(|record| record.table() == Some("RequirementSets"))
            .unwrap();
        assert_eq!(
            set.value_of("RequirementSetType"),
            Some(&SqlValue::text("REQUIREMENTSET_TEST_ANY"))
        );

        let (records, report) = compile(xml, &[]);
        assert!(report.has_code("unexpected_nesting"));
        assert!(
            !records
                .iter()
                .any(|record| record.table() == Some("Requirements"))
        );
    }

    #[test]
    fn misplaced_and_stray_content_is_reported_not_fatal() {
        let (records, report) = compile(
            r#"<GameEffects>
                <Modifier id="M" effect="E" bogus="1">
                  <Requirement type="REQ"/>
                  <SubjectRequirements>just words</SubjectRequirements>
                </Modifier>
                <Weird/>
              </GameEffects>"#,
            &[],
        );
        assert!(report.has_code("misplaced_requirement"));
        assert!(report.has_code("unexpected_text"));
        assert!(report.has_code("unknown_attribute"));
        assert!(report.has_code("unexpected_element"));
        assert!(
            records
                .iter()
                .any(|record| record.table() == Some("Modifiers"))
        );
    }

    #[test]
    fn standalone_set_and_requirement() {
        let (records, report) = compile(
            r#"<GameEffects>
                <Requirement id="REQ_SOLO" type="REQUIREMENT_PLAYER_IS_HUMAN"/>
                <RequirementSet id="SET_SOLO">
                  <Requirement xref="REQ_SOLO"/>
                </RequirementSet>
              </GameEffects>"#,
            &[],
        );
        assert!(report.is_empty());
        assert_eq!(
            rendered(&records),
            vec![
                r#"INSERT INTO Requirements (RequirementId, RequirementType) VALUES ("REQ_SOLO", "REQUIREMENT_PLAYER_IS_HUMAN");"#,
                r#"INSERT INTO RequirementSets (RequirementSetId, RequirementSetType) VALUES ("SET_SOLO", "REQUIREMENTSET_TEST_ALL");"#,
                r#"INSERT INTO RequirementSetRequirements (RequirementSetId, RequirementId) VALUES ("SET_SOLO", "REQ_SOLO");"#,
            ]
        );
    }
}
