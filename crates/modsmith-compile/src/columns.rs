//! Attribute spelling to schema column spelling.

const MODIFIER_COLUMNS: &[(&str, &str)] = &[
    ("id", "ModifierId"),
    ("collection", "CollectionType"),
    ("effect", "EffectType"),
    ("permanent", "Permanent"),
    ("run-once", "RunOnce"),
    ("new-only", "NewOnly"),
    ("owner-stack-limit", "OwnerStackLimit"),
    ("subject-stack-limit", "SubjectStackLimit"),
];

const REQUIREMENT_COLUMNS: &[(&str, &str)] = &[
    ("id", "RequirementId"),
    ("type", "RequirementType"),
    ("inverse", "Inverse"),
    ("persistent", "Persistent"),
    ("progress-weight", "ProgressWeight"),
    ("reverse", "Reverse"),
    ("triggered", "Triggered"),
];

const ARGUMENT_COLUMNS: &[(&str, &str)] = &[
    ("name", "Name"),
    ("type", "Type"),
    ("extra", "Extra"),
    ("second-extra", "SecondExtra"),
];

fn lookup(table: &[(&str, &'static str)], attribute: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == attribute)
        .map(|(_, column)| *column)
}

pub fn modifier_column(attribute: &str) -> Option<&'static str> {
    lookup(MODIFIER_COLUMNS, attribute)
}

pub fn requirement_column(attribute: &str) -> Option<&'static str> {
    lookup(REQUIREMENT_COLUMNS, attribute)
}

pub fn argument_column(attribute: &str) -> Option<&'static str> {
    lookup(ARGUMENT_COLUMNS, attribute)
}
