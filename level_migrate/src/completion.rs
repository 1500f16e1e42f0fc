use asset_codec::ClientVersion;
use serde_json::{json, Map, Value};

use crate::MigrateError;

/// Level schema revisions the completion pass knows how to visit.
pub const KNOWN_REVISIONS: &[&str] = &[
    "2.4.61", "2.5.04", "2.5.60", "2.5.80", "2.6.01", "2.6.21", "2.6.41", "2.6.61", "2.6.71",
    "2.6.82", "2.6.91", "2.7.01",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Level,
    EnemyData,
    AttributesData,
    /// Any object the tables carry no fields for; still walked.
    Other,
}

const ENEMY_DATA_OPTIONAL: &[&str] = &[
    "applyWay",
    "motion",
    "enemyTags",
    "notCountInTotal",
    "viewRadius",
];

const ATTRIBUTES_OPTIONAL: &[&str] = &[
    "palsyImmune",
    "attractImmune",
    "epBreakRecoverSpeed",
    "disarmedCombatImmune",
    "fearedImmune",
    "damageHitratePhysical",
    "damageHitrateMagical",
    "epDamageResistance",
    "epResistance",
];

const ENEMY_DATA_FIELD: &str = "overwrittenData";
const ATTRIBUTES_FIELD: &str = "attributes";

/// Kind of the value stored under `field` of an object of kind `parent`.
/// Enemy data is recognised wherever it sits as an override; its
/// attributes only directly under enemy data.
fn child_kind(parent: ObjectKind, field: &str) -> ObjectKind {
    match (parent, field) {
        (_, ENEMY_DATA_FIELD) => ObjectKind::EnemyData,
        (ObjectKind::EnemyData, ATTRIBUTES_FIELD) => ObjectKind::AttributesData,
        _ => ObjectKind::Other,
    }
}

/// Optional undefinable fields per object kind for one schema revision.
#[derive(Debug)]
pub struct CompletionTable {
    pub revision: &'static str,
    enemy_data: &'static [&'static str],
    attributes: &'static [&'static str],
}

static TABLES: &[CompletionTable] = &[
    table("2.4.61"),
    table("2.5.04"),
    table("2.5.60"),
    table("2.5.80"),
    table("2.6.01"),
    table("2.6.21"),
    table("2.6.41"),
    table("2.6.61"),
    table("2.6.71"),
    table("2.6.82"),
    table("2.6.91"),
    table("2.7.01"),
];

const fn table(revision: &'static str) -> CompletionTable {
    CompletionTable {
        revision,
        enemy_data: ENEMY_DATA_OPTIONAL,
        attributes: ATTRIBUTES_OPTIONAL,
    }
}

pub fn completion_table(version: &ClientVersion) -> Result<&'static CompletionTable, MigrateError> {
    TABLES
        .iter()
        .find(|table| {
            ClientVersion::parse(table.revision).map_or(false, |revision| revision == *version)
        })
        .ok_or_else(|| {
            MigrateError::Schema(format!("no level schema revision for client {}", version))
        })
}

/// Sentinel stored in an undefinable field that carries no value.
pub fn undefined() -> Value {
    json!({"m_defined": false})
}

fn is_absent(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).map_or(true, Value::is_null)
}

impl CompletionTable {
    pub fn optional_fields(&self, kind: ObjectKind) -> &'static [&'static str] {
        match kind {
            ObjectKind::EnemyData => self.enemy_data,
            ObjectKind::AttributesData => self.attributes,
            ObjectKind::Level | ObjectKind::Other => &[],
        }
    }

    /// Marks every absent optional field of the level's object graph as not
    /// defined. Returns how many fields were filled.
    pub fn complete_level(&self, level: &mut Value) -> usize {
        self.visit(ObjectKind::Level, level)
    }

    /// Walks every object field and list element. List elements take the
    /// kind of the slot holding the list.
    fn visit(&self, kind: ObjectKind, value: &mut Value) -> usize {
        match value {
            Value::Array(items) => items.iter_mut().map(|item| self.visit(kind, item)).sum(),
            Value::Object(object) => {
                let mut filled = 0;
                for field in self.optional_fields(kind) {
                    if is_absent(object, field) {
                        object.insert(field.to_string(), undefined());
                        filled += 1;
                    }
                }
                for (field, child) in object.iter_mut() {
                    filled += self.visit(child_kind(kind, field), child);
                }
                filled
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_for(version: &str) -> &'static CompletionTable {
        completion_table(&ClientVersion::parse(version).expect("version ok")).expect("table ok")
    }

    #[test]
    fn every_known_revision_has_a_table() {
        assert_eq!(TABLES.len(), KNOWN_REVISIONS.len());
        for revision in KNOWN_REVISIONS {
            assert_eq!(table_for(revision).revision, *revision);
        }
        let err = completion_table(&ClientVersion::parse("2.3.81").expect("version ok"))
            .expect_err("unknown revision");
        assert!(matches!(err, MigrateError::Schema(_)));
    }

    #[test]
    fn fills_absent_fields_and_keeps_present_ones() {
        let mut level = json!({
            "options": {},
            "enemyDbRefs": [
                {"id": "enemy_1007_slime", "overwrittenData": {
                    "motion": {"m_defined": true, "m_value": 1},
                    "viewRadius": null,
                    "attributes": {"palsyImmune": {"m_defined": true, "m_value": true}}
                }},
                {"id": "enemy_1000_gopro", "overwrittenData": null},
                {"id": "enemy_1001_bigbo"}
            ]
        });
        let filled = table_for("2.6.91").complete_level(&mut level);
        assert_eq!(filled, ENEMY_DATA_OPTIONAL.len() - 1 + ATTRIBUTES_OPTIONAL.len() - 1);

        let enemy = &level["enemyDbRefs"][0]["overwrittenData"];
        assert_eq!(enemy["motion"], json!({"m_defined": true, "m_value": 1}));
        assert_eq!(enemy["viewRadius"], undefined());
        assert_eq!(
            enemy["attributes"]["palsyImmune"],
            json!({"m_defined": true, "m_value": true})
        );
        assert_eq!(enemy["attributes"]["epResistance"], undefined());
        assert!(level["enemyDbRefs"][1]["overwrittenData"].is_null());
        assert!(level["enemyDbRefs"][2].get("overwrittenData").is_none());
        assert!(level["options"].get("applyWay").is_none());
    }

    #[test]
    fn completed_graph_has_no_absent_optional_field() {
        let mut level = json!({"enemyDbRefs": [{"overwrittenData": {"attributes": {}}}]});
        let table = table_for("2.7.01");
        table.complete_level(&mut level);
        let enemy = &level["enemyDbRefs"][0]["overwrittenData"];
        for field in table.optional_fields(ObjectKind::EnemyData) {
            assert!(!enemy[*field].is_null(), "{} left absent", field);
        }
        for field in table.optional_fields(ObjectKind::AttributesData) {
            assert!(!enemy["attributes"][*field].is_null(), "{} left absent", field);
        }
        assert_eq!(table.complete_level(&mut level), 0);
    }

    #[test]
    fn enemy_data_is_found_outside_enemy_refs() {
        let mut level = json!({
            "enemyDbRefs": [],
            "extra": {"refs": [{"overwrittenData": {"attributes": {}}}]},
            "waves": [{"fragments": [{"actions": [{"overwrittenData": {}}]}]}]
        });
        let table = table_for("2.6.91");
        let filled = table.complete_level(&mut level);
        assert_eq!(filled, 2 * ENEMY_DATA_OPTIONAL.len() + ATTRIBUTES_OPTIONAL.len());

        let nested = &level["extra"]["refs"][0]["overwrittenData"];
        assert_eq!(nested["applyWay"], undefined());
        assert_eq!(nested["attributes"]["fearedImmune"], undefined());
        let action = &level["waves"][0]["fragments"][0]["actions"][0]["overwrittenData"];
        assert_eq!(action["viewRadius"], undefined());
        assert!(action.get("attributes").is_none());
    }

    #[test]
    fn attributes_outside_enemy_data_are_left_alone() {
        let mut level = json!({"options": {"attributes": {}}, "tiles": [{"attributes": {}}]});
        assert_eq!(table_for("2.7.01").complete_level(&mut level), 0);
        assert_eq!(level["options"]["attributes"], json!({}));
    }
}
