use asset_codec::version::is_before;
use asset_codec::{
    level_chain, ClientVersion, CodecChain, CodecContext, Document, Payload, Transform,
    LEVEL_SCHEMA,
};
use tracing::{debug, info};

use crate::completion::completion_table;
use crate::fixup::fix_legacy_level;
use crate::MigrateError;

/// Origin clients before this version store levels as bson or encrypted json
/// instead of the structured level schema.
pub const LEGACY_LEVEL_THRESHOLD: &str = "2.0.40";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Branch {
    Legacy,
    Modern,
}

impl Branch {
    pub fn for_origin(origin: &ClientVersion) -> Self {
        if is_before(origin, LEGACY_LEVEL_THRESHOLD) {
            Branch::Legacy
        } else {
            Branch::Modern
        }
    }
}

/// Re-encodes one level payload from the `origin` client's format into the
/// `destination` client's level schema, then completes optional fields.
pub fn migrate_level(
    level_id: &str,
    origin: &ClientVersion,
    destination: &ClientVersion,
    res_version: &str,
    data: Vec<u8>,
    ctx: &CodecContext<'_>,
) -> Result<Vec<u8>, MigrateError> {
    let table = completion_table(destination)?;
    let branch = Branch::for_origin(origin);
    info!(
        level_id,
        origin = %origin,
        destination = %destination,
        ?branch,
        "migrating level"
    );

    let migrated = match branch {
        Branch::Legacy => migrate_legacy(level_id, destination, res_version, data, ctx)?,
        Branch::Modern => {
            let label = format!("{}_{}_migrate", level_id, res_version);
            let document = CodecChain::new(vec![
                Transform::Header,
                Transform::schema(origin, LEVEL_SCHEMA),
                Transform::dump(label.clone()),
            ])
            .decode(data, ctx)?;
            destination_chain(destination, label).encode(document, ctx)?
        }
    };

    let completed = level_chain(level_id, destination, res_version).apply(migrated, ctx, |payload| {
        let mut level = payload.into_document()?;
        let filled = table.complete_level(&mut level);
        debug!(level_id, filled, revision = table.revision, "completed optional fields");
        Ok(Payload::Document(level))
    })?;
    Ok(completed)
}

fn destination_chain(destination: &ClientVersion, label: String) -> CodecChain {
    CodecChain::new(vec![
        Transform::Header,
        Transform::schema(destination, LEVEL_SCHEMA),
        Transform::dump(label),
    ])
}

fn migrate_legacy(
    level_id: &str,
    destination: &ClientVersion,
    res_version: &str,
    data: Vec<u8>,
    ctx: &CodecContext<'_>,
) -> Result<Vec<u8>, MigrateError> {
    let label = format!("{}_{}_migrate_json", level_id, res_version);
    let dump = Transform::dump(label.clone());

    let level = decode_legacy(level_id, data)?;
    let mut level = dump.decode(Payload::Document(level), ctx)?.into_document()?;
    fix_legacy_level(level_id, &mut level);
    Ok(destination_chain(destination, label).encode(Payload::Document(level), ctx)?)
}

/// Tries bson behind the fixed header first, then encrypted json over the
/// whole payload. Any failure of the first attempt selects the second.
fn decode_legacy(level_id: &str, data: Vec<u8>) -> Result<Document, MigrateError> {
    // Neither chain has a schema step, so the context's codec is never used.
    let ctx = CodecContext::new(&asset_codec::JsonSchemaCodec);
    let bson_chain = CodecChain::new(vec![Transform::Header, Transform::Bson]);
    let bson = match bson_chain
        .decode(data.clone(), &ctx)
        .and_then(Payload::into_document)
    {
        Ok(level) => return Ok(level),
        Err(err) => err,
    };
    debug!(level_id, error = %bson, "legacy level is not bson");

    let json_chain = CodecChain::new(vec![Transform::Crypt, Transform::Utf8, Transform::Json]);
    json_chain
        .decode(data, &ctx)
        .and_then(Payload::into_document)
        .map_err(|json| MigrateError::LegacyDecode {
            level_id: level_id.to_string(),
            bson,
            json,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_codec::crypt::encrypt_data;
    use asset_codec::header::{add_header, remove_header};
    use asset_codec::JsonSchemaCodec;
    use serde_json::{json, Value};

    fn version(raw: &str) -> ClientVersion {
        ClientVersion::parse(raw).expect("version ok")
    }

    fn ctx() -> CodecContext<'static> {
        CodecContext::new(&JsonSchemaCodec)
    }

    fn decode_output(bytes: &[u8]) -> Value {
        let body = remove_header(bytes).expect("header ok");
        serde_json::from_slice(&body).expect("json ok")
    }

    #[test]
    fn branch_threshold() {
        assert_eq!(Branch::for_origin(&version("2.0.01")), Branch::Legacy);
        assert_eq!(Branch::for_origin(&version("2.0.40")), Branch::Modern);
        assert_eq!(Branch::for_origin(&version("2.6.01")), Branch::Modern);
    }

    #[test]
    fn modern_branch_transcodes_and_completes() {
        let level = json!({
            "options": {"maxLifePoint": 3},
            "enemyDbRefs": [{"id": "enemy_1007_slime", "overwrittenData": {"attributes": {}}}]
        });
        let input = add_header(&serde_json::to_vec(&level).expect("encode ok"));
        let output = migrate_level(
            "level_act12side_01",
            &version("2.6.01"),
            &version("2.6.91"),
            "res",
            input,
            &ctx(),
        )
        .expect("migrate ok");

        let migrated = decode_output(&output);
        assert_eq!(migrated["options"], json!({"maxLifePoint": 3}));
        let enemy = &migrated["enemyDbRefs"][0]["overwrittenData"];
        assert_eq!(enemy["applyWay"], json!({"m_defined": false}));
        assert_eq!(enemy["attributes"]["fearedImmune"], json!({"m_defined": false}));
    }

    #[test]
    fn legacy_bson_level_is_fixed_up() {
        let level = bson::doc! {
            "mapData": {"width": 2, "height": 1, "map": [[0, 1]]},
            "branches": {"b": {"phases": []}},
        };
        let mut raw = Vec::new();
        level.to_writer(&mut raw).expect("bson ok");
        let output = migrate_level(
            "level_camp_03",
            &version("1.9.01"),
            &version("2.6.91"),
            "res",
            add_header(&raw),
            &ctx(),
        )
        .expect("migrate ok");

        let migrated = decode_output(&output);
        assert_eq!(
            migrated["mapData"],
            json!({"map": {"row_size": 1, "column_size": 2, "matrix_data": [0, 1]}})
        );
        assert_eq!(migrated["branches"], json!([{"key": "b", "value": {"phases": []}}]));
    }

    #[test]
    fn legacy_encrypted_json_falls_back() {
        let level = json!({
            "routes": [null],
            "waves": [{"name": "w", "fragments": []}],
            "enemyDbRefs": []
        });
        let input = encrypt_data(&serde_json::to_vec(&level).expect("encode ok"));
        let output = migrate_level(
            "level_main_01-07",
            &version("1.9.01"),
            &version("2.5.04"),
            "res",
            input,
            &ctx(),
        )
        .expect("migrate ok");

        let migrated = decode_output(&output);
        assert_eq!(migrated["routes"], json!([{}]));
        assert_eq!(migrated["waves"], json!([{"fragments": []}]));
    }

    #[test]
    fn undecodable_legacy_level_reports_both_attempts() {
        let err = migrate_level(
            "level_main_01-07",
            &version("1.9.01"),
            &version("2.6.91"),
            "res",
            vec![7u8; 40],
            &ctx(),
        )
        .expect_err("must fail");
        assert!(matches!(err, MigrateError::LegacyDecode { .. }));
    }

    #[test]
    fn unknown_destination_revision_is_schema_error() {
        let err = migrate_level(
            "level_main_01-07",
            &version("2.6.01"),
            &version("2.6.92"),
            "res",
            add_header(b"{}"),
            &ctx(),
        )
        .expect_err("must fail");
        assert!(matches!(err, MigrateError::Schema(_)));
    }
}
