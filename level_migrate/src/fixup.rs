use serde_json::{json, Map, Value};

const BOSSRUSH_PREFIX: &str = "level_bossrush";
const BRCTRL_PREFIX: &str = "trap_091_brctrl#";
const BRCTRL_KEPT_SUFFIX: &str = ":empty";
const RECODR_PREFIX: &str = "trap_090_recodr#";

/// Rewrites a pre-schema level document into the shape the structured level
/// schema accepts. Running it on an already fixed document changes nothing.
pub fn fix_legacy_level(level_id: &str, level: &mut Value) {
    let Some(level) = level.as_object_mut() else {
        return;
    };
    flatten_map_data(level);
    strip_wave_names(level);
    fill_null_routes(level, "routes");
    fill_null_routes(level, "extraRoutes");
    branches_to_records(level);
    if level_id.starts_with(BOSSRUSH_PREFIX) {
        drop_bossrush_actions(level);
    }
}

fn flatten_map_data(level: &mut Map<String, Value>) {
    let Some(map_data) = level.get_mut("mapData").and_then(Value::as_object_mut) else {
        return;
    };
    map_data.remove("width");
    map_data.remove("height");

    let Some(Value::Array(rows)) = map_data.get("map") else {
        return;
    };
    let row_size = rows.len();
    let column_size = rows.first().and_then(Value::as_array).map_or(0, Vec::len);
    let matrix_data: Vec<Value> = rows
        .iter()
        .filter_map(Value::as_array)
        .flat_map(|row| row.iter().cloned())
        .collect();
    map_data.insert(
        "map".to_string(),
        json!({
            "row_size": row_size,
            "column_size": column_size,
            "matrix_data": matrix_data,
        }),
    );
}

fn strip_wave_names(level: &mut Map<String, Value>) {
    let Some(waves) = level.get_mut("waves").and_then(Value::as_array_mut) else {
        return;
    };
    for wave in waves.iter_mut().filter_map(Value::as_object_mut) {
        wave.remove("name");
        if let Some(fragments) = wave.get_mut("fragments").and_then(Value::as_array_mut) {
            for fragment in fragments.iter_mut().filter_map(Value::as_object_mut) {
                fragment.remove("name");
            }
        }
    }
}

fn fill_null_routes(level: &mut Map<String, Value>, field: &str) {
    let Some(routes) = level.get_mut(field).and_then(Value::as_array_mut) else {
        return;
    };
    for route in routes.iter_mut().filter(|route| route.is_null()) {
        *route = Value::Object(Map::new());
    }
}

fn branches_to_records(level: &mut Map<String, Value>) {
    let Some(Value::Object(branches)) = level.get_mut("branches") else {
        return;
    };
    let records: Vec<Value> = std::mem::take(branches)
        .into_iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect();
    level.insert("branches".to_string(), Value::Array(records));
}

fn is_obsolete_action(key: &str) -> bool {
    (key.starts_with(BRCTRL_PREFIX) && key.contains(':') && !key.ends_with(BRCTRL_KEPT_SUFFIX))
        || (key.starts_with(RECODR_PREFIX) && key.contains(':'))
}

fn drop_bossrush_actions(level: &mut Map<String, Value>) {
    let Some(waves) = level.get_mut("waves").and_then(Value::as_array_mut) else {
        return;
    };
    for wave in waves.iter_mut() {
        let Some(fragments) = wave.get_mut("fragments").and_then(Value::as_array_mut) else {
            continue;
        };
        for fragment in fragments.iter_mut() {
            let Some(actions) = fragment.get_mut("actions").and_then(Value::as_array_mut) else {
                continue;
            };
            actions.retain(|action| {
                let key = action.get("key").and_then(Value::as_str).unwrap_or("");
                !is_obsolete_action(key)
            });
        }
    }
}
