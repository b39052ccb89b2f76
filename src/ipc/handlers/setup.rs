use crate::db;
use crate::i18n::Locale;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Prediction,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "prediction" => Some(Self::Prediction),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Prediction => "setup.prediction",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Prediction => json!({
            "weightAssignmentsPercent": 25.0,
            "weightTestsPercent": 25.0,
            "weightFinalPercent": 50.0,
            "locale": "en"
        }),
    }
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Prediction => match k.as_str() {
                "weightAssignmentsPercent" | "weightTestsPercent" | "weightFinalPercent" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                "locale" => {
                    let s = v.as_str().ok_or_else(|| format!("{} must be string", k))?;
                    if !Locale::is_known_tag(s) {
                        return Err("locale must be one of: en, kk, ru".into());
                    }
                    obj.insert(k.clone(), Value::String(Locale::from_tag(s).tag().to_string()));
                }
                _ => return Err(format!("unknown prediction field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        return Ok(saved);
    }
    Ok(default_section(section))
}

/// Stored prediction defaults, or the built-in ones before a workspace
/// is selected. Request parameters always override these.
pub fn prediction_defaults(state: &AppState) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return default_section(SetupSection::Prediction);
    };
    load_section(conn, SetupSection::Prediction)
        .unwrap_or_else(|_| default_section(SetupSection::Prediction))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let prediction = match load_section(conn, SetupSection::Prediction) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "prediction": prediction }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
