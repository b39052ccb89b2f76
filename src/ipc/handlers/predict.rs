use crate::calc::{self, ErrorKind, GradeSheet, PredictConfig, TierStep, TierTable, WeightConfig};
use crate::i18n::{self, Locale, MessageKey};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::{json, Value};

/// Wire parameters of `predict.calculate`: the grade sheet plus the
/// per-request overrides for weights, locale and tier table.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalculateParams {
    #[serde(flatten)]
    sheet: GradeSheet,
    weight_assignments_percent: Option<f64>,
    weight_tests_percent: Option<f64>,
    weight_final_percent: Option<f64>,
    locale: Option<String>,
    tiers: Option<Vec<TierStep>>,
}

fn default_weight(defaults: &Value, key: &str, fallback: f64) -> f64 {
    defaults.get(key).and_then(|v| v.as_f64()).unwrap_or(fallback)
}

/// Localized display note per prediction, mirroring the reachable /
/// already-reached tags the caller renders next to each target tier.
fn annotate_prediction(prediction: &mut Value, locale: Locale) {
    let Some(obj) = prediction.as_object_mut() else {
        return;
    };
    let already_reached = obj.get("mode").and_then(|v| v.as_str()) == Some("perfectAssignments")
        && obj.get("neededCount").and_then(|v| v.as_u64()) == Some(0);
    let key = if already_reached {
        MessageKey::AlreadyReached
    } else if obj.get("reachable").and_then(|v| v.as_bool()).unwrap_or(false) {
        MessageKey::Reachable
    } else {
        MessageKey::NotReachable
    };
    obj.insert(
        "note".to_string(),
        Value::String(i18n::text(key, locale).to_string()),
    );
}

fn calc_err(id: &str, e: &calc::CalcError, locale: Locale) -> Value {
    let message = match e.kind {
        ErrorKind::InvalidRange => i18n::text(MessageKey::InvalidGrades, locale),
        ErrorKind::ScoreExceedsMax => i18n::text(MessageKey::ScoreExceedsMax, locale),
        ErrorKind::MalformedInput => i18n::text(MessageKey::MalformedInput, locale),
    };
    err(id, e.kind.code(), message, e.details.clone())
}

fn handle_calculate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };

    // The locale is resolved before full parsing so even rejections for
    // malformed sheets come back in the caller's language.
    let requested_locale = raw
        .get("locale")
        .and_then(|v| v.as_str())
        .map(Locale::from_tag);

    let defaults = setup::prediction_defaults(state);
    let default_locale = defaults
        .get("locale")
        .and_then(|v| v.as_str())
        .map(Locale::from_tag)
        .unwrap_or_default();
    let locale = requested_locale.unwrap_or(default_locale);

    if !raw.is_object() {
        return err(
            &req.id,
            ErrorKind::MalformedInput.code(),
            i18n::text(MessageKey::InvalidRequest, locale),
            None,
        );
    }

    let params: CalculateParams = match serde_json::from_value(raw) {
        Ok(p) => p,
        Err(e) => {
            return err(
                &req.id,
                ErrorKind::MalformedInput.code(),
                i18n::text(MessageKey::MalformedInput, locale),
                Some(json!({ "parse": e.to_string() })),
            );
        }
    };

    let weights = WeightConfig {
        assignments_percent: params
            .weight_assignments_percent
            .unwrap_or_else(|| default_weight(&defaults, "weightAssignmentsPercent", 25.0)),
        tests_percent: params
            .weight_tests_percent
            .unwrap_or_else(|| default_weight(&defaults, "weightTestsPercent", 25.0)),
        final_percent: params
            .weight_final_percent
            .unwrap_or_else(|| default_weight(&defaults, "weightFinalPercent", 50.0)),
    };

    let tiers = match params.tiers {
        Some(steps) => match TierTable::new(steps) {
            Ok(table) => table,
            Err(e) => return calc_err(&req.id, &e, locale),
        },
        None => TierTable::default(),
    };

    let config = PredictConfig { weights, tiers };
    match calc::calculate_prediction(&params.sheet, &config) {
        Ok(report) => {
            let message_key = if report.terminal {
                MessageKey::AlreadyHighest
            } else {
                match report.predictions.first().map(|p| &p.outcome) {
                    Some(calc::PredictionOutcome::PerfectAssignments { .. }) => {
                        MessageKey::PredictionsAssignments
                    }
                    _ => MessageKey::PredictionsRemaining,
                }
            };
            let mut body = serde_json::to_value(&report).unwrap_or_else(|_| json!({}));
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "message".to_string(),
                    Value::String(i18n::text(message_key, locale).to_string()),
                );
                obj.insert("locale".to_string(), Value::String(locale.tag().to_string()));
                if let Some(predictions) =
                    obj.get_mut("predictions").and_then(|v| v.as_array_mut())
                {
                    for prediction in predictions {
                        annotate_prediction(prediction, locale);
                    }
                }
            }
            ok(&req.id, body)
        }
        Err(e) => calc_err(&req.id, &e, locale),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "predict.calculate" => Some(handle_calculate(state, req)),
        _ => None,
    }
}
