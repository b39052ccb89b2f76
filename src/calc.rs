use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// Canonical scale every raw score is normalized onto.
pub const SCALE_MAX: f64 = 10.0;

/// Cutoff of the bounded search in the perfect-assignment prediction mode.
/// Tiers that need more than this many extra perfect assignments are
/// reported as unreachable with no finite count.
pub const MAX_EXTRA_PERFECT_ASSIGNMENTS: u32 = 20;

/// Weight assumed for assignment labels absent from the weight table,
/// expressed as a percent (100 = 1.0).
pub const DEFAULT_LABEL_WEIGHT_PERCENT: f64 = 100.0;

/// Two-decimal rounding applied only when building the wire report.
/// Internal computation keeps full precision.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRange,
    ScoreExceedsMax,
    MalformedInput,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::ScoreExceedsMax => "score_exceeds_max",
            ErrorKind::MalformedInput => "malformed_input",
        }
    }
}

/// Request-level validation failure. Carries no partial result; the
/// request is rejected as a whole.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CalcError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        kind: ErrorKind,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Raw per-request snapshot of one student's marks, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    #[serde(default)]
    pub assignment_scores: Vec<f64>,
    #[serde(default)]
    pub assignment_labels: Option<Vec<String>>,
    #[serde(default)]
    pub assignment_label_weights: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub test_scores: Vec<f64>,
    #[serde(default)]
    pub test_maxima: Option<Vec<f64>>,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default)]
    pub final_maximum: Option<f64>,
    #[serde(default)]
    pub total_tests_expected: Option<u32>,
}

/// Category weights as percents. Normalization rescales whatever is
/// configured to fractions summing to 1; the all-zero triple falls back
/// to the built-in 25/25/50 split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    pub assignments_percent: f64,
    pub tests_percent: f64,
    pub final_percent: f64,
}

pub const DEFAULT_WEIGHTS: WeightConfig = WeightConfig {
    assignments_percent: 25.0,
    tests_percent: 25.0,
    final_percent: 50.0,
};

impl Default for WeightConfig {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightFractions {
    pub assignments: f64,
    pub tests: f64,
    pub final_exam: f64,
}

impl WeightConfig {
    pub fn fractions(&self) -> Result<WeightFractions, CalcError> {
        let raw = [
            self.assignments_percent,
            self.tests_percent,
            self.final_percent,
        ];
        if raw.iter().any(|w| *w < 0.0) {
            return Err(CalcError::with_details(
                ErrorKind::MalformedInput,
                "category weights must be non-negative",
                json!({ "weights": raw }),
            ));
        }
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return DEFAULT_WEIGHTS.fractions();
        }
        Ok(WeightFractions {
            assignments: self.assignments_percent / total,
            tests: self.tests_percent / total,
            final_exam: self.final_percent / total,
        })
    }
}

/// One row of the tier table. `min_percent` is a fraction of the total
/// possible score, not a 0-100 percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStep {
    pub tier: i64,
    pub min_percent: f64,
}

/// Ordered tier thresholds: strictly increasing in both tier and
/// threshold, floor step at 0 so every percentage classifies.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    steps: Vec<TierStep>,
}

impl Default for TierTable {
    fn default() -> Self {
        TierTable {
            steps: vec![
                TierStep { tier: 2, min_percent: 0.0 },
                TierStep { tier: 3, min_percent: 0.40 },
                TierStep { tier: 4, min_percent: 0.65 },
                TierStep { tier: 5, min_percent: 0.85 },
            ],
        }
    }
}

impl TierTable {
    pub fn new(mut steps: Vec<TierStep>) -> Result<Self, CalcError> {
        if steps.is_empty() {
            return Err(CalcError::new(
                ErrorKind::MalformedInput,
                "tier table must not be empty",
            ));
        }
        steps.sort_by_key(|s| s.tier);
        if steps[0].min_percent != 0.0 {
            return Err(CalcError::new(
                ErrorKind::MalformedInput,
                "lowest tier must have threshold 0",
            ));
        }
        for pair in steps.windows(2) {
            if pair[1].tier == pair[0].tier {
                return Err(CalcError::with_details(
                    ErrorKind::MalformedInput,
                    "duplicate tier in tier table",
                    json!({ "tier": pair[0].tier }),
                ));
            }
            if pair[1].min_percent <= pair[0].min_percent {
                return Err(CalcError::new(
                    ErrorKind::MalformedInput,
                    "tier thresholds must be strictly increasing",
                ));
            }
        }
        if steps.iter().any(|s| s.min_percent < 0.0 || s.min_percent >= 1.0) {
            return Err(CalcError::new(
                ErrorKind::MalformedInput,
                "tier thresholds must lie in [0, 1)",
            ));
        }
        Ok(TierTable { steps })
    }

    /// Highest tier whose threshold is met; ties break toward the higher
    /// tier ("at least" semantics).
    pub fn classify(&self, percent: f64) -> i64 {
        let mut current = self.steps[0].tier;
        for step in &self.steps {
            if percent >= step.min_percent {
                current = step.tier;
            }
        }
        current
    }

    pub fn top_tier(&self) -> i64 {
        self.steps[self.steps.len() - 1].tier
    }

    pub fn steps_above(&self, tier: i64) -> impl Iterator<Item = &TierStep> {
        self.steps.iter().filter(move |s| s.tier > tier)
    }
}

/// Explicit configuration for one prediction run. Passed in rather than
/// read from globals so alternate tables stay testable.
#[derive(Debug, Clone, Default)]
pub struct PredictConfig {
    pub weights: WeightConfig,
    pub tiers: TierTable,
}

/// Per-category view of a grade sheet after normalization onto the
/// canonical scale. A category with no items has no average and is
/// excluded from the weighted sum and the weight-used accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSheet {
    pub assignment_scores: Vec<f64>,
    /// Resolved per-item weight percents when the type-weighted averaging
    /// policy is in effect; `None` means simple averaging.
    pub assignment_weights: Option<Vec<f64>>,
    pub assignment_avg: Option<f64>,
    pub test_avg: Option<f64>,
    pub final_score: Option<f64>,
    pub completed_tests: u32,
    pub missing_tests: u32,
}

fn normalize_one(raw: f64, maximum: Option<f64>) -> Result<f64, CalcError> {
    let value = match maximum {
        Some(max) if max > 0.0 => {
            if raw > max {
                return Err(CalcError::with_details(
                    ErrorKind::ScoreExceedsMax,
                    "score exceeds its declared maximum",
                    json!({ "score": raw, "maximum": max }),
                ));
            }
            raw / max * SCALE_MAX
        }
        // No usable maximum: assume the canonical scale, clamp overshoot.
        _ => raw.min(SCALE_MAX),
    };
    if value < 0.0 {
        return Err(CalcError::with_details(
            ErrorKind::InvalidRange,
            "score is below 0 on the 0-10 scale",
            json!({ "score": raw }),
        ));
    }
    Ok(value)
}

/// Rescales raw scores onto the canonical scale. Maxima of the wrong
/// length are ignored rather than rejected (permissive policy).
pub fn normalize_scores(raw: &[f64], maxima: Option<&[f64]>) -> Result<Vec<f64>, CalcError> {
    let maxima = maxima.filter(|m| m.len() == raw.len());
    raw.iter()
        .enumerate()
        .map(|(i, &score)| normalize_one(score, maxima.map(|m| m[i])))
        .collect()
}

/// Mean of assignment scores; type-weighted when per-item weights are
/// resolved and carry any weight, simple otherwise. `None` for an empty
/// category.
pub fn assignment_average(scores: &[f64], weights: Option<&[f64]>) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    if let Some(weights) = weights {
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            let sum: f64 = scores.iter().zip(weights).map(|(s, w)| s * w).sum();
            return Some(sum / total);
        }
        // Zero total weight: fall through to the simple mean.
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Stage 1: validate ranges and map every category onto the 0-10 scale.
pub fn normalize_sheet(sheet: &GradeSheet) -> Result<NormalizedSheet, CalcError> {
    for &grade in &sheet.assignment_scores {
        if !(0.0..=SCALE_MAX).contains(&grade) {
            return Err(CalcError::with_details(
                ErrorKind::InvalidRange,
                "all grades must be between 0 and 10",
                json!({ "score": grade }),
            ));
        }
    }

    // The type-weighted policy needs labels matching the score count and a
    // weight table; anything else silently degrades to simple averaging.
    let assignment_weights = match (&sheet.assignment_labels, &sheet.assignment_label_weights) {
        (Some(labels), Some(table)) if labels.len() == sheet.assignment_scores.len() => Some(
            labels
                .iter()
                .map(|label| {
                    table
                        .get(label)
                        .copied()
                        .unwrap_or(DEFAULT_LABEL_WEIGHT_PERCENT)
                })
                .collect::<Vec<f64>>(),
        ),
        _ => None,
    };

    let assignment_avg =
        assignment_average(&sheet.assignment_scores, assignment_weights.as_deref());

    let tests = normalize_scores(&sheet.test_scores, sheet.test_maxima.as_deref())?;
    let test_avg = if tests.is_empty() {
        None
    } else {
        Some(tests.iter().sum::<f64>() / tests.len() as f64)
    };

    let final_score = sheet
        .final_score
        .map(|raw| normalize_one(raw, sheet.final_maximum))
        .transpose()?;

    let completed_tests = sheet.test_scores.len() as u32;
    let expected_tests = sheet.total_tests_expected.unwrap_or(completed_tests);
    let missing_tests = expected_tests.saturating_sub(completed_tests);

    Ok(NormalizedSheet {
        assignment_scores: sheet.assignment_scores.clone(),
        assignment_weights,
        assignment_avg,
        test_avg,
        final_score,
        completed_tests,
        missing_tests,
    })
}

/// Current weighted standing. `current_percent` is a fraction in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing {
    pub current_score: f64,
    pub current_percent: f64,
    pub weight_used: f64,
}

/// Stage 2: weighted sum over the categories that have data. Absent
/// categories contribute neither score nor weight.
pub fn aggregate(sheet: &NormalizedSheet, weights: &WeightFractions) -> Standing {
    let mut score = 0.0;
    let mut used = 0.0;
    if let Some(avg) = sheet.assignment_avg {
        score += avg * weights.assignments;
        used += weights.assignments;
    }
    if let Some(avg) = sheet.test_avg {
        score += avg * weights.tests;
        used += weights.tests;
    }
    if let Some(final_score) = sheet.final_score {
        score += final_score * weights.final_exam;
        used += weights.final_exam;
    }
    Standing {
        current_score: score,
        current_percent: score / SCALE_MAX,
        weight_used: used,
    }
}

/// Outcome for one target tier. The two response shapes are a closed
/// variant so consumers must handle both modes explicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PredictionOutcome {
    /// Score required on the outstanding assessments, on their 0-10
    /// scale. Absent when the outstanding work carries no configured
    /// weight and so cannot move the total.
    #[serde(rename_all = "camelCase")]
    RemainingWork {
        #[serde(skip_serializing_if = "Option::is_none")]
        needed_score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        needed_percent: Option<f64>,
        missing_weight: f64,
        missing_tests: u32,
        final_missing: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        needed_final_score: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        needed_final_percent: Option<f64>,
        reachable: bool,
    },
    /// Count of additional perfect assignments; `None` past the bounded
    /// search cutoff.
    #[serde(rename_all = "camelCase")]
    PerfectAssignments {
        #[serde(skip_serializing_if = "Option::is_none")]
        needed_count: Option<u32>,
        reachable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPrediction {
    pub target_tier: i64,
    #[serde(flatten)]
    pub outcome: PredictionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionReport {
    pub current_tier: i64,
    /// 0-100, rounded to two decimals at this boundary.
    pub current_percent: f64,
    pub terminal: bool,
    pub predictions: Vec<TierPrediction>,
}

fn remaining_work_outcome(
    sheet: &NormalizedSheet,
    standing: &Standing,
    weights: &WeightFractions,
    target: &TierStep,
) -> PredictionOutcome {
    let final_missing = sheet.final_score.is_none();
    let mut missing_weight = 0.0;
    if sheet.missing_tests > 0 {
        missing_weight += weights.tests;
    }
    if final_missing {
        missing_weight += weights.final_exam;
    }

    let target_score = target.min_percent * SCALE_MAX;

    if missing_weight <= 0.0 {
        // Outstanding work with zero configured weight cannot move the
        // total; the tier is either already secured or out of reach.
        return PredictionOutcome::RemainingWork {
            needed_score: None,
            needed_percent: None,
            missing_weight: 0.0,
            missing_tests: sheet.missing_tests,
            final_missing,
            needed_final_score: None,
            needed_final_percent: None,
            reachable: standing.current_score >= target_score,
        };
    }

    let mut needed = (target_score - standing.current_score) / missing_weight;
    let reachable = needed <= SCALE_MAX;
    if needed < 0.0 {
        needed = 0.0;
    }

    // When only the final is outstanding, also report the requirement
    // isolated to the final's own weight.
    let (needed_final_score, needed_final_percent) =
        if final_missing && sheet.missing_tests == 0 && weights.final_exam > 0.0 {
            let mut needed_final = (target_score - standing.current_score) / weights.final_exam;
            if needed_final < 0.0 {
                needed_final = 0.0;
            }
            (
                Some(round2(needed_final)),
                Some(round2(needed_final / SCALE_MAX * 100.0)),
            )
        } else {
            (None, None)
        };

    PredictionOutcome::RemainingWork {
        needed_score: Some(round2(needed)),
        needed_percent: Some(round2(needed / SCALE_MAX * 100.0)),
        missing_weight: round2(missing_weight),
        missing_tests: sheet.missing_tests,
        final_missing,
        needed_final_score,
        needed_final_percent,
        reachable,
    }
}

/// Bounded search for the smallest number of appended perfect assignments
/// that lifts the overall score to `target_score`. Appended items inherit
/// the first existing label's weight; with no assignments yet the
/// simulation is unweighted.
fn extra_perfect_needed(
    sheet: &NormalizedSheet,
    assignment_weight: f64,
    fixed_contribution: f64,
    target_score: f64,
) -> Option<u32> {
    let (base_sum, base_denom, new_weight) = match &sheet.assignment_weights {
        Some(weights) if !weights.is_empty() && weights.iter().sum::<f64>() > 0.0 => {
            let sum: f64 = sheet
                .assignment_scores
                .iter()
                .zip(weights)
                .map(|(s, w)| s * w)
                .sum();
            (sum, weights.iter().sum::<f64>(), weights[0])
        }
        _ => (
            sheet.assignment_scores.iter().sum::<f64>(),
            sheet.assignment_scores.len() as f64,
            1.0,
        ),
    };

    for n in 0..=MAX_EXTRA_PERFECT_ASSIGNMENTS {
        let denom = base_denom + f64::from(n) * new_weight;
        let avg = if denom > 0.0 {
            (base_sum + SCALE_MAX * f64::from(n) * new_weight) / denom
        } else {
            SCALE_MAX
        };
        if avg * assignment_weight + fixed_contribution >= target_score {
            return Some(n);
        }
    }
    None
}

/// Stage 3: classify the standing and project every tier above it.
pub fn predict(
    sheet: &NormalizedSheet,
    standing: &Standing,
    weights: &WeightFractions,
    tiers: &TierTable,
) -> PredictionReport {
    let current_tier = tiers.classify(standing.current_percent);
    let current_percent = round2(standing.current_percent * 100.0);

    if current_tier == tiers.top_tier() {
        return PredictionReport {
            current_tier,
            current_percent,
            terminal: true,
            predictions: Vec::new(),
        };
    }

    let has_final = sheet.final_score.is_some();
    let remaining_mode = sheet.missing_tests > 0 || !has_final;

    let predictions = tiers
        .steps_above(current_tier)
        .map(|step| {
            let outcome = if remaining_mode {
                remaining_work_outcome(sheet, standing, weights, step)
            } else {
                let target_score = step.min_percent * SCALE_MAX;
                if standing.current_score >= target_score {
                    PredictionOutcome::PerfectAssignments {
                        needed_count: Some(0),
                        reachable: true,
                    }
                } else {
                    let mut fixed = 0.0;
                    if let Some(avg) = sheet.test_avg {
                        fixed += avg * weights.tests;
                    }
                    if let Some(final_score) = sheet.final_score {
                        fixed += final_score * weights.final_exam;
                    }
                    let found =
                        extra_perfect_needed(sheet, weights.assignments, fixed, target_score);
                    PredictionOutcome::PerfectAssignments {
                        needed_count: found,
                        reachable: found.is_some(),
                    }
                }
            };
            TierPrediction {
                target_tier: step.tier,
                outcome,
            }
        })
        .collect();

    PredictionReport {
        current_tier,
        current_percent,
        terminal: false,
        predictions,
    }
}

/// Full pipeline: normalize, aggregate, predict.
pub fn calculate_prediction(
    sheet: &GradeSheet,
    config: &PredictConfig,
) -> Result<PredictionReport, CalcError> {
    let weights = config.weights.fractions()?;
    let normalized = normalize_sheet(sheet)?;
    let standing = aggregate(&normalized, &weights);
    Ok(predict(&normalized, &standing, &weights, &config.tiers))
}
