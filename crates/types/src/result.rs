//! Normalized per-step results.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Terminal status of a step as reported by the engine.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Failure,
    Skipped,
    /// The engine did not report the step, or reported something unrecognized.
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for StepOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_engine(&raw))
    }
}

impl StepOutcome {
    /// Maps an engine-reported outcome string onto the normalized set.
    ///
    /// Matching is case-insensitive and ignores surrounding quotes and whitespace;
    /// anything outside `success`, `failure`, `skipped` becomes [`StepOutcome::Unknown`].
    pub fn from_engine(raw: &str) -> Self {
        let cleaned = raw.trim().trim_matches(|character| character == '"' || character == '\'');
        match cleaned.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "skipped" => Self::Skipped,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

/// One element of the final `results` array.
///
/// `uses` and `run` are serialized as explicit `null` when absent so consumers can rely
/// on every key being present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedStepResult {
    /// Identifier assigned by the compiler, or the engine's key for unregistered steps.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Action reference for action steps.
    #[serde(default)]
    pub uses: Option<String>,
    /// Script body for script steps.
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub outcome: StepOutcome,
    /// Declared outputs flattened to strings.
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

impl NormalizedStepResult {
    /// Creates a record with an unknown outcome and no outputs.
    pub fn unknown(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            uses: None,
            run: None,
            outcome: StepOutcome::Unknown,
            outputs: IndexMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_outcomes_map_onto_normalized_set() {
        assert_eq!(StepOutcome::from_engine("success"), StepOutcome::Success);
        assert_eq!(StepOutcome::from_engine(" Failure "), StepOutcome::Failure);
        assert_eq!(StepOutcome::from_engine("\"skipped\""), StepOutcome::Skipped);
        assert_eq!(StepOutcome::from_engine("cancelled"), StepOutcome::Unknown);
        assert_eq!(StepOutcome::from_engine(""), StepOutcome::Unknown);
    }

    #[test]
    fn result_survives_json_round_trip() {
        let mut result = NormalizedStepResult::unknown("action_0_run", "Echo");
        result.run = Some("echo hi".into());
        result.outcome = StepOutcome::Success;
        result.outputs.insert("x".into(), "1".into());

        let encoded = serde_json::to_string(&result).expect("serialize");
        let decoded: NormalizedStepResult = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, result);
    }

    #[test]
    fn absent_references_serialize_as_null() {
        let result = NormalizedStepResult::unknown("collect_results_step", "collect_results_step");
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["uses"], serde_json::Value::Null);
        assert_eq!(value["run"], serde_json::Value::Null);
        assert_eq!(value["outcome"], "unknown");
        assert_eq!(value["outputs"], serde_json::json!({}));
    }

    #[test]
    fn unrecognized_outcome_deserializes_as_unknown() {
        let result: NormalizedStepResult =
            serde_json::from_str(r#"{"id":"a","name":"A","outcome":"cancelled","outputs":{}}"#).expect("deserialize");
        assert_eq!(result.outcome, StepOutcome::Unknown);
    }
}
