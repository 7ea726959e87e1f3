//! Result extraction and normalization.
//!
//! The engine's textual output is not a stable contract, so every format-specific
//! concern lives behind [`ExtractionStrategy`]. Strategies are tried in order until one
//! recovers a result set; extraction as a whole never fails, it degrades:
//!
//! - [`RawContextStrategy`] reads the step context the trailer step dumped to disk
//! - [`DirectEmissionStrategy`] scans the captured output for a finished JSON array
//!
//! When every strategy degrades, the best partial result (often empty) is returned
//! together with the reasons.

pub mod context;
pub mod direct;
pub mod lenient;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use stepline_types::{NormalizedStepResult, StepIdentity, StepOutcome};
use tracing::debug;

pub use context::RawContextStrategy;
pub use direct::DirectEmissionStrategy;

use crate::identity::StepRegistry;

/// What the engine left behind after a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEngineResult<'a> {
    /// Captured combined output of the engine process.
    pub output: &'a [u8],
    /// Step context written by the trailer step, when it was produced.
    pub context: Option<&'a str>,
}

/// Outcome of extraction: a recovered result set, or a degraded one with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Recovered(Vec<NormalizedStepResult>),
    Degraded {
        results: Vec<NormalizedStepResult>,
        reason: String,
    },
}

impl Extraction {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            results: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn results(&self) -> &[NormalizedStepResult] {
        match self {
            Self::Recovered(results) | Self::Degraded { results, .. } => results,
        }
    }

    pub fn into_results(self) -> Vec<NormalizedStepResult> {
        match self {
            Self::Recovered(results) | Self::Degraded { results, .. } => results,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Self::Recovered(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// A way of turning raw engine output into normalized results.
///
/// Implementations must be total: malformed input yields [`Extraction::Degraded`],
/// never a panic.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;

    fn extract(&self, raw: &RawEngineResult<'_>, registry: &StepRegistry) -> Extraction;
}

/// Runs the default strategy chain: raw context first, then direct emission.
pub fn extract(raw: &RawEngineResult<'_>, registry: &StepRegistry) -> Extraction {
    extract_with(&[&RawContextStrategy, &DirectEmissionStrategy], raw, registry)
}

/// Runs `strategies` in order and returns the first recovered result set.
pub fn extract_with(
    strategies: &[&dyn ExtractionStrategy],
    raw: &RawEngineResult<'_>,
    registry: &StepRegistry,
) -> Extraction {
    let mut reasons = Vec::with_capacity(strategies.len());
    let mut best_partial = Vec::new();

    for strategy in strategies {
        match strategy.extract(raw, registry) {
            Extraction::Recovered(results) => {
                debug!(strategy = strategy.name(), result_count = results.len(), "results recovered");
                return Extraction::Recovered(results);
            }
            Extraction::Degraded { results, reason } => {
                debug!(strategy = strategy.name(), %reason, "extraction strategy degraded");
                if best_partial.is_empty() {
                    best_partial = results;
                }
                reasons.push(format!("{}: {reason}", strategy.name()));
            }
        }
    }

    let reason = if reasons.is_empty() {
        "no extraction strategy configured".to_string()
    } else {
        reasons.join("; ")
    };
    Extraction::Degraded {
        results: best_partial,
        reason,
    }
}

/// Flattens a step's `outputs` value into a string-to-string mapping.
///
/// Strings are kept, `null` becomes an empty string, other scalars are rendered, and
/// nested values become compact JSON. Anything other than an object yields an empty map.
pub fn coerce_outputs(value: Option<&JsonValue>) -> IndexMap<String, String> {
    let Some(JsonValue::Object(members)) = value else {
        if let Some(other) = value.filter(|value| !value.is_null()) {
            debug!(outputs = %other, "outputs are not a mapping; using empty outputs");
        }
        return IndexMap::new();
    };
    members
        .iter()
        .map(|(key, value)| {
            let text = match value {
                JsonValue::String(text) => text.clone(),
                JsonValue::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// Reads an `outcome` field, defaulting to `unknown` when absent or not textual.
pub(crate) fn outcome_field(entry: Option<&JsonValue>) -> Option<StepOutcome> {
    entry?.get("outcome")?.as_str().map(StepOutcome::from_engine)
}

/// Builds the record for a registered step.
pub(crate) fn registered_record(
    identity: &StepIdentity,
    outcome: StepOutcome,
    outputs: IndexMap<String, String>,
) -> NormalizedStepResult {
    NormalizedStepResult {
        id: identity.id.clone(),
        name: identity.display_name.clone(),
        uses: identity.reference.clone(),
        run: identity.script.clone(),
        outcome,
        outputs,
    }
}
