//! Raw-context extraction.
//!
//! The trailer step writes the engine's per-step context (keyed by engine step id) to a
//! file. Each registered step is looked up by id; the trailer itself is appended last.
//! Keys the registry does not know, such as setup steps the engine injects, are
//! dropped.

use serde_json::Value as JsonValue;
use stepline_types::{NormalizedStepResult, StepOutcome};
use tracing::{debug, warn};

use super::{Extraction, ExtractionStrategy, RawEngineResult, coerce_outputs, lenient, outcome_field, registered_record};
use crate::descriptor::TRAILER_STEP_ID;
use crate::identity::StepRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawContextStrategy;

impl ExtractionStrategy for RawContextStrategy {
    fn name(&self) -> &'static str {
        "raw-context"
    }

    fn extract(&self, raw: &RawEngineResult<'_>, registry: &StepRegistry) -> Extraction {
        let Some(text) = raw.context else {
            return Extraction::degraded("results context was not produced");
        };
        if text.trim().is_empty() {
            return Extraction::degraded("results context is empty");
        }

        let context = match serde_json::from_str::<JsonValue>(text) {
            Ok(value) => value,
            Err(error) => {
                debug!(%error, "results context is not strict JSON; parsing leniently");
                let parsed = lenient::parse(text);
                if !parsed.issues.is_empty() {
                    warn!(issues = ?parsed.issues, "results context repaired while parsing");
                }
                match parsed.value {
                    Some(value) => value,
                    None => return Extraction::degraded(format!("results context unreadable: {}", parsed.issues.join(", "))),
                }
            }
        };

        let JsonValue::Object(steps) = context else {
            return Extraction::degraded("results context is not a mapping of step ids");
        };

        for key in steps.keys() {
            if key != TRAILER_STEP_ID && !registry.contains(key) {
                debug!(step_id = %key, "ignoring step not in the registry");
            }
        }

        let mut results: Vec<NormalizedStepResult> = registry
            .identities()
            .map(|identity| {
                let entry = steps.get(&identity.id);
                if entry.is_none() {
                    debug!(step_id = %identity.id, "registered step missing from results context");
                }
                let outcome = outcome_field(entry).unwrap_or(StepOutcome::Unknown);
                let outputs = coerce_outputs(entry.and_then(|entry| entry.get("outputs")));
                registered_record(identity, outcome, outputs)
            })
            .collect();

        let trailer = steps.get(TRAILER_STEP_ID);
        results.push(NormalizedStepResult {
            id: TRAILER_STEP_ID.to_string(),
            name: TRAILER_STEP_ID.to_string(),
            uses: None,
            run: None,
            outcome: outcome_field(trailer).unwrap_or(StepOutcome::Success),
            outputs: coerce_outputs(trailer.and_then(|entry| entry.get("outputs"))),
        });

        Extraction::Recovered(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::assign;
    use crate::merge::CanonicalSequence;
    use stepline_types::StepSpec;

    fn registry() -> StepRegistry {
        assign(&CanonicalSequence::new(vec![
            StepSpec::action("actions/checkout@v4"),
            StepSpec::script("exit 1").named("Fail"),
            StepSpec::script("echo later"),
        ]))
        .expect("assign")
    }

    fn run(context: &str) -> Extraction {
        RawContextStrategy.extract(
            &RawEngineResult {
                output: b"",
                context: Some(context),
            },
            &registry(),
        )
    }

    #[test]
    fn joins_engine_context_against_registry() {
        let context = r#"{
  "action_0_actions-checkout": {"outputs": {"ref": "main"}, "outcome": "success", "conclusion": "success"},
  "action_1_run": {"outputs": {}, "outcome": "failure", "conclusion": "failure"},
  "action_2_run": {"outputs": {}, "outcome": "skipped", "conclusion": "skipped"}
}"#;
        let extraction = run(context);
        assert!(!extraction.is_degraded());
        let results = extraction.results();
        assert_eq!(results.len(), 4);

        assert_eq!(results[0].name, "Run actions/checkout@v4");
        assert_eq!(results[0].uses.as_deref(), Some("actions/checkout@v4"));
        assert_eq!(results[0].run, None);
        assert_eq!(results[0].outputs["ref"], "main");

        assert_eq!(results[1].name, "Fail");
        assert_eq!(results[1].run.as_deref(), Some("exit 1"));
        assert_eq!(results[1].outcome, StepOutcome::Failure);
        assert_eq!(results[2].outcome, StepOutcome::Skipped);

        assert_eq!(results[3].id, TRAILER_STEP_ID);
        assert_eq!(results[3].name, TRAILER_STEP_ID);
        assert_eq!(results[3].outcome, StepOutcome::Success);
    }

    #[test]
    fn missing_steps_are_unknown_and_unregistered_keys_dropped() {
        let context = r#"{"pre-setup": {"outcome": "success"}, "action_1_run": {"outcome": "failure"}}"#;
        let results = run(context).into_results();
        let ids: Vec<&str> = results.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["action_0_actions-checkout", "action_1_run", "action_2_run", TRAILER_STEP_ID]);
        assert_eq!(results[0].outcome, StepOutcome::Unknown);
        assert!(results[0].outputs.is_empty());
    }

    #[test]
    fn reported_trailer_outcome_wins() {
        let results = run(r#"{"collect_results_step": {"outcome": "failure", "outputs": {}}}"#).into_results();
        assert_eq!(results.last().map(|record| record.outcome), Some(StepOutcome::Failure));
    }

    #[test]
    fn engine_notation_is_parsed_leniently() {
        let context = "{\n  action_1_run: {\n    outcome: failure\n    outputs: { exit: 1 }\n  }\n  action_2_run: {\n    outcome: 'success',\n";
        let extraction = run(context);
        assert!(!extraction.is_degraded());
        let results = extraction.results();
        assert_eq!(results[1].outcome, StepOutcome::Failure);
        assert_eq!(results[1].outputs["exit"], "1");
        assert_eq!(results[2].outcome, StepOutcome::Success);
    }

    #[test]
    fn odd_fields_fall_back_to_defaults() {
        let context = r#"{"action_0_actions-checkout": {"outcome": 7, "outputs": "text"}, "action_1_run": "flat"}"#;
        let results = run(context).into_results();
        assert_eq!(results[0].outcome, StepOutcome::Unknown);
        assert!(results[0].outputs.is_empty());
        assert_eq!(results[1].outcome, StepOutcome::Unknown);
    }

    #[test]
    fn unusable_context_degrades() {
        for context in ["", "   ", "no structure here", "[1, 2]"] {
            let extraction = run(context);
            assert!(extraction.is_degraded(), "context {context:?}");
            assert!(extraction.results().is_empty());
        }
        let absent = RawContextStrategy.extract(&RawEngineResult::default(), &registry());
        assert_eq!(absent.degraded_reason(), Some("results context was not produced"));
    }
}
