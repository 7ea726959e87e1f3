//! Direct-emission extraction.
//!
//! Some trailer variants compute the finished result array themselves and print it as
//! a single JSON line. The captured output is scanned line by line; the engine prefixes
//! step output with `[workflow/job]   | `, so the text after the first `| ` is tried
//! as well. The first array of objects that names at least one known step is used.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use stepline_types::{NormalizedStepResult, StepOutcome};
use tracing::debug;

use super::{Extraction, ExtractionStrategy, RawEngineResult, coerce_outputs, outcome_field, registered_record};
use crate::descriptor::{TRAILER_STEP_ID, TRAILER_STEP_NAME};
use crate::identity::StepRegistry;

const ENGINE_LINE_PREFIX: &str = "| ";

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectEmissionStrategy;

struct EmittedRecord {
    outcome: Option<StepOutcome>,
    outputs: IndexMap<String, String>,
}

impl ExtractionStrategy for DirectEmissionStrategy {
    fn name(&self) -> &'static str {
        "direct-emission"
    }

    fn extract(&self, raw: &RawEngineResult<'_>, registry: &StepRegistry) -> Extraction {
        let text = String::from_utf8_lossy(raw.output);
        for (line_number, line) in text.lines().enumerate() {
            for candidate in candidates(line) {
                let Some(records) = parse_records(candidate) else {
                    continue;
                };
                if let Some(results) = join(records, registry) {
                    debug!(line_number, result_count = results.len(), "result array found in engine output");
                    return Extraction::Recovered(results);
                }
            }
        }
        Extraction::degraded("no JSON array of step results found in engine output")
    }
}

fn candidates(line: &str) -> impl Iterator<Item = &str> {
    let trimmed = line.trim();
    let prefixed = trimmed
        .split_once(ENGINE_LINE_PREFIX)
        .map(|(_, rest)| rest.trim())
        .filter(|rest| *rest != trimmed);
    std::iter::once(trimmed)
        .chain(prefixed)
        .filter(|candidate| candidate.starts_with('['))
}

/// Parses a line as a non-empty JSON array whose elements are all objects.
fn parse_records(candidate: &str) -> Option<Vec<JsonValue>> {
    match serde_json::from_str::<JsonValue>(candidate).ok()? {
        JsonValue::Array(items) if !items.is_empty() && items.iter().all(JsonValue::is_object) => Some(items),
        _ => None,
    }
}

/// Orders emitted records by the registry, or `None` when no record names a known step.
fn join(records: Vec<JsonValue>, registry: &StepRegistry) -> Option<Vec<NormalizedStepResult>> {
    let mut by_id: IndexMap<String, EmittedRecord> = IndexMap::new();
    for record in &records {
        let Some(id) = record_id(record, registry) else {
            debug!(record = %record, "ignoring emitted record for an unknown step");
            continue;
        };
        by_id.entry(id).or_insert_with(|| EmittedRecord {
            outcome: outcome_field(Some(record)),
            outputs: coerce_outputs(record.get("outputs")),
        });
    }
    if by_id.is_empty() {
        return None;
    }

    let mut results: Vec<NormalizedStepResult> = registry
        .identities()
        .map(|identity| match by_id.shift_remove(&identity.id) {
            Some(record) => registered_record(identity, record.outcome.unwrap_or_default(), record.outputs),
            None => registered_record(identity, StepOutcome::Unknown, IndexMap::new()),
        })
        .collect();
    if let Some(trailer) = by_id.shift_remove(TRAILER_STEP_ID) {
        results.push(NormalizedStepResult {
            id: TRAILER_STEP_ID.to_string(),
            name: TRAILER_STEP_ID.to_string(),
            uses: None,
            run: None,
            outcome: trailer.outcome.unwrap_or(StepOutcome::Success),
            outputs: trailer.outputs,
        });
    }
    Some(results)
}

/// Resolves the step a record refers to, by `id` or else by its display name.
fn record_id(record: &JsonValue, registry: &StepRegistry) -> Option<String> {
    let text_field = |field: &str| record.get(field).and_then(JsonValue::as_str).map(str::trim);

    if let Some(id) = text_field("id").filter(|id| !id.is_empty()) {
        return (id == TRAILER_STEP_ID || registry.contains(id)).then(|| id.to_string());
    }
    let name = text_field("name").filter(|name| !name.is_empty())?;
    if name == TRAILER_STEP_NAME || name == TRAILER_STEP_ID {
        return Some(TRAILER_STEP_ID.to_string());
    }
    registry
        .identities()
        .find(|identity| identity.display_name == name || format!("{} ({})", identity.display_name, identity.id) == name)
        .map(|identity| identity.id.clone())
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
            StepSpec::script("echo hi").named("Echo"),
        ]))
        .expect("assign")
    }

    fn run(output: &str) -> Extraction {
        DirectEmissionStrategy.extract(
            &RawEngineResult {
                output: output.as_bytes(),
                context: None,
            },
            &registry(),
        )
    }

    #[test]
    fn finds_array_behind_engine_prefix() {
        let output = concat!(
            "[Dynamic Workflow Execution/dynamic_job] 🚀  Start image=node:16-buster-slim\n",
            "[Dynamic Workflow Execution/dynamic_job]   | [\"not\", \"records\"]\n",
            "[Dynamic Workflow Execution/dynamic_job]   | [{\"id\":\"action_1_run\",\"outcome\":\"success\",\"outputs\":{\"greeting\":\"hi\"}},",
            "{\"id\":\"collect_results_step\",\"outcome\":\"success\",\"outputs\":{}}]\n",
            "[Dynamic Workflow Execution/dynamic_job] 🏁  Job succeeded\n",
        );
        let extraction = run(output);
        assert!(!extraction.is_degraded());
        let results = extraction.results();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].outcome, StepOutcome::Unknown);
        assert_eq!(results[0].name, "Run actions/checkout@v4");
        assert_eq!(results[0].uses.as_deref(), Some("actions/checkout@v4"));
        assert_eq!(results[0].run, None);
        assert!(results[0].outputs.is_empty());

        assert_eq!(results[1].name, "Echo");
        assert_eq!(results[1].run.as_deref(), Some("echo hi"));
        assert_eq!(results[1].outputs["greeting"], "hi");

        assert_eq!(results[2].id, TRAILER_STEP_ID);
    }

    #[test]
    fn steps_absent_from_the_array_keep_their_identity() {
        let results = run(r#"[{"id":"action_0_actions-checkout","outcome":"success","outputs":{}}]"#).into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].uses.as_deref(), Some("actions/checkout@v4"));
        assert_eq!(results[1].id, "action_1_run");
        assert_eq!(results[1].name, "Echo");
        assert_eq!(results[1].run.as_deref(), Some("echo hi"));
        assert_eq!(results[1].uses, None);
        assert_eq!(results[1].outcome, StepOutcome::Unknown);
    }

    #[test]
    fn records_may_be_matched_by_name() {
        let output = r#"[{"name":"Echo (action_1_run)","outcome":"failure"},{"name":"Collect Results","outcome":"success"}]"#;
        let results = run(output).into_results();
        assert_eq!(results[1].outcome, StepOutcome::Failure);
        assert_eq!(results.last().map(|record| record.id.as_str()), Some(TRAILER_STEP_ID));
    }

    #[test]
    fn arrays_naming_no_known_step_are_skipped() {
        let output = "[{\"id\":\"other\"}]\n[{\"id\":\"action_0_actions-checkout\",\"outcome\":\"skipped\"}]\n";
        let results = run(output).into_results();
        assert_eq!(results[0].outcome, StepOutcome::Skipped);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn no_array_degrades_to_empty() {
        for output in ["", "plain log line", "[{\"id\": \"action_1_run\"", "[]", "| [1, 2]"] {
            let extraction = run(output);
            assert!(extraction.is_degraded(), "output {output:?}");
            assert!(extraction.results().is_empty());
        }
    }
}
