//! Workflow descriptor generation.
//!
//! The descriptor is a single-job workflow document in the format the external engine
//! consumes. Every canonical step becomes one descriptor step carrying its assigned id;
//! a trailer step, always executed, dumps the engine's own per-step result context to
//! a file so the outcome of every earlier step can be recovered afterwards.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use stepline_types::{StepIdentity, StepKind, StepSpec};
use stepline_util::{redact_json, redact_sensitive};
use tracing::debug;

use crate::error::PipelineError;
use crate::identity::{StepRegistry, assign_identity};
use crate::merge::CanonicalSequence;

/// Fixed id of the trailer step.
pub const TRAILER_STEP_ID: &str = "collect_results_step";
/// Display name of the trailer step inside the descriptor.
pub const TRAILER_STEP_NAME: &str = "Collect Results";
/// Name of the single job in the descriptor.
pub const JOB_ID: &str = "dynamic_job";
/// Workflow name written into the descriptor header.
pub const WORKFLOW_NAME: &str = "Dynamic Workflow Execution";
/// Event the engine is told to simulate.
pub const TRIGGER_EVENT: &str = "push";
/// Interpreter used for script steps that do not declare one.
pub const DEFAULT_SHELL: &str = "bash";

const RESULTS_HEREDOC_DELIMITER: &str = "STEPLINE_RESULTS_EOF";

/// Settings that shape the generated descriptor.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorOptions<'a> {
    /// Runner profile written to the job's `runs-on`.
    pub runner_os: &'a str,
    /// File the trailer step writes the engine's result context to.
    pub results_path: &'a Path,
}

/// Rendered descriptor text plus the bookkeeping needed to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    text: String,
    step_count: usize,
}

impl Descriptor {
    /// The descriptor document as YAML.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of descriptor steps, including the trailer.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Job the engine must be told to run.
    pub fn job_id(&self) -> &'static str {
        JOB_ID
    }

    /// Event the engine must be told to simulate.
    pub fn event(&self) -> &'static str {
        TRIGGER_EVENT
    }
}

#[derive(Debug, Serialize)]
struct WorkflowDocument {
    name: &'static str,
    on: IndexMap<&'static str, Option<JsonValue>>,
    jobs: IndexMap<&'static str, JobDocument>,
}

#[derive(Debug, Serialize)]
struct JobDocument {
    #[serde(rename = "runs-on")]
    runs_on: String,
    steps: Vec<StepDocument>,
}

#[derive(Debug, Serialize)]
struct StepDocument {
    name: String,
    id: String,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uses: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    with: Option<IndexMap<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shell: Option<String>,
    #[serde(rename = "working-directory", skip_serializing_if = "Option::is_none")]
    working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<String>,
}

/// Renders the descriptor for a canonical sequence.
///
/// Identities are taken from `registry` by position. The step shape is checked again
/// here, so a sequence that bypassed [`crate::identity::assign`] still cannot produce a
/// descriptor with a step lacking an execution mode.
pub fn generate(
    sequence: &CanonicalSequence,
    registry: &StepRegistry,
    options: &DescriptorOptions<'_>,
) -> Result<Descriptor, PipelineError> {
    let mut steps = Vec::with_capacity(sequence.len() + 1);
    for (index, step) in sequence.iter().enumerate() {
        let kind = step
            .kind()
            .map_err(|source| PipelineError::InvalidStepDefinition { index, source })?;
        let identity = match registry.at(index) {
            Some(identity) if identity.kind == kind => identity.clone(),
            _ => assign_identity(index, step).map_err(|source| PipelineError::InvalidStepDefinition { index, source })?,
        };
        steps.push(step_document(step, &identity));
    }
    steps.push(trailer_document(options.results_path));

    let document = WorkflowDocument {
        name: WORKFLOW_NAME,
        on: IndexMap::from([(TRIGGER_EVENT, None)]),
        jobs: IndexMap::from([(
            JOB_ID,
            JobDocument {
                runs_on: options.runner_os.to_string(),
                steps,
            },
        )]),
    };

    let step_count = sequence.len() + 1;
    let text = serde_yaml::to_string(&document)?;
    debug!(
        step_count,
        runner_os = %options.runner_os,
        descriptor = %redact_sensitive(&text),
        "workflow descriptor generated"
    );
    Ok(Descriptor { text, step_count })
}

fn step_document(step: &StepSpec, identity: &StepIdentity) -> StepDocument {
    let name = format!("{} ({})", identity.display_name, identity.id);
    match identity.kind {
        StepKind::Uses => {
            if let Some(with) = &step.with {
                debug!(step_id = %identity.id, with = %redact_json(&JsonValue::Object(with.clone().into_iter().collect())), "action inputs");
            }
            StepDocument {
                name,
                id: identity.id.clone(),
                condition: None,
                uses: identity.reference.clone(),
                with: step.with.clone(),
                shell: None,
                working_directory: None,
                run: None,
            }
        }
        StepKind::Run => StepDocument {
            name,
            id: identity.id.clone(),
            condition: None,
            uses: None,
            with: None,
            shell: Some(
                step.shell
                    .as_deref()
                    .map(str::trim)
                    .filter(|shell| !shell.is_empty())
                    .unwrap_or(DEFAULT_SHELL)
                    .to_string(),
            ),
            working_directory: step.working_directory.clone(),
            run: step.run.clone(),
        },
    }
}

fn trailer_document(results_path: &Path) -> StepDocument {
    let quoted_path = shell_quote(&results_path.display().to_string());
    let script = format!(
        "echo 'Writing raw results to {path}...' >&2\n\
         cat > {path} <<'{delimiter}'\n\
         ${{{{ toJSON(steps) }}}}\n\
         {delimiter}\n\
         echo 'Raw results written.' >&2\n",
        path = quoted_path,
        delimiter = RESULTS_HEREDOC_DELIMITER,
    );
    StepDocument {
        name: TRAILER_STEP_NAME.to_string(),
        id: TRAILER_STEP_ID.to_string(),
        condition: Some("always()".to_string()),
        uses: None,
        with: None,
        shell: Some(DEFAULT_SHELL.to_string()),
        working_directory: None,
        run: Some(script),
    }
}

/// Quotes a value for POSIX shells using single quotes.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::assign;
    use serde_yaml::Value as YamlValue;
    use stepline_types::StepShapeError;

    fn render(steps: Vec<StepSpec>) -> YamlValue {
        let sequence = CanonicalSequence::new(steps);
        let registry = assign(&sequence).expect("assign");
        let options = DescriptorOptions {
            runner_os: "ubuntu-latest",
            results_path: Path::new("/tmp/stepline-run/results.json"),
        };
        let descriptor = generate(&sequence, &registry, &options).expect("generate");
        assert_eq!(descriptor.step_count(), sequence.len() + 1);
        serde_yaml::from_str(descriptor.text()).expect("descriptor is valid YAML")
    }

    fn steps_of(document: &YamlValue) -> &Vec<YamlValue> {
        document["jobs"][JOB_ID]["steps"].as_sequence().expect("steps sequence")
    }

    #[test]
    fn header_declares_job_and_runner() {
        let document = render(vec![StepSpec::script("echo hi")]);
        assert_eq!(document["name"], WORKFLOW_NAME);
        assert_eq!(document["jobs"][JOB_ID]["runs-on"], "ubuntu-latest");
        let triggers = document["on"].as_mapping().expect("trigger mapping");
        assert!(triggers.contains_key(&YamlValue::from(TRIGGER_EVENT)));
    }

    #[test]
    fn action_steps_carry_uses_and_with() {
        let mut step = StepSpec::action("actions/setup-node@v4");
        step.with = Some(IndexMap::from([("node-version".to_string(), JsonValue::from("20"))]));
        let document = render(vec![step]);

        let rendered = &steps_of(&document)[0];
        assert_eq!(rendered["id"], "action_0_actions-setup-node");
        assert_eq!(rendered["name"], "Run actions/setup-node@v4 (action_0_actions-setup-node)");
        assert_eq!(rendered["uses"], "actions/setup-node@v4");
        assert_eq!(rendered["with"]["node-version"], "20");
        assert!(rendered.get("run").is_none());
        assert!(rendered.get("shell").is_none());
    }

    #[test]
    fn script_steps_default_to_bash() {
        let mut custom_shell = StepSpec::script("Get-ChildItem");
        custom_shell.shell = Some("pwsh".into());
        custom_shell.working_directory = Some("scripts".into());
        let document = render(vec![StepSpec::script("echo one\necho two").named("Echo"), custom_shell]);
        let steps = steps_of(&document);

        assert_eq!(steps[0]["id"], "action_0_run");
        assert_eq!(steps[0]["name"], "Echo (action_0_run)");
        assert_eq!(steps[0]["shell"], DEFAULT_SHELL);
        assert_eq!(steps[0]["run"], "echo one\necho two");
        assert!(steps[0].get("working-directory").is_none());

        assert_eq!(steps[1]["shell"], "pwsh");
        assert_eq!(steps[1]["working-directory"], "scripts");
    }

    #[test]
    fn trailer_always_runs_last() {
        let document = render(vec![StepSpec::action("actions/checkout@v4"), StepSpec::script("make")]);
        let steps = steps_of(&document);
        assert_eq!(steps.len(), 3);

        let trailer = steps.last().expect("trailer");
        assert_eq!(trailer["id"], TRAILER_STEP_ID);
        assert_eq!(trailer["if"], "always()");
        let script = trailer["run"].as_str().expect("trailer script");
        assert!(script.contains("${{ toJSON(steps) }}"), "script: {script}");
        assert!(script.contains("'/tmp/stepline-run/results.json'"), "script: {script}");
    }

    #[test]
    fn malformed_steps_fail_generation() {
        let sequence = CanonicalSequence::new(vec![StepSpec::script("echo ok"), StepSpec::default()]);
        let options = DescriptorOptions {
            runner_os: "ubuntu-latest",
            results_path: Path::new("/tmp/results.json"),
        };
        let error = generate(&sequence, &StepRegistry::default(), &options).expect_err("missing mode");
        assert!(matches!(
            error,
            PipelineError::InvalidStepDefinition {
                index: 1,
                source: StepShapeError::MissingMode
            }
        ));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/tmp/it's/results.json"), r"'/tmp/it'\''s/results.json'");
    }
}
