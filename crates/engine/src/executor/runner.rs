use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;

use stepline_util::find_executable;
use tracing::{debug, info, warn};

use super::{EngineOutput, EngineRequest};
use crate::error::PipelineError;

/// File name of the descriptor inside the run scratch directory.
pub const DESCRIPTOR_FILE_NAME: &str = "dynamic_workflow.yml";
/// Default engine binary.
pub const DEFAULT_ENGINE_BINARY: &str = "act";
/// Default container architecture forwarded to the engine.
pub const DEFAULT_CONTAINER_ARCHITECTURE: &str = "linux/amd64";

/// Runs a workflow descriptor.
///
/// The engine is a black box: it receives a descriptor and reports captured output and
/// an exit code. A non-zero exit is a normal, reportable result (an embedded step
/// failed); only the inability to start the engine at all is an error.
pub trait Engine {
    /// Checks that the engine can be started. Called before any run-scoped work.
    fn ensure_available(&self) -> Result<(), PipelineError>;

    /// Executes the descriptor and blocks until the engine exits.
    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineOutput, PipelineError>;
}

/// Engine backed by the `act` local workflow runner.
#[derive(Debug, Clone)]
pub struct ActEngine {
    binary: String,
    container_architecture: Option<String>,
    echo_output: bool,
}

impl Default for ActEngine {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE_BINARY.to_string(),
            container_architecture: Some(DEFAULT_CONTAINER_ARCHITECTURE.to_string()),
            echo_output: true,
        }
    }
}

impl ActEngine {
    /// Create an engine that invokes `binary` (a bare name searched on `PATH`, or a path).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Sets the container architecture; `None` lets the engine choose.
    pub fn with_container_architecture(mut self, architecture: Option<String>) -> Self {
        self.container_architecture = architecture.filter(|value| !value.trim().is_empty());
        self
    }

    /// Whether engine output is copied to this process's stderr as it arrives.
    pub fn with_echo_output(mut self, echo_output: bool) -> Self {
        self.echo_output = echo_output;
        self
    }

    fn resolve_binary(&self) -> Result<PathBuf, PipelineError> {
        find_executable(&self.binary).ok_or_else(|| PipelineError::EngineInvocationFailure {
            binary: self.binary.clone(),
            reason: "executable not found on PATH".to_string(),
        })
    }

    /// Arguments passed to the engine, excluding the binary itself.
    pub fn arguments(&self, request: &EngineRequest<'_>, descriptor_path: &Path) -> Vec<String> {
        let mut arguments = vec![
            request.descriptor.event().to_string(),
            "-P".to_string(),
            format!("{}=-self-hosted", request.runner_profile),
            "--workflows".to_string(),
            descriptor_path.display().to_string(),
            "--job".to_string(),
            request.descriptor.job_id().to_string(),
            "--bind".to_string(),
            "--directory".to_string(),
            request.workspace.display().to_string(),
        ];
        if let Some(architecture) = &self.container_architecture {
            arguments.push("--container-architecture".to_string());
            arguments.push(architecture.clone());
        }
        arguments
    }
}

impl Engine for ActEngine {
    fn ensure_available(&self) -> Result<(), PipelineError> {
        let resolved = self.resolve_binary()?;
        debug!(binary = %resolved.display(), "engine binary located");
        Ok(())
    }

    fn run(&self, request: &EngineRequest<'_>) -> Result<EngineOutput, PipelineError> {
        let binary = self.resolve_binary()?;
        let descriptor_path = request.scratch_dir.join(DESCRIPTOR_FILE_NAME);
        fs::write(&descriptor_path, request.descriptor.text())?;

        let arguments = self.arguments(request, &descriptor_path);
        info!(
            engine = %self.binary,
            runner_profile = %request.runner_profile,
            step_count = request.descriptor.step_count(),
            "running workflow descriptor"
        );
        debug!(command = ?arguments, "engine command line");

        let mut child = Command::new(&binary)
            .args(&arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| PipelineError::EngineInvocationFailure {
                binary: self.binary.clone(),
                reason: error.to_string(),
            })?;

        // Both streams land in one buffer in arrival order.
        let combined = Mutex::new(Vec::new());
        thread::scope(|scope| {
            let combined = &combined;
            if let Some(stdout) = child.stdout.take() {
                scope.spawn(move || tee_lines(stdout, combined, self.echo_output));
            }
            if let Some(stderr) = child.stderr.take() {
                scope.spawn(move || tee_lines(stderr, combined, self.echo_output));
            }
        });
        let status = child.wait()?;

        let raw_output = combined.into_inner().unwrap_or_else(PoisonError::into_inner);
        let exit_code = status.code();
        debug!(exit_code = ?exit_code, output_bytes = raw_output.len(), "engine finished");
        Ok(EngineOutput { raw_output, exit_code })
    }
}

/// Appends each line of `stream` to `combined` until end of stream, echoing it to stderr.
fn tee_lines(stream: impl Read, combined: &Mutex<Vec<u8>>, mut echo: bool) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                warn!("failed to read engine output: {error}");
                break;
            }
        }
        if echo {
            let mut stderr = io::stderr().lock();
            if let Err(error) = stderr.write_all(&line).and_then(|_| stderr.flush()) {
                warn!("failed to echo engine output: {error}");
                echo = false;
            }
        }
        combined.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorOptions, generate};
    use crate::identity::assign;
    use crate::merge::CanonicalSequence;
    use stepline_types::StepSpec;

    #[test]
    fn builds_engine_command_line() {
        let sequence = CanonicalSequence::new(vec![StepSpec::script("echo hi")]);
        let registry = assign(&sequence).expect("assign");
        let descriptor = generate(
            &sequence,
            &registry,
            &DescriptorOptions {
                runner_os: "ubuntu-22.04",
                results_path: Path::new("/scratch/results.json"),
            },
        )
        .expect("generate");

        let request = EngineRequest {
            descriptor: &descriptor,
            runner_profile: "ubuntu-22.04",
            workspace: Path::new("/github/workspace"),
            scratch_dir: Path::new("/scratch"),
        };
        let engine = ActEngine::default();
        let arguments = engine.arguments(&request, Path::new("/scratch/dynamic_workflow.yml"));
        assert_eq!(
            arguments,
            vec![
                "push",
                "-P",
                "ubuntu-22.04=-self-hosted",
                "--workflows",
                "/scratch/dynamic_workflow.yml",
                "--job",
                "dynamic_job",
                "--bind",
                "--directory",
                "/github/workspace",
                "--container-architecture",
                "linux/amd64",
            ]
        );

        let without_architecture = ActEngine::default().with_container_architecture(Some("  ".into()));
        assert!(
            !without_architecture
                .arguments(&request, Path::new("/scratch/dynamic_workflow.yml"))
                .contains(&"--container-architecture".to_string())
        );
    }

    #[test]
    fn missing_binary_is_an_invocation_failure() {
        let engine = ActEngine::new("stepline-missing-engine-binary");
        match engine.ensure_available() {
            Err(PipelineError::EngineInvocationFailure { binary, .. }) => assert_eq!(binary, "stepline-missing-engine-binary"),
            other => panic!("expected EngineInvocationFailure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn captures_interleaved_output_and_exit_code_of_a_failing_engine() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = tempfile::tempdir().expect("scratch");
        let engine_path = scratch.path().join("fake-engine");
        fs::write(
            &engine_path,
            "#!/bin/sh\necho \"ran $1\"\nsleep 0.2\necho oops >&2\nsleep 0.2\necho done\nexit 3\n",
        )
        .expect("write engine");
        let mut permissions = fs::metadata(&engine_path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&engine_path, permissions).expect("chmod");

        let sequence = CanonicalSequence::new(vec![StepSpec::script("false")]);
        let registry = assign(&sequence).expect("assign");
        let results_path = scratch.path().join("results.json");
        let descriptor = generate(
            &sequence,
            &registry,
            &DescriptorOptions {
                runner_os: "ubuntu-latest",
                results_path: &results_path,
            },
        )
        .expect("generate");

        let engine = ActEngine::new(engine_path.display().to_string()).with_echo_output(false);
        let output = engine
            .run(&EngineRequest {
                descriptor: &descriptor,
                runner_profile: "ubuntu-latest",
                workspace: scratch.path(),
                scratch_dir: scratch.path(),
            })
            .expect("engine runs");

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.succeeded());
        assert_eq!(output.text(), "ran push\noops\ndone\n");
        assert!(scratch.path().join(DESCRIPTOR_FILE_NAME).is_file());
    }
}
