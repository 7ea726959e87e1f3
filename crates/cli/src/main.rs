use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use stepline_engine::executor::{DEFAULT_CONTAINER_ARCHITECTURE, DEFAULT_ENGINE_BINARY};
use stepline_engine::pipeline::DEFAULT_RUNNER_OS;
use stepline_engine::{ActEngine, DirectoryPresetStore, Pipeline, RunRequest};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod sink;

use sink::SinkOptions;

const DEFAULT_PRESETS_DIR: &str = "/presets";

/// Compile a list of CI steps into one workflow, run it locally, and report per-step results.
#[derive(Parser, Debug)]
#[command(name = "stepline", version, about)]
struct Args {
    /// YAML sequence of preset names
    #[arg(long, env = "INPUT_PRESETS")]
    presets: Option<String>,

    /// YAML sequence of custom steps (`uses` or `run`)
    #[arg(long, env = "INPUT_ACTION_LIST")]
    action_list: Option<String>,

    /// Workspace-relative file to save the results JSON to
    #[arg(long, env = "INPUT_RESULTS_OUTPUT_FILE")]
    results_output_file: Option<String>,

    /// Runner profile the workflow job runs on [default: ubuntu-latest]
    #[arg(long, env = "INPUT_RUNNER_OS")]
    runner_os: Option<String>,

    /// Pretty-print the results to the log; only "true" enables it [default: true]
    #[arg(long, env = "INPUT_DISPLAY_RESULTS")]
    display_results: Option<String>,

    /// Workspace bound into the engine [default: .]
    #[arg(long, env = "GITHUB_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Directory holding `<name>.json` presets [default: /presets]
    #[arg(long, env = "STEPLINE_PRESETS_DIR")]
    presets_dir: Option<PathBuf>,

    /// Engine binary, by name or path [default: act]
    #[arg(long, env = "STEPLINE_ENGINE_BIN")]
    engine_bin: Option<String>,

    /// Container architecture forwarded to the engine [default: linux/amd64]
    #[arg(long, env = "STEPLINE_CONTAINER_ARCHITECTURE")]
    container_architecture: Option<String>,

    /// File receiving the step's `results` output
    #[arg(long, env = "GITHUB_OUTPUT")]
    output_file: Option<PathBuf>,

    /// Print the generated workflow descriptor instead of running it
    #[arg(long)]
    dry_run: bool,
}

/// Empty values count as absent; the runner exports every declared input.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn present_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|value| !value.as_os_str().is_empty())
}

fn display_enabled(raw: Option<&str>) -> bool {
    raw.is_none_or(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn main() -> ExitCode {
    init_tracing();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("::error::{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| {
            if std::env::var("RUNNER_DEBUG").is_ok_and(|value| value == "1") {
                "debug".into()
            } else {
                "info".into()
            }
        });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Args) -> Result<()> {
    let workspace = present_path(args.workspace).unwrap_or_else(|| PathBuf::from("."));
    let presets_dir = present_path(args.presets_dir).unwrap_or_else(|| PathBuf::from(DEFAULT_PRESETS_DIR));
    let runner_os = present(args.runner_os).unwrap_or_else(|| DEFAULT_RUNNER_OS.to_string());
    let results_output_file = present(args.results_output_file);
    let display = display_enabled(present(args.display_results).as_deref());
    let output_file = present_path(args.output_file);

    let mut request = RunRequest::default().with_runner_os(runner_os).with_workspace(&workspace);
    if let Some(raw) = present(args.presets) {
        request = request.with_presets(raw);
    }
    if let Some(raw) = present(args.action_list) {
        request = request.with_action_list(raw);
    }
    let display_flag = display;
    debug!(
        presets = ?request.presets,
        action_list = ?request.action_list,
        results_output_file = ?results_output_file,
        runner_os = %request.runner_os,
        display = display_flag,
        workspace = %workspace.display(),
        "inputs resolved"
    );

    let store = DirectoryPresetStore::new(presets_dir);
    let engine = ActEngine::new(present(args.engine_bin).unwrap_or_else(|| DEFAULT_ENGINE_BINARY.to_string()))
        .with_container_architecture(Some(
            present(args.container_architecture).unwrap_or_else(|| DEFAULT_CONTAINER_ARCHITECTURE.to_string()),
        ));
    let pipeline = Pipeline::new(&store, &engine);

    if args.dry_run {
        let descriptor = pipeline.preview(&request)?;
        print!("{}", descriptor.text());
        return Ok(());
    }

    let report = pipeline.run(&request)?;
    sink::deliver(
        &report.results,
        &SinkOptions {
            workspace: &workspace,
            results_output_file: results_output_file.as_deref(),
            display,
            output_file: output_file.as_deref(),
        },
    )?;
    info!(result_count = report.results.len(), "stepline finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_flag_is_true_only_for_true() {
        assert!(display_enabled(None));
        assert!(display_enabled(Some("true")));
        assert!(display_enabled(Some(" TRUE ")));
        assert!(!display_enabled(Some("false")));
        assert!(!display_enabled(Some("yes")));
        assert!(!display_enabled(Some("1")));
    }

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(present(Some("  ".into())), None);
        assert_eq!(present(Some("[checkout]".into())), Some("[checkout]".into()));
        assert_eq!(present_path(Some(PathBuf::new())), None);
    }

    #[test]
    fn flags_parse_into_args() {
        let args = Args::try_parse_from([
            "stepline",
            "--presets",
            "[checkout]",
            "--runner-os",
            "ubuntu-22.04",
            "--display-results",
            "false",
            "--dry-run",
        ])
        .expect("parse");
        assert_eq!(args.presets.as_deref(), Some("[checkout]"));
        assert_eq!(args.runner_os.as_deref(), Some("ubuntu-22.04"));
        assert_eq!(args.display_results.as_deref(), Some("false"));
        assert!(args.dry_run);
    }
}
