//! Result delivery: the step output, the optional log display, and the optional file.
//!
//! Nothing here fails a run that already happened. Delivery problems are logged and
//! the remaining channels are still served.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use stepline_types::NormalizedStepResult;
use stepline_util::resolve_workspace_relative;
use tracing::{debug, error, info, warn};

/// Name of the declared step output.
pub const RESULTS_OUTPUT_NAME: &str = "results";

const OUTPUT_DELIMITER: &str = "EOF";
const DISPLAY_GROUP_TITLE: &str = "Stepline Collected Results (JSON)";

/// Where results should be delivered.
#[derive(Debug, Clone, Copy)]
pub struct SinkOptions<'a> {
    pub workspace: &'a Path,
    /// Workspace-relative path to save the results to.
    pub results_output_file: Option<&'a str>,
    pub display: bool,
    /// Step output file provided by the runner.
    pub output_file: Option<&'a Path>,
}

/// Serializes `results` once and hands the same JSON to every configured channel.
pub fn deliver(results: &[NormalizedStepResult], options: &SinkOptions<'_>) -> Result<()> {
    let compact = serde_json::to_string(results)?;

    match options.output_file {
        Some(path) => {
            if let Err(error) = append_output(path, RESULTS_OUTPUT_NAME, &compact) {
                warn!(path = %path.display(), "failed to write step output: {error}");
            }
        }
        None => warn!("GITHUB_OUTPUT is not set; the '{RESULTS_OUTPUT_NAME}' output is not exported"),
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{compact}")?;
    stdout.flush()?;

    if options.display {
        display_results(&mut io::stderr().lock(), results)?;
    } else {
        debug!("result display disabled");
    }

    if let Some(raw) = options.results_output_file {
        save_results_file(options.workspace, raw, &compact);
    }
    Ok(())
}

/// Appends a multi-line `name<<EOF` record to the runner's output file.
pub fn append_output(path: &Path, name: &str, value: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    write!(file, "{name}<<{OUTPUT_DELIMITER}\n{value}\n{OUTPUT_DELIMITER}\n")?;
    file.flush()
}

/// Pretty-prints the results inside a collapsible log group.
pub fn display_results(writer: &mut impl Write, results: &[NormalizedStepResult]) -> Result<()> {
    writeln!(writer, "::group::{DISPLAY_GROUP_TITLE}")?;
    writeln!(writer, "{}", serde_json::to_string_pretty(results)?)?;
    writeln!(writer, "::endgroup::")?;
    Ok(())
}

/// Writes `contents` to a workspace-relative path, creating parent directories.
///
/// Returns `false` when the path was rejected or the write failed.
pub fn save_results_file(workspace: &Path, raw: &str, contents: &str) -> bool {
    let target = match resolve_workspace_relative(workspace, raw) {
        Ok(target) => target,
        Err(reason) => {
            error!("results_output_file rejected: {reason}");
            return false;
        }
    };

    let written = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
    .and_then(|_| fs::write(&target, contents));

    match written {
        Ok(()) => {
            info!(path = %target.display(), "results saved");
            true
        }
        Err(error) => {
            warn!(path = %target.display(), "failed to save results: {error}");
            false
        }
    }
}
