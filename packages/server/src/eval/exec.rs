//! Subprocess execution of a general block's external command.
//!
//! Arguments are always passed as a vector to the OS process API: settings
//! and filenames are user-controlled, so nothing here may ever pass through
//! a shell. The executor is stateless and holds no locks: two concurrent
//! executions of the same cache key each write to a distinct output UUID,
//! and the later cache insert wins.

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};

/// One invocation of a block command.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub command: &'a str,
    pub block_name: &'a str,
    pub input_paths: &'a [PathBuf],
    pub output_path: &'a Path,
    pub positional: &'a [String],
    pub templated: &'a [String],
}

/// Why a block command failed.
#[derive(Debug)]
pub enum ExecError {
    /// The command could not be spawned at all.
    Spawn { command: String, source: std::io::Error },
    /// Nonzero exit status. Carries the merged stdout+stderr.
    Failed { command: String, code: Option<i32>, output: String },
    /// Exit 0 but the output file never appeared.
    NoOutput { command: String, output: String },
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(f, "failed to spawn {command}: {source}")
            }
            Self::Failed { command, code, output } => match code {
                Some(code) => write!(f, "{command} exited with status {code}: {output}"),
                None => write!(f, "{command} was killed by a signal: {output}"),
            },
            Self::NoOutput { command, output } => {
                write!(f, "{command} exited cleanly but produced no output file: {output}")
            }
        }
    }
}

impl std::error::Error for ExecError {}

/// Run the command and require exit 0 *and* an output file on disk.
///
/// Any partial output is deleted on failure so no half-written file can be
/// mistaken for a derived image.
pub async fn run(invocation: Invocation<'_>) -> Result<(), ExecError> {
    let argv = build_argv(&invocation);
    debug!(command = invocation.command, ?argv, "spawning block command");

    // Both pipes are captured and drained to completion before the child is
    // reaped, so a chatty tool cannot stall on a full pipe.
    let output = Command::new(invocation.command)
        .args(&argv)
        .output()
        .await
        .map_err(|source| ExecError::Spawn {
            command: invocation.command.to_string(),
            source,
        })?;

    let merged = merge_output(&output.stdout, &output.stderr);

    if !output.status.success() {
        warn!(
            command = invocation.command,
            code = ?output.status.code(),
            output = %merged,
            "block command failed"
        );
        remove_partial(invocation.output_path).await;
        return Err(ExecError::Failed {
            command: invocation.command.to_string(),
            code: output.status.code(),
            output: merged,
        });
    }

    if !tokio::fs::try_exists(invocation.output_path)
        .await
        .unwrap_or(false)
    {
        warn!(
            command = invocation.command,
            output = %merged,
            "block command exited cleanly but wrote no output"
        );
        return Err(ExecError::NoOutput {
            command: invocation.command.to_string(),
            output: merged,
        });
    }

    Ok(())
}

/// Argv after the command itself: block name, input paths, output path,
/// positional values, templated tokens. Empty elements are dropped.
fn build_argv(invocation: &Invocation<'_>) -> Vec<std::ffi::OsString> {
    let mut argv: Vec<std::ffi::OsString> = Vec::with_capacity(
        2 + invocation.input_paths.len()
            + invocation.positional.len()
            + invocation.templated.len(),
    );
    if !invocation.block_name.is_empty() {
        argv.push(invocation.block_name.into());
    }
    for path in invocation.input_paths {
        argv.push(path.as_os_str().to_os_string());
    }
    argv.push(invocation.output_path.as_os_str().to_os_string());
    for value in invocation.positional.iter().chain(invocation.templated) {
        if !value.is_empty() {
            argv.push(value.into());
        }
    }
    argv
}

fn merge_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut merged = String::from_utf8_lossy(stdout).into_owned();
    merged.push_str(&String::from_utf8_lossy(stderr));
    merged
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), %err, "failed to remove partial output"),
    }
}
