//! Helpers for running `gpg` / `age` with piped stdin.

use super::UnwrapError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// Locate `tool` on `PATH`.
pub(super) fn locate(tool: &'static str) -> Result<PathBuf, UnwrapError> {
    which::which(tool).map_err(|e| UnwrapError::ToolUnavailable {
        tool,
        reason: e.to_string(),
    })
}

/// Run `program`, feed `input` on stdin and return stdout.
///
/// A non-zero exit status is reported with the tool's stderr.
pub(super) async fn run<I, S>(
    program: &Path,
    args: I,
    envs: &[(&str, &OsStr)],
    input: &[u8],
) -> Result<Vec<u8>, UnwrapError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| UnwrapError::Failed(format!("failed to spawn {name}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input)
            .await
            .map_err(|e| UnwrapError::Failed(format!("failed to write to {name} stdin: {e}")))?;
        stdin
            .shutdown()
            .await
            .map_err(|e| UnwrapError::Failed(format!("failed to close {name} stdin: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| UnwrapError::Failed(format!("failed to wait for {name}: {e}")))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(UnwrapError::Failed(format!(
            "{name} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}
