use std::process::Stdio;
use std::time::Duration;

use scanbox_common::error::ScanEngineError;
use scanbox_common::progress::Progress;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::keepalive::with_keepalive;

/// Runs `program args.. targets..` and returns its stdout.
///
/// The child is killed as soon as `cancel` fires.
pub(crate) async fn run_scan(
    program: &str,
    args: &[&str],
    targets: &[String],
    every: Duration,
    progress: &Progress,
    cancel: &CancellationToken,
) -> Result<String, ScanEngineError> {
    if cancel.is_cancelled() {
        return Err(ScanEngineError::Cancelled);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .args(targets)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(ScanEngineError::Spawn)?;
    debug!("Started {program} {} on {} target(s)", args.join(" "), targets.len());

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
        res = with_keepalive(every, progress, child.wait_with_output()) => res?,
        _ = cancel.cancelled() => {
            warn!("{program} cancelled before completion");
            return Err(ScanEngineError::Cancelled);
        }
    };

    if !output.status.success() {
        return Err(ScanEngineError::Exited {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        warn!("{program} finished with warnings: {}", stderr.trim());
    }

    String::from_utf8(output.stdout).map_err(|e| ScanEngineError::Parse(e.to_string()))
}
