//! Flame graph rendering via the analyzer's graphical output mode.
//!
//! Rendering depends on the graphviz backend being installed next to the
//! analyzer. That absence is reported as the distinct
//! [`GraphError::BackendUnavailable`] so the orchestrator can fall back to
//! the textual report instead of failing the whole session.

use crate::profiler::types::{FlameGraphArtifact, ProfileArtifact};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

/// Error type for flame graph rendering.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to invoke profile analyzer: {0}")]
    Invoke(std::io::Error),

    #[error("flame graph rendering failed (status {status}): {stderr}")]
    RenderFailed { status: i32, stderr: String },

    #[error("flame graph rendering timed out after {0:?}")]
    Timeout(Duration),
}

/// Render an SVG flame graph for a fetched payload into a unique path under
/// `dir`.
pub async fn render(
    command: &[String],
    artifact: &ProfileArtifact,
    dir: &Path,
    timeout: Duration,
) -> Result<FlameGraphArtifact, GraphError> {
    let (program, prefix_args) = command
        .split_first()
        .ok_or_else(|| GraphError::Invoke(std::io::Error::other("empty analyzer command")))?;

    let out_path = dir.join(format!("podprof-{}-{}.svg", artifact.profile_type, Uuid::new_v4()));

    log::info!(
        "rendering flame graph for {} into {}",
        artifact.path.display(),
        out_path.display()
    );

    let mut cmd = Command::new(program);
    cmd.args(prefix_args)
        .arg("-svg")
        .arg("-output")
        .arg(&out_path)
        .arg(&artifact.path);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| GraphError::Timeout(timeout))?
        .map_err(GraphError::Invoke)?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() || !out_path.exists() {
        if is_backend_missing(&stderr) {
            return Err(GraphError::BackendUnavailable(stderr));
        }
        return Err(GraphError::RenderFailed {
            status: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(FlameGraphArtifact {
        format: "svg".to_string(),
        path: out_path,
    })
}

/// stderr signatures the analyzer emits when graphviz is not installed.
fn is_backend_missing(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("graphviz")
        || stderr.contains("failed to execute dot")
        || stderr.contains("executable file not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphviz_stderr_signatures_are_recognized() {
        assert!(is_backend_missing("Failed to execute dot. Is Graphviz installed?"));
        assert!(is_backend_missing(
            "exec: \"dot\": executable file not found in $PATH"
        ));
        assert!(!is_backend_missing("profile parse error: unrecognized format"));
    }
}
