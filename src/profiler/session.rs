//! Session orchestration.
//!
//! One [`Session`] is one end-to-end execution of the pipeline:
//! `Probing -> TunnelOpening -> Fetching -> Analyzing -> (GraphRendering) ->
//! Teardown -> Done | Failed`. Transitions are strictly forward; any stage's
//! failure jumps straight to Teardown, which closes the tunnel and removes
//! the session's temporary files before the error is reported. Sessions are
//! one-shot values and own their tunnel and temp directory exclusively.

use crate::config::types::Config;
use crate::profiler::fetch::{self, FetchError};
use crate::profiler::flamegraph::{self, GraphError};
use crate::profiler::pod_status::{PodStatusProbe, ProbeError};
use crate::profiler::ports::PortError;
use crate::profiler::pprof::{self, AnalyzeError};
use crate::profiler::tunnel::{Tunnel, TunnelError};
use crate::profiler::types::{ProfileReport, ProfileRequest, ProfileType};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Error type for a profiling session. Every variant is terminal for the
/// session; Teardown has already run by the time one is surfaced.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("session cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("failed to serialize pod status: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Probing,
    TunnelOpening,
    Fetching,
    Analyzing,
    GraphRendering,
    Teardown,
    Done,
    Failed,
}

/// What a session produces. The named CLI operations are thin configurations
/// of the same state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fetch and analyze one profile, optionally rendering a flame graph.
    Profile { flamegraph: bool },
    /// Pod status only: no tunnel, no fetch.
    Status,
}

/// Per-session knobs on top of the request itself.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub operation: Operation,
    /// Run the pod status pre-flight before opening a tunnel
    pub probe: bool,
    /// Maximum rows requested from the analyzer
    pub top_n: usize,
    /// Retain an artifact (flame graph, or the raw payload) at this path
    pub export: Option<PathBuf>,
}

/// Timeouts and tool configuration, resolved from the config file.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub ready_timeout: Duration,
    pub fetch_grace: Duration,
    pub tool_timeout: Duration,
    /// Analyzer argv prefix, conventionally `go tool pprof`
    pub pprof_command: Vec<String>,
    /// Port-forward argv prefix, conventionally `kubectl`
    pub kubectl_command: Vec<String>,
}

impl SessionLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_timeout: Duration::from_secs(config.tunnel.ready_timeout_seconds),
            fetch_grace: Duration::from_secs(config.tunnel.fetch_grace_seconds),
            tool_timeout: Duration::from_secs(config.tunnel.tool_timeout_seconds),
            pprof_command: config
                .tools
                .pprof_command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            kubectl_command: config
                .tools
                .kubectl_command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// One profiling session. Owns its tunnel and temp files exclusively; both
/// are released by Teardown on every exit path, including cancellation.
pub struct Session {
    request: ProfileRequest,
    options: SessionOptions,
    limits: SessionLimits,
    state: SessionState,
    abort: Arc<AtomicBool>,
    tunnel: Option<Tunnel>,
    temp_dir: Option<TempDir>,
}

impl Session {
    pub fn new(request: ProfileRequest, options: SessionOptions, limits: SessionLimits) -> Self {
        Self {
            request,
            options,
            limits,
            state: SessionState::Probing,
            abort: Arc::new(AtomicBool::new(false)),
            tunnel: None,
            temp_dir: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Flag the caller can set from another task to abort the session. An
    /// aborted session still runs Teardown synchronously before reporting
    /// [`SessionError::Cancelled`].
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Execute the pipeline to completion. Consumes the session: Done and
    /// Failed are terminal.
    pub async fn run(mut self) -> Result<ProfileReport, SessionError> {
        let outcome = self.execute().await;
        let failed_stage = self.state;
        self.teardown().await;
        match outcome {
            Ok(report) => {
                self.enter(SessionState::Done);
                Ok(report)
            }
            Err(e) => {
                self.enter(SessionState::Failed);
                log::error!(
                    "profiling session for pod/{} in namespace {} failed during {:?}: {}",
                    self.request.pod_name,
                    self.request.namespace,
                    failed_stage,
                    e
                );
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<ProfileReport, SessionError> {
        self.request
            .validate()
            .map_err(SessionError::InvalidRequest)?;

        let namespace = self.request.namespace.clone();
        let pod_name = self.request.pod_name.clone();

        // Pre-flight probe, and the whole of the status operation.
        if self.options.probe || self.options.operation == Operation::Status {
            self.check_abort("probe")?;
            self.enter(SessionState::Probing);
            let probe = PodStatusProbe::new().await?;
            if self.options.operation == Operation::Status {
                let status = probe.status(&namespace, &pod_name).await?;
                return Ok(ProfileReport {
                    records: Vec::new(),
                    raw_text: serde_json::to_string_pretty(&status)?,
                    artifact_path: None,
                    errors: Vec::new(),
                });
            }
            probe.ensure_running(&namespace, &pod_name).await?;
        }

        self.check_abort("tunnel open")?;
        self.enter(SessionState::TunnelOpening);
        let mut tunnel = Tunnel::open(
            &self.limits.kubectl_command,
            &namespace,
            &pod_name,
            self.request.pod_port,
            self.request.local_port,
        )
        .await?;
        let local_port = tunnel.local_port;
        // Stored before the readiness check so Teardown reaches it even when
        // the tunnel never comes up.
        let ready = tunnel.wait_ready(self.limits.ready_timeout).await;
        self.tunnel = Some(tunnel);
        ready?;

        self.check_abort("fetch")?;
        self.enter(SessionState::Fetching);
        let temp_dir = tempfile::Builder::new().prefix("podprof-").tempdir()?;
        let temp_path = temp_dir.path().to_path_buf();
        self.temp_dir = Some(temp_dir);
        let artifact = fetch::fetch(
            local_port,
            self.request.profile_type,
            self.request.duration_seconds,
            self.limits.fetch_grace,
            &temp_path,
        )
        .await?;

        self.check_abort("analyze")?;
        self.enter(SessionState::Analyzing);
        let mut errors = Vec::new();
        let (records, raw_text) = match pprof::analyze(
            &self.limits.pprof_command,
            &artifact,
            self.options.top_n,
            self.limits.tool_timeout,
        )
        .await
        {
            Ok(report) => (report.records, report.raw_text),
            // Soft failure: format drift degrades to the raw text instead of
            // failing the session.
            Err(AnalyzeError::Parse { raw }) => {
                errors.push(
                    "could not locate the ranked function table in analyzer output".to_string(),
                );
                (Vec::new(), raw)
            }
            Err(e) => return Err(e.into()),
        };

        let mut artifact_path = None;
        let render_graph = matches!(
            self.options.operation,
            Operation::Profile { flamegraph: true }
        );
        if render_graph {
            self.check_abort("flame graph")?;
            self.enter(SessionState::GraphRendering);
            match flamegraph::render(
                &self.limits.pprof_command,
                &artifact,
                &temp_path,
                self.limits.tool_timeout,
            )
            .await
            {
                Ok(graph) => {
                    if let Some(dest) = &self.options.export {
                        std::fs::copy(&graph.path, dest)?;
                        artifact_path = Some(dest.clone());
                    }
                }
                // Soft failure: the textual report still stands.
                Err(GraphError::BackendUnavailable(msg)) => {
                    errors.push(format!("flame graph unavailable: {}", msg));
                }
                Err(e) => return Err(e.into()),
            }
        } else if let Some(dest) = &self.options.export {
            std::fs::copy(&artifact.path, dest)?;
            artifact_path = Some(dest.clone());
        }

        Ok(ProfileReport {
            records,
            raw_text,
            artifact_path,
            errors,
        })
    }

    /// Release everything the session acquired. Runs on every exit path and
    /// is safe when nothing was acquired.
    async fn teardown(&mut self) {
        self.enter(SessionState::Teardown);
        if let Some(mut tunnel) = self.tunnel.take() {
            tunnel.close().await;
        }
        if let Some(temp_dir) = self.temp_dir.take() {
            if let Err(e) = temp_dir.close() {
                log::warn!("failed to remove session temp directory: {}", e);
            }
        }
    }

    fn check_abort(&self, stage: &'static str) -> Result<(), SessionError> {
        if self.abort.load(Ordering::SeqCst) {
            return Err(SessionError::Cancelled { stage });
        }
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        // Transitions are strictly forward; stages may be skipped but never
        // revisited.
        if next > self.state {
            log::debug!("session state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// Convenience constructor for the common "fetch and analyze one profile"
/// request shape.
pub fn profile_request(
    namespace: String,
    pod_name: String,
    profile_type: ProfileType,
    duration_seconds: u64,
    local_port: Option<u16>,
    pod_port: u16,
) -> ProfileRequest {
    ProfileRequest {
        namespace,
        pod_name,
        profile_type,
        duration_seconds,
        local_port,
        pod_port,
    }
}
