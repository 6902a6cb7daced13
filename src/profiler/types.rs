//! Core data types for one profiling session: the request, the fetched
//! artifact, and the parsed analysis results.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Profile kinds exposed under the target's `/debug/pprof/` prefix.
///
/// Every variant maps to a fixed sub-path; only `Cpu` accepts a capture
/// duration (the endpoint blocks server-side for that long before answering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    Cpu,
    Heap,
    Goroutine,
    Mutex,
    Block,
    Allocs,
    Threadcreate,
}

impl ProfileType {
    /// Sub-path of the endpoint under `/debug/pprof/`.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Self::Cpu => "profile",
            Self::Heap => "heap",
            Self::Goroutine => "goroutine",
            Self::Mutex => "mutex",
            Self::Block => "block",
            Self::Allocs => "allocs",
            Self::Threadcreate => "threadcreate",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Heap => "heap",
            Self::Goroutine => "goroutine",
            Self::Mutex => "mutex",
            Self::Block => "block",
            Self::Allocs => "allocs",
            Self::Threadcreate => "threadcreate",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "profile" => Ok(Self::Cpu),
            "heap" => Ok(Self::Heap),
            "goroutine" => Ok(Self::Goroutine),
            "mutex" => Ok(Self::Mutex),
            "block" => Ok(Self::Block),
            "allocs" => Ok(Self::Allocs),
            "threadcreate" => Ok(Self::Threadcreate),
            other => Err(format!(
                "unknown profile type '{}' (expected one of: cpu, heap, goroutine, mutex, block, allocs, threadcreate)",
                other
            )),
        }
    }
}

/// Immutable description of one profiling session's target.
///
/// Validated up front so that a malformed request fails before any tunnel or
/// port is acquired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRequest {
    /// Kubernetes namespace of the target pod
    pub namespace: String,
    /// Name of the target pod
    pub pod_name: String,
    /// Which profile to capture
    pub profile_type: ProfileType,
    /// Capture duration in seconds (meaningful only for cpu)
    pub duration_seconds: u64,
    /// Local tunnel port; allocated automatically when absent
    pub local_port: Option<u16>,
    /// Port the pprof endpoint listens on inside the pod
    pub pod_port: u16,
}

impl ProfileRequest {
    /// Check the request before any resource is acquired.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("namespace must not be empty".to_string());
        }
        if self.pod_name.trim().is_empty() {
            return Err("pod name must not be empty".to_string());
        }
        if self.profile_type == ProfileType::Cpu && self.duration_seconds == 0 {
            return Err("cpu profile duration must be greater than zero".to_string());
        }
        if self.local_port == Some(0) {
            return Err("local port 0 is not a valid forwarding target".to_string());
        }
        if self.pod_port == 0 {
            return Err("pod port must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A fetched profile payload sitting in a session-owned temp file.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileArtifact {
    pub profile_type: ProfileType,
    /// Full URL the payload was fetched from
    pub source_endpoint: String,
    /// Path of the temporary payload file
    pub path: PathBuf,
    pub byte_size: u64,
    pub fetched_at: DateTime<Utc>,
}

/// One parsed row of the analyzer's ranked function table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// 1-based position in the ranked table
    pub rank: usize,
    /// Flat value normalized to base units (seconds or bytes)
    pub flat_value: f64,
    pub flat_percent: f64,
    /// Cumulative value normalized to base units
    pub cum_value: f64,
    pub cum_percent: f64,
    pub function_name: String,
}

/// Parsed output of one analyzer invocation.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub records: Vec<AnalysisRecord>,
    /// The analyzer's combined output, kept verbatim
    pub raw_text: String,
}

/// A rendered flame graph on disk.
#[derive(Debug, Clone, Serialize)]
pub struct FlameGraphArtifact {
    /// Output format; currently always "svg"
    pub format: String,
    pub path: PathBuf,
}

/// Structured result handed back to the caller for every session, success or
/// failure of individual soft stages included.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub records: Vec<AnalysisRecord>,
    pub raw_text: String,
    /// Path of an exported artifact (flame graph or raw payload), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Soft failures that degraded the report without aborting the session
    pub errors: Vec<String>,
}
