use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Defaults applied to profile requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Port the pprof endpoint conventionally listens on inside the pod
    pub default_pod_port: u16,
    /// Default cpu capture duration in seconds
    pub default_duration_seconds: u64,
    /// Default number of ranked functions requested from the analyzer
    pub default_top_n: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            default_pod_port: 6060,
            default_duration_seconds: 30,
            default_top_n: 15,
        }
    }
}

/// Timeouts for tunnel readiness and the downstream stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// How long to wait for the local port to accept connections
    pub ready_timeout_seconds: u64,
    /// Added to the capture duration for the fetch's client-side timeout
    pub fetch_grace_seconds: u64,
    /// Upper bound on any single analyzer invocation
    pub tool_timeout_seconds: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ready_timeout_seconds: 5,
            fetch_grace_seconds: 15,
            tool_timeout_seconds: 60,
        }
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Analyzer command prefix; split on whitespace into argv
    pub pprof_command: String,
    /// Port-forward command prefix; split on whitespace into argv. Supports
    /// wrappers such as `minikube kubectl --`.
    pub kubectl_command: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pprof_command: "go tool pprof".to_string(),
            kubectl_command: "kubectl".to_string(),
        }
    }
}
