//! # Podprof CLI
//!
//! A Rust-based command-line application that profiles processes running
//! inside Kubernetes pods. It opens a temporary `kubectl port-forward`
//! tunnel to the pod's pprof endpoint, captures a time-boxed profile
//! payload, drives the external `go tool pprof` analyzer against it, and
//! reports a ranked function table or an SVG flame graph.
//!
//! ## Features
//!
//! - **Seven profile types**: cpu, heap, goroutine, mutex, block, allocs,
//!   threadcreate
//! - **Guaranteed teardown**: tunnel subprocesses, local ports, and temp
//!   files are released on every exit path, including failure
//! - **Soft parse failures**: analyzer output-format drift degrades to the
//!   raw text report instead of failing the session
//! - **Pre-flight probe**: an optional pod status check fails fast before a
//!   tunnel is wasted on a dead pod
//!
//! ## Example
//!
//! ```rust,no_run
//! use podprof::config::types::Config;
//! use podprof::profiler::{
//!     Operation, ProfileRequest, ProfileType, Session, SessionLimits, SessionOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = ProfileRequest {
//!     namespace: "default".to_string(),
//!     pod_name: "app-1".to_string(),
//!     profile_type: ProfileType::Goroutine,
//!     duration_seconds: 30,
//!     local_port: None,
//!     pod_port: 6060,
//! };
//! let options = SessionOptions {
//!     operation: Operation::Profile { flamegraph: false },
//!     probe: true,
//!     top_n: 15,
//!     export: None,
//! };
//! let limits = SessionLimits::from_config(&Config::default());
//! let report = Session::new(request, options, limits).run().await?;
//! println!("{} hot functions", report.records.len());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod common;
pub mod config;
pub mod error;
pub mod handlers;
pub mod profiler;

// Re-export commonly used types and functions
pub use error::{PodProfError, Result};
pub use profiler::{ProfileReport, ProfileRequest, ProfileType, Session};
use cli::Commands;
use config::types::Config;
use handlers::ProfileOptions;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run_command(command: Commands, config: &Config, json: bool) -> Result<()> {
    match command {
        Commands::Cpu {
            pod,
            namespace,
            duration,
            top,
            local_port,
            pod_port,
            probe,
            flamegraph,
            output,
        } => {
            handlers::handle_profile(
                ProfileOptions {
                    pod,
                    namespace,
                    profile_type: ProfileType::Cpu,
                    duration,
                    top,
                    local_port,
                    pod_port,
                    probe,
                    flamegraph,
                    output,
                },
                config,
                json,
            )
            .await
        }
        Commands::Heap {
            pod,
            namespace,
            top,
            local_port,
            pod_port,
            probe,
            output,
        } => {
            handlers::handle_profile(
                ProfileOptions {
                    pod,
                    namespace,
                    profile_type: ProfileType::Heap,
                    duration: None,
                    top,
                    local_port,
                    pod_port,
                    probe,
                    flamegraph: false,
                    output,
                },
                config,
                json,
            )
            .await
        }
        Commands::Goroutine {
            pod,
            namespace,
            top,
            local_port,
            pod_port,
            probe,
            output,
        } => {
            handlers::handle_profile(
                ProfileOptions {
                    pod,
                    namespace,
                    profile_type: ProfileType::Goroutine,
                    duration: None,
                    top,
                    local_port,
                    pod_port,
                    probe,
                    flamegraph: false,
                    output,
                },
                config,
                json,
            )
            .await
        }
        Commands::Profile {
            pod,
            profile_type,
            namespace,
            duration,
            top,
            local_port,
            pod_port,
            probe,
            output,
        } => {
            handlers::handle_profile(
                ProfileOptions {
                    pod,
                    namespace,
                    profile_type,
                    duration,
                    top,
                    local_port,
                    pod_port,
                    probe,
                    flamegraph: false,
                    output,
                },
                config,
                json,
            )
            .await
        }
        Commands::Flamegraph {
            pod,
            profile_type,
            namespace,
            duration,
            local_port,
            pod_port,
            output,
        } => {
            handlers::handle_profile(
                ProfileOptions {
                    pod,
                    namespace,
                    profile_type,
                    duration,
                    top: None,
                    local_port,
                    pod_port,
                    probe: false,
                    flamegraph: true,
                    output,
                },
                config,
                json,
            )
            .await
        }
        Commands::Status { pod, namespace } => {
            handlers::handle_status(pod, namespace, config, json).await
        }
    }
}
