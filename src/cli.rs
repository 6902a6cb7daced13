use crate::profiler::ProfileType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "podprof")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Profile processes running inside Kubernetes pods")]
#[command(
    long_about = "Profiles a running process inside a Kubernetes pod through its pprof endpoint: opens a temporary port-forward tunnel, captures a profile, analyzes it with the external pprof tool, and reports the ranked function table or a flame graph."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format where applicable
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture and analyze a CPU profile
    Cpu {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Capture duration in seconds (the endpoint blocks this long)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Number of ranked functions to report
        #[arg(long)]
        top: Option<usize>,

        /// Local port for the tunnel (allocated automatically when omitted)
        #[arg(long)]
        local_port: Option<u16>,

        /// Port the pprof endpoint listens on inside the pod
        #[arg(long)]
        pod_port: Option<u16>,

        /// Check pod status before opening the tunnel
        #[arg(long)]
        probe: bool,

        /// Also render an SVG flame graph next to the report
        #[arg(long)]
        flamegraph: bool,

        /// Export the captured artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture and analyze a heap profile
    Heap {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Number of ranked functions to report
        #[arg(long)]
        top: Option<usize>,

        /// Local port for the tunnel (allocated automatically when omitted)
        #[arg(long)]
        local_port: Option<u16>,

        /// Port the pprof endpoint listens on inside the pod
        #[arg(long)]
        pod_port: Option<u16>,

        /// Check pod status before opening the tunnel
        #[arg(long)]
        probe: bool,

        /// Export the captured artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture and analyze a goroutine profile
    Goroutine {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Number of ranked functions to report
        #[arg(long)]
        top: Option<usize>,

        /// Local port for the tunnel (allocated automatically when omitted)
        #[arg(long)]
        local_port: Option<u16>,

        /// Port the pprof endpoint listens on inside the pod
        #[arg(long)]
        pod_port: Option<u16>,

        /// Check pod status before opening the tunnel
        #[arg(long)]
        probe: bool,

        /// Export the captured artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Capture and analyze any supported profile type
    Profile {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Profile type to capture
        #[arg(short = 't', long = "type", value_enum)]
        profile_type: ProfileType,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Capture duration in seconds (cpu only)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Number of ranked functions to report
        #[arg(long)]
        top: Option<usize>,

        /// Local port for the tunnel (allocated automatically when omitted)
        #[arg(long)]
        local_port: Option<u16>,

        /// Port the pprof endpoint listens on inside the pod
        #[arg(long)]
        pod_port: Option<u16>,

        /// Check pod status before opening the tunnel
        #[arg(long)]
        probe: bool,

        /// Export the captured artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render an SVG flame graph for a captured profile
    Flamegraph {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Profile type to capture
        #[arg(short = 't', long = "type", value_enum, default_value = "cpu")]
        profile_type: ProfileType,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Capture duration in seconds (cpu only)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Local port for the tunnel (allocated automatically when omitted)
        #[arg(long)]
        local_port: Option<u16>,

        /// Port the pprof endpoint listens on inside the pod
        #[arg(long)]
        pod_port: Option<u16>,

        /// Where to write the SVG (defaults to ./<pod>-<type>.svg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the pod's phase, readiness, and conditions
    Status {
        /// Name of the target pod
        #[arg(value_name = "POD")]
        pod: String,

        /// Kubernetes namespace of the pod
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
