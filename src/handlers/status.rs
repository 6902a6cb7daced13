use crate::config::types::Config;
use crate::error::Result;
use crate::profiler::pod_status::PodStatus;
use crate::profiler::{
    Operation, ProfileRequest, ProfileType, Session, SessionLimits, SessionOptions,
};
use colored::Colorize;

/// Query and print a pod's status without opening a tunnel.
///
/// The status operation runs through the same session state machine as the
/// profiling operations; only the probe stage executes.
pub async fn handle_status(
    pod: String,
    namespace: String,
    config: &Config,
    json: bool,
) -> Result<()> {
    let request = ProfileRequest {
        namespace,
        pod_name: pod,
        profile_type: ProfileType::Goroutine,
        duration_seconds: config.profile.default_duration_seconds,
        local_port: None,
        pod_port: config.profile.default_pod_port,
    };
    let options = SessionOptions {
        operation: Operation::Status,
        probe: true,
        top_n: config.profile.default_top_n,
        export: None,
    };
    let session = Session::new(request, options, SessionLimits::from_config(config));
    let report = session.run().await?;

    if json {
        println!("{}", report.raw_text);
        return Ok(());
    }

    let status: PodStatus = serde_json::from_str(&report.raw_text)?;
    let phase = if status.is_running() {
        status.phase.green()
    } else {
        status.phase.red()
    };
    println!("pod/{} in namespace {}", status.pod_name, status.namespace);
    println!("  phase:    {}", phase);
    println!("  ready:    {}", status.ready);
    println!("  restarts: {}", status.restart_count);
    if !status.conditions.is_empty() {
        println!("  conditions:");
        for condition in &status.conditions {
            let mut line = format!("    {} = {}", condition.kind, condition.status);
            if let Some(reason) = &condition.reason {
                line.push_str(&format!(" ({})", reason));
            }
            println!("{}", line);
        }
    }
    Ok(())
}
