use crate::common::command_utils;
use crate::config::types::Config;
use crate::error::{PodProfError, Result};
use crate::profiler::types::ProfileReport;
use crate::profiler::{
    Operation, ProfileRequest, ProfileType, Session, SessionLimits, SessionOptions,
};
use colored::Colorize;
use prettytable::{Table, row};
use std::path::PathBuf;

/// Everything one profiling operation needs beyond the config defaults.
pub struct ProfileOptions {
    pub pod: String,
    pub namespace: String,
    pub profile_type: ProfileType,
    pub duration: Option<u64>,
    pub top: Option<usize>,
    pub local_port: Option<u16>,
    pub pod_port: Option<u16>,
    pub probe: bool,
    pub flamegraph: bool,
    pub output: Option<PathBuf>,
}

/// Run one profiling session end to end and print the report.
pub async fn handle_profile(options: ProfileOptions, config: &Config, json: bool) -> Result<()> {
    let forwarder = config
        .tools
        .kubectl_command
        .split_whitespace()
        .next()
        .unwrap_or("kubectl")
        .to_string();
    if !command_utils::is_command_available(&forwarder, &["version", "--client"]) {
        return Err(PodProfError::MissingTool(forwarder));
    }

    let request = ProfileRequest {
        namespace: options.namespace,
        pod_name: options.pod,
        profile_type: options.profile_type,
        duration_seconds: options
            .duration
            .unwrap_or(config.profile.default_duration_seconds),
        local_port: options.local_port,
        pod_port: options.pod_port.unwrap_or(config.profile.default_pod_port),
    };

    // The flame graph operation always retains its SVG; default the export
    // path so the rendered file survives session teardown.
    let export = if options.flamegraph {
        Some(options.output.unwrap_or_else(|| {
            PathBuf::from(format!(
                "{}-{}.svg",
                request.pod_name, request.profile_type
            ))
        }))
    } else {
        options.output
    };

    let session_options = SessionOptions {
        operation: Operation::Profile {
            flamegraph: options.flamegraph,
        },
        probe: options.probe,
        top_n: options.top.unwrap_or(config.profile.default_top_n),
        export,
    };

    if !json {
        println!(
            "Profiling {} of pod/{} in namespace {}...",
            request.profile_type, request.pod_name, request.namespace
        );
    }

    let session = Session::new(request, session_options, SessionLimits::from_config(config));
    let report = session.run().await?;

    print_report(&report, json)?;
    Ok(())
}

fn print_report(report: &ProfileReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.records.is_empty() {
        // Parse degraded (or the table was empty): show the analyzer output
        // verbatim so the caller still gets something actionable.
        println!("{}", report.raw_text);
    } else {
        let mut table = Table::new();
        table.add_row(row!["RANK", "FLAT", "FLAT%", "CUM", "CUM%", "FUNCTION"]);
        for record in &report.records {
            table.add_row(row![
                record.rank,
                format!("{:.4}", record.flat_value),
                format!("{:.2}", record.flat_percent),
                format!("{:.4}", record.cum_value),
                format!("{:.2}", record.cum_percent),
                record.function_name,
            ]);
        }
        table.printstd();
    }

    if let Some(path) = &report.artifact_path {
        println!("{} {}", "Artifact written to".green(), path.display());
    }

    for error in &report.errors {
        eprintln!("{} {}", "warning:".yellow(), error);
    }

    Ok(())
}
