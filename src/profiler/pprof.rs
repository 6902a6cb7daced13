//! External analyzer invocation and "top" output parsing.
//!
//! The analyzer's tabular output is an unstable text protocol: the table is
//! located by its header row and parsed best-effort. When the header cannot
//! be found (format drift, truncated output) the parse fails softly —
//! [`AnalyzeError::Parse`] still carries the full raw text so the caller is
//! not left with nothing.

use crate::profiler::types::{AnalysisRecord, AnalysisReport, ProfileArtifact};
use std::time::Duration;
use tokio::process::Command;

/// Error type for analyzer invocations.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("failed to invoke profile analyzer: {0}")]
    Invoke(std::io::Error),

    #[error("profile analyzer exited with status {status}{stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("profile analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not locate the ranked function table in analyzer output")]
    Parse {
        /// Combined analyzer output, unchanged.
        raw: String,
    },
}

/// Run the analyzer's ranked "top" view against a fetched payload.
///
/// `command` is the analyzer argv prefix (conventionally `go tool pprof`);
/// `top_n` bounds the number of table rows requested.
pub async fn analyze(
    command: &[String],
    artifact: &ProfileArtifact,
    top_n: usize,
    timeout: Duration,
) -> Result<AnalysisReport, AnalyzeError> {
    let (program, prefix_args) = command
        .split_first()
        .ok_or_else(|| AnalyzeError::Invoke(std::io::Error::other("empty analyzer command")))?;

    log::info!(
        "analyzing {} with `{} -top -nodecount={}`",
        artifact.path.display(),
        command.join(" "),
        top_n
    );

    let mut cmd = Command::new(program);
    cmd.args(prefix_args)
        .arg("-top")
        .arg(format!("-nodecount={}", top_n))
        .arg(&artifact.path);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| AnalyzeError::Timeout(timeout))?
        .map_err(AnalyzeError::Invoke)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        let stderr = stderr.trim();
        return Err(AnalyzeError::ToolFailed {
            status: output.status.code().unwrap_or(-1),
            stderr: if stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr)
            },
        });
    }

    let raw = if stderr.trim().is_empty() {
        stdout.into_owned()
    } else {
        format!("{}\n{}", stdout.trim_end(), stderr.trim_end())
    };

    match parse_top(&raw) {
        Some(records) => {
            log::debug!("parsed {} ranked function records", records.len());
            Ok(AnalysisReport {
                records,
                raw_text: raw,
            })
        }
        None => Err(AnalyzeError::Parse { raw }),
    }
}

/// Parse the ranked function table out of the analyzer's combined output.
/// Returns `None` when the header row cannot be located.
pub fn parse_top(raw: &str) -> Option<Vec<AnalysisRecord>> {
    let mut lines = raw.lines();
    lines.by_ref().find(|line| is_header(line))?;

    let mut records = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        // flat, flat%, sum%, cum, cum%, then the function name (which may
        // itself contain spaces).
        if fields.len() < 6 {
            log::warn!("skipping short table row: {:?}", line);
            continue;
        }
        let parsed = (
            parse_metric(fields[0]),
            parse_metric(fields[1]),
            parse_metric(fields[3]),
            parse_metric(fields[4]),
        );
        let (Some(flat_value), Some(flat_percent), Some(cum_value), Some(cum_percent)) = parsed
        else {
            log::warn!("skipping unparsable table row: {:?}", line);
            continue;
        };
        records.push(AnalysisRecord {
            rank: records.len() + 1,
            flat_value,
            flat_percent,
            cum_value,
            cum_percent,
            function_name: fields[5..].join(" "),
        });
    }
    Some(records)
}

fn is_header(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("flat") && line.contains("flat%") && line.contains("cum%")
}

/// Normalize one numeric table field: percent signs stripped, size suffixes
/// converted to bytes, duration suffixes to seconds, bare numbers passed
/// through.
pub(crate) fn parse_metric(field: &str) -> Option<f64> {
    let field = field.trim();
    if let Some(percent) = field.strip_suffix('%') {
        return percent.parse().ok();
    }

    // pprof sizes use binary multiples.
    const KB: f64 = 1024.0;
    const SUFFIXES: &[(&str, f64)] = &[
        ("ns", 1e-9),
        ("us", 1e-6),
        ("\u{b5}s", 1e-6),
        ("ms", 1e-3),
        ("s", 1.0),
        ("mins", 60.0),
        ("hrs", 3600.0),
        ("B", 1.0),
        ("kB", KB),
        ("MB", KB * KB),
        ("GB", KB * KB * KB),
        ("TB", KB * KB * KB * KB),
        ("PB", KB * KB * KB * KB * KB),
    ];
    for (suffix, scale) in SUFFIXES {
        if let Some(prefix) = field.strip_suffix(suffix) {
            if let Ok(value) = prefix.parse::<f64>() {
                return Some(value * scale);
            }
        }
    }

    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::types::ProfileType;
    use std::path::PathBuf;

    fn artifact() -> ProfileArtifact {
        ProfileArtifact {
            profile_type: ProfileType::Cpu,
            source_endpoint: "http://127.0.0.1:6060/debug/pprof/profile?seconds=30".to_string(),
            path: PathBuf::from("/nonexistent/profile.pb.gz"),
            byte_size: 0,
            fetched_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn nonzero_analyzer_exit_carries_its_stderr() {
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo boom >&2; exit 3".to_string(),
        ];
        let err = analyze(&command, &artifact(), 5, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            AnalyzeError::ToolFailed { status, stderr } => {
                assert_eq!(status, 3);
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }

    const CPU_TOP: &str = "\
File: app
Type: cpu
Duration: 30.01s, Total samples = 25.40s (84.64%)
Showing nodes accounting for 24.91s, 98.07% of 25.40s total
Dropped 12 nodes (cum <= 0.13s)
      flat  flat%   sum%        cum   cum%
    12.50s 49.21% 49.21%     12.60s 49.61%  main.compute
     5.20s 20.47% 69.69%      5.20s 20.47%  runtime.memmove
     3.10s 12.20% 81.89%      8.90s 35.04%  main.(*Server).handle
";

    #[test]
    fn parses_a_pinned_cpu_top_sample() {
        let records = parse_top(CPU_TOP).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].rank, 1);
        assert_eq!(records[0].flat_value, 12.5);
        assert_eq!(records[0].flat_percent, 49.21);
        assert_eq!(records[0].cum_value, 12.6);
        assert_eq!(records[0].cum_percent, 49.61);
        assert_eq!(records[0].function_name, "main.compute");

        assert_eq!(records[2].rank, 3);
        assert_eq!(records[2].function_name, "main.(*Server).handle");
    }

    #[test]
    fn table_parsing_stops_at_a_blank_line() {
        let sample = format!("{}\nDropped trailing section\n", CPU_TOP.trim_end().to_owned() + "\n\n");
        let records = parse_top(&sample).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn missing_header_fails_the_parse() {
        let sample = "File: app\nType: cpu\nsomething unexpected\n";
        assert!(parse_top(sample).is_none());
    }

    #[test]
    fn size_suffixes_normalize_to_bytes() {
        assert_eq!(parse_metric("512B"), Some(512.0));
        assert_eq!(parse_metric("512.50kB"), Some(512.5 * 1024.0));
        assert_eq!(parse_metric("1.5MB"), Some(1.5 * 1024.0 * 1024.0));
        assert_eq!(parse_metric("2GB"), Some(2.0 * 1024.0 * 1024.0 * 1024.0));
    }

    #[test]
    fn duration_suffixes_normalize_to_seconds() {
        assert_eq!(parse_metric("30.01s"), Some(30.01));
        assert_eq!(parse_metric("250ms"), Some(0.25));
        assert_eq!(parse_metric("10us"), Some(1e-5));
        assert_eq!(parse_metric("10\u{b5}s"), Some(1e-5));
        assert_eq!(parse_metric("40ns"), Some(4e-8));
        assert_eq!(parse_metric("2mins"), Some(120.0));
    }

    #[test]
    fn percents_and_bare_counts_pass_through() {
        assert_eq!(parse_metric("49.21%"), Some(49.21));
        assert_eq!(parse_metric("25"), Some(25.0));
        assert_eq!(parse_metric("garbage"), None);
    }
}
