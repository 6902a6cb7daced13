//! Timed HTTP fetch of one profile payload through an established tunnel.
//!
//! The cpu endpoint blocks server-side for the requested number of seconds
//! before answering, so the client timeout is `duration + grace` rather than
//! a flat value: slow servers cannot hang the pipeline, correct long captures
//! are not falsely cut off.

use crate::profiler::types::{ProfileArtifact, ProfileType};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Bounded retry on transient connection refusal, inside the timeout window.
const CONNECT_ATTEMPTS: usize = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Error type for profile fetches.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cpu profile duration must be greater than zero")]
    InvalidDuration,

    #[error("profiling endpoint {endpoint} returned HTTP {status}")]
    Status { status: u16, endpoint: String },

    #[error("fetch from {endpoint} timed out after {seconds}s")]
    Timeout { endpoint: String, seconds: u64 },

    #[error("request to profiling endpoint failed: {0}")]
    Request(reqwest::Error),

    #[error("failed to write profile payload: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetch one profile payload through the tunnel's local port into a uniquely
/// named file under `dir`. `duration_seconds` is only consulted for cpu
/// profiles.
pub async fn fetch(
    local_port: u16,
    profile_type: ProfileType,
    duration_seconds: u64,
    grace: Duration,
    dir: &Path,
) -> Result<ProfileArtifact, FetchError> {
    let (endpoint, timeout) = endpoint_for(local_port, profile_type, duration_seconds, grace)?;

    log::info!(
        "fetching {} profile from {} (timeout {}s)",
        profile_type,
        endpoint,
        timeout.as_secs()
    );

    let client = reqwest::Client::new();
    let mut attempt = 0;
    let response = loop {
        attempt += 1;
        match client.get(&endpoint).timeout(timeout).send().await {
            Ok(response) => break response,
            Err(e) if e.is_timeout() => {
                return Err(FetchError::Timeout {
                    endpoint,
                    seconds: timeout.as_secs(),
                });
            }
            Err(e) if e.is_connect() && attempt < CONNECT_ATTEMPTS => {
                log::debug!(
                    "connection to {} refused (attempt {}/{}), retrying",
                    endpoint,
                    attempt,
                    CONNECT_ATTEMPTS
                );
                tokio::time::sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(FetchError::Request(e)),
        }
    };

    if !response.status().is_success() {
        return Err(FetchError::Status {
            status: response.status().as_u16(),
            endpoint,
        });
    }

    // Unique name so concurrent sessions sharing a directory never collide.
    let path = dir.join(format!("podprof-{}-{}.pb.gz", profile_type, Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&path).await?;
    let mut byte_size = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    endpoint: endpoint.clone(),
                    seconds: timeout.as_secs(),
                }
            } else {
                FetchError::Request(e)
            }
        })?;
        byte_size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    log::info!("fetched {} bytes into {}", byte_size, path.display());

    Ok(ProfileArtifact {
        profile_type,
        source_endpoint: endpoint,
        path,
        byte_size,
        fetched_at: chrono::Utc::now(),
    })
}

/// Map a profile type to its endpoint URL and the client-side timeout for the
/// request.
fn endpoint_for(
    local_port: u16,
    profile_type: ProfileType,
    duration_seconds: u64,
    grace: Duration,
) -> Result<(String, Duration), FetchError> {
    let base = format!(
        "http://127.0.0.1:{}/debug/pprof/{}",
        local_port,
        profile_type.endpoint_path()
    );
    match profile_type {
        ProfileType::Cpu => {
            if duration_seconds == 0 {
                return Err(FetchError::InvalidDuration);
            }
            Ok((
                format!("{}?seconds={}", base, duration_seconds),
                Duration::from_secs(duration_seconds) + grace,
            ))
        }
        _ => Ok((base, grace)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(15);

    #[test]
    fn cpu_endpoint_carries_duration_and_padded_timeout() {
        let (endpoint, timeout) = endpoint_for(18080, ProfileType::Cpu, 30, GRACE).unwrap();
        assert_eq!(endpoint, "http://127.0.0.1:18080/debug/pprof/profile?seconds=30");
        assert_eq!(timeout, Duration::from_secs(45));
    }

    #[test]
    fn point_in_time_profiles_use_bare_paths() {
        for (profile_type, path) in [
            (ProfileType::Heap, "heap"),
            (ProfileType::Goroutine, "goroutine"),
            (ProfileType::Mutex, "mutex"),
            (ProfileType::Block, "block"),
            (ProfileType::Allocs, "allocs"),
            (ProfileType::Threadcreate, "threadcreate"),
        ] {
            let (endpoint, timeout) = endpoint_for(6060, profile_type, 30, GRACE).unwrap();
            assert_eq!(endpoint, format!("http://127.0.0.1:6060/debug/pprof/{}", path));
            assert_eq!(timeout, GRACE);
        }
    }

    #[test]
    fn zero_duration_cpu_fetch_is_rejected() {
        assert!(matches!(
            endpoint_for(6060, ProfileType::Cpu, 0, GRACE),
            Err(FetchError::InvalidDuration)
        ));
    }
}
