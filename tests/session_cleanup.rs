//! Resource-release properties of the session pipeline.
//!
//! These tests exercise the paths that must never leak a port, a tunnel
//! subprocess, or a temporary profile file, without requiring a live
//! cluster: invalid input rejected before acquisition, cancellation running
//! teardown before reporting, and full runs against a local stand-in
//! endpoint on both the success and the analyzer-failure path.

use podprof::config::types::Config;
use podprof::profiler::ports::PORTS;
use podprof::profiler::{
    Operation, ProfileRequest, ProfileType, Session, SessionError, SessionLimits, SessionOptions,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const PROFILE_BODY: &[u8] = b"fake-profile-payload";

fn request(profile_type: ProfileType, duration: u64) -> ProfileRequest {
    ProfileRequest {
        namespace: "default".to_string(),
        pod_name: "app-1".to_string(),
        profile_type,
        duration_seconds: duration,
        local_port: None,
        pod_port: 6060,
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        operation: Operation::Profile { flamegraph: false },
        probe: false,
        top_n: 15,
        export: None,
    }
}

fn limits() -> SessionLimits {
    SessionLimits::from_config(&Config::default())
}

// Stand-ins that need no cluster: the forwarder just stays alive (the local
// listener provides readiness), and the analyzer is whatever shell command
// the scenario needs.
fn stand_in_limits(analyzer: &str) -> SessionLimits {
    let mut limits = limits();
    limits.kubectl_command = vec!["sh".to_string(), "-c".to_string(), "sleep 30".to_string()];
    limits.pprof_command = vec![analyzer.to_string()];
    limits.ready_timeout = Duration::from_secs(10);
    limits
}

fn free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .expect("bind to an ephemeral port")
        .local_addr()
        .expect("listener address")
        .port()
}

// The allocator is process-global and tests run in parallel, so release is
// verified by re-claiming the specific port rather than by comparing totals.
fn assert_port_free(port: u16) {
    PORTS
        .acquire_specific(port)
        .expect("port must be free after the session");
    PORTS.release(port);
}

/// Minimal HTTP endpoint standing in for a pod's pprof server. Binds only
/// after a short delay so the session's port claim does not collide with the
/// listener, then answers every request with a canned payload.
async fn serve_profiles(port: u16) {
    tokio::time::sleep(Duration::from_millis(150)).await;
    let listener = loop {
        match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => break listener,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 1024];
        // Readiness probes connect and hang up without sending anything.
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => continue,
            Ok(_) => {}
        }
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            PROFILE_BODY.len()
        );
        let _ = socket.write_all(header.as_bytes()).await;
        let _ = socket.write_all(PROFILE_BODY).await;
        let _ = socket.shutdown().await;
    }
}

/// Session working directories left in the system temp location.
fn session_temp_dirs() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("podprof-"))
        })
        .collect();
    dirs.sort();
    dirs
}

#[tokio::test]
async fn zero_duration_cpu_request_has_no_side_effects() {
    let port = free_port();
    let mut req = request(ProfileType::Cpu, 0);
    req.local_port = Some(port);
    let session = Session::new(req, options(), limits());
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidRequest(_)));
    assert_port_free(port);
}

#[tokio::test]
async fn blank_pod_name_has_no_side_effects() {
    let port = free_port();
    let mut req = request(ProfileType::Heap, 30);
    req.pod_name = " ".to_string();
    req.local_port = Some(port);
    let session = Session::new(req, options(), limits());
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidRequest(_)));
    assert_port_free(port);
}

#[tokio::test]
async fn cancellation_before_the_tunnel_stage_releases_nothing_it_did_not_take() {
    let port = free_port();
    let mut req = request(ProfileType::Goroutine, 30);
    req.local_port = Some(port);
    let session = Session::new(req, options(), limits());
    session.abort_flag().store(true, Ordering::SeqCst);
    let err = session.run().await.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled { .. }));
    assert_port_free(port);
}

#[tokio::test]
async fn concurrent_sessions_with_invalid_input_do_not_interfere() {
    let a = Session::new(request(ProfileType::Cpu, 0), options(), limits());
    let b = Session::new(request(ProfileType::Cpu, 0), options(), limits());
    let (ra, rb) = tokio::join!(a.run(), b.run());
    assert!(matches!(ra, Err(SessionError::InvalidRequest(_))));
    assert!(matches!(rb, Err(SessionError::InvalidRequest(_))));
}

// Both scenarios run in one test so the temp-directory scan cannot observe
// the other one mid-flight.
#[tokio::test]
async fn temporary_profile_files_are_removed_on_success_and_on_analyzer_failure() {
    let dirs_before = session_temp_dirs();

    // Success path: the analyzer exits zero but emits no ranked table, which
    // degrades to a raw-text report. The exported payload must survive the
    // session; its working files must not.
    let export_dir = tempfile::tempdir().expect("export dir");
    let dest = export_dir.path().join("goroutine.pb.gz");
    let port = free_port();
    let server = tokio::spawn(serve_profiles(port));

    let mut req = request(ProfileType::Goroutine, 30);
    req.local_port = Some(port);
    let mut opts = options();
    opts.export = Some(dest.clone());
    let report = Session::new(req, opts, stand_in_limits("echo"))
        .run()
        .await
        .expect("a missing table must degrade, not fail the session");
    // Wait for the cancellation so the listener has released the port.
    server.abort();
    let _ = server.await;

    assert!(report.records.is_empty());
    assert!(!report.errors.is_empty(), "degradation must be reported");
    assert_eq!(report.artifact_path.as_deref(), Some(dest.as_path()));
    assert_eq!(std::fs::read(&dest).expect("exported artifact"), PROFILE_BODY);
    assert_port_free(port);

    // Failure path: the analyzer exits nonzero, the session errors, and
    // teardown still removes every working file.
    let port = free_port();
    let server = tokio::spawn(serve_profiles(port));
    let mut req = request(ProfileType::Heap, 30);
    req.local_port = Some(port);
    let err = Session::new(req, options(), stand_in_limits("false"))
        .run()
        .await
        .unwrap_err();
    server.abort();
    let _ = server.await;

    assert!(matches!(err, SessionError::Analyze(_)));
    assert_port_free(port);

    assert_eq!(
        session_temp_dirs(),
        dirs_before,
        "session working directories must be removed on every exit path"
    );
}
