//! # Profiler Module
//!
//! The profile acquisition and analysis pipeline: tunnel lifecycle, timed
//! payload fetch, external analyzer invocation, flame graph rendering, and
//! the session orchestration that guarantees teardown on every exit path.

pub mod fetch;
pub mod flamegraph;
pub mod pod_status;
pub mod ports;
pub mod pprof;
pub mod session;
pub mod tunnel;
pub mod types;

pub use session::{Operation, Session, SessionError, SessionLimits, SessionOptions};
pub use types::{ProfileReport, ProfileRequest, ProfileType};
