//! Local port allocation for tunnel endpoints.
//!
//! The allocator is the one piece of state shared between concurrent
//! sessions; `acquire`/`release` are serialized through a single lock so two
//! sessions can never be handed the same port. A port stays tracked until it
//! is released by session teardown.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::TcpListener;

/// Bound on ephemeral-port probe attempts before giving up.
const MAX_PROBE_ATTEMPTS: usize = 16;

/// Global allocator shared by all sessions in this process.
pub static PORTS: Lazy<PortAllocator> = Lazy::new(PortAllocator::new);

/// Error type for port allocation.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("no free local port after {0} probe attempts")]
    ResourceExhausted(usize),

    #[error("local port {0} is already allocated to another session")]
    InUse(u16),

    #[error("local port {port} could not be bound: {source}")]
    Unavailable {
        port: u16,
        source: std::io::Error,
    },
}

/// Hands out free local ports and reclaims them on release.
pub struct PortAllocator {
    allocated: Mutex<HashSet<u16>>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PortAllocator {
    pub fn new() -> Self {
        Self {
            allocated: Mutex::new(HashSet::new()),
        }
    }

    /// Pick an ephemeral port the OS reports as free and not already tracked.
    pub fn acquire(&self) -> Result<u16, PortError> {
        let mut allocated = self.allocated.lock();
        for _ in 0..MAX_PROBE_ATTEMPTS {
            let port = match TcpListener::bind(("127.0.0.1", 0)) {
                Ok(listener) => match listener.local_addr() {
                    Ok(addr) => addr.port(),
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            // The probe listener is dropped here; kubectl re-binds the port.
            if allocated.insert(port) {
                log::debug!("allocated local port {}", port);
                return Ok(port);
            }
        }
        Err(PortError::ResourceExhausted(MAX_PROBE_ATTEMPTS))
    }

    /// Claim a caller-chosen port, verifying it is both untracked and
    /// bindable.
    pub fn acquire_specific(&self, port: u16) -> Result<u16, PortError> {
        let mut allocated = self.allocated.lock();
        if allocated.contains(&port) {
            return Err(PortError::InUse(port));
        }
        TcpListener::bind(("127.0.0.1", port))
            .map_err(|source| PortError::Unavailable { port, source })?;
        allocated.insert(port);
        log::debug!("allocated requested local port {}", port);
        Ok(port)
    }

    /// Return a port to the pool. Idempotent: releasing an unknown or
    /// already-released port is a no-op, so both success and failure cleanup
    /// paths may call it.
    pub fn release(&self, port: u16) {
        if self.allocated.lock().remove(&port) {
            log::debug!("released local port {}", port);
        }
    }

    /// Number of ports currently tracked as allocated.
    pub fn in_use(&self) -> usize {
        self.allocated.lock().len()
    }
}
