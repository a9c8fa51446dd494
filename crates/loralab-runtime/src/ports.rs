//! Port allocation for the compute service.

use std::net::TcpListener;

use loralab_core::{PortAllocator, PortExhausted};
use tracing::debug;

/// Check if a port is available by attempting to bind to it.
/// The listener is dropped immediately, which releases the port.
pub fn is_port_available(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener.local_addr().is_ok(),
        Err(_) => false,
    }
}

/// Allocate the lowest free port in `preferred..preferred + range`.
///
/// Ports are probed in ascending order; the result is never randomised so
/// logs and manual debugging stay predictable.
pub fn allocate_port(preferred: u16, range: u16) -> Result<u16, PortExhausted> {
    let last = preferred.saturating_add(range.saturating_sub(1));

    if range == 0 {
        return Err(PortExhausted {
            first: preferred,
            last: preferred,
        });
    }

    for port in preferred..=last {
        if is_port_available(port) {
            debug!(port = %port, "Allocated available port");
            return Ok(port);
        }
        debug!(port = %port, "Port unavailable on system, skipping");
    }

    Err(PortExhausted {
        first: preferred,
        last,
    })
}

/// [`PortAllocator`] probing the local TCP stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortAllocator;

impl PortAllocator for TcpPortAllocator {
    fn allocate(&self, preferred: u16, range: u16) -> Result<u16, PortExhausted> {
        allocate_port(preferred, range)
    }
}
