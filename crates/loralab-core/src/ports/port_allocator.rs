//! Port allocator port.

use crate::error::PortExhausted;

/// Finds a free local TCP port for the compute service.
pub trait PortAllocator: Send + Sync {
    /// Return the lowest free port in `preferred..preferred + range`.
    ///
    /// Probing is sequential and deterministic; a `range` of zero always fails.
    fn allocate(&self, preferred: u16, range: u16) -> Result<u16, PortExhausted>;
}
