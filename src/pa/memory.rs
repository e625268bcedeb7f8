//! Memory admission control for the replica population.

use crate::error::{AnnealError, AnnealResult};
use sysinfo::System;
use tracing::debug;

/// Currently available system memory in bytes.
pub fn available_memory() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Bytes needed for `population` replicas of `per_replica` bytes each.
pub fn required_memory(per_replica: usize, population: usize) -> u64 {
    (per_replica as u64).saturating_mul(population as u64)
}

/// Fails with [`AnnealError::InsufficientMemory`] when `population`
/// replicas would not fit into `limit` (or the probed available memory).
pub fn check_admission(per_replica: usize, population: usize, limit: Option<u64>) -> AnnealResult<()> {
    let required = required_memory(per_replica, population);
    let available = limit.unwrap_or_else(available_memory);
    debug!(required, available, population, "memory admission check");
    if required > available {
        return Err(AnnealError::InsufficientMemory {
            required,
            available,
        });
    }
    Ok(())
}
