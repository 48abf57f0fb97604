//! Process-scoped identifier generation.
//!
//! The source relies on an implicit, statically-constructed UID
//! singleton. Here the generator is an explicit value the caller
//! constructs once (typically as part of a [`crate::pipeline::Pipeline`])
//! and shares via `Arc`, so there is no reliance on static initialization
//! order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates 64-bit identifiers derived from (process-id low bits,
/// start-time low bits, sequential counter), matching the scheme
/// described in the design notes.
#[derive(Debug)]
pub struct UidGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl UidGenerator {
    pub fn new() -> Self {
        let pid = std::process::id() as u64;
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            seed: (pid & 0xFFFF) << 48 | (start & 0xFFFF_FFFF_FFFF),
            counter: AtomicU64::new(0),
        }
    }

    /// Returns a fresh, process-unique identifier.
    pub fn next(&self) -> u64 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.seed ^ n
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new()
    }
}
