//! Pre-flight capacity planning for inference requests
//!
//! Sizes every input/output tensor buffer a request will need before any
//! grant is issued. This enables fail-fast admission: if the aggregate
//! does not fit a pool's headroom, the request can be rejected up front
//! instead of failing halfway through its allocations.

use crate::arena::ArenaManager;
use crate::config::{PoolKind, DEFAULT_ALIGNMENT};
use crate::error::MemResult;

/// Aggregates the aligned byte sizes of a request's tensor buffers
///
/// # Example
/// ```ignore
/// let mut planner = CapacityPlanner::new();
/// planner.add_tensor("input_ids".to_string(), 2048, 4);
/// planner.add_tensor("logits".to_string(), 32000 * 8, 4);
///
/// if planner.fits(&manager, PoolKind::Device, 0)? {
///     // issue the individual allocations
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CapacityPlanner {
    buffer_sizes: Vec<(String, usize)>,
    alignment: usize,
}

impl CapacityPlanner {
    /// Create a planner using the default grant alignment
    pub fn new() -> Self {
        Self {
            buffer_sizes: Vec::new(),
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Create a planner with a custom alignment
    ///
    /// Must match the alignment of the manager the plan is checked
    /// against, otherwise totals underestimate the real grants.
    pub fn with_alignment(alignment: usize) -> Self {
        Self {
            buffer_sizes: Vec::new(),
            alignment,
        }
    }

    /// Add a tensor buffer to the plan
    ///
    /// # Arguments
    /// * `name` - Buffer name (for logging)
    /// * `element_count` - Number of elements
    /// * `element_size` - Size of each element in bytes (e.g. 4 for f32)
    pub fn add_tensor(&mut self, name: String, element_count: usize, element_size: usize) {
        let bytes = element_count.saturating_mul(element_size);
        self.add_bytes(name, bytes);
    }

    /// Add a raw byte count to the plan
    ///
    /// The size is rounded up to the alignment boundary, matching what
    /// the pool will actually carve out.
    pub fn add_bytes(&mut self, name: String, bytes: usize) {
        let aligned = (bytes + self.alignment - 1) & !(self.alignment - 1);
        self.buffer_sizes.push((name, aligned));
    }

    /// Total bytes the plan will request
    pub fn total_bytes(&self) -> usize {
        self.buffer_sizes.iter().map(|(_, size)| size).sum()
    }

    /// Number of buffers planned
    pub fn buffer_count(&self) -> usize {
        self.buffer_sizes.len()
    }

    /// Individual buffer sizes (for logging)
    pub fn buffer_sizes(&self) -> &[(String, usize)] {
        &self.buffer_sizes
    }

    /// Total bytes with a safety margin for alignment slack
    ///
    /// Adds 10% (at least one extra grant's alignment worth per buffer)
    /// to absorb fragmentation between the plan and the live free list.
    pub fn total_bytes_with_margin(&self) -> usize {
        self.total_bytes() + self.safety_margin()
    }

    /// The safety margin in bytes
    pub fn safety_margin(&self) -> usize {
        let base = self.total_bytes();
        (base / 10).max(self.buffer_count() * self.alignment)
    }

    /// Check the plan against a pool's current headroom
    ///
    /// Read-only snapshot; a concurrent allocator can still win the race
    /// for the same bytes, so individual grants may fail regardless.
    ///
    /// # Errors
    /// `InvalidKind` if no pool matches.
    pub fn fits(&self, manager: &ArenaManager, kind: PoolKind, device_index: u8) -> MemResult<bool> {
        let util = manager.query_utilization(kind, device_index)?;
        Ok(self.total_bytes() <= util.available())
    }

    /// Check the plan plus safety margin against a pool's headroom
    pub fn fits_with_margin(
        &self,
        manager: &ArenaManager,
        kind: PoolKind,
        device_index: u8,
    ) -> MemResult<bool> {
        let util = manager.query_utilization(kind, device_index)?;
        Ok(self.total_bytes_with_margin() <= util.available())
    }

    /// Clear all planned buffers (for reuse)
    pub fn clear(&mut self) {
        self.buffer_sizes.clear();
    }
}

impl Default for CapacityPlanner {
    fn default() -> Self {
        Self::new()
    }
}
