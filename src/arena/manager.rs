//! Thread-safe arena manager
//!
//! The manager owns one [`MemoryPool`] per configured `(kind, device)`
//! pair. The pool map is built at initialization and never changes, so
//! each pool sits behind its own `Mutex` and operations on different
//! pools never contend. Allocate either succeeds or fails fast with
//! `OutOfMemory`; it never blocks waiting for another request to free
//! space, which would invite cross-request deadlock in the scheduler
//! sitting above this layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::arena::handle::AllocationHandle;
use crate::arena::pool::{MemoryPool, PoolStats, PoolUtilization};
use crate::config::{format_bytes, ManagerConfig, PoolId, PoolKind};
use crate::error::{MemForgeError, MemResult};
use crate::metrics::Metrics;

/// Metadata for a live allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInfo {
    /// Byte offset from the pool base (device pointer surrogate)
    pub offset: usize,
    /// Byte length of the grant
    pub size: usize,
    /// Owning pool
    pub pool: PoolId,
}

/// One allocation still live at teardown
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LeakRecord {
    /// Raw handle value of the leaked allocation
    pub allocation_id: u64,
    /// Pool the allocation belongs to
    pub pool: PoolId,
    /// Byte length of the grant
    pub size: usize,
}

/// Teardown leak report
///
/// Leaks indicate a caller bug elsewhere in the system (a request path
/// that forgot to release), not manager corruption; they are reported
/// and logged, never treated as fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeakReport {
    pub leaks: Vec<LeakRecord>,
}

impl LeakReport {
    /// True when nothing was outstanding at teardown
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }

    /// Number of leaked allocations
    pub fn len(&self) -> usize {
        self.leaks.len()
    }

    /// True when the report holds no records
    pub fn is_empty(&self) -> bool {
        self.leaks.is_empty()
    }

    /// Total leaked bytes across all pools
    pub fn total_leaked_bytes(&self) -> usize {
        self.leaks.iter().map(|l| l.size).sum()
    }
}

/// Thread-safe memory arena manager
///
/// Services allocate/release of byte ranges from named pools, honoring
/// per-pool byte budgets, and reports utilization for observability.
/// Pure bookkeeping: the manager never accesses allocation contents.
///
/// # Thread Safety
///
/// `ArenaManager` is `Send + Sync`. Each pool has its own lock; the pool
/// map itself is immutable after construction. Handles are plain `Copy`
/// data, so a release may come from a different thread than the grant.
///
/// # Example
///
/// ```ignore
/// use memforge::{ArenaManager, ManagerConfig, PoolKind, PoolSpec};
///
/// let manager = ArenaManager::new(
///     ManagerConfig::new().with_pool(PoolSpec::device(0, 1024 * 1024)),
/// )?;
///
/// let h = manager.allocate(PoolKind::Device, 0, 4096)?;
/// let util = manager.query_utilization(PoolKind::Device, 0)?;
/// manager.release(h)?;
///
/// let report = manager.teardown();
/// assert!(report.is_clean());
/// # Ok::<(), memforge::MemForgeError>(())
/// ```
#[derive(Debug)]
pub struct ArenaManager {
    pools: HashMap<PoolId, Mutex<MemoryPool>>,
    alignment: usize,
    metrics: Option<Arc<Metrics>>,
}

impl ArenaManager {
    /// Create a manager from a validated configuration
    ///
    /// # Errors
    /// `InvalidConfiguration` / `InvalidAlignment` if the configuration
    /// fails validation. The pool set is fixed from here on.
    pub fn new(config: ManagerConfig) -> MemResult<Self> {
        config.validate()?;

        let mut pools = HashMap::with_capacity(config.pools.len());
        for spec in &config.pools {
            let id = spec.pool_id();
            tracing::info!(
                "arena pool {} created: {} ({} bytes)",
                id,
                format_bytes(spec.capacity_bytes),
                spec.capacity_bytes
            );
            pools.insert(id, Mutex::new(MemoryPool::new(id, spec.capacity_bytes)));
        }

        Ok(ArenaManager {
            pools,
            alignment: config.alignment,
            metrics: None,
        })
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Grant alignment in bytes
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Configured pool identities, sorted
    pub fn pool_ids(&self) -> Vec<PoolId> {
        let mut ids: Vec<PoolId> = self.pools.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Allocate `size` bytes from the named pool
    ///
    /// On success the granted range overlaps no other live allocation in
    /// the pool and the pool's allocated-byte count rises by `size`,
    /// atomically with the grant.
    ///
    /// # Errors
    /// - `InvalidKind` if no pool matches `(kind, device_index)`
    /// - `ZeroSizeRequest` if `size` is zero
    /// - `OutOfMemory` if granting would exceed the pool budget; the
    ///   caller may retry after releasing other allocations (no backoff
    ///   machinery here - the caller decides)
    pub fn allocate(
        &self,
        kind: PoolKind,
        device_index: u8,
        size: usize,
    ) -> MemResult<AllocationHandle> {
        let id = PoolId::new(kind, device_index);
        let pool = self
            .pools
            .get(&id)
            .ok_or(MemForgeError::InvalidKind(id))?;

        let result = pool.lock()?.grant(size, self.alignment);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics.record_grant(size),
                Err(MemForgeError::OutOfMemory { .. }) => metrics.record_grant_failure(),
                Err(_) => {}
            }
        }
        result
    }

    /// Release a previously granted allocation
    ///
    /// Safe to call from a different thread than the one that allocated.
    ///
    /// # Errors
    /// - `DoubleRelease` on the second release of the same handle
    /// - `UnknownAllocation` if the handle belongs to no tracked pool or
    ///   names a grant the pool never made
    pub fn release(&self, handle: AllocationHandle) -> MemResult<()> {
        let pool = self.pool_for_handle(handle)?;
        let result = pool.lock()?.release(handle);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(size) => metrics.record_release(*size),
                Err(_) => metrics.record_release_failure(),
            }
        }
        result.map(|_| ())
    }

    /// Read-only utilization snapshot for one pool
    ///
    /// # Errors
    /// `InvalidKind` if no pool matches.
    pub fn query_utilization(&self, kind: PoolKind, device_index: u8) -> MemResult<PoolUtilization> {
        let id = PoolId::new(kind, device_index);
        let pool = self
            .pools
            .get(&id)
            .ok_or(MemForgeError::InvalidKind(id))?;
        Ok(pool.lock()?.utilization())
    }

    /// Metadata for a live allocation (no state change)
    pub fn allocation_info(&self, handle: AllocationHandle) -> MemResult<AllocationInfo> {
        let pool = self.pool_for_handle(handle)?;
        let (offset, size) = pool.lock()?.allocation_range(handle)?;
        Ok(AllocationInfo {
            offset,
            size,
            pool: handle.pool(),
        })
    }

    /// Traffic and fragmentation statistics for one pool
    ///
    /// # Errors
    /// `InvalidKind` if no pool matches.
    pub fn pool_stats(&self, kind: PoolKind, device_index: u8) -> MemResult<PoolStats> {
        let id = PoolId::new(kind, device_index);
        let pool = self
            .pools
            .get(&id)
            .ok_or(MemForgeError::InvalidKind(id))?;
        Ok(pool.lock()?.stats())
    }

    /// Force-release everything outstanding and report it
    ///
    /// Every drained allocation is a leak: the caller still holds its
    /// handle, so freeing silently would hide a double-free-equivalent
    /// bug. The report lists exactly what was outstanding.
    pub fn drain_leaks(&self) -> LeakReport {
        let mut leaks = Vec::new();
        for pool in self.pools.values() {
            let mut guard = match pool.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (handle, size) in guard.drain() {
                tracing::warn!(
                    "leaked allocation {} ({} bytes) force-released at teardown",
                    handle,
                    size
                );
                leaks.push(LeakRecord {
                    allocation_id: handle.to_raw().0,
                    pool: handle.pool(),
                    size,
                });
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_leaks(leaks.len() as u64);
        }
        if !leaks.is_empty() {
            tracing::warn!(
                "teardown leak report: {} allocations, {} total",
                leaks.len(),
                format_bytes(leaks.iter().map(|l| l.size).sum())
            );
        }
        LeakReport { leaks }
    }

    /// Tear the manager down, reporting anything still outstanding
    pub fn teardown(self) -> LeakReport {
        let report = self.drain_leaks();
        tracing::info!(
            "arena manager torn down ({} pools, {} leaks)",
            self.pools.len(),
            report.len()
        );
        report
    }

    fn pool_for_handle(&self, handle: AllocationHandle) -> MemResult<&Mutex<MemoryPool>> {
        if handle.is_null() {
            return Err(MemForgeError::UnknownAllocation(handle.to_string()));
        }
        // A handle for an unconfigured pool is unknown, not InvalidKind:
        // it cannot have come from this manager
        self.pools
            .get(&handle.pool())
            .ok_or_else(|| MemForgeError::UnknownAllocation(handle.to_string()))
    }
}

impl Drop for ArenaManager {
    fn drop(&mut self) {
        // Teardown drains first, so a clean shutdown reports nothing here.
        // Dropping with live allocations means the embedding layer skipped
        // teardown; warn rather than stay silent.
        let mut outstanding = 0usize;
        for pool in self.pools.values() {
            if let Ok(guard) = pool.lock() {
                outstanding += guard.live_count();
            }
        }
        if outstanding > 0 {
            tracing::warn!(
                "arena manager dropped with {} live allocations (teardown not called)",
                outstanding
            );
        }
    }
}
