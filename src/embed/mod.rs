//! Host-process embedding surface
//!
//! An inference server embeds the arena manager behind a binding layer
//! that can only carry address-sized values. This module provides that
//! surface: a process-wide registry of live managers, raw `u64` handles
//! for managers and allocations, and an init-once / teardown-once
//! lifecycle. The boundary only marshals handles; it never copies or
//! inspects allocation contents.

pub mod capi;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::arena::{AllocationHandle, ArenaManager, LeakReport, RawAllocationHandle};
use crate::config::{ManagerConfig, PoolKind};
use crate::error::{MemForgeError, MemResult};

/// Raw address-sized manager handle for the language boundary
///
/// Zero is the null handle; valid handles are never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawManagerHandle(pub u64);

impl RawManagerHandle {
    /// The null handle
    pub const NULL: RawManagerHandle = RawManagerHandle(0);

    /// Check for the null handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Process-wide table of live managers
struct ManagerRegistry {
    managers: HashMap<u64, Arc<ArenaManager>>,
    next_id: u64,
}

static REGISTRY: Lazy<Mutex<ManagerRegistry>> = Lazy::new(|| {
    Mutex::new(ManagerRegistry {
        managers: HashMap::new(),
        next_id: 1, // 0 is the null handle
    })
});

/// Create a manager from the given pool configuration and register it
///
/// # Errors
/// `InvalidConfiguration` / `InvalidAlignment` on a bad configuration.
pub fn init(config: ManagerConfig) -> MemResult<RawManagerHandle> {
    let manager = Arc::new(ArenaManager::new(config)?);

    let mut registry = REGISTRY.lock()?;
    let id = registry.next_id;
    registry.next_id += 1;
    registry.managers.insert(id, manager);

    tracing::debug!("embedding layer registered manager {:#x}", id);
    Ok(RawManagerHandle(id))
}

/// Tear down a registered manager, returning its leak report
///
/// Teardown-once: a second shutdown of the same handle fails with
/// `UnknownManager`, as does any operation after shutdown.
pub fn shutdown(handle: RawManagerHandle) -> MemResult<LeakReport> {
    let manager = {
        let mut registry = REGISTRY.lock()?;
        registry
            .managers
            .remove(&handle.0)
            .ok_or(MemForgeError::UnknownManager(handle.0))?
    };

    let report = manager.drain_leaks();
    tracing::debug!(
        "embedding layer shut down manager {:#x} ({} leaks)",
        handle.0,
        report.len()
    );
    Ok(report)
}

/// Run a closure against a registered manager
///
/// The registry lock is dropped before the closure runs, so operations
/// on different managers (and pools) proceed concurrently.
pub fn with_manager<T>(
    handle: RawManagerHandle,
    f: impl FnOnce(&ArenaManager) -> MemResult<T>,
) -> MemResult<T> {
    let manager = {
        let registry = REGISTRY.lock()?;
        registry
            .managers
            .get(&handle.0)
            .cloned()
            .ok_or(MemForgeError::UnknownManager(handle.0))?
    };
    f(&manager)
}

/// Allocate through a raw manager handle, returning a raw allocation handle
pub fn allocate(
    manager: RawManagerHandle,
    kind: PoolKind,
    device_index: u8,
    size: usize,
) -> MemResult<RawAllocationHandle> {
    with_manager(manager, |m| {
        m.allocate(kind, device_index, size).map(|h| h.to_raw())
    })
}

/// Release through a raw manager handle
pub fn release(manager: RawManagerHandle, allocation: RawAllocationHandle) -> MemResult<()> {
    let handle = decode_allocation(allocation)?;
    with_manager(manager, |m| m.release(handle))
}

/// Query pool utilization through a raw manager handle
pub fn query_utilization(
    manager: RawManagerHandle,
    kind: PoolKind,
    device_index: u8,
) -> MemResult<crate::arena::PoolUtilization> {
    with_manager(manager, |m| m.query_utilization(kind, device_index))
}

fn decode_allocation(raw: RawAllocationHandle) -> MemResult<AllocationHandle> {
    match AllocationHandle::from_raw(raw) {
        Some(handle) if !handle.is_null() => Ok(handle),
        // Null and undecodable bit patterns name no allocation
        _ => Err(MemForgeError::UnknownAllocation(format!("{:#x}", raw.0))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSpec;
    use serial_test::serial;

    fn test_config() -> ManagerConfig {
        ManagerConfig::new().with_pool(PoolSpec::device(0, 4096))
    }

    #[test]
    #[serial]
    fn test_init_shutdown_lifecycle() {
        let handle = init(test_config()).unwrap();
        assert!(!handle.is_null());

        let report = shutdown(handle).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    #[serial]
    fn test_shutdown_twice_fails() {
        let handle = init(test_config()).unwrap();
        shutdown(handle).unwrap();

        assert!(matches!(
            shutdown(handle),
            Err(MemForgeError::UnknownManager(_))
        ));
    }

    #[test]
    #[serial]
    fn test_operations_after_shutdown_fail() {
        let handle = init(test_config()).unwrap();
        shutdown(handle).unwrap();

        assert!(matches!(
            allocate(handle, PoolKind::Device, 0, 64),
            Err(MemForgeError::UnknownManager(_))
        ));
    }

    #[test]
    #[serial]
    fn test_raw_allocate_release() {
        let handle = init(test_config()).unwrap();

        let raw = allocate(handle, PoolKind::Device, 0, 512).unwrap();
        assert!(!raw.is_null());

        let util = query_utilization(handle, PoolKind::Device, 0).unwrap();
        assert_eq!(util.allocated, 512);

        release(handle, raw).unwrap();
        assert!(shutdown(handle).unwrap().is_clean());
    }

    #[test]
    #[serial]
    fn test_release_null_raw_handle() {
        let handle = init(test_config()).unwrap();
        assert!(matches!(
            release(handle, RawAllocationHandle::NULL),
            Err(MemForgeError::UnknownAllocation(_))
        ));
        shutdown(handle).unwrap();
    }

    #[test]
    #[serial]
    fn test_shutdown_reports_leaks() {
        let handle = init(test_config()).unwrap();
        let raw = allocate(handle, PoolKind::Device, 0, 256).unwrap();

        let report = shutdown(handle).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.leaks[0].allocation_id, raw.0);
        assert_eq!(report.leaks[0].size, 256);
    }

    #[test]
    #[serial]
    fn test_managers_are_isolated() {
        let a = init(test_config()).unwrap();
        let b = init(test_config()).unwrap();
        assert_ne!(a, b);

        let raw = allocate(a, PoolKind::Device, 0, 1024).unwrap();
        assert_eq!(query_utilization(b, PoolKind::Device, 0).unwrap().allocated, 0);

        release(a, raw).unwrap();
        shutdown(a).unwrap();
        shutdown(b).unwrap();
    }
}
