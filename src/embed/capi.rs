//! C ABI for the embedding layer
//!
//! The binding generators on the host side only understand C signatures,
//! address-sized handles, and plain structs. This module mirrors the
//! manager contract in that shape: status codes instead of `Result`,
//! `#[repr(C)]` configuration and report structs, and `u64` handles with
//! zero as null. No ownership of the underlying bytes ever crosses the
//! boundary.

use crate::config::{ManagerConfig, PoolKind, PoolSpec};
use crate::embed;
use crate::embed::RawManagerHandle;
use crate::error::MemForgeError;

/// Pool kind code for host pinned memory
pub const MEMFORGE_POOL_HOST: u32 = 0;
/// Pool kind code for accelerator device memory
pub const MEMFORGE_POOL_DEVICE: u32 = 1;

/// Status codes returned by every C-ABI entry point
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemForgeStatus {
    /// Operation succeeded
    Ok = 0,
    /// Null pointer, bad kind code, or invalid size/configuration
    InvalidArgument = 1,
    /// No pool configured for the requested kind/device
    InvalidKind = 2,
    /// Granting would exceed the pool budget
    OutOfMemory = 3,
    /// Handle names no tracked allocation
    UnknownAllocation = 4,
    /// Second release of an already-released allocation
    DoubleRelease = 5,
    /// Manager handle names no live manager
    UnknownManager = 6,
    /// Internal error
    Internal = 7,
}

impl From<&MemForgeError> for MemForgeStatus {
    fn from(err: &MemForgeError) -> Self {
        match err {
            MemForgeError::InvalidKind(_) => MemForgeStatus::InvalidKind,
            MemForgeError::OutOfMemory { .. } => MemForgeStatus::OutOfMemory,
            MemForgeError::UnknownAllocation(_) => MemForgeStatus::UnknownAllocation,
            MemForgeError::DoubleRelease(_) => MemForgeStatus::DoubleRelease,
            MemForgeError::UnknownManager(_) => MemForgeStatus::UnknownManager,
            MemForgeError::ZeroSizeRequest
            | MemForgeError::InvalidAlignment(_)
            | MemForgeError::InvalidConfiguration(_) => MemForgeStatus::InvalidArgument,
            MemForgeError::LockPoisoned(_) => MemForgeStatus::Internal,
        }
    }
}

/// Pool configuration entry handed to `memforge_init`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemForgePoolConfig {
    /// `MEMFORGE_POOL_HOST` or `MEMFORGE_POOL_DEVICE`
    pub kind: u32,
    /// Device index (must be 0 for host pools, < 256 otherwise)
    pub device_index: u32,
    /// Pool capacity in bytes
    pub capacity_bytes: u64,
}

/// Utilization snapshot written by `memforge_query_utilization`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemForgeUtilization {
    pub capacity_bytes: u64,
    pub allocated_bytes: u64,
}

/// One leaked allocation written by `memforge_shutdown`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemForgeLeakRecord {
    /// Raw allocation handle of the leaked allocation
    pub allocation_id: u64,
    /// Pool kind code of the owning pool
    pub kind: u32,
    /// Device index of the owning pool
    pub device_index: u32,
    /// Leaked bytes
    pub size_bytes: u64,
}

fn decode_kind(kind: u32) -> Option<PoolKind> {
    match kind {
        MEMFORGE_POOL_HOST => Some(PoolKind::Host),
        MEMFORGE_POOL_DEVICE => Some(PoolKind::Device),
        _ => None,
    }
}

fn encode_kind(kind: PoolKind) -> u32 {
    match kind {
        PoolKind::Host => MEMFORGE_POOL_HOST,
        PoolKind::Device => MEMFORGE_POOL_DEVICE,
    }
}

/// Initialize a manager from a pool configuration list.
///
/// Writes the new manager handle to `out_manager` on success.
///
/// # Safety
/// `pools` must point to `pool_count` valid `MemForgePoolConfig` entries
/// and `out_manager` must be a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn memforge_init(
    pools: *const MemForgePoolConfig,
    pool_count: usize,
    out_manager: *mut u64,
) -> MemForgeStatus {
    if pools.is_null() || out_manager.is_null() || pool_count == 0 {
        return MemForgeStatus::InvalidArgument;
    }

    // SAFETY: caller guarantees `pools` points to `pool_count` entries
    let entries = std::slice::from_raw_parts(pools, pool_count);

    let mut config = ManagerConfig::new();
    for entry in entries {
        let kind = match decode_kind(entry.kind) {
            Some(kind) => kind,
            None => return MemForgeStatus::InvalidArgument,
        };
        let device_index = match u8::try_from(entry.device_index) {
            Ok(index) => index,
            Err(_) => return MemForgeStatus::InvalidArgument,
        };
        config = config.with_pool(PoolSpec {
            kind,
            device_index,
            capacity_bytes: entry.capacity_bytes as usize,
        });
    }

    match embed::init(config) {
        Ok(handle) => {
            // SAFETY: caller guarantees `out_manager` is writable
            *out_manager = handle.0;
            MemForgeStatus::Ok
        }
        Err(err) => MemForgeStatus::from(&err),
    }
}

/// Allocate `size` bytes from the named pool.
///
/// Writes the raw allocation handle to `out_allocation` on success.
///
/// # Safety
/// `out_allocation` must be a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn memforge_allocate(
    manager: u64,
    kind: u32,
    device_index: u32,
    size: u64,
    out_allocation: *mut u64,
) -> MemForgeStatus {
    if out_allocation.is_null() {
        return MemForgeStatus::InvalidArgument;
    }
    let kind = match decode_kind(kind) {
        Some(kind) => kind,
        None => return MemForgeStatus::InvalidArgument,
    };
    let device_index = match u8::try_from(device_index) {
        Ok(index) => index,
        Err(_) => return MemForgeStatus::InvalidArgument,
    };

    match embed::allocate(RawManagerHandle(manager), kind, device_index, size as usize) {
        Ok(raw) => {
            // SAFETY: caller guarantees `out_allocation` is writable
            *out_allocation = raw.0;
            MemForgeStatus::Ok
        }
        Err(err) => MemForgeStatus::from(&err),
    }
}

/// Release a previously granted allocation.
#[no_mangle]
pub extern "C" fn memforge_release(manager: u64, allocation: u64) -> MemForgeStatus {
    match embed::release(
        RawManagerHandle(manager),
        crate::arena::RawAllocationHandle(allocation),
    ) {
        Ok(()) => MemForgeStatus::Ok,
        Err(err) => MemForgeStatus::from(&err),
    }
}

/// Query a pool's utilization snapshot.
///
/// # Safety
/// `out` must be a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn memforge_query_utilization(
    manager: u64,
    kind: u32,
    device_index: u32,
    out: *mut MemForgeUtilization,
) -> MemForgeStatus {
    if out.is_null() {
        return MemForgeStatus::InvalidArgument;
    }
    let kind = match decode_kind(kind) {
        Some(kind) => kind,
        None => return MemForgeStatus::InvalidArgument,
    };
    let device_index = match u8::try_from(device_index) {
        Ok(index) => index,
        Err(_) => return MemForgeStatus::InvalidArgument,
    };

    match embed::query_utilization(RawManagerHandle(manager), kind, device_index) {
        Ok(util) => {
            // SAFETY: caller guarantees `out` is writable
            *out = MemForgeUtilization {
                capacity_bytes: util.capacity as u64,
                allocated_bytes: util.allocated as u64,
            };
            MemForgeStatus::Ok
        }
        Err(err) => MemForgeStatus::from(&err),
    }
}

/// Tear down a manager, reporting outstanding allocations as leaks.
///
/// Up to `leak_capacity` records are written to `out_leaks`; the full
/// leak count always goes to `out_leak_count`, so a caller seeing a
/// count above its capacity knows the report was truncated.
///
/// # Safety
/// `out_leak_count` must be a valid writable pointer, and `out_leaks`
/// must point to `leak_capacity` writable records (it may be null when
/// `leak_capacity` is 0).
#[no_mangle]
pub unsafe extern "C" fn memforge_shutdown(
    manager: u64,
    out_leaks: *mut MemForgeLeakRecord,
    leak_capacity: usize,
    out_leak_count: *mut usize,
) -> MemForgeStatus {
    if out_leak_count.is_null() || (out_leaks.is_null() && leak_capacity > 0) {
        return MemForgeStatus::InvalidArgument;
    }

    match embed::shutdown(RawManagerHandle(manager)) {
        Ok(report) => {
            // SAFETY: caller guarantees `out_leak_count` is writable
            *out_leak_count = report.len();

            let to_write = report.len().min(leak_capacity);
            for (i, leak) in report.leaks.iter().take(to_write).enumerate() {
                // SAFETY: caller guarantees `leak_capacity` writable records
                *out_leaks.add(i) = MemForgeLeakRecord {
                    allocation_id: leak.allocation_id,
                    kind: encode_kind(leak.pool.kind),
                    device_index: leak.pool.device_index as u32,
                    size_bytes: leak.size as u64,
                };
            }
            MemForgeStatus::Ok
        }
        Err(err) => MemForgeStatus::from(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn device_pool(capacity_bytes: u64) -> MemForgePoolConfig {
        MemForgePoolConfig {
            kind: MEMFORGE_POOL_DEVICE,
            device_index: 0,
            capacity_bytes,
        }
    }

    fn init_manager(pools: &[MemForgePoolConfig]) -> u64 {
        let mut manager = 0u64;
        let status = unsafe { memforge_init(pools.as_ptr(), pools.len(), &mut manager) };
        assert_eq!(status, MemForgeStatus::Ok);
        assert_ne!(manager, 0);
        manager
    }

    #[test]
    #[serial]
    fn test_init_null_arguments() {
        let mut manager = 0u64;
        let status =
            unsafe { memforge_init(std::ptr::null(), 1, &mut manager) };
        assert_eq!(status, MemForgeStatus::InvalidArgument);

        let pools = [device_pool(4096)];
        let status = unsafe { memforge_init(pools.as_ptr(), 0, &mut manager) };
        assert_eq!(status, MemForgeStatus::InvalidArgument);
    }

    #[test]
    #[serial]
    fn test_init_bad_kind_code() {
        let pools = [MemForgePoolConfig {
            kind: 99,
            device_index: 0,
            capacity_bytes: 4096,
        }];
        let mut manager = 0u64;
        let status = unsafe { memforge_init(pools.as_ptr(), 1, &mut manager) };
        assert_eq!(status, MemForgeStatus::InvalidArgument);
    }

    #[test]
    #[serial]
    fn test_allocate_release_query() {
        let manager = init_manager(&[device_pool(4096)]);

        let mut allocation = 0u64;
        let status = unsafe {
            memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 1024, &mut allocation)
        };
        assert_eq!(status, MemForgeStatus::Ok);
        assert_ne!(allocation, 0);

        let mut util = MemForgeUtilization::default();
        let status =
            unsafe { memforge_query_utilization(manager, MEMFORGE_POOL_DEVICE, 0, &mut util) };
        assert_eq!(status, MemForgeStatus::Ok);
        assert_eq!(util.capacity_bytes, 4096);
        assert_eq!(util.allocated_bytes, 1024);

        assert_eq!(
            memforge_release(manager, allocation),
            MemForgeStatus::Ok
        );
        assert_eq!(
            memforge_release(manager, allocation),
            MemForgeStatus::DoubleRelease
        );

        let mut count = 0usize;
        let status =
            unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
        assert_eq!(status, MemForgeStatus::Ok);
        assert_eq!(count, 0);
    }

    #[test]
    #[serial]
    fn test_allocate_error_codes() {
        let manager = init_manager(&[device_pool(1024)]);
        let mut allocation = 0u64;

        // Unconfigured pool
        let status = unsafe {
            memforge_allocate(manager, MEMFORGE_POOL_HOST, 0, 64, &mut allocation)
        };
        assert_eq!(status, MemForgeStatus::InvalidKind);

        // Undecodable kind code
        let status = unsafe { memforge_allocate(manager, 42, 0, 64, &mut allocation) };
        assert_eq!(status, MemForgeStatus::InvalidArgument);

        // Zero size
        let status = unsafe {
            memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 0, &mut allocation)
        };
        assert_eq!(status, MemForgeStatus::InvalidArgument);

        // Over capacity
        let status = unsafe {
            memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 2048, &mut allocation)
        };
        assert_eq!(status, MemForgeStatus::OutOfMemory);

        let mut count = 0usize;
        unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
    }

    #[test]
    #[serial]
    fn test_release_unknown_handle() {
        let manager = init_manager(&[device_pool(1024)]);

        assert_eq!(
            memforge_release(manager, 0),
            MemForgeStatus::UnknownAllocation
        );

        let mut count = 0usize;
        unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
    }

    #[test]
    #[serial]
    fn test_shutdown_leak_buffer() {
        let manager = init_manager(&[device_pool(8192)]);

        let mut a = 0u64;
        let mut b = 0u64;
        unsafe {
            memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 1024, &mut a);
            memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 2048, &mut b);
        }

        // Undersized buffer: count still reports everything
        let mut records = [MemForgeLeakRecord::default(); 1];
        let mut count = 0usize;
        let status = unsafe {
            memforge_shutdown(manager, records.as_mut_ptr(), records.len(), &mut count)
        };
        assert_eq!(status, MemForgeStatus::Ok);
        assert_eq!(count, 2);
        assert!(records[0].allocation_id == a || records[0].allocation_id == b);
        assert_eq!(records[0].kind, MEMFORGE_POOL_DEVICE);
        assert!(records[0].size_bytes == 1024 || records[0].size_bytes == 2048);
    }

    #[test]
    #[serial]
    fn test_shutdown_twice() {
        let manager = init_manager(&[device_pool(1024)]);

        let mut count = 0usize;
        let status =
            unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
        assert_eq!(status, MemForgeStatus::Ok);

        let status =
            unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
        assert_eq!(status, MemForgeStatus::UnknownManager);
    }
}
