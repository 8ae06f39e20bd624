//! Integration tests for the host-process embedding surface
//!
//! Drives the boundary the way a binding layer would: raw u64 handles
//! only, config handed over as data, leak reports read back out. All
//! tests are serialized because the registry is process-wide.

use memforge::embed::capi::{
    memforge_allocate, memforge_init, memforge_query_utilization, memforge_release,
    memforge_shutdown, MemForgeLeakRecord, MemForgePoolConfig, MemForgeStatus,
    MemForgeUtilization, MEMFORGE_POOL_DEVICE, MEMFORGE_POOL_HOST,
};
use memforge::{embed, ManagerConfig, MemForgeError, PoolKind, RawManagerHandle};
use serial_test::serial;

#[test]
#[serial]
fn test_full_lifecycle_through_raw_handles() {
    let config = ManagerConfig::from_json(
        r#"{
            "pools": [
                {"kind": "host", "capacity_bytes": 65536},
                {"kind": "device", "device_index": 0, "capacity_bytes": 1024}
            ]
        }"#,
    )
    .unwrap();

    let manager = embed::init(config).unwrap();
    assert!(!manager.is_null());

    // The concrete device-pool scenario, through the boundary
    let a = embed::allocate(manager, PoolKind::Device, 0, 512).unwrap();
    let b = embed::allocate(manager, PoolKind::Device, 0, 512).unwrap();
    assert_ne!(a, b);

    let util = embed::query_utilization(manager, PoolKind::Device, 0).unwrap();
    assert_eq!((util.capacity, util.allocated), (1024, 1024));

    assert!(matches!(
        embed::allocate(manager, PoolKind::Device, 0, 1),
        Err(MemForgeError::OutOfMemory { .. })
    ));

    embed::release(manager, a).unwrap();
    let _c = embed::allocate(manager, PoolKind::Device, 0, 256).unwrap();
    let util = embed::query_utilization(manager, PoolKind::Device, 0).unwrap();
    assert_eq!(util.allocated, 768);

    // Outstanding allocations surface in the leak report
    let report = embed::shutdown(manager).unwrap();
    assert_eq!(report.len(), 2);
    assert!(serde_json::to_string(&report).unwrap().contains("device"));
}

#[test]
#[serial]
fn test_handles_are_opaque_plain_data() {
    let config = ManagerConfig::from_json(
        r#"{"pools": [{"kind": "device", "capacity_bytes": 4096}]}"#,
    )
    .unwrap();
    let manager = embed::init(config).unwrap();

    let raw = embed::allocate(manager, PoolKind::Device, 0, 128).unwrap();

    // Round-trip through a foreign representation (e.g. a Java long)
    let as_long: u64 = raw.0;
    let back = memforge::RawAllocationHandle(as_long);
    embed::release(manager, back).unwrap();

    assert!(embed::shutdown(manager).unwrap().is_clean());
}

#[test]
#[serial]
fn test_stale_manager_handle_rejected() {
    let config = ManagerConfig::from_json(
        r#"{"pools": [{"kind": "device", "capacity_bytes": 1024}]}"#,
    )
    .unwrap();
    let manager = embed::init(config).unwrap();
    embed::shutdown(manager).unwrap();

    assert!(matches!(
        embed::query_utilization(manager, PoolKind::Device, 0),
        Err(MemForgeError::UnknownManager(_))
    ));
    assert!(matches!(
        embed::shutdown(RawManagerHandle(0)),
        Err(MemForgeError::UnknownManager(0))
    ));
}

#[test]
#[serial]
fn test_c_abi_end_to_end() {
    let pools = [
        MemForgePoolConfig {
            kind: MEMFORGE_POOL_HOST,
            device_index: 0,
            capacity_bytes: 16384,
        },
        MemForgePoolConfig {
            kind: MEMFORGE_POOL_DEVICE,
            device_index: 0,
            capacity_bytes: 8192,
        },
    ];

    let mut manager = 0u64;
    let status = unsafe { memforge_init(pools.as_ptr(), pools.len(), &mut manager) };
    assert_eq!(status, MemForgeStatus::Ok);

    let mut allocation = 0u64;
    let status = unsafe {
        memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 0, 4096, &mut allocation)
    };
    assert_eq!(status, MemForgeStatus::Ok);

    let mut util = MemForgeUtilization::default();
    let status =
        unsafe { memforge_query_utilization(manager, MEMFORGE_POOL_DEVICE, 0, &mut util) };
    assert_eq!(status, MemForgeStatus::Ok);
    assert_eq!(util.allocated_bytes, 4096);

    // Host pool is untouched
    let status =
        unsafe { memforge_query_utilization(manager, MEMFORGE_POOL_HOST, 0, &mut util) };
    assert_eq!(status, MemForgeStatus::Ok);
    assert_eq!(util.allocated_bytes, 0);

    assert_eq!(memforge_release(manager, allocation), MemForgeStatus::Ok);

    let mut count = 0usize;
    let status = unsafe { memforge_shutdown(manager, std::ptr::null_mut(), 0, &mut count) };
    assert_eq!(status, MemForgeStatus::Ok);
    assert_eq!(count, 0);
}

#[test]
#[serial]
fn test_c_abi_leak_records() {
    let pools = [MemForgePoolConfig {
        kind: MEMFORGE_POOL_DEVICE,
        device_index: 2,
        capacity_bytes: 8192,
    }];

    let mut manager = 0u64;
    unsafe { memforge_init(pools.as_ptr(), pools.len(), &mut manager) };

    let mut leaked = 0u64;
    unsafe { memforge_allocate(manager, MEMFORGE_POOL_DEVICE, 2, 1000, &mut leaked) };

    let mut records = [MemForgeLeakRecord::default(); 4];
    let mut count = 0usize;
    let status = unsafe {
        memforge_shutdown(manager, records.as_mut_ptr(), records.len(), &mut count)
    };
    assert_eq!(status, MemForgeStatus::Ok);
    assert_eq!(count, 1);
    assert_eq!(records[0].allocation_id, leaked);
    assert_eq!(records[0].kind, MEMFORGE_POOL_DEVICE);
    assert_eq!(records[0].device_index, 2);
    assert_eq!(records[0].size_bytes, 1000);
}
