//! Opaque, generation-tagged allocation handles
//!
//! A handle names one incarnation of one slot in one pool. Generations
//! start at 1 and advance every time a slot is re-granted, so a released
//! handle can never silently alias a newer allocation: stale use is
//! detected at the bookkeeping layer instead of corrupting memory.
//!
//! Handles pack into a single `u64` for the host-process boundary:
//! `[kind:8 | device:8 | generation:16 | slot:32]`. The all-zero word is
//! reserved for the null handle (generations are never 0), mirroring the
//! empty-vs-valid duality of pointer bindings.

use std::fmt;

use crate::config::{PoolId, PoolKind};

/// Raw address-sized allocation handle for the language boundary
///
/// The boundary layer only marshals this value; it never inspects or
/// dereferences anything. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawAllocationHandle(pub u64);

impl RawAllocationHandle {
    /// The null handle
    pub const NULL: RawAllocationHandle = RawAllocationHandle(0);

    /// Check for the null handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque handle to a live allocation
///
/// Plain `Copy` data: safe to pass between threads, store, and release
/// from a different execution context than the one that allocated.
/// Holding a handle confers no access to memory contents; all operations
/// go through the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationHandle {
    pool: PoolId,
    slot: u32,
    generation: u16,
}

impl AllocationHandle {
    /// The null handle (distinct from every valid handle)
    pub const NULL: AllocationHandle = AllocationHandle {
        pool: PoolId {
            kind: PoolKind::Host,
            device_index: 0,
        },
        slot: 0,
        generation: 0,
    };

    /// Generations start here; 0 is reserved for the null handle
    pub(crate) const FIRST_GENERATION: u16 = 1;

    pub(crate) fn new(pool: PoolId, slot: u32, generation: u16) -> Self {
        debug_assert!(generation >= Self::FIRST_GENERATION);
        AllocationHandle {
            pool,
            slot,
            generation,
        }
    }

    /// Check for the null handle
    pub fn is_null(&self) -> bool {
        self.generation == 0
    }

    /// Pool this allocation belongs to
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub(crate) fn slot(&self) -> u32 {
        self.slot
    }

    pub(crate) fn generation(&self) -> u16 {
        self.generation
    }

    /// Pack into the raw boundary representation
    ///
    /// The round trip through `from_raw` is exact for every valid handle.
    pub fn to_raw(self) -> RawAllocationHandle {
        if self.is_null() {
            return RawAllocationHandle::NULL;
        }
        let kind = match self.pool.kind {
            PoolKind::Host => 0u64,
            PoolKind::Device => 1u64,
        };
        RawAllocationHandle(
            (kind << 56)
                | ((self.pool.device_index as u64) << 48)
                | ((self.generation as u64) << 32)
                | self.slot as u64,
        )
    }

    /// Unpack a raw boundary value
    ///
    /// Returns `None` for bit patterns that cannot name an allocation
    /// (unknown kind byte). The zero word decodes to the null handle.
    pub fn from_raw(raw: RawAllocationHandle) -> Option<Self> {
        if raw.is_null() {
            return Some(AllocationHandle::NULL);
        }
        let kind = match (raw.0 >> 56) & 0xff {
            0 => PoolKind::Host,
            1 => PoolKind::Device,
            _ => return None,
        };
        let device_index = ((raw.0 >> 48) & 0xff) as u8;
        let generation = ((raw.0 >> 32) & 0xffff) as u16;
        let slot = (raw.0 & 0xffff_ffff) as u32;
        if generation == 0 {
            // Only the all-zero word may carry generation 0
            return None;
        }
        Some(AllocationHandle {
            pool: PoolId::new(kind, device_index),
            slot,
            generation,
        })
    }
}

impl fmt::Display for AllocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}#{}.g{}", self.pool, self.slot, self.generation)
        }
    }
}
