//! Single memory pool bookkeeping
//!
//! A pool owns one address range of a fixed capacity, a best-fit free
//! list over that range, and a slot table of live allocations. The slot
//! table is the source of truth for handle validity: each slot carries a
//! generation that advances on every grant, which lets release calls
//! distinguish a double release from a forged or out-of-range handle.
//!
//! Pools never touch memory contents. An "address" here is an offset
//! surrogate into the range owned by the driver layer; the pool only
//! guarantees that live ranges never overlap and the budget holds.

use crate::arena::free_list::FreeList;
use crate::arena::handle::AllocationHandle;
use crate::config::PoolId;
use crate::error::{MemForgeError, MemResult};

/// Read-only utilization snapshot for one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUtilization {
    /// Configured byte capacity
    pub capacity: usize,
    /// Bytes currently granted
    pub allocated: usize,
}

impl PoolUtilization {
    /// Bytes still grantable (ignoring fragmentation)
    pub fn available(&self) -> usize {
        self.capacity - self.allocated
    }
}

/// Allocation traffic statistics for one pool
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total grants served
    pub total_grants: u64,
    /// Total releases served
    pub total_releases: u64,
    /// Peak bytes granted simultaneously
    pub peak_allocated: usize,
    /// Allocations currently live
    pub live_allocations: usize,
    /// Free fragments currently tracked
    pub fragment_count: usize,
    /// Fragmentation ratio (0.0 = single contiguous free block)
    pub fragmentation: f64,
}

/// One slot in the pool's allocation table
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Generation of the most recent grant through this slot
    generation: u16,
    /// Live range, or `None` once released
    range: Option<(usize, usize)>,
}

/// A single memory pool: capacity budget, free list, live-allocation table
#[derive(Debug)]
pub struct MemoryPool {
    id: PoolId,
    capacity: usize,
    allocated: usize,
    free: FreeList,
    slots: Vec<Slot>,
    /// Vacant slot indices available for reuse
    vacant: Vec<u32>,
    total_grants: u64,
    total_releases: u64,
    peak_allocated: usize,
}

impl MemoryPool {
    /// Create a pool covering `[0, capacity)`
    pub fn new(id: PoolId, capacity: usize) -> Self {
        MemoryPool {
            id,
            capacity,
            allocated: 0,
            free: FreeList::new(capacity),
            slots: Vec::new(),
            vacant: Vec::new(),
            total_grants: 0,
            total_releases: 0,
            peak_allocated: 0,
        }
    }

    /// Pool identity
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Grant an aligned range of `size` bytes
    ///
    /// # Errors
    /// - `ZeroSizeRequest` if `size` is zero
    /// - `OutOfMemory` if no free block can satisfy the request; pool
    ///   state is left untouched (no partial grant)
    pub fn grant(&mut self, size: usize, alignment: usize) -> MemResult<AllocationHandle> {
        if size == 0 {
            return Err(MemForgeError::ZeroSizeRequest);
        }

        let offset = self
            .free
            .reserve(size, alignment)
            .ok_or(MemForgeError::OutOfMemory {
                pool: self.id,
                requested: size,
                available: self.capacity - self.allocated,
            })?;

        let slot_idx = self.occupy_slot(offset, size);
        self.allocated += size;
        self.peak_allocated = self.peak_allocated.max(self.allocated);
        self.total_grants += 1;

        let handle = AllocationHandle::new(self.id, slot_idx, self.slots[slot_idx as usize].generation);
        tracing::trace!(
            "pool {} granted {} bytes at offset {} ({})",
            self.id,
            size,
            offset,
            handle
        );
        Ok(handle)
    }

    /// Release a previously granted allocation, returning its size
    ///
    /// # Errors
    /// - `DoubleRelease` if this handle incarnation was already released
    /// - `UnknownAllocation` if the handle names no grant this pool ever
    ///   made (out-of-range slot, or a generation newer than the slot's)
    pub fn release(&mut self, handle: AllocationHandle) -> MemResult<usize> {
        let slot = self.lookup(handle)?;

        let (offset, size) = match slot.range {
            Some(range) => range,
            None => return Err(MemForgeError::DoubleRelease(handle.to_string())),
        };

        self.slots[handle.slot() as usize].range = None;
        self.vacant.push(handle.slot());
        self.free.restore(offset, size);
        self.allocated -= size;
        self.total_releases += 1;

        tracing::trace!(
            "pool {} released {} bytes at offset {} ({})",
            self.id,
            size,
            offset,
            handle
        );
        Ok(size)
    }

    /// Look up the live range behind a handle without changing state
    ///
    /// Same error discrimination as [`MemoryPool::release`].
    pub fn allocation_range(&self, handle: AllocationHandle) -> MemResult<(usize, usize)> {
        let slot = self.lookup(handle)?;
        slot.range
            .ok_or_else(|| MemForgeError::DoubleRelease(handle.to_string()))
    }

    /// Utilization snapshot
    pub fn utilization(&self) -> PoolUtilization {
        PoolUtilization {
            capacity: self.capacity,
            allocated: self.allocated,
        }
    }

    /// Traffic and fragmentation statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_grants: self.total_grants,
            total_releases: self.total_releases,
            peak_allocated: self.peak_allocated,
            live_allocations: self.live_count(),
            fragment_count: self.free.fragment_count(),
            fragmentation: self.free.fragmentation(),
        }
    }

    /// Number of live allocations
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.range.is_some()).count()
    }

    /// Force-release every live allocation, returning their handles+sizes
    ///
    /// Used at teardown: callers may still hold these handles, so the
    /// drained set is reported rather than silently dropped.
    pub fn drain(&mut self) -> Vec<(AllocationHandle, usize)> {
        let mut drained = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some((offset, size)) = slot.range.take() {
                self.free.restore(offset, size);
                drained.push((
                    AllocationHandle::new(self.id, idx as u32, slot.generation),
                    size,
                ));
                self.vacant.push(idx as u32);
            }
        }
        self.allocated = 0;
        drained
    }

    /// Resolve a handle to its slot, rejecting what this pool never granted
    fn lookup(&self, handle: AllocationHandle) -> MemResult<&Slot> {
        debug_assert_eq!(handle.pool(), self.id);

        let slot = self
            .slots
            .get(handle.slot() as usize)
            .ok_or_else(|| MemForgeError::UnknownAllocation(handle.to_string()))?;

        if handle.generation() == slot.generation {
            Ok(slot)
        } else if handle.generation() < slot.generation {
            // Provably an earlier incarnation: the slot was re-granted
            // after this handle's allocation was released
            Err(MemForgeError::DoubleRelease(handle.to_string()))
        } else {
            // A generation this slot has not reached yet: forged handle
            Err(MemForgeError::UnknownAllocation(handle.to_string()))
        }
    }

    /// Occupy a vacant slot (or grow the table), advancing its generation
    fn occupy_slot(&mut self, offset: usize, size: usize) -> u32 {
        if let Some(idx) = self.vacant.pop() {
            let slot = &mut self.slots[idx as usize];
            // Skip generation 0 on wraparound; it is reserved for null
            slot.generation = match slot.generation.checked_add(1) {
                Some(g) => g,
                None => AllocationHandle::FIRST_GENERATION,
            };
            slot.range = Some((offset, size));
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: AllocationHandle::FIRST_GENERATION,
                range: Some((offset, size)),
            });
            idx
        }
    }
}
