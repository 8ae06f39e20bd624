//! MemForge - memory arena manager for inference serving
//!
//! A backend memory manager that arbitrates allocation of input/output
//! tensor buffers across host-pinned and accelerator device pools for
//! concurrent inference executions. The manager does pure bookkeeping:
//! it grants byte ranges, enforces per-pool budgets, and detects misuse
//! (double release, forged handles) by construction. It never touches
//! allocation contents.

#![allow(clippy::collapsible_if)] // Sometimes clearer for control flow
#![allow(clippy::collapsible_else_if)] // Sometimes clearer for control flow

pub mod arena;
pub mod config;
pub mod embed;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod planner;

pub use arena::{
    AllocationHandle, AllocationInfo, ArenaManager, LeakRecord, LeakReport, PoolStats,
    PoolUtilization, RawAllocationHandle,
};
pub use config::{ManagerConfig, PoolId, PoolKind, PoolPreset, PoolSpec};
pub use embed::RawManagerHandle;
pub use error::{ErrorCategory, MemForgeError, MemResult};
pub use metrics::Metrics;
pub use planner::CapacityPlanner;
