//! Unified error handling for MemForge
//!
//! This module provides the single error type used across the crate and
//! implements error categorization for:
//! - User errors (bad sizes, bad configuration - actionable by users)
//! - Recoverable errors (capacity-dependent, the caller decides)
//! - Caller bugs (double release, forged handles - surfaced, never swallowed)
//! - Internal errors (bugs, poisoned locks)

use std::fmt;

use crate::config::PoolId;

/// Unified error type for MemForge
///
/// All manager operations return this type. Errors are never logged and
/// swallowed inside the manager; the caller always sees the typed result.
#[derive(Debug, thiserror::Error)]
pub enum MemForgeError {
    // ========== Pool Selection ==========
    /// No pool configured for the requested kind/device
    #[error("no pool configured for {0}")]
    InvalidKind(PoolId),

    // ========== Capacity ==========
    /// Granting the request would exceed the pool's byte budget.
    ///
    /// Transient: the caller may retry after releasing other allocations.
    /// The manager never blocks waiting for space.
    #[error("pool {pool} out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        pool: PoolId,
        requested: usize,
        available: usize,
    },

    // ========== Handle Misuse ==========
    /// Handle does not name any tracked allocation
    #[error("unknown allocation handle: {0}")]
    UnknownAllocation(String),

    /// Second release of an already-released allocation
    #[error("allocation already released: {0}")]
    DoubleRelease(String),

    /// Manager handle does not name a live manager (e.g. after teardown)
    #[error("unknown manager handle: {0:#x}")]
    UnknownManager(u64),

    // ========== Request Validation ==========
    /// Allocation size must be greater than zero
    #[error("allocation size must be greater than zero")]
    ZeroSizeRequest,

    /// Alignment must be a power of two
    #[error("alignment must be a power of two, got {0}")]
    InvalidAlignment(usize),

    /// Invalid manager configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ========== Internal Errors ==========
    /// Lock poisoned (indicates a panic while holding a pool lock)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl MemForgeError {
    /// Categorize the error for handling decisions
    ///
    /// # Examples
    /// ```ignore
    /// match error.category() {
    ///     ErrorCategory::Recoverable => retry_after_releasing(),
    ///     ErrorCategory::Caller => panic!("bug in the execution layer"),
    ///     _ => fail_request(),
    /// }
    /// ```
    pub fn category(&self) -> ErrorCategory {
        match self {
            // User errors - bad input or configuration
            MemForgeError::ZeroSizeRequest
            | MemForgeError::InvalidAlignment(_)
            | MemForgeError::InvalidConfiguration(_) => ErrorCategory::User,

            // Recoverable - capacity-dependent, caller decides
            MemForgeError::OutOfMemory { .. } => ErrorCategory::Recoverable,

            // Caller bugs - misuse of the handle protocol
            MemForgeError::InvalidKind(_)
            | MemForgeError::UnknownAllocation(_)
            | MemForgeError::DoubleRelease(_)
            | MemForgeError::UnknownManager(_) => ErrorCategory::Caller,

            // Internal - bugs in the manager itself
            MemForgeError::LockPoisoned(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is recoverable (capacity-dependent)
    ///
    /// The caller may retry the operation after other allocations are
    /// released. Retrying is a caller policy; the manager never retries.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Recoverable)
    }

    /// Check if this is a user-facing error (bad input or configuration)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is a caller bug (handle protocol misuse)
    ///
    /// These indicate double-free-equivalent logic errors elsewhere in the
    /// system and should be treated as bugs, not transient conditions.
    pub fn is_caller_bug(&self) -> bool {
        matches!(self.category(), ErrorCategory::Caller)
    }

    /// Check if this is an internal error (indicates a bug in the manager)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid input or configuration
    User,
    /// Recoverable error - capacity-dependent condition
    Recoverable,
    /// Caller bug - handle protocol misuse
    Caller,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Caller => write!(f, "Caller"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for MemForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        MemForgeError::LockPoisoned(err.to_string())
    }
}

/// Helper type alias for Results using MemForgeError
pub type MemResult<T> = std::result::Result<T, MemForgeError>;
