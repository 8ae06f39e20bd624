//! Pool configuration types
//!
//! This module contains the immutable configuration handed to the arena
//! manager at initialization: which pools exist (host pinned memory,
//! device memory per accelerator), their byte capacities, and the grant
//! alignment. Includes capacity presets for common GPU classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{MemForgeError, MemResult};

/// Memory kind backing a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Pinned host memory (staging for transfers)
    Host,
    /// Accelerator device memory, addressed by device index
    Device,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Host => write!(f, "host"),
            PoolKind::Device => write!(f, "device"),
        }
    }
}

/// Identity of a pool: memory kind plus device index
///
/// Host pools always use device index 0. Two allocations belong to the
/// same pool exactly when their `PoolId`s are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId {
    pub kind: PoolKind,
    pub device_index: u8,
}

impl PoolId {
    /// Create a pool id for the given kind and device index
    pub fn new(kind: PoolKind, device_index: u8) -> Self {
        PoolId { kind, device_index }
    }

    /// The host pinned-memory pool
    pub fn host() -> Self {
        PoolId::new(PoolKind::Host, 0)
    }

    /// The device pool for the given accelerator index
    pub fn device(device_index: u8) -> Self {
        PoolId::new(PoolKind::Device, device_index)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PoolKind::Host => write!(f, "host"),
            PoolKind::Device => write!(f, "device-{}", self.device_index),
        }
    }
}

/// Configuration for a single pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    pub kind: PoolKind,
    #[serde(default)]
    pub device_index: u8,
    pub capacity_bytes: usize,
}

impl PoolSpec {
    /// Create a host pinned-memory pool spec
    pub fn host(capacity_bytes: usize) -> Self {
        PoolSpec {
            kind: PoolKind::Host,
            device_index: 0,
            capacity_bytes,
        }
    }

    /// Create a device pool spec
    pub fn device(device_index: u8, capacity_bytes: usize) -> Self {
        PoolSpec {
            kind: PoolKind::Device,
            device_index,
            capacity_bytes,
        }
    }

    /// The identity this spec configures
    pub fn pool_id(&self) -> PoolId {
        PoolId::new(self.kind, self.device_index)
    }
}

/// Capacity presets for common accelerator classes
///
/// The preset sizes the tensor-buffer budget, not the whole card: half of
/// the target VRAM is reserved for model weights and KV cache, matching
/// how the serving layer splits device memory.
#[derive(Debug, Clone, Copy)]
pub enum PoolPreset {
    /// Edge devices (~4GB VRAM)
    Small,
    /// Consumer GPUs (~12GB VRAM)
    Medium,
    /// Data center GPUs (~40GB VRAM)
    Large,
    /// Explicit capacity in bytes
    Custom { capacity_bytes: usize },
}

impl PoolPreset {
    /// Tensor-buffer capacity for this preset
    pub fn capacity_bytes(self) -> usize {
        const GB: usize = 1024 * 1024 * 1024;
        match self {
            PoolPreset::Small => 2 * GB,
            PoolPreset::Medium => 6 * GB,
            PoolPreset::Large => 20 * GB,
            PoolPreset::Custom { capacity_bytes } => capacity_bytes,
        }
    }

    /// Device pool spec for this preset
    pub fn device_spec(self, device_index: u8) -> PoolSpec {
        PoolSpec::device(device_index, self.capacity_bytes())
    }
}

/// Immutable manager configuration
///
/// Built once, validated, then handed to `ArenaManager::new`. The pool
/// set cannot change after initialization.
///
/// # Example
/// ```ignore
/// let config = ManagerConfig::new()
///     .with_pool(PoolSpec::host(256 * 1024 * 1024))
///     .with_pool(PoolPreset::Medium.device_spec(0));
/// let manager = ArenaManager::new(config)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub pools: Vec<PoolSpec>,
    /// Grant alignment in bytes (power of two)
    #[serde(default = "default_alignment")]
    pub alignment: usize,
}

/// Default grant alignment (256 bytes, the typical accelerator requirement)
pub const DEFAULT_ALIGNMENT: usize = 256;

fn default_alignment() -> usize {
    DEFAULT_ALIGNMENT
}

impl ManagerConfig {
    /// Create an empty configuration with the default alignment
    pub fn new() -> Self {
        ManagerConfig {
            pools: Vec::new(),
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Add a pool
    pub fn with_pool(mut self, spec: PoolSpec) -> Self {
        self.pools.push(spec);
        self
    }

    /// Override the grant alignment (must be a power of two)
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Load a configuration from a JSON string
    pub fn from_json(json: &str) -> MemResult<Self> {
        let config: ManagerConfig = serde_json::from_str(json)
            .map_err(|e| MemForgeError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> MemResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            MemForgeError::InvalidConfiguration(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - No pools configured
    /// - Zero-capacity pool
    /// - Duplicate pool identity
    /// - Host pool with a non-zero device index
    /// - Alignment not a power of two
    pub fn validate(&self) -> MemResult<()> {
        if self.pools.is_empty() {
            return Err(MemForgeError::InvalidConfiguration(
                "at least one pool must be configured".to_string(),
            ));
        }
        if !self.alignment.is_power_of_two() {
            return Err(MemForgeError::InvalidAlignment(self.alignment));
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.pools {
            if spec.capacity_bytes == 0 {
                return Err(MemForgeError::InvalidConfiguration(format!(
                    "pool {} has zero capacity",
                    spec.pool_id()
                )));
            }
            if spec.kind == PoolKind::Host && spec.device_index != 0 {
                return Err(MemForgeError::InvalidConfiguration(format!(
                    "host pool must use device index 0, got {}",
                    spec.device_index
                )));
            }
            if !seen.insert(spec.pool_id()) {
                return Err(MemForgeError::InvalidConfiguration(format!(
                    "duplicate pool {}",
                    spec.pool_id()
                )));
            }
        }
        Ok(())
    }

    /// Total configured capacity across all pools
    pub fn total_capacity_bytes(&self) -> usize {
        self.pools.iter().map(|p| p.capacity_bytes).sum()
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a byte count as human readable
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    const GB: usize = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_id_display() {
        assert_eq!(PoolId::host().to_string(), "host");
        assert_eq!(PoolId::device(0).to_string(), "device-0");
        assert_eq!(PoolId::device(3).to_string(), "device-3");
    }

    #[test]
    fn test_pool_spec_identity() {
        let spec = PoolSpec::device(1, 1024);
        assert_eq!(spec.pool_id(), PoolId::device(1));

        let spec = PoolSpec::host(1024);
        assert_eq!(spec.pool_id(), PoolId::host());
    }

    #[test]
    fn test_valid_config() {
        let config = ManagerConfig::new()
            .with_pool(PoolSpec::host(1024))
            .with_pool(PoolSpec::device(0, 4096));
        assert!(config.validate().is_ok());
        assert_eq!(config.total_capacity_bytes(), 5120);
    }

    #[test]
    fn test_empty_config_rejected() {
        let config = ManagerConfig::new();
        assert!(matches!(
            config.validate(),
            Err(MemForgeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ManagerConfig::new().with_pool(PoolSpec::device(0, 0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_pool_rejected() {
        let config = ManagerConfig::new()
            .with_pool(PoolSpec::device(0, 1024))
            .with_pool(PoolSpec::device(0, 2048));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_host_pool_device_index_rejected() {
        let config = ManagerConfig::new().with_pool(PoolSpec {
            kind: PoolKind::Host,
            device_index: 1,
            capacity_bytes: 1024,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let config = ManagerConfig::new()
            .with_pool(PoolSpec::device(0, 1024))
            .with_alignment(100);
        assert!(matches!(
            config.validate(),
            Err(MemForgeError::InvalidAlignment(100))
        ));
    }

    #[test]
    fn test_preset_capacities() {
        assert!(PoolPreset::Small.capacity_bytes() < PoolPreset::Medium.capacity_bytes());
        assert!(PoolPreset::Medium.capacity_bytes() < PoolPreset::Large.capacity_bytes());
        assert_eq!(
            PoolPreset::Custom {
                capacity_bytes: 512
            }
            .capacity_bytes(),
            512
        );

        let spec = PoolPreset::Medium.device_spec(2);
        assert_eq!(spec.pool_id(), PoolId::device(2));
    }

    #[test]
    fn test_config_json_round_trip() {
        let json = r#"{
            "pools": [
                {"kind": "host", "capacity_bytes": 1048576},
                {"kind": "device", "device_index": 0, "capacity_bytes": 4194304}
            ],
            "alignment": 256
        }"#;

        let config = ManagerConfig::from_json(json).unwrap();
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[0].pool_id(), PoolId::host());
        assert_eq!(config.pools[1].capacity_bytes, 4194304);
        assert_eq!(config.alignment, 256);
    }

    #[test]
    fn test_config_json_default_alignment() {
        let json = r#"{"pools": [{"kind": "device", "capacity_bytes": 1024}]}"#;
        let config = ManagerConfig::from_json(json).unwrap();
        assert_eq!(config.alignment, DEFAULT_ALIGNMENT);
    }

    #[test]
    fn test_config_json_invalid_rejected() {
        assert!(ManagerConfig::from_json("not json").is_err());
        // Valid JSON, invalid config (no pools)
        assert!(ManagerConfig::from_json(r#"{"pools": []}"#).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(2_000_000), "1.91 MB");
        assert_eq!(format_bytes(2_000_000_000), "1.86 GB");
    }
}
