//! Configuration system for the cache engine.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the engine. It provides:
//! 1. **Defaults:** Baseline geometry constants (slot count, buckets, line sectors).
//! 2. **Structures:** The top-level [`CacheConfig`] and per-partition budgets.
//! 3. **Enums:** The eviction policy selector.
//!
//! Configuration is supplied as JSON via [`CacheConfig::from_json`] or use
//! `CacheConfig::default()` for embedding directly.

use serde::Deserialize;

use crate::common::{ConfigError, MAX_LINE_SECTORS, SECTOR_SIZE};

/// Default configuration constants for the engine.
///
/// These values define the baseline cache geometry when not explicitly
/// overridden in the configuration JSON.
mod defaults {
    /// Default number of cache line slots on the fast device (8192).
    ///
    /// Also the size of the collision table; slot indices range over
    /// `[0, CACHE_LINES)`.
    pub const CACHE_LINES: u32 = 8192;

    /// Default number of hash buckets (1024).
    ///
    /// Chains average `CACHE_LINES / HASH_BUCKETS` entries when full.
    pub const HASH_BUCKETS: u32 = 1024;

    /// Default sectors per cache line (8 sectors = 4 KiB lines).
    pub const LINE_SECTORS: u8 = 8;

    /// Default fallback pass-through error threshold.
    ///
    /// `None` leaves the fallback counter inactive.
    pub const FALLBACK_PT_THRESHOLD: Option<u32> = None;
}

/// Eviction policy implementation types.
///
/// Selects the recency bookkeeping used to pick victims when the cache or a
/// partition is out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    /// Least Recently Used (reference policy).
    #[default]
    Lru,
}

/// Budget and state of one partition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Whether requests targeting this partition may insert lines.
    ///
    /// Requests against a disabled partition latch a mapping error and fall
    /// back to pass-through.
    pub enabled: bool,
    /// Maximum number of cache lines this partition may hold.
    pub max_lines: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_lines: u32::MAX,
        }
    }
}

/// Top-level cache engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of cache line slots (collision table entries).
    pub cache_lines: u32,
    /// Number of hash buckets in the collision index.
    pub hash_buckets: u32,
    /// Sectors per cache line; at most [`MAX_LINE_SECTORS`].
    pub line_sectors: u8,
    /// Partition table; partition ids index this vector.
    pub partitions: Vec<PartitionConfig>,
    /// Error count at which fallback pass-through is reported once.
    ///
    /// `None` disables the counter's threshold behavior.
    pub fallback_pt_threshold: Option<u32>,
    /// Eviction policy selector.
    pub eviction: EvictionPolicyKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_lines: defaults::CACHE_LINES,
            hash_buckets: defaults::HASH_BUCKETS,
            line_sectors: defaults::LINE_SECTORS,
            partitions: vec![PartitionConfig::default()],
            fallback_pt_threshold: defaults::FALLBACK_PT_THRESHOLD,
            eviction: EvictionPolicyKind::default(),
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the JSON is malformed or the resulting
    /// configuration fails [`CacheConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: zero cache lines or buckets,
    /// a sector count outside `1..=64`, or a missing/oversized partition
    /// table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_lines == 0 {
            return Err(ConfigError::NoCacheLines);
        }
        if self.hash_buckets == 0 {
            return Err(ConfigError::NoHashBuckets);
        }
        if self.line_sectors == 0 || self.line_sectors > MAX_LINE_SECTORS {
            return Err(ConfigError::BadLineSectors(self.line_sectors));
        }
        if self.partitions.is_empty() {
            return Err(ConfigError::NoPartitions);
        }
        if self.partitions.len() > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::TooManyPartitions(self.partitions.len()));
        }
        Ok(())
    }

    /// Returns the size of one cache line in bytes.
    #[inline]
    pub fn line_bytes(&self) -> u64 {
        u64::from(self.line_sectors) * SECTOR_SIZE
    }

    /// Returns the index of the last sector within a line.
    #[inline]
    pub fn line_end_sector(&self) -> u8 {
        self.line_sectors - 1
    }
}
