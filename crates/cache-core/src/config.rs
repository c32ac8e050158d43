//! Core cache configuration (spec.md §6's configuration table), loadable
//! from TOML via `serde`, following `teleport-core::config::Config`'s
//! nested-struct-with-`Default` pattern and `#[serde(default)]` style.

use serde::{Deserialize, Serialize};

/// Every tunable named in spec.md §6, with defaults matching the table
/// exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub chunk_size: usize,
    pub cache_is_shared: bool,
    pub mindlessly_cache_vary: bool,
    pub object_high_mark: usize,
    pub public_object_low_mark: usize,
    /// `0` means "auto: 16 × object_high_mark, rounded to a power of two",
    /// matching spec.md §6's `objectHashTableSize` default.
    pub object_hash_table_size: usize,
    pub max_expires_age_secs: i64,
    pub max_age_secs: i64,
    pub max_age_fraction: f64,
    pub max_no_modified_age_secs: i64,
    pub idle_time_secs: u64,
    pub max_writeout_when_idle: usize,
    pub max_objects_when_idle: usize,

    /// Chunk pool sizing; not named individually in spec.md §6's table but
    /// required by `ChunkPool::new`'s watermark arguments (§4.A).
    pub total_chunks: usize,
    pub chunk_low_mark: usize,
    pub chunk_high_mark: usize,
    pub chunk_critical_mark: usize,
}

impl CacheConfig {
    /// Resolves `object_hash_table_size`'s `0` ("auto") sentinel to a
    /// concrete power-of-two size, per spec.md §6.
    pub fn resolved_hash_table_size(&self) -> usize {
        if self.object_hash_table_size != 0 {
            return self.object_hash_table_size.next_power_of_two();
        }
        (self.object_high_mark * 16).next_power_of_two()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            cache_is_shared: false,
            mindlessly_cache_vary: false,
            object_high_mark: 2048,
            public_object_low_mark: 2048 / 2,
            object_hash_table_size: 0,
            max_expires_age_secs: 30 * 86400 + 3600,
            max_age_secs: 14 * 86400 + 3600,
            max_age_fraction: 0.1,
            max_no_modified_age_secs: 23 * 60,
            idle_time_secs: 30,
            max_writeout_when_idle: 65536,
            max_objects_when_idle: 32,
            total_chunks: 16384,
            chunk_low_mark: 16384 / 2,
            chunk_high_mark: (16384 * 3) / 4,
            chunk_critical_mark: (16384 * 9) / 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.chunk_size, 4096);
        assert_eq!(cfg.object_high_mark, 2048);
        assert_eq!(cfg.public_object_low_mark, 1024);
        assert_eq!(cfg.max_expires_age_secs, 30 * 86400 + 3600);
        assert_eq!(cfg.max_age_secs, 14 * 86400 + 3600);
        assert_eq!(cfg.max_no_modified_age_secs, 23 * 60);
    }

    #[test]
    fn auto_hash_table_size_is_power_of_two_16x_high_mark() {
        let cfg = CacheConfig::default();
        let size = cfg.resolved_hash_table_size();
        assert_eq!(size, (2048usize * 16).next_power_of_two());
    }

    #[test]
    fn toml_round_trip_with_partial_overrides() {
        let toml_str = "object_high_mark = 4096\n";
        let cfg: CacheConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.object_high_mark, 4096);
        // Unspecified fields fall back to Default via #[serde(default)].
        assert_eq!(cfg.chunk_size, 4096);
    }
}
