use serde::{Deserialize, Serialize};
use crate::{config_err, Result};

// Cache and block sizing for the store layer. Nothing here changes what gets
// written to disk, only how much is kept hot in memory while reading or
// writing, so two processes with different configs can share files.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Rows per block in the null bitmap's block cache.
    pub bitmap_block_rows: usize,
    /// Number of bitmap blocks kept in memory before the least recently
    /// used one is flushed and dropped.
    pub bitmap_cache_blocks: usize,
    /// Materialized rows kept by a table proxy.
    pub row_cache_capacity: usize,
    /// Materialized columns kept by a table proxy.
    pub column_cache_capacity: usize,
    /// Entries in each store's write-dedup cache.
    pub dedup_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bitmap_block_rows: 4096,
            bitmap_cache_blocks: 16,
            row_cache_capacity: 1024,
            column_cache_capacity: 16,
            dedup_cache_capacity: 8192,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("bitmap_block_rows", self.bitmap_block_rows),
            ("bitmap_cache_blocks", self.bitmap_cache_blocks),
            ("row_cache_capacity", self.row_cache_capacity),
            ("column_cache_capacity", self.column_cache_capacity),
            ("dedup_cache_capacity", self.dedup_cache_capacity),
        ];
        for (name, val) in fields {
            if val == 0 {
                return Err(config_err(format!("config field {name} must be nonzero")));
            }
        }
        Ok(())
    }
}
