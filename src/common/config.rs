//! Configuration for compression and persistence

use crate::common::constants::*;
use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::types::StrategyFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mosaic configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    /// Maximum number of logical values a block may cover
    pub max_block_count: usize,
    /// Columns with fewer rows are not compressed
    pub min_rows: usize,
    /// Heaps with a worse ratio (raw bytes / heap bytes) are discarded
    pub min_compression_ratio: f64,
    /// Strategies the compressor may choose from
    pub strategies: StrategyFilter,
    /// Number of background persistence workers
    pub persist_workers: usize,
    /// Bound on queued persistence jobs
    pub persist_queue_depth: usize,
}

impl MosaicConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> MosaicResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: MosaicConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style override of the strategy filter
    pub fn with_strategies(mut self, strategies: StrategyFilter) -> Self {
        self.strategies = strategies;
        self
    }

    /// Builder-style override of the block count limit
    pub fn with_max_block_count(mut self, max_block_count: usize) -> Self {
        self.max_block_count = max_block_count;
        self
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> MosaicResult<()> {
        if self.max_block_count == 0 || self.max_block_count > u32::MAX as usize {
            return Err(MosaicError::InvalidArgument(format!(
                "max_block_count must be in 1..={}, got {}",
                u32::MAX,
                self.max_block_count
            )));
        }
        if self.persist_workers == 0 || self.persist_queue_depth == 0 {
            return Err(MosaicError::InvalidArgument(
                "persistence needs at least one worker and one queue slot".to_string(),
            ));
        }
        if !self.min_compression_ratio.is_finite() || self.min_compression_ratio < 0.0 {
            return Err(MosaicError::InvalidArgument(format!(
                "invalid min_compression_ratio {}",
                self.min_compression_ratio
            )));
        }
        Ok(())
    }
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            max_block_count: DEFAULT_MAX_BLOCK_COUNT,
            min_rows: DEFAULT_MIN_ROWS,
            min_compression_ratio: 0.0,
            strategies: StrategyFilter::all(),
            persist_workers: DEFAULT_PERSIST_WORKERS,
            persist_queue_depth: DEFAULT_PERSIST_QUEUE_DEPTH,
        }
    }
}
