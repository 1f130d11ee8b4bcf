/// Block-stream compressor
///
/// Greedy, one block at a time: every enabled strategy estimates how well it
/// covers the rows at the current position, the cheapest per covered value
/// wins, and that strategy writes the block. Raw storage is always a
/// candidate, so each step consumes at least one row.
use crate::common::config::MosaicConfig;
use crate::common::error::MosaicResult;
use crate::internal_err;
use crate::storage::mosaic::heap::MosaicHeap;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::{strategy_for, CompressionStats, MosaicStrategy};
use crate::storage::mosaic::types::{Estimate, HeapStats, MosaicTag, StrategyFilter};
use crate::types::MosaicValue;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome of compressing a column under one strategy filter
#[derive(Debug, Clone)]
pub struct StrategyAnalysis {
    /// Strategies that were enabled
    pub filter: StrategyFilter,
    /// Blocks and sizes of the heap that was built
    pub stats: HeapStats,
    /// Wall time spent compressing
    pub elapsed: Duration,
}

impl StrategyAnalysis {
    /// Strategies that produced at least one block
    pub fn used(&self) -> StrategyFilter {
        let used: Vec<MosaicTag> = self
            .filter
            .tags()
            .filter(|t| self.stats.blocks_of(*t) > 0)
            .collect();
        StrategyFilter::from_tags(&used)
    }
}

/// Compressor turning raw column values into a heap
#[derive(Debug, Clone)]
pub struct MosaicCompressor {
    /// Strategies that may be chosen
    filter: StrategyFilter,

    /// Maximum number of values per block
    max_block_count: usize,
}

impl MosaicCompressor {
    /// Creates a compressor with every strategy enabled
    pub fn new() -> Self {
        Self::from_config(&MosaicConfig::default())
    }

    /// Creates a compressor with the configured filter and block limit
    pub fn from_config(config: &MosaicConfig) -> Self {
        Self::with_settings(config.strategies, config.max_block_count)
    }

    /// Creates a compressor with custom settings
    pub fn with_settings(filter: StrategyFilter, max_block_count: usize) -> Self {
        Self {
            filter,
            max_block_count: max_block_count.max(1),
        }
    }

    pub fn filter(&self) -> StrategyFilter {
        self.filter
    }

    pub fn max_block_count(&self) -> usize {
        self.max_block_count
    }

    /// Strategies that are enabled and can encode `T`
    fn candidates<T: MosaicValue>(&self) -> Vec<&'static dyn MosaicStrategy<T>> {
        self.filter
            .tags()
            .map(strategy_for::<T>)
            .filter(|s| s.supports(T::PHYSICAL_TYPE))
            .collect()
    }

    /// Cheapest estimate at the task's current position
    fn select_best<T: MosaicValue>(
        &self,
        task: &CompressTask<'_, T>,
        candidates: &[&'static dyn MosaicStrategy<T>],
    ) -> MosaicResult<Estimate> {
        let previous = task.open_block().copied();
        let mut best: Option<Estimate> = None;
        for strategy in candidates {
            let Some(estimate) = strategy.estimate(task, previous.as_ref()) else {
                continue;
            };
            if estimate.run_length == 0 || estimate.run_length > task.remaining() {
                return Err(internal_err!(
                    "{} estimated a run of {} with {} rows left",
                    estimate.tag,
                    estimate.run_length,
                    task.remaining()
                ));
            }
            trace!(
                tag = %estimate.tag,
                run = estimate.run_length,
                bytes = estimate.compressed_size,
                "estimate"
            );
            if best.map_or(true, |b| estimate.is_better_than(&b)) {
                best = Some(estimate);
            }
        }
        best.ok_or_else(|| internal_err!("no strategy applies at row {}", task.start()))
    }

    /// Encode `values` into a new heap
    ///
    /// `nullable` decides whether the nil pattern marks missing values; arithmetic
    /// strategies never span a missing value.
    pub fn compress<T: MosaicValue>(&self, values: &[T], nullable: bool) -> MosaicResult<MosaicHeap> {
        let candidates = self.candidates::<T>();
        let mut task = CompressTask::new(values, nullable, self.max_block_count)?;

        while !task.is_done() {
            let best = self.select_best(&task, &candidates)?;
            let consumed = strategy_for::<T>(best.tag).compress(&mut task, &best)?;
            if consumed != best.run_length {
                return Err(internal_err!(
                    "{} consumed {} values but estimated {}",
                    best.tag,
                    consumed,
                    best.run_length
                ));
            }
            task.consume(consumed);
        }

        let (bytes, stats) = task.finish()?;
        let heap = MosaicHeap::from_parts(bytes, T::PHYSICAL_TYPE, stats);
        debug!(
            rows = values.len(),
            blocks = heap.stats().total_blocks(),
            runlength = heap.stats().blocks_of(MosaicTag::RunLength),
            dictionary = heap.stats().blocks_of(MosaicTag::Dictionary),
            delta = heap.stats().blocks_of(MosaicTag::Delta),
            linear = heap.stats().blocks_of(MosaicTag::Linear),
            frame = heap.stats().blocks_of(MosaicTag::Frame),
            raw = heap.stats().blocks_of(MosaicTag::Raw),
            heap_bytes = heap.size_bytes(),
            ratio = heap.compression_ratio(),
            "compressed column"
        );
        Ok(heap)
    }
}

impl MosaicCompressor {
    /// Compress `values` once per filter, keeping this compressor's block
    /// limit, and report the heap each filter produces
    ///
    /// The heaps are dropped; only their statistics survive. Filters whose
    /// chosen strategies repeat an earlier entry are skipped.
    pub fn analyse<T: MosaicValue>(
        &self,
        values: &[T],
        nullable: bool,
        filters: &[StrategyFilter],
    ) -> MosaicResult<Vec<StrategyAnalysis>> {
        let mut report: Vec<StrategyAnalysis> = Vec::with_capacity(filters.len());
        for filter in filters {
            let compressor = Self::with_settings(*filter, self.max_block_count);
            let started = Instant::now();
            let heap = compressor.compress(values, nullable)?;
            let entry = StrategyAnalysis {
                filter: *filter,
                stats: heap.stats().clone(),
                elapsed: started.elapsed(),
            };
            if report.iter().any(|seen| seen.used() == entry.used()) {
                trace!(filter = %filter, "same strategies as an earlier filter");
                continue;
            }
            debug!(
                filter = %filter,
                heap_bytes = entry.stats.heap_bytes,
                ratio = entry.stats.compression_ratio(),
                elapsed_us = entry.elapsed.as_micros() as u64,
                "analysed filter"
            );
            report.push(entry);
        }
        Ok(report)
    }
}

impl Default for MosaicCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to compress with every strategy enabled
pub fn auto_compress<T: MosaicValue>(values: &[T], nullable: bool) -> MosaicResult<MosaicHeap> {
    MosaicCompressor::new().compress(values, nullable)
}

/// Compare every strategy combination on `values` with the default block limit
pub fn analyse<T: MosaicValue>(
    values: &[T],
    nullable: bool,
    filters: &[StrategyFilter],
) -> MosaicResult<Vec<StrategyAnalysis>> {
    MosaicCompressor::new().analyse(values, nullable, filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(heap: &MosaicHeap) -> Vec<(MosaicTag, usize)> {
        heap.layout::<i32>()
            .unwrap()
            .into_iter()
            .map(|b| (b.tag, b.count))
            .collect()
    }

    #[test]
    fn test_run_column_layout() {
        let nil = i32::MIN;
        let data = vec![5, 5, 5, 5, 7, 7, nil, nil, 3];
        let rle_only = MosaicCompressor::with_settings(
            StrategyFilter::from_tags(&[MosaicTag::RunLength]),
            1000,
        );
        let heap = rle_only.compress(&data, true).unwrap();
        assert_eq!(
            tags(&heap),
            vec![
                (MosaicTag::RunLength, 4),
                (MosaicTag::RunLength, 2),
                (MosaicTag::RunLength, 2),
                (MosaicTag::RunLength, 1),
            ]
        );
        assert_eq!(heap.decompress_all::<i32>().unwrap(), data);

        // the short tail is cheaper as one dictionary block than as three runs
        let heap = auto_compress(&data, true).unwrap();
        assert_eq!(
            tags(&heap),
            vec![(MosaicTag::RunLength, 4), (MosaicTag::Dictionary, 5)]
        );
        assert_eq!(heap.decompress_all::<i32>().unwrap(), data);
    }

    #[test]
    fn test_sequence_becomes_linear() {
        let data: Vec<i32> = (0..500).map(|i| i * 4).collect();
        let heap = auto_compress(&data, true).unwrap();
        assert_eq!(tags(&heap), vec![(MosaicTag::Linear, 500)]);
    }

    #[test]
    fn test_noise_coalesces_into_raw() {
        let data = vec![1_000_000, -7, 3_000_000, 42, -900_000];
        let heap = MosaicCompressor::with_settings(StrategyFilter::from_tags(&[]), 100)
            .compress(&data, true)
            .unwrap();
        assert_eq!(tags(&heap), vec![(MosaicTag::Raw, 5)]);
        assert_eq!(heap.decompress_all::<i32>().unwrap(), data);
    }

    #[test]
    fn test_block_limit() {
        let data = vec![8i32; 10];
        let heap = MosaicCompressor::with_settings(StrategyFilter::all(), 4)
            .compress(&data, true)
            .unwrap();
        assert_eq!(
            tags(&heap),
            vec![
                (MosaicTag::RunLength, 4),
                (MosaicTag::RunLength, 4),
                (MosaicTag::RunLength, 2),
            ]
        );
    }

    #[test]
    fn test_float_columns_use_value_strategies() {
        let data = vec![1.5f64, 1.5, 2.5, f64::NAN, 2.5, 1.5];
        let heap = auto_compress(&data, true).unwrap();
        for block in heap.layout::<f64>().unwrap() {
            assert!(matches!(
                block.tag,
                MosaicTag::Raw | MosaicTag::RunLength | MosaicTag::Dictionary
            ));
        }
        let out = heap.decompress_all::<f64>().unwrap();
        assert_eq!(out.len(), data.len());
        assert!(out.iter().zip(&data).all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_empty_column() {
        let heap = auto_compress::<i64>(&[], true).unwrap();
        assert!(heap.is_empty());
        assert_eq!(heap.size_bytes(), 16);
    }

    #[test]
    fn test_candidates_respect_type() {
        let compressor = MosaicCompressor::new();
        let byte_tags: Vec<MosaicTag> = compressor.candidates::<i8>().iter().map(|s| s.tag()).collect();
        assert_eq!(
            byte_tags,
            vec![MosaicTag::Raw, MosaicTag::RunLength, MosaicTag::Dictionary, MosaicTag::Linear]
        );
        assert_eq!(compressor.candidates::<f32>().len(), 3);
    }

    #[test]
    fn test_analyse_reports_each_heap() {
        let mut data: Vec<i32> = (0..400).map(|i| i / 50).collect();
        data.extend((0..300).map(|i| 1000 + 7 * i));
        data.extend((0..300).map(|i| (i * 31) % 200));

        let filters = StrategyFilter::combinations();
        let report = analyse(&data, true, &filters).unwrap();
        assert!(!report.is_empty());
        assert_eq!(report[0].used(), StrategyFilter::from_tags(&[]));

        for entry in &report {
            let compressor =
                MosaicCompressor::with_settings(entry.filter, MosaicConfig::default().max_block_count);
            let heap = compressor.compress(&data, true).unwrap();
            assert_eq!(&entry.stats, heap.stats());
            assert_eq!(entry.stats.heap_bytes, heap.size_bytes());
            assert_eq!(entry.stats.compression_ratio(), heap.compression_ratio());
            assert!(entry.used().tags().all(|t| entry.filter.contains(t)));
        }

        // no two entries settle on the same strategies
        for (i, a) in report.iter().enumerate() {
            assert!(report[i + 1..].iter().all(|b| b.used() != a.used()));
        }

        // raw blocks only add headers
        assert!(report[0].stats.compression_ratio() < 1.0);
        assert!(report.iter().any(|e| e.stats.compression_ratio() > 2.0));
    }
}
