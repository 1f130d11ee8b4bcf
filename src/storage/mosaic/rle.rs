/// RLE (Run-Length Encoding) block strategy
///
/// A run-length block stores a single representative value that expands to
/// `count` copies. Runs are detected on bit patterns, so a stretch of nils is a
/// run like any other and NaN payloads survive unchanged.
///
/// Best for:
/// - Sorted columns (e.g., status flags, partition keys)
/// - Columns with many repeated values
/// - Long stretches of missing values
///
/// Selection over a run needs one predicate evaluation per block: either all
/// rows of the block qualify or none do.
use crate::common::error::MosaicResult;
use crate::internal_err;
use crate::storage::mosaic::layout::{block_footprint, BlockRef};
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, RowId};
use std::ops::Range;

/// RLE block strategy
pub struct RunLengthStrategy;

impl RunLengthStrategy {
    /// Creates a new RLE strategy instance
    pub fn new() -> Self {
        Self
    }

    /// Length of the run at the head of `values`
    fn run_length<T: MosaicValue>(values: &[T]) -> usize {
        match values.first() {
            Some(head) => values.iter().take_while(|v| v.same(head)).count(),
            None => 0,
        }
    }
}

impl Default for RunLengthStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MosaicValue> MosaicStrategy<T> for RunLengthStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::RunLength
    }

    fn estimate(
        &self,
        task: &CompressTask<'_, T>,
        _previous: Option<&OpenBlock>,
    ) -> Option<Estimate> {
        let run_length = Self::run_length(task.window());
        if run_length == 0 {
            return None;
        }
        Some(Estimate {
            tag: MosaicTag::RunLength,
            run_length,
            compressed_size: block_footprint(T::WIDTH),
            uncompressed_size: run_length * T::WIDTH,
            extends_previous: false,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let window = task.window();
        let run_length = Self::run_length(window);
        if run_length != estimate.run_length {
            return Err(internal_err!(
                "run length changed between estimate ({}) and compress ({})",
                estimate.run_length,
                run_length
            ));
        }
        task.begin_block(MosaicTag::RunLength, run_length)?;
        task.writer().put_value(window[0])?;
        Ok(run_length)
    }

    fn payload_size(&self, _block: &BlockRef<'_>) -> MosaicResult<usize> {
        Ok(T::WIDTH)
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        let value: T = block.payload().read_value()?;
        out.extend(std::iter::repeat(value).take(block.count));
        Ok(())
    }

    fn select(
        &self,
        block: &BlockRef<'_>,
        _first: RowId,
        rows: Range<RowId>,
        predicate: &RangePredicate<T>,
        out: &mut Vec<RowId>,
    ) -> MosaicResult<()> {
        let value: T = block.payload().read_value()?;
        if predicate.matches(&value) {
            out.extend(rows);
        }
        Ok(())
    }

    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let value: T = block.payload().read_value()?;
        Ok(format!("{:?}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mosaic::layout::BlockStream;

    #[test]
    fn test_run_detection() {
        assert_eq!(RunLengthStrategy::run_length(&[5, 5, 5, 7]), 3);
        assert_eq!(RunLengthStrategy::run_length(&[i32::MIN, i32::MIN, 3]), 2);
        assert_eq!(RunLengthStrategy::run_length::<i32>(&[]), 0);
        // -0.0 and 0.0 are different bit patterns
        assert_eq!(RunLengthStrategy::run_length(&[0.0f64, -0.0]), 1);
    }

    #[test]
    fn test_estimate_capped_by_block_limit() {
        let data = vec![9i16; 50];
        let task = CompressTask::new(&data, true, 16).unwrap();
        let estimate = RunLengthStrategy.estimate(&task, None).unwrap();
        assert_eq!(estimate.run_length, 16);
        assert_eq!(estimate.compressed_size, 16);
        assert_eq!(estimate.uncompressed_size, 32);
    }

    #[test]
    fn test_compress_decompress_block() {
        let data = [4i64, 4, 4, 8];
        let mut task = CompressTask::new(&data, true, 100).unwrap();
        let estimate = RunLengthStrategy.estimate(&task, None).unwrap();
        let consumed = RunLengthStrategy.compress(&mut task, &estimate).unwrap();
        assert_eq!(consumed, 3);
        let (bytes, _) = task.finish().unwrap();

        let mut stream = BlockStream::new(&bytes);
        let block = stream.current().unwrap().unwrap();
        let mut out: Vec<i64> = Vec::new();
        RunLengthStrategy.decompress(&block, &mut out).unwrap();
        assert_eq!(out, vec![4, 4, 4]);

        MosaicStrategy::<i64>::advance(&RunLengthStrategy, &mut stream, &block).unwrap();
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_select_whole_block() {
        let data = [6i32; 5];
        let mut task = CompressTask::new(&data, true, 100).unwrap();
        let estimate = RunLengthStrategy.estimate(&task, None).unwrap();
        RunLengthStrategy.compress(&mut task, &estimate).unwrap();
        let (bytes, _) = task.finish().unwrap();
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();

        let mut out: Vec<RowId> = Vec::new();
        let hit = RangePredicate::new(Some(5i32), Some(6), true, true, false, true);
        RunLengthStrategy
            .select(&block, 10, 11..14, &hit, &mut out)
            .unwrap();
        assert_eq!(out, vec![11, 12, 13]);

        out.clear();
        let miss = RangePredicate::new(Some(7i32), None, true, false, false, true);
        RunLengthStrategy
            .select(&block, 10, 10..15, &miss, &mut out)
            .unwrap();
        assert!(out.is_empty());
    }
}
