/// Strategy trait
///
/// Every block encoding implements the same contract: estimate how well it
/// covers the head of the remaining input, write one block, expand one block,
/// and step over one block without expanding it. Direct selection is a fifth,
/// optional operation with a decompress-and-filter default.
use crate::common::error::MosaicResult;
use crate::storage::mosaic::delta::DeltaStrategy;
use crate::storage::mosaic::dictionary::DictionaryStrategy;
use crate::storage::mosaic::frame::FrameStrategy;
use crate::storage::mosaic::layout::{BlockRef, BlockStream};
use crate::storage::mosaic::linear::LinearStrategy;
use crate::storage::mosaic::raw::RawStrategy;
use crate::storage::mosaic::rle::RunLengthStrategy;
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, PhysicalType, RowId};
use std::ops::Range;

/// Block encoding strategy
pub trait MosaicStrategy<T: MosaicValue>: Send + Sync {
    /// Tag written into the headers of blocks this strategy produces
    fn tag(&self) -> MosaicTag;

    /// Whether this strategy can encode values of `physical_type`
    fn supports(&self, physical_type: PhysicalType) -> bool {
        let _ = physical_type;
        true
    }

    /// Inspect the rows at the head of the task's remaining range
    ///
    /// Returns `None` when the strategy does not apply; otherwise the run
    /// length is at least one and at most the task's block limit. Never
    /// touches the destination buffer.
    fn estimate(&self, task: &CompressTask<'_, T>, previous: Option<&OpenBlock>)
        -> Option<Estimate>;

    /// Write one block for `estimate` and return the number of values consumed
    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize>;

    /// Unpadded payload size of `block`
    fn payload_size(&self, block: &BlockRef<'_>) -> MosaicResult<usize>;

    /// Append the `block.count` values of `block` to `out`
    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()>;

    /// Step past `block` without expanding it
    fn advance(&self, stream: &mut BlockStream<'_>, block: &BlockRef<'_>) -> MosaicResult<()> {
        let size = self.payload_size(block)?;
        stream.advance_past(block, size)
    }

    /// Emit the rows of `rows` (a subrange of the block starting at `first`)
    /// whose values satisfy `predicate`
    fn select(
        &self,
        block: &BlockRef<'_>,
        first: RowId,
        rows: Range<RowId>,
        predicate: &RangePredicate<T>,
        out: &mut Vec<RowId>,
    ) -> MosaicResult<()> {
        let mut values = Vec::with_capacity(block.count);
        self.decompress(block, &mut values)?;
        for row in rows {
            if predicate.matches(&values[(row - first) as usize]) {
                out.push(row);
            }
        }
        Ok(())
    }

    /// Short human readable summary of the payload
    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let _ = block;
        Ok(String::new())
    }
}

/// The strategy that reads and writes blocks tagged `tag`
pub fn strategy_for<T: MosaicValue>(tag: MosaicTag) -> &'static dyn MosaicStrategy<T> {
    match tag {
        MosaicTag::Raw => &RawStrategy,
        MosaicTag::RunLength => &RunLengthStrategy,
        MosaicTag::Dictionary => &DictionaryStrategy,
        MosaicTag::Delta => &DeltaStrategy,
        MosaicTag::Linear => &LinearStrategy,
        MosaicTag::Frame => &FrameStrategy,
    }
}

/// Helper trait for compression statistics
pub trait CompressionStats {
    /// Returns the uncompressed size
    fn uncompressed_size(&self) -> usize;

    /// Returns the compressed size
    fn compressed_size(&self) -> usize;

    /// Returns the compression ratio
    fn compression_ratio(&self) -> f64 {
        if self.compressed_size() > 0 {
            self.uncompressed_size() as f64 / self.compressed_size() as f64
        } else {
            1.0
        }
    }

    /// Returns the space savings as a percentage
    fn space_savings(&self) -> f64 {
        if self.uncompressed_size() > 0 {
            (1.0 - (self.compressed_size() as f64 / self.uncompressed_size() as f64)) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStats {
        uncompressed: usize,
        compressed: usize,
    }

    impl CompressionStats for MockStats {
        fn uncompressed_size(&self) -> usize {
            self.uncompressed
        }

        fn compressed_size(&self) -> usize {
            self.compressed
        }
    }

    #[test]
    fn test_compression_ratio() {
        let stats = MockStats {
            uncompressed: 1000,
            compressed: 100,
        };
        assert_eq!(stats.compression_ratio(), 10.0);
        assert_eq!(stats.space_savings(), 90.0);
    }

    #[test]
    fn test_dispatch_matches_tag() {
        for tag in MosaicTag::ALL {
            assert_eq!(strategy_for::<i32>(tag).tag(), tag);
            assert_eq!(strategy_for::<f64>(tag).tag(), tag);
        }
    }

    #[test]
    fn test_arithmetic_strategies_reject_floats() {
        for tag in [MosaicTag::Delta, MosaicTag::Linear, MosaicTag::Frame] {
            assert!(!strategy_for::<f64>(tag).supports(PhysicalType::Double));
            assert!(strategy_for::<i64>(tag).supports(PhysicalType::Int64));
        }
        assert!(strategy_for::<f32>(MosaicTag::Dictionary).supports(PhysicalType::Float));
    }
}
