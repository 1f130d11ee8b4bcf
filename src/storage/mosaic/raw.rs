/// Verbatim storage, the fallback strategy
///
/// Always applicable with a run length of one, which guarantees the
/// compressor makes progress on any input. Consecutive raw values coalesce
/// into the open raw block until it reaches the block limit.
use crate::common::error::MosaicResult;
use crate::internal_err;
use crate::storage::mosaic::layout::{block_footprint, BlockRef};
use crate::storage::mosaic::select::{emit_matches, RangePredicate};
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, RowId};
use std::ops::Range;

/// Uncompressed block strategy
pub struct RawStrategy;

impl RawStrategy {
    /// Creates a new raw strategy instance
    pub fn new() -> Self {
        Self
    }
}

impl Default for RawStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<'a, T: MosaicValue>(bytes: &'a [u8]) -> impl Iterator<Item = T> + 'a {
    bytes.chunks_exact(T::WIDTH).map(T::read_le)
}

impl<T: MosaicValue> MosaicStrategy<T> for RawStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::Raw
    }

    fn estimate(
        &self,
        task: &CompressTask<'_, T>,
        previous: Option<&OpenBlock>,
    ) -> Option<Estimate> {
        if task.is_done() {
            return None;
        }
        let extends_previous = matches!(
            previous,
            Some(open) if open.tag == MosaicTag::Raw && open.count < task.max_block_count()
        );
        let compressed_size = if extends_previous {
            T::WIDTH
        } else {
            block_footprint(T::WIDTH)
        };
        Some(Estimate {
            tag: MosaicTag::Raw,
            run_length: 1,
            compressed_size,
            uncompressed_size: T::WIDTH,
            extends_previous,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let value = *task
            .window()
            .first()
            .ok_or_else(|| internal_err!("raw compression past the end of the column"))?;

        if estimate.extends_previous {
            match task.open_block() {
                Some(open) if open.tag == MosaicTag::Raw => {}
                other => {
                    return Err(internal_err!(
                        "raw extension requested but open block is {:?}",
                        other
                    ))
                }
            }
            task.writer().put_value(value)?;
            task.extend_open_block(1)?;
        } else {
            task.begin_block(MosaicTag::Raw, 1)?;
            task.writer().put_value(value)?;
        }
        Ok(1)
    }

    fn payload_size(&self, block: &BlockRef<'_>) -> MosaicResult<usize> {
        Ok(block.count * T::WIDTH)
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        let bytes = block.payload().values::<T>(block.count)?;
        out.extend(decode::<T>(bytes));
        Ok(())
    }

    fn select(
        &self,
        block: &BlockRef<'_>,
        first: RowId,
        rows: Range<RowId>,
        predicate: &RangePredicate<T>,
        out: &mut Vec<RowId>,
    ) -> MosaicResult<()> {
        let bytes = block.payload().values::<T>(block.count)?;
        emit_matches(decode::<T>(bytes), first, rows, predicate, out);
        Ok(())
    }
}
