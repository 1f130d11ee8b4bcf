//! Forward cursor over a row range of a compressed heap.

use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::heap::MosaicHeap;
use crate::storage::mosaic::layout::BlockStream;
use crate::storage::mosaic::traits::strategy_for;
use crate::storage::mosaic::types::MosaicTag;
use crate::types::{MosaicValue, RowId};
use std::marker::PhantomData;
use std::ops::Range;

/// Values of one block, clipped to the cursor range
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock<T> {
    pub tag: MosaicTag,
    /// Row of `values[0]`
    pub first_row: RowId,
    pub values: Vec<T>,
}

/// Walks the blocks overlapping a row range, expanding one block per call
///
/// Blocks before the range are stepped over without being expanded.
#[derive(Debug)]
pub struct MosaicCursor<'h, T> {
    stream: BlockStream<'h>,
    range: Range<RowId>,
    _values: PhantomData<T>,
}

impl<'h, T: MosaicValue> MosaicCursor<'h, T> {
    /// Position a cursor at the first block overlapping `range`
    pub fn new(heap: &'h MosaicHeap, range: Range<RowId>) -> MosaicResult<Self> {
        heap.check_type::<T>()?;
        if range.start > range.end || range.end > heap.len() as RowId {
            return Err(MosaicError::InvalidArgument(format!(
                "row range {:?} outside heap of {} rows",
                range,
                heap.len()
            )));
        }
        let mut stream = heap.block_stream();
        while let Some(block) = stream.current()? {
            if stream.row() + block.count as RowId > range.start {
                break;
            }
            strategy_for::<T>(block.tag).advance(&mut stream, &block)?;
        }
        Ok(Self {
            stream,
            range,
            _values: PhantomData,
        })
    }

    /// Rows the cursor covers
    pub fn range(&self) -> Range<RowId> {
        self.range.clone()
    }

    /// Expand the next block, or `None` once the range is exhausted
    pub fn decompress_next(&mut self) -> MosaicResult<Option<DecodedBlock<T>>> {
        if self.range.is_empty() || self.stream.row() >= self.range.end {
            return Ok(None);
        }
        let Some(block) = self.stream.current()? else {
            return Ok(None);
        };
        let strategy = strategy_for::<T>(block.tag);
        let first = self.stream.row();

        let mut values = Vec::with_capacity(block.count);
        strategy.decompress(&block, &mut values)?;
        if values.len() != block.count {
            return Err(crate::corrupted_err!(
                "block at {} expanded to {} values, header says {}",
                block.offset,
                values.len(),
                block.count
            ));
        }
        strategy.advance(&mut self.stream, &block)?;

        let last = first + block.count as RowId;
        let lo = self.range.start.max(first);
        let hi = self.range.end.min(last);
        values.truncate((hi - first) as usize);
        values.drain(..(lo - first) as usize);
        Ok(Some(DecodedBlock {
            tag: block.tag,
            first_row: lo,
            values,
        }))
    }

    /// Expand the whole remaining range
    pub fn decompress_all(mut self) -> MosaicResult<Vec<T>> {
        let mut out = Vec::with_capacity((self.range.end - self.range.start) as usize);
        while let Some(block) = self.decompress_next()? {
            out.extend(block.values);
        }
        Ok(out)
    }
}

/// Values at the given ascending row positions
pub fn project<T: MosaicValue>(heap: &MosaicHeap, rows: &[RowId]) -> MosaicResult<Vec<T>> {
    heap.check_type::<T>()?;
    if rows.windows(2).any(|w| w[0] > w[1]) {
        return Err(MosaicError::InvalidArgument(
            "projection rows must be ascending".to_string(),
        ));
    }
    if let Some(last) = rows.last() {
        if *last >= heap.len() as RowId {
            return Err(MosaicError::InvalidArgument(format!(
                "row {} outside heap of {} rows",
                last,
                heap.len()
            )));
        }
    }

    let mut out = Vec::with_capacity(rows.len());
    let mut scratch = Vec::new();
    let mut pending = rows;
    let mut stream = heap.block_stream();
    while let Some(block) = stream.current()? {
        if pending.is_empty() {
            break;
        }
        let strategy = strategy_for::<T>(block.tag);
        let first = stream.row();
        let last = first + block.count as RowId;
        let inside = pending.partition_point(|r| *r < last);
        if inside > 0 {
            scratch.clear();
            strategy.decompress(&block, &mut scratch)?;
            for row in &pending[..inside] {
                let value = scratch.get((row - first) as usize).ok_or_else(|| {
                    crate::corrupted_err!("block at {} is short of row {}", block.offset, row)
                })?;
                out.push(*value);
            }
            pending = &pending[inside..];
        }
        strategy.advance(&mut stream, &block)?;
    }
    Ok(out)
}
