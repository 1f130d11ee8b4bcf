//! Compression task: the state shared between the compressor and the
//! strategies while one column is encoded.

use crate::common::error::MosaicResult;
use crate::storage::mosaic::layout::BlockWriter;
use crate::storage::mosaic::types::{HeapStats, MosaicTag, OpenBlock};
use crate::types::{is_nil_in, MosaicValue};

/// Encoding state for one column
#[derive(Debug)]
pub struct CompressTask<'a, T: MosaicValue> {
    src: &'a [T],
    start: usize,
    stop: usize,
    nullable: bool,
    max_block_count: usize,
    dst: BlockWriter,
    open: Option<OpenBlock>,
    stats: HeapStats,
}

impl<'a, T: MosaicValue> CompressTask<'a, T> {
    /// Prepare to encode all of `src`
    pub fn new(src: &'a [T], nullable: bool, max_block_count: usize) -> MosaicResult<Self> {
        // a heap rarely outgrows the raw data plus one header per block
        let capacity = src.len().saturating_mul(T::WIDTH) / 2 + 64;
        Ok(Self {
            src,
            start: 0,
            stop: src.len(),
            nullable,
            max_block_count: max_block_count.max(1),
            dst: BlockWriter::with_capacity(capacity)?,
            open: None,
            stats: HeapStats {
                raw_bytes: src.len() * T::WIDTH,
                ..HeapStats::default()
            },
        })
    }

    /// Whether every row has been encoded
    pub fn is_done(&self) -> bool {
        self.start >= self.stop
    }

    /// Next row to encode
    pub fn start(&self) -> usize {
        self.start
    }

    /// Rows left to encode
    pub fn remaining(&self) -> usize {
        self.stop - self.start
    }

    /// The rows a single block may cover from the current position
    pub fn window(&self) -> &'a [T] {
        let end = self.stop.min(self.start + self.max_block_count);
        &self.src[self.start..end]
    }

    /// Whether the column gives nil its missing-value meaning
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Nil test under the column's nullability flag
    pub fn is_nil(&self, value: &T) -> bool {
        is_nil_in(value, self.nullable)
    }

    /// Block size limit
    pub fn max_block_count(&self) -> usize {
        self.max_block_count
    }

    /// The block written last, if any
    pub fn open_block(&self) -> Option<&OpenBlock> {
        self.open.as_ref()
    }

    /// Destination buffer
    pub fn writer(&mut self) -> &mut BlockWriter {
        &mut self.dst
    }

    /// Start a new block; it becomes the open block
    pub fn begin_block(&mut self, tag: MosaicTag, count: usize) -> MosaicResult<usize> {
        let offset = self.dst.begin_block(tag, count)?;
        self.open = Some(OpenBlock { tag, offset, count });
        self.stats.record(tag, count);
        Ok(offset)
    }

    /// Grow the open block by `extra` values already appended to its payload
    pub fn extend_open_block(&mut self, extra: usize) -> MosaicResult<()> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| crate::internal_err!("no open block to extend"))?;
        open.count += extra;
        let (tag, offset, count) = (open.tag, open.offset, open.count);
        self.dst.set_count(offset, count)?;
        self.stats.elements[tag.as_u8() as usize] += extra as u64;
        Ok(())
    }

    /// Mark `consumed` rows as encoded
    pub fn consume(&mut self, consumed: usize) {
        self.start = (self.start + consumed).min(self.stop);
    }

    /// Finish the image and return it with its statistics
    pub fn finish(self) -> MosaicResult<(Vec<u8>, HeapStats)> {
        let mut stats = self.stats;
        let bytes = self.dst.finish()?;
        stats.heap_bytes = bytes.len();
        Ok((bytes, stats))
    }
}
