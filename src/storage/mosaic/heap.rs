//! The compressed heap: an immutable, self-describing block stream.

use crate::common::constants::HEAP_HEADER_SIZE;
use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::cursor::MosaicCursor;
use crate::storage::mosaic::layout::{block_footprint, BlockStream, HeapHeader};
use crate::storage::mosaic::traits::{strategy_for, CompressionStats};
use crate::storage::mosaic::types::{BlockLayout, HeapStats};
use crate::types::{MosaicValue, PhysicalType, RowId};
use memmap2::Mmap;
use std::ops::Range;

/// Backing bytes of a heap
#[derive(Debug)]
pub enum HeapStorage {
    /// Built in memory by the compressor or read from disk
    Memory(Vec<u8>),
    /// Mapped from a persisted heap file
    Mapped(Mmap),
}

impl HeapStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            HeapStorage::Memory(bytes) => bytes.as_slice(),
            HeapStorage::Mapped(map) => &map[..],
        }
    }
}

/// A compressed column value sequence
///
/// Never modified after construction, so any number of readers may walk it
/// concurrently through shared references.
#[derive(Debug)]
pub struct MosaicHeap {
    storage: HeapStorage,
    /// Declared heap size; the storage may be longer (mapped files)
    size: usize,
    physical_type: PhysicalType,
    len: usize,
    stats: HeapStats,
}

impl MosaicHeap {
    /// Wrap an image fresh out of the compressor
    pub(crate) fn from_parts(bytes: Vec<u8>, physical_type: PhysicalType, stats: HeapStats) -> Self {
        let size = bytes.len();
        let len = stats.total_elements() as usize;
        Self {
            storage: HeapStorage::Memory(bytes),
            size,
            physical_type,
            len,
            stats,
        }
    }

    /// Validate an image of `T` values and take ownership of it
    pub fn from_bytes<T: MosaicValue>(bytes: Vec<u8>) -> MosaicResult<Self> {
        Self::validated::<T>(HeapStorage::Memory(bytes))
    }

    /// Validate a mapped heap file of `T` values
    pub fn from_mmap<T: MosaicValue>(map: Mmap) -> MosaicResult<Self> {
        Self::validated::<T>(HeapStorage::Mapped(map))
    }

    /// Check the header and walk every block once
    ///
    /// After this succeeds, each block's tag is known and its payload lies
    /// inside the declared size.
    fn validated<T: MosaicValue>(storage: HeapStorage) -> MosaicResult<Self> {
        let bytes = storage.as_slice();
        let header = HeapHeader::parse(bytes)?;
        let size = header.size as usize;

        let mut stats = HeapStats {
            heap_bytes: size,
            ..HeapStats::default()
        };
        let mut stream = BlockStream::new(&bytes[..size]);
        while let Some(block) = stream.current()? {
            stats.record(block.tag, block.count);
            strategy_for::<T>(block.tag).advance(&mut stream, &block)?;
        }
        let len = stream.row() as usize;
        stats.raw_bytes = len * T::WIDTH;

        Ok(Self {
            storage,
            size,
            physical_type: T::PHYSICAL_TYPE,
            len,
            stats,
        })
    }

    /// Number of logical values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type the heap was built for
    pub fn physical_type(&self) -> PhysicalType {
        self.physical_type
    }

    /// The heap image, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage.as_slice()[..self.size]
    }

    /// Heap size in bytes, header included
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Whether the heap is backed by a file mapping
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, HeapStorage::Mapped(_))
    }

    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }

    /// Walker positioned at the first block
    pub fn block_stream(&self) -> BlockStream<'_> {
        BlockStream::new(self.as_bytes())
    }

    /// Fail unless the heap holds `T` values
    pub fn check_type<T: MosaicValue>(&self) -> MosaicResult<()> {
        if T::PHYSICAL_TYPE != self.physical_type {
            return Err(MosaicError::InvalidType(format!(
                "heap holds {} values, {} requested",
                self.physical_type,
                T::PHYSICAL_TYPE
            )));
        }
        Ok(())
    }

    /// Cursor over the rows of `range`
    pub fn open_cursor<T: MosaicValue>(&self, range: Range<RowId>) -> MosaicResult<MosaicCursor<'_, T>> {
        MosaicCursor::new(self, range)
    }

    /// Every value, in row order
    pub fn decompress_all<T: MosaicValue>(&self) -> MosaicResult<Vec<T>> {
        self.open_cursor(0..self.len as RowId)?.decompress_all()
    }

    /// Per-block report of the stream
    pub fn layout<T: MosaicValue>(&self) -> MosaicResult<Vec<BlockLayout>> {
        self.check_type::<T>()?;
        let mut layout = Vec::with_capacity(self.stats.total_blocks() as usize);
        let mut stream = self.block_stream();
        while let Some(block) = stream.current()? {
            let strategy = strategy_for::<T>(block.tag);
            layout.push(BlockLayout {
                tag: block.tag,
                count: block.count,
                input_bytes: block.count * T::WIDTH,
                output_bytes: block_footprint(strategy.payload_size(&block)?),
                properties: strategy.describe(&block)?,
            });
            strategy.advance(&mut stream, &block)?;
        }
        Ok(layout)
    }
}

impl CompressionStats for MosaicHeap {
    fn uncompressed_size(&self) -> usize {
        self.len * self.physical_type.get_size()
    }

    fn compressed_size(&self) -> usize {
        self.size
    }
}

impl CompressionStats for HeapStats {
    fn uncompressed_size(&self) -> usize {
        self.raw_bytes
    }

    fn compressed_size(&self) -> usize {
        self.heap_bytes
    }
}
