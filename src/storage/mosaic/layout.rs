//! Binary layout of a compressed heap.
//!
//! ```text
//! offset 0   u64  MOSAIC_MAGIC
//! offset 8   u64  heap size in bytes (header included)
//! offset 16  block*                      each block starts 8-byte aligned
//!
//! block:     u8 tag | 3 x u8 zero | u32 count | payload | zero padding
//! ```
//!
//! All words are little endian. Payload sections holding typed values are
//! padded to the value width; since a block header is 8 bytes and blocks are
//! 8-byte aligned, a payload that starts with values needs no leading padding.

use crate::common::constants::{
    BLOCK_ALIGNMENT, BLOCK_HEADER_SIZE, HEAP_HEADER_SIZE, MOSAIC_MAGIC,
};
use crate::common::error::{MosaicError, MosaicResult};
use crate::corrupted_err;
use crate::storage::mosaic::types::MosaicTag;
use crate::types::MosaicValue;
use byteorder::{ByteOrder, LittleEndian};

/// Round `offset` up to the next multiple of `align` (a power of two)
#[inline]
pub fn align_up(offset: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (offset + align - 1) & !(align - 1)
}

/// Bytes a block occupies given its unpadded payload size
#[inline]
pub fn block_footprint(payload_size: usize) -> usize {
    align_up(BLOCK_HEADER_SIZE + payload_size, BLOCK_ALIGNMENT)
}

/// Append-only writer producing a heap image
#[derive(Debug)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    /// Create a writer with room reserved for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> MosaicResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve(capacity.max(HEAP_HEADER_SIZE))?;
        buf.resize(HEAP_HEADER_SIZE, 0);
        Ok(Self { buf })
    }

    /// Current end of the image
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no block has been written yet
    pub fn is_empty(&self) -> bool {
        self.buf.len() == HEAP_HEADER_SIZE
    }

    fn reserve(&mut self, additional: usize) -> MosaicResult<()> {
        if self.buf.capacity() - self.buf.len() < additional {
            self.buf.try_reserve(additional)?;
        }
        Ok(())
    }

    /// Pad with zero bytes up to the next multiple of `align`
    pub fn align(&mut self, align: usize) -> MosaicResult<()> {
        let target = align_up(self.buf.len(), align);
        self.reserve(target - self.buf.len())?;
        self.buf.resize(target, 0);
        Ok(())
    }

    /// Start a new block and return the offset of its header
    pub fn begin_block(&mut self, tag: MosaicTag, count: usize) -> MosaicResult<usize> {
        self.align(BLOCK_ALIGNMENT)?;
        let offset = self.buf.len();
        self.reserve(BLOCK_HEADER_SIZE)?;
        self.buf.extend_from_slice(&[tag.as_u8(), 0, 0, 0]);
        self.put_u32(count_word(count)?)?;
        Ok(offset)
    }

    /// Rewrite the count of the block at `offset`
    pub fn set_count(&mut self, offset: usize, count: usize) -> MosaicResult<()> {
        let word = count_word(count)?;
        let slot = self
            .buf
            .get_mut(offset + 4..offset + BLOCK_HEADER_SIZE)
            .ok_or_else(|| MosaicError::Internal(format!("no block header at {}", offset)))?;
        LittleEndian::write_u32(slot, word);
        Ok(())
    }

    /// Append one byte
    pub fn put_u8(&mut self, value: u8) -> MosaicResult<()> {
        self.reserve(1)?;
        self.buf.push(value);
        Ok(())
    }

    /// Append a little endian u32
    pub fn put_u32(&mut self, value: u32) -> MosaicResult<()> {
        let mut word = [0u8; 4];
        LittleEndian::write_u32(&mut word, value);
        self.reserve(4)?;
        self.buf.extend_from_slice(&word);
        Ok(())
    }

    /// Append one typed value at the current position
    pub fn put_value<T: MosaicValue>(&mut self, value: T) -> MosaicResult<()> {
        let start = self.buf.len();
        self.reserve(T::WIDTH)?;
        self.buf.resize(start + T::WIDTH, 0);
        value.write_le(&mut self.buf[start..]);
        Ok(())
    }

    /// Close the image: pad the last block and fill in the heap header
    pub fn finish(mut self) -> MosaicResult<Vec<u8>> {
        self.align(BLOCK_ALIGNMENT)?;
        let size = self.buf.len() as u64;
        LittleEndian::write_u64(&mut self.buf[0..8], MOSAIC_MAGIC);
        LittleEndian::write_u64(&mut self.buf[8..16], size);
        Ok(self.buf)
    }
}

fn count_word(count: usize) -> MosaicResult<u32> {
    u32::try_from(count)
        .map_err(|_| MosaicError::Encode(format!("block count {} exceeds u32", count)))
}

/// Parsed heap header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapHeader {
    pub magic: u64,
    pub size: u64,
}

impl HeapHeader {
    /// Read and validate the header of `bytes`
    pub fn parse(bytes: &[u8]) -> MosaicResult<Self> {
        if bytes.len() < HEAP_HEADER_SIZE {
            return Err(corrupted_err!(
                "heap of {} bytes is shorter than its header",
                bytes.len()
            ));
        }
        let header = Self {
            magic: LittleEndian::read_u64(&bytes[0..8]),
            size: LittleEndian::read_u64(&bytes[8..16]),
        };
        if header.magic != MOSAIC_MAGIC {
            return Err(corrupted_err!("bad magic {:#018x}", header.magic));
        }
        if header.size < HEAP_HEADER_SIZE as u64 || header.size > bytes.len() as u64 {
            return Err(corrupted_err!(
                "declared size {} does not fit {} available bytes",
                header.size,
                bytes.len()
            ));
        }
        Ok(header)
    }
}

/// A block as found in the stream: header fields plus the bytes after it
#[derive(Debug, Clone, Copy)]
pub struct BlockRef<'a> {
    /// Offset of the block header within the heap
    pub offset: usize,
    pub tag: MosaicTag,
    pub count: usize,
    /// Bytes from the payload start to the end of the heap
    pub tail: &'a [u8],
}

impl<'a> BlockRef<'a> {
    /// Reader positioned at the payload start
    pub fn payload(&self) -> PayloadReader<'a> {
        PayloadReader {
            buf: self.tail,
            pos: 0,
            block_offset: self.offset,
        }
    }
}

/// Bounds-checked typed reads over a block payload
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    block_offset: usize,
}

impl<'a> PayloadReader<'a> {
    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> MosaicResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(corrupted_err!(
                "block at {} needs {} payload bytes at {}, only {} remain",
                self.block_offset,
                len,
                self.pos,
                self.buf.len().saturating_sub(self.pos)
            )),
        }
    }

    /// Skip padding up to the next multiple of `align`
    pub fn align(&mut self, align: usize) -> MosaicResult<()> {
        let target = align_up(self.pos, align);
        self.take(target - self.pos).map(|_| ())
    }

    pub fn read_u8(&mut self) -> MosaicResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> MosaicResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_value<T: MosaicValue>(&mut self) -> MosaicResult<T> {
        Ok(T::read_le(self.take(T::WIDTH)?))
    }

    /// Borrow `len` raw bytes
    pub fn bytes(&mut self, len: usize) -> MosaicResult<&'a [u8]> {
        self.take(len)
    }

    /// Borrow `count` packed values as raw bytes
    pub fn values<T: MosaicValue>(&mut self, count: usize) -> MosaicResult<&'a [u8]> {
        let len = count
            .checked_mul(T::WIDTH)
            .ok_or_else(|| corrupted_err!("value section of {} entries overflows", count))?;
        self.take(len)
    }
}

/// Forward-only walker over the blocks of a heap
#[derive(Debug, Clone)]
pub struct BlockStream<'a> {
    heap: &'a [u8],
    offset: usize,
    row: u64,
}

impl<'a> BlockStream<'a> {
    /// Walk `heap`, which must already have a validated header
    pub fn new(heap: &'a [u8]) -> Self {
        Self {
            heap,
            offset: HEAP_HEADER_SIZE,
            row: 0,
        }
    }

    /// Logical row of the first value of the current block
    pub fn row(&self) -> u64 {
        self.row
    }

    /// Byte offset of the current block
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the walk reached the end of the heap
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.heap.len()
    }

    /// Decode the header of the current block
    pub fn current(&self) -> MosaicResult<Option<BlockRef<'a>>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let header = self
            .heap
            .get(self.offset..self.offset + BLOCK_HEADER_SIZE)
            .ok_or_else(|| corrupted_err!("truncated block header at {}", self.offset))?;
        let tag = MosaicTag::from_u8(header[0]).ok_or(MosaicError::UnknownTag {
            tag: header[0],
            offset: self.offset,
        })?;
        let count = LittleEndian::read_u32(&header[4..8]) as usize;
        if count == 0 {
            return Err(corrupted_err!("empty block at {}", self.offset));
        }
        Ok(Some(BlockRef {
            offset: self.offset,
            tag,
            count,
            tail: &self.heap[self.offset + BLOCK_HEADER_SIZE..],
        }))
    }

    /// Move past `block`, whose payload occupies `payload_size` bytes
    pub fn advance_past(&mut self, block: &BlockRef<'_>, payload_size: usize) -> MosaicResult<()> {
        let next = block.offset + block_footprint(payload_size);
        if next > self.heap.len() {
            return Err(corrupted_err!(
                "block at {} extends to {} beyond heap end {}",
                block.offset,
                next,
                self.heap.len()
            ));
        }
        self.offset = next;
        self.row += block.count as u64;
        Ok(())
    }
}
