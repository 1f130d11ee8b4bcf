//! Constants used throughout the mosaic layer

/// Format/version magic stored in word 0 of every compressed heap ("MOSA" v2)
pub const MOSAIC_MAGIC: u64 = 0x4D4F_5341_0000_0002;

/// Size of the heap header: magic word + declared size word
pub const HEAP_HEADER_SIZE: usize = 16;

/// Size of a block header: tag byte, three reserved bytes, u32 count
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Every block starts on this boundary relative to the heap start
pub const BLOCK_ALIGNMENT: usize = 8;

/// Default upper bound on the logical values covered by one block
pub const DEFAULT_MAX_BLOCK_COUNT: usize = 100_000;

/// Columns shorter than this are left uncompressed by default
pub const DEFAULT_MIN_ROWS: usize = 1;

/// Largest dictionary a single dictionary block may carry (u8 indices)
pub const MAX_DICTIONARY_SIZE: usize = 256;

/// Default number of background persistence workers
pub const DEFAULT_PERSIST_WORKERS: usize = 2;

/// Default depth of the persistence queue
pub const DEFAULT_PERSIST_QUEUE_DEPTH: usize = 16;

/// File suffix of persisted heaps
pub const MOSAIC_FILE_SUFFIX: &str = "mosaic";
