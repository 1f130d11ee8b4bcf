//! PrismDB Mosaic - lightweight column compression
//!
//! Fixed-width columns are compressed block by block, choosing per block the
//! cheapest of several lightweight encodings. Compressed heaps can be scanned,
//! projected and filtered without decompressing them first, and are persisted
//! next to the column they describe.
//!
pub mod common;
pub mod storage;
pub mod types;

// Re-export common types for convenience
pub use common::{MosaicConfig, MosaicError, MosaicResult};

// Re-export type system for convenience
pub use types::{is_nil_in, MosaicValue, PhysicalType, RowId};

// Re-export storage system for convenience
pub use storage::{
    analyse, auto_compress, scan_select, select_in, select_range, BlockLayout, ColumnInfo,
    ColumnView, CompressionStats, HeapStats, HeapStatus, MosaicColumn, MosaicCompressor,
    MosaicCursor, MosaicHeap, MosaicTag, PersistHandle, PersistQueue, RangePredicate,
    StrategyAnalysis, StrategyFilter, ThetaOp,
};
