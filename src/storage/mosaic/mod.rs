/// Mosaic: lightweight column compression with direct selection
///
/// A column is compressed into a heap, a sequence of self-describing blocks.
/// Each block covers a run of consecutive rows and is encoded by whichever
/// strategy stores that run most cheaply. Readers can decompress a row range,
/// project individual rows, or evaluate range predicates directly against the
/// blocks without expanding them first.
///
/// ## Strategies:
///
/// - **Raw**: values stored as they are; neighbouring raw rows share a block
/// - **RunLength**: one value repeated over the block
/// - **Dictionary**: up to 256 distinct values plus a byte index per row
/// - **Delta**: a base value followed by signed byte differences
/// - **Linear**: an arithmetic sequence, base and step
/// - **Frame**: the block minimum plus an unsigned byte offset per row
///
/// Delta, Linear and Frame only apply to integer columns.
///
/// ## Usage Example:
///
/// ```ignore
/// use prism_mosaic::storage::mosaic::*;
///
/// let values: Vec<i32> = (0..10_000).map(|i| i / 100).collect();
/// let heap = auto_compress(&values, true)?;
///
/// let predicate = RangePredicate::new(Some(10), Some(20), true, false, false, true);
/// let rows = select_range(&heap, &predicate)?;
/// assert_eq!(rows.len(), 1000);
/// ```

pub mod compressor;
pub mod cursor;
pub mod delta;
pub mod dictionary;
pub mod frame;
pub mod heap;
pub mod layout;
pub mod linear;
pub mod persist;
pub mod raw;
pub mod rle;
pub mod select;
pub mod task;
pub mod traits;
pub mod types;

pub use compressor::{analyse, auto_compress, MosaicCompressor, StrategyAnalysis};
pub use cursor::{project, DecodedBlock, MosaicCursor};
pub use delta::DeltaStrategy;
pub use dictionary::DictionaryStrategy;
pub use frame::FrameStrategy;
pub use heap::{HeapStorage, MosaicHeap};
pub use layout::{BlockRef, BlockStream, BlockWriter, HeapHeader, PayloadReader};
pub use linear::LinearStrategy;
pub use persist::{heap_path, load_heap, remove_heap, write_heap, PersistHandle, PersistQueue};
pub use raw::RawStrategy;
pub use rle::RunLengthStrategy;
pub use select::{scan_select, select_in, select_range, RangePredicate, ThetaOp};
pub use task::CompressTask;
pub use traits::{strategy_for, CompressionStats, MosaicStrategy};
pub use types::{BlockLayout, Estimate, HeapStats, MosaicTag, OpenBlock, StrategyFilter};
