//! Storage module for the mosaic layer
//!
//! This module provides:
//! - The compressed heap format and its strategies (`mosaic`)
//! - Column ownership, lazy heap construction and persistence (`column`)

pub mod column;
pub mod mosaic;

pub use column::{ColumnInfo, ColumnView, HeapState, HeapStatus, MosaicColumn};
pub use mosaic::*;
