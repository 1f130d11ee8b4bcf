//! Type system module for the mosaic layer
//!
//! - PhysicalType: fixed-width storage representations
//! - MosaicValue: the value contract the compression strategies work against

pub mod physical_type;
pub mod value;

pub use physical_type::PhysicalType;
pub use value::{is_nil_in, MosaicValue};

/// Dense position of a value within its column
pub type RowId = u64;
