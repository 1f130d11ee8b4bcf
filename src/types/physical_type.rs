use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical types the mosaic layer can compress
/// These are the fixed-width representations a column stores its values in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalType {
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float,
    /// 64-bit double precision
    Double,
}

impl PhysicalType {
    /// Size of one value in bytes
    pub fn get_size(&self) -> usize {
        match self {
            PhysicalType::Int8 => 1,
            PhysicalType::Int16 => 2,
            PhysicalType::Int32 | PhysicalType::Float => 4,
            PhysicalType::Int64 | PhysicalType::Double => 8,
        }
    }

    /// Check if this type is an integer type
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PhysicalType::Int8 | PhysicalType::Int16 | PhysicalType::Int32 | PhysicalType::Int64
        )
    }

    /// Parse the short names accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tinyint" | "int8" | "bte" => Some(PhysicalType::Int8),
            "smallint" | "int16" | "sht" => Some(PhysicalType::Int16),
            "int" | "integer" | "int32" => Some(PhysicalType::Int32),
            "bigint" | "int64" | "lng" => Some(PhysicalType::Int64),
            "float" | "real" | "flt" => Some(PhysicalType::Float),
            "double" | "dbl" => Some(PhysicalType::Double),
            _ => None,
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhysicalType::Int8 => "INT8",
            PhysicalType::Int16 => "INT16",
            PhysicalType::Int32 => "INT32",
            PhysicalType::Int64 => "INT64",
            PhysicalType::Float => "FLOAT",
            PhysicalType::Double => "DOUBLE",
        };
        write!(f, "{}", name)
    }
}
