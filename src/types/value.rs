//! Fixed-width column values as seen by the compression strategies.
//!
//! Every supported element type reserves one bit pattern as its missing-value
//! marker (nil): the minimum for integers and a canonical NaN for floats.
//! Run and dictionary identity is decided on the raw bit pattern, so encoding
//! is lossless for every value including signed zeros and NaN payloads.

use crate::types::PhysicalType;
use byteorder::{ByteOrder, LittleEndian};
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt::Debug;

/// A value type a mosaic heap can store
pub trait MosaicValue: Copy + PartialOrd + Debug + Send + Sync + 'static {
    /// Physical type tag of this value type
    const PHYSICAL_TYPE: PhysicalType;

    /// Width in bytes
    const WIDTH: usize;

    /// The missing-value marker
    const NIL: Self;

    /// Whether this is the missing-value marker
    fn is_nil(&self) -> bool;

    /// Raw bit pattern, zero extended
    fn to_bits(self) -> u64;

    /// Bitwise identity
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }

    /// Read one little endian value; `buf` must hold at least `WIDTH` bytes
    fn read_le(buf: &[u8]) -> Self;

    /// Write one little endian value; `buf` must hold at least `WIDTH` bytes
    fn write_le(self, buf: &mut [u8]);

    /// Integer view used by the arithmetic strategies; `None` for floats
    fn as_i128(self) -> Option<i128>;

    /// Inverse of `as_i128`; `None` when out of range or for floats
    fn from_i128(value: i128) -> Option<Self>;
}

macro_rules! impl_integer_value {
    ($t:ty, $ptype:expr, $read:expr, $write:expr, $unsigned:ty) => {
        impl MosaicValue for $t {
            const PHYSICAL_TYPE: PhysicalType = $ptype;
            const WIDTH: usize = std::mem::size_of::<$t>();
            const NIL: Self = <$t>::MIN;

            fn is_nil(&self) -> bool {
                *self == <$t>::MIN
            }

            fn to_bits(self) -> u64 {
                self as $unsigned as u64
            }

            fn read_le(buf: &[u8]) -> Self {
                $read(buf)
            }

            fn write_le(self, buf: &mut [u8]) {
                $write(buf, self)
            }

            fn as_i128(self) -> Option<i128> {
                self.to_i128()
            }

            fn from_i128(value: i128) -> Option<Self> {
                <$t as FromPrimitive>::from_i128(value)
            }
        }
    };
}

fn read_i8(buf: &[u8]) -> i8 {
    buf[0] as i8
}

fn write_i8(buf: &mut [u8], value: i8) {
    buf[0] = value as u8;
}

impl_integer_value!(i8, PhysicalType::Int8, read_i8, write_i8, u8);
impl_integer_value!(
    i16,
    PhysicalType::Int16,
    LittleEndian::read_i16,
    LittleEndian::write_i16,
    u16
);
impl_integer_value!(
    i32,
    PhysicalType::Int32,
    LittleEndian::read_i32,
    LittleEndian::write_i32,
    u32
);
impl_integer_value!(
    i64,
    PhysicalType::Int64,
    LittleEndian::read_i64,
    LittleEndian::write_i64,
    u64
);

impl MosaicValue for f32 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Float;
    const WIDTH: usize = 4;
    const NIL: Self = f32::NAN;

    fn is_nil(&self) -> bool {
        self.is_nan()
    }

    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }

    fn read_le(buf: &[u8]) -> Self {
        LittleEndian::read_f32(buf)
    }

    fn write_le(self, buf: &mut [u8]) {
        LittleEndian::write_f32(buf, self)
    }

    fn as_i128(self) -> Option<i128> {
        None
    }

    fn from_i128(_value: i128) -> Option<Self> {
        None
    }
}

impl MosaicValue for f64 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Double;
    const WIDTH: usize = 8;
    const NIL: Self = f64::NAN;

    fn is_nil(&self) -> bool {
        self.is_nan()
    }

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn read_le(buf: &[u8]) -> Self {
        LittleEndian::read_f64(buf)
    }

    fn write_le(self, buf: &mut [u8]) {
        LittleEndian::write_f64(buf, self)
    }

    fn as_i128(self) -> Option<i128> {
        None
    }

    fn from_i128(_value: i128) -> Option<Self> {
        None
    }
}

/// Nil test honouring the column's nullability flag
#[inline]
pub fn is_nil_in<T: MosaicValue>(value: &T, nullable: bool) -> bool {
    nullable && value.is_nil()
}
