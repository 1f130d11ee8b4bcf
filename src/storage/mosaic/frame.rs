/// Frame-of-reference block strategy
///
/// Values whose spread fits in a byte are stored as unsigned offsets from the
/// block minimum. The block grows while `max - min <= 255` and ends at a nil
/// of a nullable column.
use crate::common::error::MosaicResult;
use crate::storage::mosaic::layout::{block_footprint, BlockRef};
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, PhysicalType, RowId};
use crate::{corrupted_err, internal_err};
use std::ops::Range;

const MAX_SPREAD: i128 = u8::MAX as i128;

/// Frame-of-reference block strategy
pub struct FrameStrategy;

impl FrameStrategy {
    /// Creates a new frame strategy instance
    pub fn new() -> Self {
        Self
    }

    /// Reference value and length of the frame at the head of the task window
    fn frame<T: MosaicValue>(task: &CompressTask<'_, T>) -> Option<(i128, usize)> {
        let window = task.window();
        let head = window.first().filter(|v| !task.is_nil(v))?.as_i128()?;
        let (mut min, mut max) = (head, head);
        let mut run = 1;
        for value in &window[1..] {
            if task.is_nil(value) {
                break;
            }
            let Some(v) = value.as_i128() else {
                break;
            };
            let (lo, hi) = (min.min(v), max.max(v));
            if hi - lo > MAX_SPREAD {
                break;
            }
            min = lo;
            max = hi;
            run += 1;
        }
        Some((min, run))
    }

    fn read_reference<'a, T: MosaicValue>(block: &BlockRef<'a>) -> MosaicResult<(i128, &'a [u8])> {
        let mut payload = block.payload();
        let reference: T = payload.read_value()?;
        let reference = reference.as_i128().ok_or_else(|| {
            corrupted_err!("frame block at {} on a non-integer column", block.offset)
        })?;
        let offsets = payload.bytes(block.count)?;
        Ok((reference, offsets))
    }

    fn value_at<T: MosaicValue>(block: &BlockRef<'_>, reference: i128, offset: u8) -> MosaicResult<T> {
        T::from_i128(reference + offset as i128).ok_or_else(|| {
            corrupted_err!(
                "frame block at {} leaves the value domain",
                block.offset
            )
        })
    }
}

impl Default for FrameStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MosaicValue> MosaicStrategy<T> for FrameStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::Frame
    }

    // a byte offset from a byte reference saves nothing
    fn supports(&self, physical_type: PhysicalType) -> bool {
        physical_type.is_integral() && physical_type != PhysicalType::Int8
    }

    fn estimate(
        &self,
        task: &CompressTask<'_, T>,
        _previous: Option<&OpenBlock>,
    ) -> Option<Estimate> {
        if !<Self as MosaicStrategy<T>>::supports(self, T::PHYSICAL_TYPE) {
            return None;
        }
        let (_, run_length) = Self::frame(task)?;
        if run_length < 2 {
            return None;
        }
        Some(Estimate {
            tag: MosaicTag::Frame,
            run_length,
            compressed_size: block_footprint(T::WIDTH + run_length),
            uncompressed_size: run_length * T::WIDTH,
            extends_previous: false,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let values = task
            .window()
            .get(..estimate.run_length)
            .ok_or_else(|| internal_err!("frame run exceeds the remaining rows"))?;
        let mut ints = Vec::with_capacity(values.len());
        for value in values {
            ints.push(
                value
                    .as_i128()
                    .ok_or_else(|| internal_err!("frame encoding of a non-integer value"))?,
            );
        }
        let min = ints.iter().copied().min().unwrap_or_default();
        let reference =
            T::from_i128(min).ok_or_else(|| internal_err!("frame reference {} out of range", min))?;

        task.begin_block(MosaicTag::Frame, values.len())?;
        task.writer().put_value(reference)?;
        for v in ints {
            let offset = u8::try_from(v - min)
                .map_err(|_| internal_err!("frame offset {} does not fit a byte", v - min))?;
            task.writer().put_u8(offset)?;
        }
        Ok(values.len())
    }

    fn payload_size(&self, block: &BlockRef<'_>) -> MosaicResult<usize> {
        Ok(T::WIDTH + block.count)
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        let (reference, offsets) = Self::read_reference::<T>(block)?;
        out.reserve(offsets.len());
        for offset in offsets {
            out.push(Self::value_at(block, reference, *offset)?);
        }
        Ok(())
    }

    fn select(
        &self,
        block: &BlockRef<'_>,
        first: RowId,
        rows: Range<RowId>,
        predicate: &RangePredicate<T>,
        out: &mut Vec<RowId>,
    ) -> MosaicResult<()> {
        let (reference, offsets) = Self::read_reference::<T>(block)?;
        let start = (rows.start - first) as usize;
        let end = (rows.end - first) as usize;
        for (row, offset) in (rows.start..).zip(&offsets[start..end]) {
            let value: T = Self::value_at(block, reference, *offset)?;
            if predicate.matches(&value) {
                out.push(row);
            }
        }
        Ok(())
    }

    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let reference: T = block.payload().read_value()?;
        Ok(format!("reference {:?}", reference))
    }
}
