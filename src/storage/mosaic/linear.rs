/// Linear block strategy
///
/// An arithmetic sequence `base + i * step` stored as two values, whatever
/// its length. The step must itself be representable in the column type.
use crate::common::error::MosaicResult;
use crate::storage::mosaic::layout::{block_footprint, BlockRef};
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, PhysicalType, RowId};
use crate::{corrupted_err, internal_err};
use std::ops::Range;

/// Linear block strategy
pub struct LinearStrategy;

impl LinearStrategy {
    /// Creates a new linear strategy instance
    pub fn new() -> Self {
        Self
    }

    /// Base, step and length of the sequence at the head of the task window
    fn sequence<T: MosaicValue>(task: &CompressTask<'_, T>) -> Option<(T, T, usize)> {
        let window = task.window();
        if window.len() < 2 || window[..2].iter().any(|v| task.is_nil(v)) {
            return None;
        }
        let base = window[0].as_i128()?;
        let step = window[1].as_i128()? - base;
        let step_value = T::from_i128(step)?;

        let mut prev = base;
        let mut run = 1;
        for value in &window[1..] {
            if task.is_nil(value) {
                break;
            }
            match value.as_i128() {
                Some(current) if current - prev == step => prev = current,
                _ => break,
            }
            run += 1;
        }
        Some((window[0], step_value, run))
    }

    fn read_header<T: MosaicValue>(block: &BlockRef<'_>) -> MosaicResult<(i128, i128)> {
        let mut payload = block.payload();
        let base: T = payload.read_value()?;
        let step: T = payload.read_value()?;
        match (base.as_i128(), step.as_i128()) {
            (Some(base), Some(step)) => Ok((base, step)),
            _ => Err(corrupted_err!(
                "linear block at {} on a non-integer column",
                block.offset
            )),
        }
    }

    fn value_at<T: MosaicValue>(block: &BlockRef<'_>, base: i128, step: i128, i: usize) -> MosaicResult<T> {
        T::from_i128(base + step * i as i128).ok_or_else(|| {
            corrupted_err!(
                "linear block at {} leaves the value domain at {}",
                block.offset,
                i
            )
        })
    }
}

impl Default for LinearStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MosaicValue> MosaicStrategy<T> for LinearStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::Linear
    }

    fn supports(&self, physical_type: PhysicalType) -> bool {
        physical_type.is_integral()
    }

    fn estimate(
        &self,
        task: &CompressTask<'_, T>,
        _previous: Option<&OpenBlock>,
    ) -> Option<Estimate> {
        if !<Self as MosaicStrategy<T>>::supports(self, T::PHYSICAL_TYPE) {
            return None;
        }
        let (_, _, run_length) = Self::sequence(task)?;
        if run_length < 2 {
            return None;
        }
        Some(Estimate {
            tag: MosaicTag::Linear,
            run_length,
            compressed_size: block_footprint(2 * T::WIDTH),
            uncompressed_size: run_length * T::WIDTH,
            extends_previous: false,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let (base, step, run_length) = Self::sequence(task)
            .ok_or_else(|| internal_err!("linear sequence vanished before compression"))?;
        if run_length < estimate.run_length {
            return Err(internal_err!(
                "linear run shrank from {} to {}",
                estimate.run_length,
                run_length
            ));
        }
        task.begin_block(MosaicTag::Linear, estimate.run_length)?;
        task.writer().put_value(base)?;
        task.writer().put_value(step)?;
        Ok(estimate.run_length)
    }

    fn payload_size(&self, _block: &BlockRef<'_>) -> MosaicResult<usize> {
        Ok(2 * T::WIDTH)
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        let (base, step) = Self::read_header::<T>(block)?;
        out.reserve(block.count);
        for i in 0..block.count {
            out.push(Self::value_at(block, base, step, i)?);
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
        let (base, step) = Self::read_header::<T>(block)?;
        for row in rows {
            let value: T = Self::value_at(block, base, step, (row - first) as usize)?;
            if predicate.matches(&value) {
                out.push(row);
            }
        }
        Ok(())
    }

    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let mut payload = block.payload();
        let base: T = payload.read_value()?;
        let step: T = payload.read_value()?;
        Ok(format!("base {:?} step {:?}", base, step))
    }
}
