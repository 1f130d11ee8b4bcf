/// Delta block strategy
///
/// Stores the first value of the block followed by one signed byte per
/// successive difference. A block ends at the first difference outside
/// `i8`, and never spans a nil of a nullable column.
use crate::common::error::MosaicResult;
use crate::storage::mosaic::layout::{block_footprint, BlockRef};
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, PhysicalType, RowId};
use crate::{corrupted_err, internal_err};
use std::ops::Range;

/// Delta block strategy
pub struct DeltaStrategy;

impl DeltaStrategy {
    /// Creates a new delta strategy instance
    pub fn new() -> Self {
        Self
    }

    /// Length of the prefix of the task window encodable as one block
    fn run_length<T: MosaicValue>(task: &CompressTask<'_, T>) -> usize {
        let window = task.window();
        let mut prev = match window.first() {
            Some(v) if !task.is_nil(v) => match v.as_i128() {
                Some(v) => v,
                None => return 0,
            },
            _ => return 0,
        };
        let mut run = 1;
        for value in &window[1..] {
            if task.is_nil(value) {
                break;
            }
            let Some(current) = value.as_i128() else {
                break;
            };
            if i8::try_from(current - prev).is_err() {
                break;
            }
            prev = current;
            run += 1;
        }
        run
    }

    /// Expand a block into its values
    fn decode<'a, T: MosaicValue>(
        block: &BlockRef<'a>,
    ) -> MosaicResult<impl Iterator<Item = MosaicResult<T>> + 'a> {
        let mut payload = block.payload();
        let base: T = payload.read_value()?;
        let base = base
            .as_i128()
            .ok_or_else(|| corrupted_err!("delta block at {} on a non-integer column", block.offset))?;
        let deltas = payload.bytes(block.count - 1)?;
        let offset = block.offset;
        let tail = deltas.iter().scan(base, move |acc, d| {
            *acc += (*d as i8) as i128;
            Some(*acc)
        });
        Ok(std::iter::once(base).chain(tail).map(move |v| {
            T::from_i128(v)
                .ok_or_else(|| corrupted_err!("delta block at {} leaves the value domain", offset))
        }))
    }
}

impl Default for DeltaStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MosaicValue> MosaicStrategy<T> for DeltaStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::Delta
    }

    // single byte integers gain nothing from byte deltas
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
        let run_length = Self::run_length(task);
        if run_length < 2 {
            return None;
        }
        Some(Estimate {
            tag: MosaicTag::Delta,
            run_length,
            compressed_size: block_footprint(T::WIDTH + run_length - 1),
            uncompressed_size: run_length * T::WIDTH,
            extends_previous: false,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let run_length = Self::run_length(task);
        if run_length < estimate.run_length {
            return Err(internal_err!(
                "delta run shrank from {} to {}",
                estimate.run_length,
                run_length
            ));
        }
        let values = &task.window()[..estimate.run_length];

        task.begin_block(MosaicTag::Delta, values.len())?;
        task.writer().put_value(values[0])?;
        for pair in values.windows(2) {
            let (prev, next) = match (pair[0].as_i128(), pair[1].as_i128()) {
                (Some(prev), Some(next)) => (prev, next),
                _ => return Err(internal_err!("delta encoding of a non-integer value")),
            };
            let delta = i8::try_from(next - prev)
                .map_err(|_| internal_err!("delta {} does not fit a byte", next - prev))?;
            task.writer().put_u8(delta as u8)?;
        }
        Ok(values.len())
    }

    fn payload_size(&self, block: &BlockRef<'_>) -> MosaicResult<usize> {
        Ok(T::WIDTH + block.count - 1)
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        for value in Self::decode::<T>(block)? {
            out.push(value?);
        }
        Ok(())
    }

    // runs the sum forward and tests each value as it is produced
    fn select(
        &self,
        block: &BlockRef<'_>,
        first: RowId,
        rows: Range<RowId>,
        predicate: &RangePredicate<T>,
        out: &mut Vec<RowId>,
    ) -> MosaicResult<()> {
        let skip = (rows.start - first) as usize;
        let take = (rows.end - rows.start) as usize;
        let values = Self::decode::<T>(block)?;
        for (row, value) in (first..).zip(values).skip(skip).take(take) {
            if predicate.matches(&value?) {
                out.push(row);
            }
        }
        Ok(())
    }

    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let base: T = block.payload().read_value()?;
        Ok(format!("base {:?}", base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mosaic::layout::BlockStream;

    fn encode_one<T: MosaicValue>(data: &[T], nullable: bool) -> Option<Vec<u8>> {
        let mut task = CompressTask::new(data, nullable, 1 << 16).unwrap();
        let estimate = DeltaStrategy.estimate(&task, None)?;
        DeltaStrategy.compress(&mut task, &estimate).unwrap();
        Some(task.finish().unwrap().0)
    }

    #[test]
    fn test_delta_roundtrip() {
        let data = [1000i32, 1003, 1001, 1128, 1000, 1200];
        let bytes = encode_one(&data, true).unwrap();
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();
        assert_eq!(block.count, 5);

        let mut out: Vec<i32> = Vec::new();
        DeltaStrategy.decompress(&block, &mut out).unwrap();
        assert_eq!(out, &data[..5]);
    }

    #[test]
    fn test_delta_stops_at_nil() {
        let data = [5i64, 6, i64::MIN, 7];
        let task = CompressTask::new(&data, true, 100).unwrap();
        assert_eq!(DeltaStrategy.estimate(&task, None).unwrap().run_length, 2);

        let leading_nil = [i64::MIN, 1, 2];
        let task = CompressTask::new(&leading_nil, true, 100).unwrap();
        assert!(DeltaStrategy.estimate(&task, None).is_none());
    }

    #[test]
    fn test_delta_needs_two_values() {
        let data = [1i16, 500];
        assert!(encode_one(&data, true).is_none());
    }

    #[test]
    fn test_delta_rejects_byte_and_float_columns() {
        assert!(encode_one(&[1i8, 2, 3], true).is_none());
        assert!(encode_one(&[1.0f64, 2.0, 3.0], true).is_none());
    }

    #[test]
    fn test_delta_select() {
        let data = [10i64, 11, 12, 13, 14];
        let bytes = encode_one(&data, false).unwrap();
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();
        let mut out: Vec<RowId> = Vec::new();
        let predicate = RangePredicate::new(Some(12i64), None, false, false, false, false);
        DeltaStrategy
            .select(&block, 0, 1..5, &predicate, &mut out)
            .unwrap();
        assert_eq!(out, vec![3, 4]);
    }

    #[test]
    fn test_delta_select_agrees_with_decompress() {
        // bounded walk keeps every step inside a byte
        let mut current = 500i32;
        let data: Vec<i32> = (0..200)
            .map(|i| {
                current += (i * 37) % 41 - 20;
                current
            })
            .collect();
        let mut task = CompressTask::new(&data, false, 1 << 16).unwrap();
        let estimate = DeltaStrategy.estimate(&task, None).unwrap();
        DeltaStrategy.compress(&mut task, &estimate).unwrap();
        let (bytes, _) = task.finish().unwrap();
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();

        let mut decoded: Vec<i32> = Vec::new();
        DeltaStrategy.decompress(&block, &mut decoded).unwrap();
        assert_eq!(decoded, data);
        let count = decoded.len() as RowId;
        let first = 40;

        for (low, high, anti) in [(450, 520, false), (450, 520, true), (600, 700, false)] {
            let predicate = RangePredicate::new(Some(low), Some(high), true, false, anti, false);
            for rows in [first..first + count, first + 3..first + count / 2] {
                let expected: Vec<RowId> = rows
                    .clone()
                    .filter(|row| predicate.matches(&decoded[(row - first) as usize]))
                    .collect();
                let mut out: Vec<RowId> = Vec::new();
                DeltaStrategy
                    .select(&block, first, rows, &predicate, &mut out)
                    .unwrap();
                assert_eq!(out, expected);
            }
        }
    }
}
