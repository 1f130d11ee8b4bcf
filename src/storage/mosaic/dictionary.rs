/// Dictionary block strategy
///
/// Each block carries its own dictionary of at most 256 distinct values and
/// one byte per row indexing into it. Values are keyed on their bit pattern,
/// so nil and every NaN payload get their own entry.
///
/// Payload layout:
///
/// ```text
/// u32 entries | pad to value width | entries x value | count x u8 index
/// ```
///
/// Selection evaluates the predicate once per dictionary entry and then only
/// looks at the index bytes.
use crate::common::constants::MAX_DICTIONARY_SIZE;
use crate::common::error::MosaicResult;
use crate::storage::mosaic::layout::{align_up, block_footprint, BlockRef, PayloadReader};
use crate::storage::mosaic::select::RangePredicate;
use crate::storage::mosaic::task::CompressTask;
use crate::storage::mosaic::traits::MosaicStrategy;
use crate::storage::mosaic::types::{Estimate, MosaicTag, OpenBlock};
use crate::types::{MosaicValue, RowId};
use crate::{corrupted_err, internal_err};
use ahash::AHashMap;
use std::ops::Range;

/// Dictionary block strategy
pub struct DictionaryStrategy;

/// Dictionary being built for one block
struct DictionaryBuilder<T> {
    entries: Vec<T>,
    index: AHashMap<u64, u8>,
}

impl<T: MosaicValue> DictionaryBuilder<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }

    /// Index of `value`, adding it if there is room
    fn lookup_or_insert(&mut self, value: T) -> Option<u8> {
        let bits = value.to_bits();
        if let Some(slot) = self.index.get(&bits) {
            return Some(*slot);
        }
        if self.entries.len() >= MAX_DICTIONARY_SIZE {
            return None;
        }
        let slot = self.entries.len() as u8;
        self.entries.push(value);
        self.index.insert(bits, slot);
        Some(slot)
    }

    /// Longest prefix of `values` the dictionary can cover
    fn cover(&mut self, values: &[T]) -> usize {
        values
            .iter()
            .take_while(|v| self.lookup_or_insert(**v).is_some())
            .count()
    }
}

impl DictionaryStrategy {
    /// Creates a new dictionary strategy instance
    pub fn new() -> Self {
        Self
    }

    fn payload_len<T: MosaicValue>(entries: usize, count: usize) -> usize {
        align_up(4, T::WIDTH) + entries * T::WIDTH + count
    }

    /// Read the dictionary, leaving `payload` at the first index byte
    fn read_dictionary<T: MosaicValue>(
        block: &BlockRef<'_>,
        payload: &mut PayloadReader<'_>,
    ) -> MosaicResult<Vec<T>> {
        let entries = payload.read_u32()? as usize;
        if entries == 0 || entries > MAX_DICTIONARY_SIZE {
            return Err(corrupted_err!(
                "dictionary block at {} declares {} entries",
                block.offset,
                entries
            ));
        }
        payload.align(T::WIDTH)?;
        let bytes = payload.values::<T>(entries)?;
        Ok(bytes.chunks_exact(T::WIDTH).map(T::read_le).collect())
    }

    fn read_indices<'a>(
        block: &BlockRef<'a>,
        payload: &mut PayloadReader<'a>,
        entries: usize,
    ) -> MosaicResult<&'a [u8]> {
        let indices = payload.bytes(block.count)?;
        if let Some(bad) = indices.iter().find(|i| **i as usize >= entries) {
            return Err(corrupted_err!(
                "dictionary block at {} indexes entry {} of {}",
                block.offset,
                bad,
                entries
            ));
        }
        Ok(indices)
    }
}

impl Default for DictionaryStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MosaicValue> MosaicStrategy<T> for DictionaryStrategy {
    fn tag(&self) -> MosaicTag {
        MosaicTag::Dictionary
    }

    fn estimate(
        &self,
        task: &CompressTask<'_, T>,
        _previous: Option<&OpenBlock>,
    ) -> Option<Estimate> {
        let mut builder = DictionaryBuilder::new();
        let run_length = builder.cover(task.window());
        if run_length == 0 {
            return None;
        }
        let payload = Self::payload_len::<T>(builder.entries.len(), run_length);
        Some(Estimate {
            tag: MosaicTag::Dictionary,
            run_length,
            compressed_size: block_footprint(payload),
            uncompressed_size: run_length * T::WIDTH,
            extends_previous: false,
        })
    }

    fn compress(&self, task: &mut CompressTask<'_, T>, estimate: &Estimate) -> MosaicResult<usize> {
        let window = task.window();
        let values = window.get(..estimate.run_length).ok_or_else(|| {
            internal_err!(
                "dictionary run of {} exceeds window of {}",
                estimate.run_length,
                window.len()
            )
        })?;

        let mut builder = DictionaryBuilder::new();
        let mut indices = Vec::with_capacity(values.len());
        for value in values {
            let slot = builder
                .lookup_or_insert(*value)
                .ok_or_else(|| internal_err!("dictionary overflow during compression"))?;
            indices.push(slot);
        }

        task.begin_block(MosaicTag::Dictionary, values.len())?;
        let writer = task.writer();
        writer.put_u32(builder.entries.len() as u32)?;
        writer.align(T::WIDTH)?;
        for entry in &builder.entries {
            writer.put_value(*entry)?;
        }
        for slot in indices {
            writer.put_u8(slot)?;
        }
        Ok(values.len())
    }

    fn payload_size(&self, block: &BlockRef<'_>) -> MosaicResult<usize> {
        let entries = block.payload().read_u32()? as usize;
        Ok(Self::payload_len::<T>(entries, block.count))
    }

    fn decompress(&self, block: &BlockRef<'_>, out: &mut Vec<T>) -> MosaicResult<()> {
        let mut payload = block.payload();
        let dictionary = Self::read_dictionary::<T>(block, &mut payload)?;
        let indices = Self::read_indices(block, &mut payload, dictionary.len())?;
        out.extend(indices.iter().map(|i| dictionary[*i as usize]));
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
        let mut payload = block.payload();
        let dictionary = Self::read_dictionary::<T>(block, &mut payload)?;
        let qualifies: Vec<bool> = dictionary.iter().map(|v| predicate.matches(v)).collect();
        if !qualifies.iter().any(|q| *q) {
            return Ok(());
        }
        let indices = Self::read_indices(block, &mut payload, dictionary.len())?;
        let start = (rows.start - first) as usize;
        let end = (rows.end - first) as usize;
        for (row, slot) in (rows.start..).zip(&indices[start..end]) {
            if qualifies[*slot as usize] {
                out.push(row);
            }
        }
        Ok(())
    }

    fn describe(&self, block: &BlockRef<'_>) -> MosaicResult<String> {
        let entries = block.payload().read_u32()?;
        Ok(format!("{} entries", entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mosaic::layout::BlockStream;

    fn encode_one<T: MosaicValue>(data: &[T]) -> (Estimate, Vec<u8>) {
        let mut task = CompressTask::new(data, true, 1 << 16).unwrap();
        let estimate = DictionaryStrategy.estimate(&task, None).unwrap();
        let consumed = DictionaryStrategy.compress(&mut task, &estimate).unwrap();
        assert_eq!(consumed, estimate.run_length);
        (estimate, task.finish().unwrap().0)
    }

    #[test]
    fn test_dictionary_roundtrip() {
        let data = [10i64, 20, 10, 30, 20, 10, i64::MIN];
        let (estimate, bytes) = encode_one(&data);
        assert_eq!(estimate.run_length, data.len());

        let mut stream = BlockStream::new(&bytes);
        let block = stream.current().unwrap().unwrap();
        let mut out: Vec<i64> = Vec::new();
        DictionaryStrategy.decompress(&block, &mut out).unwrap();
        assert_eq!(out, data);

        // 4 byte length, 4 pad, 4 entries, 7 indices
        assert_eq!(MosaicStrategy::<i64>::payload_size(&DictionaryStrategy, &block).unwrap(), 47);
        MosaicStrategy::<i64>::advance(&DictionaryStrategy, &mut stream, &block).unwrap();
        assert!(stream.is_exhausted());
    }

    #[test]
    fn test_dictionary_stops_at_capacity() {
        let data: Vec<i32> = (0..300).collect();
        let task = CompressTask::new(&data, true, 1 << 16).unwrap();
        let estimate = DictionaryStrategy.estimate(&task, None).unwrap();
        assert_eq!(estimate.run_length, MAX_DICTIONARY_SIZE);
    }

    #[test]
    fn test_dictionary_keeps_float_bit_patterns() {
        let data = [0.0f32, -0.0, f32::NAN, 0.0];
        let (_, bytes) = encode_one(&data);
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();
        assert_eq!(MosaicStrategy::<f32>::describe(&DictionaryStrategy, &block).unwrap(), "3 entries");

        let mut out: Vec<f32> = Vec::new();
        DictionaryStrategy.decompress(&block, &mut out).unwrap();
        let bits: Vec<u32> = out.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = data.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_dictionary_select_partial_rows() {
        let data = [1i16, 2, 3, 1, 2, 3];
        let (_, bytes) = encode_one(&data);
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();

        let mut out: Vec<RowId> = Vec::new();
        let predicate = RangePredicate::new(Some(2i16), Some(3), true, true, false, true);
        DictionaryStrategy
            .select(&block, 100, 101..105, &predicate, &mut out)
            .unwrap();
        assert_eq!(out, vec![101, 102, 104]);
    }

    #[test]
    fn test_dictionary_rejects_bad_index() {
        let data = [1i32, 2];
        let (_, mut bytes) = encode_one(&data);
        // header 16 + block header 8 + length 4 + 2 entries 8 = first index at 36
        bytes[37] = 9;
        let block = BlockStream::new(&bytes).current().unwrap().unwrap();
        let mut out: Vec<i32> = Vec::new();
        let err = DictionaryStrategy.decompress(&block, &mut out).unwrap_err();
        assert!(err.is_corruption());
    }
}
