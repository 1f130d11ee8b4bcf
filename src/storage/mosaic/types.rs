/// Block tags, estimates and bookkeeping shared by all strategies
///
/// The tag of a block decides how its payload is read, so the set of tags is
/// closed and every dispatch over it is an exhaustive `match`.
use crate::common::error::{MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block strategy identifier, stored as the first byte of every block header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MosaicTag {
    /// Values stored verbatim
    Raw,

    /// One value repeated `count` times
    /// Best for: sorted data, flags, long nil stretches
    RunLength,

    /// Small per-block dictionary plus one byte index per value
    /// Best for: low-cardinality data without long runs
    Dictionary,

    /// Base value plus one signed byte per successive difference
    /// Best for: slowly drifting integers (timestamps, counters)
    Delta,

    /// Base value plus constant step
    /// Best for: dense keys, arithmetic sequences
    Linear,

    /// Reference (block minimum) plus one unsigned byte offset per value
    /// Best for: integers clustered in a narrow window
    Frame,
}

impl MosaicTag {
    /// All tags in on-disk order
    pub const ALL: [MosaicTag; 6] = [
        MosaicTag::Raw,
        MosaicTag::RunLength,
        MosaicTag::Dictionary,
        MosaicTag::Delta,
        MosaicTag::Linear,
        MosaicTag::Frame,
    ];

    /// The byte written into block headers
    pub fn as_u8(self) -> u8 {
        match self {
            MosaicTag::Raw => 0,
            MosaicTag::RunLength => 1,
            MosaicTag::Dictionary => 2,
            MosaicTag::Delta => 3,
            MosaicTag::Linear => 4,
            MosaicTag::Frame => 5,
        }
    }

    /// Inverse of `as_u8`
    pub fn from_u8(tag: u8) -> Option<Self> {
        MosaicTag::ALL.get(tag as usize).copied()
    }

    /// Name used in layouts and strategy property lists
    pub fn name(&self) -> &'static str {
        match self {
            MosaicTag::Raw => "raw",
            MosaicTag::RunLength => "runlength",
            MosaicTag::Dictionary => "dictionary",
            MosaicTag::Delta => "delta",
            MosaicTag::Linear => "linear",
            MosaicTag::Frame => "frame",
        }
    }

    /// Tie-break rank when two estimates cost the same per value; lower wins
    pub fn priority(&self) -> u8 {
        match self {
            MosaicTag::RunLength => 0,
            MosaicTag::Linear => 1,
            MosaicTag::Delta => 2,
            MosaicTag::Frame => 3,
            MosaicTag::Dictionary => 4,
            MosaicTag::Raw => 5,
        }
    }

    fn bit(self) -> u8 {
        1 << self.as_u8()
    }
}

impl fmt::Display for MosaicTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a strategy reports about the rows at the head of the remaining range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    /// Strategy that produced the estimate
    pub tag: MosaicTag,
    /// Logical values the block would cover (always >= 1)
    pub run_length: usize,
    /// Bytes the block adds to the heap, header and padding included
    pub compressed_size: usize,
    /// Bytes the covered values occupy uncompressed
    pub uncompressed_size: usize,
    /// The values are appended to the open block instead of starting a new one
    pub extends_previous: bool,
}

impl Estimate {
    /// Whether this estimate is strictly cheaper per value than `other`,
    /// breaking ties by strategy priority
    pub fn is_better_than(&self, other: &Estimate) -> bool {
        let lhs = self.compressed_size as u128 * other.run_length as u128;
        let rhs = other.compressed_size as u128 * self.run_length as u128;
        lhs < rhs || (lhs == rhs && self.tag.priority() < other.tag.priority())
    }

    /// Compression factor of this estimate alone
    pub fn factor(&self) -> f64 {
        if self.compressed_size == 0 {
            1.0
        } else {
            self.uncompressed_size as f64 / self.compressed_size as f64
        }
    }
}

/// The block most recently written by the compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenBlock {
    /// Tag of the block
    pub tag: MosaicTag,
    /// Byte offset of the block header within the heap
    pub offset: usize,
    /// Logical values covered so far
    pub count: usize,
}

/// Set of strategies the compressor may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MosaicTag>", into = "Vec<MosaicTag>")]
pub struct StrategyFilter {
    mask: u8,
}

impl StrategyFilter {
    /// Every strategy enabled
    pub fn all() -> Self {
        Self::from_tags(&MosaicTag::ALL)
    }

    /// Only the given strategies; `Raw` is always added as the fallback
    pub fn from_tags(tags: &[MosaicTag]) -> Self {
        let mask = tags
            .iter()
            .fold(MosaicTag::Raw.bit(), |mask, tag| mask | tag.bit());
        Self { mask }
    }

    /// Parse a comma or space separated list of strategy names
    ///
    /// `mosaic` (or an empty list) selects every strategy.
    pub fn parse(properties: &str) -> MosaicResult<Self> {
        let mut tags = Vec::new();
        for name in properties
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            let name = name.to_ascii_lowercase();
            if name == "mosaic" {
                return Ok(Self::all());
            }
            let tag = MosaicTag::ALL
                .iter()
                .copied()
                .find(|t| t.name() == name || (name == "literal" && *t == MosaicTag::Raw))
                .ok_or_else(|| {
                    MosaicError::InvalidArgument(format!("unknown strategy '{}'", name))
                })?;
            tags.push(tag);
        }
        if tags.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self::from_tags(&tags))
    }

    /// Whether `tag` is enabled
    pub fn contains(&self, tag: MosaicTag) -> bool {
        self.mask & tag.bit() != 0
    }

    /// Enabled tags in on-disk order
    pub fn tags(&self) -> impl Iterator<Item = MosaicTag> + '_ {
        MosaicTag::ALL.iter().copied().filter(|t| self.contains(*t))
    }

    /// Every subset of the compressing strategies, raw only first
    pub fn combinations() -> Vec<Self> {
        let raw = MosaicTag::Raw.bit();
        let others = MosaicTag::ALL.len() - 1;
        (0..1u8 << others)
            .map(|subset| Self {
                mask: raw | (subset << 1),
            })
            .collect()
    }
}

impl fmt::Display for StrategyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tags().map(|t| t.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl Default for StrategyFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<Vec<MosaicTag>> for StrategyFilter {
    fn from(tags: Vec<MosaicTag>) -> Self {
        Self::from_tags(&tags)
    }
}

impl From<StrategyFilter> for Vec<MosaicTag> {
    fn from(filter: StrategyFilter) -> Self {
        filter.tags().collect()
    }
}

/// One row of a heap layout report
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    /// Strategy of the block
    pub tag: MosaicTag,
    /// Logical values covered
    pub count: usize,
    /// Uncompressed bytes of those values
    pub input_bytes: usize,
    /// Bytes the block occupies in the heap
    pub output_bytes: usize,
    /// Strategy specific summary
    pub properties: String,
}

/// Per-strategy block and element counts of a heap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeapStats {
    /// Blocks per strategy, indexed by tag byte
    pub blocks: [u64; 6],
    /// Logical values per strategy, indexed by tag byte
    pub elements: [u64; 6],
    /// Raw bytes of the column
    pub raw_bytes: usize,
    /// Bytes of the heap, header included
    pub heap_bytes: usize,
}

impl HeapStats {
    /// Account one block
    pub fn record(&mut self, tag: MosaicTag, count: usize) {
        self.blocks[tag.as_u8() as usize] += 1;
        self.elements[tag.as_u8() as usize] += count as u64;
    }

    /// Total number of blocks
    pub fn total_blocks(&self) -> u64 {
        self.blocks.iter().sum()
    }

    /// Total logical values
    pub fn total_elements(&self) -> u64 {
        self.elements.iter().sum()
    }

    /// Blocks written with `tag`
    pub fn blocks_of(&self, tag: MosaicTag) -> u64 {
        self.blocks[tag.as_u8() as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(tag: MosaicTag, run_length: usize, compressed_size: usize) -> Estimate {
        Estimate {
            tag,
            run_length,
            compressed_size,
            uncompressed_size: run_length * 4,
            extends_previous: false,
        }
    }

    #[test]
    fn test_tag_roundtrip() {
        for tag in MosaicTag::ALL {
            assert_eq!(MosaicTag::from_u8(tag.as_u8()), Some(tag));
        }
        assert_eq!(MosaicTag::from_u8(6), None);
    }

    #[test]
    fn test_estimate_ordering() {
        let rle = estimate(MosaicTag::RunLength, 4, 16);
        let raw = estimate(MosaicTag::Raw, 1, 12);
        assert!(rle.is_better_than(&raw));
        assert!(!raw.is_better_than(&rle));

        // equal cost per value: priority decides
        let rle = estimate(MosaicTag::RunLength, 1, 12);
        assert!(rle.is_better_than(&raw));
        assert!(!raw.is_better_than(&rle));
    }

    #[test]
    fn test_filter_parse() {
        let filter = StrategyFilter::parse("runlength, delta").unwrap();
        assert!(filter.contains(MosaicTag::RunLength));
        assert!(filter.contains(MosaicTag::Delta));
        assert!(filter.contains(MosaicTag::Raw));
        assert!(!filter.contains(MosaicTag::Dictionary));

        assert_eq!(StrategyFilter::parse("mosaic").unwrap(), StrategyFilter::all());
        assert_eq!(StrategyFilter::parse("").unwrap(), StrategyFilter::all());
        assert!(StrategyFilter::parse("gzip").is_err());
    }

    #[test]
    fn test_serde_names_match_parse() {
        for tag in MosaicTag::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.name()));
            assert_eq!(serde_json::from_str::<MosaicTag>(&json).unwrap(), tag);
        }

        let filter = StrategyFilter::parse("runlength,frame").unwrap();
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"["raw","runlength","frame"]"#);
        assert_eq!(serde_json::from_str::<StrategyFilter>(&json).unwrap(), filter);
        assert_eq!(StrategyFilter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_combinations() {
        let combinations = StrategyFilter::combinations();
        assert_eq!(combinations.len(), 32);
        assert_eq!(combinations[0].tags().collect::<Vec<_>>(), vec![MosaicTag::Raw]);
        assert_eq!(combinations[31], StrategyFilter::all());
        assert!(combinations.iter().all(|f| f.contains(MosaicTag::Raw)));
        for (i, a) in combinations.iter().enumerate() {
            assert!(combinations[i + 1..].iter().all(|b| b != a));
        }
    }

    #[test]
    fn test_heap_stats() {
        let mut stats = HeapStats::default();
        stats.record(MosaicTag::RunLength, 4);
        stats.record(MosaicTag::RunLength, 2);
        stats.record(MosaicTag::Raw, 1);
        assert_eq!(stats.total_blocks(), 3);
        assert_eq!(stats.total_elements(), 7);
        assert_eq!(stats.blocks_of(MosaicTag::RunLength), 2);
    }
}
