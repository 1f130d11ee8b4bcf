//! Range selection evaluated directly against the block stream.
//!
//! A [`RangePredicate`] resolves the `(low, high, li, hi, anti)` tuple once
//! into a `Matcher`; per-value evaluation is then a single `match`. Nil never
//! satisfies a predicate unless both bounds are nil and the predicate asks for
//! nil explicitly.

use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::heap::MosaicHeap;
use crate::storage::mosaic::traits::strategy_for;
use crate::types::{is_nil_in, MosaicValue, RowId};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Resolved form of a range predicate
#[derive(Debug, Clone, Copy, PartialEq)]
enum Matcher<T> {
    /// Matches no row
    Nothing,
    /// Matches exactly the nil rows
    Nil,
    /// Matches every non-nil row
    NotNil,
    Equal(T),
    NotEqual(T),
    Below { bound: T, inclusive: bool },
    Above { bound: T, inclusive: bool },
    Between { low: T, high: T, li: bool, hi: bool },
    Outside { low: T, high: T, li: bool, hi: bool },
}

/// A bounded, half-bounded or unbounded range predicate over one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangePredicate<T> {
    low: Option<T>,
    high: Option<T>,
    low_inclusive: bool,
    high_inclusive: bool,
    anti: bool,
    nullable: bool,
    matcher: Matcher<T>,
}

impl<T: MosaicValue> RangePredicate<T> {
    /// Build a predicate; a `None` or nil bound means "unbounded"
    pub fn new(
        low: Option<T>,
        high: Option<T>,
        low_inclusive: bool,
        high_inclusive: bool,
        anti: bool,
        nullable: bool,
    ) -> Self {
        let low = low.filter(|v| !v.is_nil());
        let high = high.filter(|v| !v.is_nil());
        let matcher = Self::resolve(low, high, low_inclusive, high_inclusive, anti);
        Self {
            low,
            high,
            low_inclusive,
            high_inclusive,
            anti,
            nullable,
            matcher,
        }
    }

    /// Single comparison `x op value`
    pub fn theta(op: ThetaOp, value: T, nullable: bool) -> Self {
        match op {
            ThetaOp::Lt => Self::new(None, Some(value), false, false, false, nullable),
            ThetaOp::Le => Self::new(None, Some(value), false, true, false, nullable),
            ThetaOp::Gt => Self::new(Some(value), None, false, false, false, nullable),
            ThetaOp::Ge => Self::new(Some(value), None, true, false, false, nullable),
            ThetaOp::Eq => Self::new(Some(value), Some(value), true, true, false, nullable),
            ThetaOp::Ne => Self::new(Some(value), Some(value), true, true, true, nullable),
        }
    }

    fn resolve(low: Option<T>, high: Option<T>, li: bool, hi: bool, anti: bool) -> Matcher<T> {
        match (low, high) {
            (None, None) => match (li && hi, anti) {
                (true, false) => Matcher::Nil,
                (true, true) => Matcher::NotNil,
                (false, false) => Matcher::NotNil,
                (false, true) => Matcher::Nothing,
            },
            (None, Some(bound)) => {
                if anti {
                    Matcher::Above { bound, inclusive: !hi }
                } else {
                    Matcher::Below { bound, inclusive: hi }
                }
            }
            (Some(bound), None) => {
                if anti {
                    Matcher::Below { bound, inclusive: !li }
                } else {
                    Matcher::Above { bound, inclusive: li }
                }
            }
            (Some(low), Some(high)) if low == high => match (li && hi, anti) {
                (true, false) => Matcher::Equal(low),
                (true, true) => Matcher::NotEqual(low),
                (false, false) => Matcher::Nothing,
                (false, true) => Matcher::NotNil,
            },
            (Some(low), Some(high)) if low > high => {
                if anti {
                    Matcher::NotNil
                } else {
                    Matcher::Nothing
                }
            }
            (Some(low), Some(high)) => {
                if anti {
                    Matcher::Outside { low, high, li, hi }
                } else {
                    Matcher::Between { low, high, li, hi }
                }
            }
        }
    }

    /// Whether `value` qualifies
    #[inline]
    pub fn matches(&self, value: &T) -> bool {
        if is_nil_in(value, self.nullable) {
            return matches!(self.matcher, Matcher::Nil);
        }
        match self.matcher {
            Matcher::Nothing | Matcher::Nil => false,
            Matcher::NotNil => true,
            Matcher::Equal(v) => *value == v,
            Matcher::NotEqual(v) => *value != v,
            Matcher::Below { bound, inclusive } => {
                *value < bound || (inclusive && *value == bound)
            }
            Matcher::Above { bound, inclusive } => {
                *value > bound || (inclusive && *value == bound)
            }
            Matcher::Between { low, high, li, hi } => in_interval(value, low, high, li, hi),
            Matcher::Outside { low, high, li, hi } => !in_interval(value, low, high, li, hi),
        }
    }

    /// Whether the predicate matches no value at all
    pub fn is_empty(&self) -> bool {
        matches!(self.matcher, Matcher::Nothing)
            || (!self.nullable && matches!(self.matcher, Matcher::Nil))
    }

    pub fn low(&self) -> Option<T> {
        self.low
    }

    pub fn high(&self) -> Option<T> {
        self.high
    }

    pub fn is_anti(&self) -> bool {
        self.anti
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl<T: MosaicValue> fmt::Display for RangePredicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |v: Option<T>| v.map_or_else(|| "nil".to_string(), |v| format!("{:?}", v));
        write!(
            f,
            "{}{}{}, {}{}",
            if self.anti { "not " } else { "" },
            if self.low_inclusive { '[' } else { '(' },
            bound(self.low),
            bound(self.high),
            if self.high_inclusive { ']' } else { ')' }
        )
    }
}

#[inline]
fn in_interval<T: PartialOrd>(value: &T, low: T, high: T, li: bool, hi: bool) -> bool {
    let above_low = *value > low || (li && *value == low);
    let below_high = *value < high || (hi && *value == high);
    above_low && below_high
}

/// Comparison operator of a theta selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThetaOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl FromStr for ThetaOp {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(ThetaOp::Lt),
            "<=" => Ok(ThetaOp::Le),
            ">" => Ok(ThetaOp::Gt),
            ">=" => Ok(ThetaOp::Ge),
            "=" | "==" => Ok(ThetaOp::Eq),
            "!=" | "<>" => Ok(ThetaOp::Ne),
            other => Err(MosaicError::InvalidArgument(format!(
                "unknown comparison operator '{}'",
                other
            ))),
        }
    }
}

/// Emit the rows of `rows` whose value in the block sequence `values`
/// (starting at row `first`) satisfies `predicate`
pub(crate) fn emit_matches<T: MosaicValue>(
    values: impl Iterator<Item = T>,
    first: RowId,
    rows: Range<RowId>,
    predicate: &RangePredicate<T>,
    out: &mut Vec<RowId>,
) {
    let skip = (rows.start - first) as usize;
    let take = (rows.end - rows.start) as usize;
    for (row, value) in (rows.start..).zip(values.skip(skip).take(take)) {
        if predicate.matches(&value) {
            out.push(row);
        }
    }
}

fn check_candidates(candidates: Option<&[RowId]>) -> MosaicResult<()> {
    match candidates {
        Some(list) if list.windows(2).any(|w| w[0] >= w[1]) => Err(MosaicError::InvalidArgument(
            "candidate list must be strictly ascending".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Keep the rows of `found` that also appear in `candidates`; both ascending
fn intersect_sorted(found: &[RowId], candidates: &[RowId], out: &mut Vec<RowId>) {
    let (mut i, mut j) = (0, 0);
    while i < found.len() && j < candidates.len() {
        match found[i].cmp(&candidates[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(found[i]);
                i += 1;
                j += 1;
            }
        }
    }
}

/// Rows of the whole heap satisfying `predicate`
pub fn select_range<T: MosaicValue>(
    heap: &MosaicHeap,
    predicate: &RangePredicate<T>,
) -> MosaicResult<Vec<RowId>> {
    select_in(heap, 0..heap.len() as RowId, None, predicate)
}

/// Rows within `range` (and within `candidates`, when given) satisfying
/// `predicate`
///
/// Blocks entirely outside the range, or holding no candidate, are stepped
/// over without being read.
pub fn select_in<T: MosaicValue>(
    heap: &MosaicHeap,
    range: Range<RowId>,
    candidates: Option<&[RowId]>,
    predicate: &RangePredicate<T>,
) -> MosaicResult<Vec<RowId>> {
    heap.check_type::<T>()?;
    check_candidates(candidates)?;
    let end = range.end.min(heap.len() as RowId);
    let start = range.start.min(end);

    let mut out = Vec::new();
    if start == end || predicate.is_empty() {
        return Ok(out);
    }

    let mut scratch = Vec::new();
    let mut stream = heap.block_stream();
    while let Some(block) = stream.current()? {
        let strategy = strategy_for::<T>(block.tag);
        let first = stream.row();
        let last = first + block.count as RowId;
        if first >= end {
            break;
        }
        if last > start {
            let rows = first.max(start)..last.min(end);
            match candidates {
                None => strategy.select(&block, first, rows, predicate, &mut out)?,
                Some(list) => {
                    let lo = list.partition_point(|r| *r < rows.start);
                    let hi = list.partition_point(|r| *r < rows.end);
                    if lo < hi {
                        scratch.clear();
                        strategy.select(&block, first, rows, predicate, &mut scratch)?;
                        intersect_sorted(&scratch, &list[lo..hi], &mut out);
                    }
                }
            }
        }
        strategy.advance(&mut stream, &block)?;
    }
    Ok(out)
}

/// Reference evaluation over uncompressed values
pub fn scan_select<T: MosaicValue>(
    values: &[T],
    range: Range<RowId>,
    candidates: Option<&[RowId]>,
    predicate: &RangePredicate<T>,
) -> MosaicResult<Vec<RowId>> {
    check_candidates(candidates)?;
    let end = range.end.min(values.len() as RowId);
    let start = range.start.min(end);
    let rows: Box<dyn Iterator<Item = RowId> + '_> = match candidates {
        Some(list) => Box::new(list.iter().copied().filter(move |r| *r >= start && *r < end)),
        None => Box::new(start..end),
    };
    Ok(rows
        .filter(|r| predicate.matches(&values[*r as usize]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIL: i32 = i32::MIN;

    fn sample() -> Vec<i32> {
        vec![5, 5, 5, 5, 7, 7, NIL, NIL, 3]
    }

    fn rows(
        low: Option<i32>,
        high: Option<i32>,
        li: bool,
        hi: bool,
        anti: bool,
    ) -> Vec<RowId> {
        let predicate = RangePredicate::new(low, high, li, hi, anti, true);
        scan_select(&sample(), 0..9, None, &predicate).unwrap()
    }

    #[test]
    fn test_nil_nil_branches() {
        assert_eq!(rows(None, None, true, true, false), vec![6, 7]);
        assert_eq!(rows(None, None, true, true, true), vec![0, 1, 2, 3, 4, 5, 8]);
        assert_eq!(rows(None, None, true, false, false), vec![0, 1, 2, 3, 4, 5, 8]);
        assert!(rows(None, None, false, true, true).is_empty());
        // an explicit nil bound is the same as no bound
        assert_eq!(rows(Some(NIL), Some(NIL), true, true, false), vec![6, 7]);
    }

    #[test]
    fn test_point_branches() {
        assert_eq!(rows(Some(7), Some(7), true, true, false), vec![4, 5]);
        assert_eq!(rows(Some(7), Some(7), true, true, true), vec![0, 1, 2, 3, 8]);
        assert!(rows(Some(7), Some(7), true, false, false).is_empty());
        assert_eq!(rows(Some(7), Some(7), false, true, true), vec![0, 1, 2, 3, 4, 5, 8]);
    }

    #[test]
    fn test_inverted_bounds() {
        assert!(rows(Some(7), Some(5), true, true, false).is_empty());
        assert_eq!(rows(Some(7), Some(5), true, true, true), vec![0, 1, 2, 3, 4, 5, 8]);
    }

    #[test]
    fn test_half_bounded_branches() {
        assert_eq!(rows(None, Some(5), false, false, false), vec![8]);
        assert_eq!(rows(None, Some(5), false, true, false), vec![0, 1, 2, 3, 8]);
        assert_eq!(rows(None, Some(5), false, false, true), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(rows(None, Some(5), false, true, true), vec![4, 5]);

        assert_eq!(rows(Some(5), None, false, false, false), vec![4, 5]);
        assert_eq!(rows(Some(5), None, true, false, false), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(rows(Some(5), None, false, false, true), vec![0, 1, 2, 3, 8]);
        assert_eq!(rows(Some(5), None, true, false, true), vec![8]);
    }

    #[test]
    fn test_general_interval() {
        assert_eq!(rows(Some(5), Some(7), true, false, false), vec![0, 1, 2, 3]);
        assert_eq!(rows(Some(5), Some(7), false, true, false), vec![4, 5]);
        // nil stays out of the complement
        assert_eq!(rows(Some(5), Some(7), true, false, true), vec![4, 5, 8]);
        assert_eq!(rows(Some(4), Some(6), false, false, true), vec![4, 5, 8]);
    }

    #[test]
    fn test_non_nullable_column_has_no_nil() {
        let values = [i32::MIN, 0, 1];
        let seek_nil = RangePredicate::new(None, None, true, true, false, false);
        assert!(seek_nil.is_empty());
        assert!(scan_select(&values, 0..3, None, &seek_nil).unwrap().is_empty());

        let below = RangePredicate::new(None, Some(1), false, false, false, false);
        assert_eq!(scan_select(&values, 0..3, None, &below).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_float_nan_is_nil() {
        let values = [1.0f64, f64::NAN, 3.0];
        let above = RangePredicate::new(Some(0.0), None, true, false, false, true);
        assert_eq!(scan_select(&values, 0..3, None, &above).unwrap(), vec![0, 2]);
        let anti = RangePredicate::new(Some(2.0), Some(4.0), true, true, true, true);
        assert_eq!(scan_select(&values, 0..3, None, &anti).unwrap(), vec![0]);
    }

    #[test]
    fn test_theta() {
        let values = sample();
        let check = |op: &str, v: i32| {
            let predicate = RangePredicate::theta(op.parse().unwrap(), v, true);
            scan_select(&values, 0..9, None, &predicate).unwrap()
        };
        assert_eq!(check("<", 7), vec![0, 1, 2, 3, 8]);
        assert_eq!(check(">=", 7), vec![4, 5]);
        assert_eq!(check("==", 3), vec![8]);
        assert_eq!(check("<>", 5), vec![4, 5, 8]);
        assert!("~".parse::<ThetaOp>().is_err());
    }

    #[test]
    fn test_candidates_and_range() {
        let values = sample();
        let predicate = RangePredicate::new(Some(5), None, true, false, false, true);
        let found = scan_select(&values, 2..9, Some(&[1, 3, 5, 6, 8][..]), &predicate).unwrap();
        assert_eq!(found, vec![3, 5]);
        assert!(scan_select(&values, 0..9, Some(&[3, 1][..]), &predicate).is_err());
    }

    #[test]
    fn test_intersect_sorted() {
        let mut out = Vec::new();
        intersect_sorted(&[1, 2, 4, 7, 9], &[2, 3, 7, 10], &mut out);
        assert_eq!(out, vec![2, 7]);
    }

    #[test]
    fn test_display() {
        let predicate = RangePredicate::new(Some(5), None, true, false, true, true);
        assert_eq!(predicate.to_string(), "not [5, nil)");
    }
}
