//! Column storage with a lazily built compressed heap
//!
//! This module provides:
//! - The owning column type with its heap state machine
//! - Lazy load-or-build of the compressed heap
//! - Background persistence of committed heaps
//! - Borrowed views sharing the parent's heap

use crate::common::config::MosaicConfig;
use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::compressor::MosaicCompressor;
use crate::storage::mosaic::cursor;
use crate::storage::mosaic::heap::MosaicHeap;
use crate::storage::mosaic::persist::{self, PersistHandle, PersistQueue};
use crate::storage::mosaic::select::{self, RangePredicate, ThetaOp};
use crate::storage::mosaic::traits::CompressionStats;
use crate::types::{MosaicValue, RowId};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name, also the stem of its heap file
    pub name: String,
    /// Whether the nil pattern marks missing values
    pub nullable: bool,
    /// Transient columns are never written to disk
    pub transient: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            transient: false,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}

/// Where a column's compressed heap currently lives
#[derive(Debug, Clone)]
pub enum HeapState {
    /// No heap built
    Absent,
    /// A heap file may exist on disk but has not been loaded
    Placeholder,
    /// Heap resident; `persisted` when the file on disk matches it
    Loaded {
        heap: Arc<MosaicHeap>,
        persisted: bool,
    },
}

/// Summary of a [`HeapState`] for callers that only need the phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapStatus {
    Absent,
    Placeholder,
    Loaded,
    Persisted,
}

impl HeapState {
    pub fn status(&self) -> HeapStatus {
        match self {
            HeapState::Absent => HeapStatus::Absent,
            HeapState::Placeholder => HeapStatus::Placeholder,
            HeapState::Loaded {
                persisted: false, ..
            } => HeapStatus::Loaded,
            HeapState::Loaded {
                persisted: true, ..
            } => HeapStatus::Persisted,
        }
    }
}

/// State guarded by the structural lock
#[derive(Debug)]
struct ColumnInner<T> {
    values: Vec<T>,
    /// Rows appended since the last commit
    pending: usize,
    state: HeapState,
    /// Compression was judged not worthwhile for the current values
    uncompressible: bool,
}

/// A column owning its values and its compressed heap
pub struct MosaicColumn<T: MosaicValue> {
    info: ColumnInfo,
    /// Directory of the heap file; `None` keeps the column memory only
    dir: Option<PathBuf>,
    config: MosaicConfig,
    compressor: MosaicCompressor,
    inner: Arc<RwLock<ColumnInner<T>>>,
}

impl<T: MosaicValue> MosaicColumn<T> {
    /// In-memory column holding committed `values`
    pub fn new(info: ColumnInfo, values: Vec<T>, config: MosaicConfig) -> Self {
        Self::build(info, None, values, config, HeapState::Absent)
    }

    /// Column whose heap file lives in `dir`
    ///
    /// An existing heap file is not read here; it is loaded, and validated,
    /// on first use.
    pub fn open(info: ColumnInfo, dir: impl AsRef<Path>, values: Vec<T>, config: MosaicConfig) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let state = if persist::heap_path(&dir, &info.name).exists() {
            HeapState::Placeholder
        } else {
            HeapState::Absent
        };
        Self::build(info, Some(dir), values, config, state)
    }

    fn build(
        info: ColumnInfo,
        dir: Option<PathBuf>,
        values: Vec<T>,
        config: MosaicConfig,
        state: HeapState,
    ) -> Self {
        let compressor = MosaicCompressor::from_config(&config);
        Self {
            info,
            dir,
            config,
            compressor,
            inner: Arc::new(RwLock::new(ColumnInner {
                values,
                pending: 0,
                state,
                uncompressible: false,
            })),
        }
    }

    pub fn info(&self) -> &ColumnInfo {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Heap file location, if the column has one
    pub fn heap_path(&self) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| persist::heap_path(dir, &self.info.name))
    }

    pub fn heap_status(&self) -> HeapStatus {
        self.inner.read().state.status()
    }

    /// Whether rows were appended since the last commit
    pub fn has_pending(&self) -> bool {
        self.inner.read().pending > 0
    }

    /// Append rows; the current heap no longer describes the column
    pub fn append(&self, values: &[T]) -> MosaicResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write();
        inner.values.try_reserve(values.len())?;
        inner.values.extend_from_slice(values);
        inner.pending += values.len();
        inner.uncompressible = false;
        self.invalidate(&mut inner);
        Ok(())
    }

    /// Mark every appended row as committed
    pub fn commit(&self) {
        let mut inner = self.inner.write();
        if inner.pending > 0 {
            debug!(column = %self.info.name, rows = inner.pending, "committed rows");
            inner.pending = 0;
        }
    }

    fn invalidate(&self, inner: &mut ColumnInner<T>) {
        let on_disk = matches!(
            inner.state,
            HeapState::Placeholder | HeapState::Loaded { persisted: true, .. }
        );
        inner.state = HeapState::Absent;
        if on_disk {
            self.unlink_quietly();
        }
    }

    fn unlink_quietly(&self) {
        if let Some(path) = self.heap_path() {
            if let Err(e) = persist::remove_heap(&path) {
                warn!(column = %self.info.name, ?path, error = %e, "could not remove heap file");
            }
        }
    }

    /// The compressed heap, loading or building it on first use
    ///
    /// Returns `None` while the column stays in raw form: too few rows, or a
    /// heap that would not reach the configured compression ratio. The returned
    /// `Arc` pins the heap for as long as the caller holds it.
    pub fn heap(&self) -> MosaicResult<Option<Arc<MosaicHeap>>> {
        {
            let inner = self.inner.read();
            match &inner.state {
                HeapState::Loaded { heap, .. } => return Ok(Some(Arc::clone(heap))),
                HeapState::Absent if inner.uncompressible => return Ok(None),
                _ => {}
            }
        }
        let mut inner = self.inner.write();
        self.load_or_build(&mut inner)
    }

    fn load_or_build(&self, inner: &mut ColumnInner<T>) -> MosaicResult<Option<Arc<MosaicHeap>>> {
        if let HeapState::Loaded { heap, .. } = &inner.state {
            return Ok(Some(Arc::clone(heap)));
        }
        if matches!(inner.state, HeapState::Placeholder) {
            if let Some(heap) = self.load_placeholder(inner.values.len()) {
                let heap = Arc::new(heap);
                inner.state = HeapState::Loaded {
                    heap: Arc::clone(&heap),
                    persisted: true,
                };
                return Ok(Some(heap));
            }
            inner.state = HeapState::Absent;
        }

        if inner.uncompressible || inner.values.len() < self.config.min_rows {
            return Ok(None);
        }
        let heap = self.compressor.compress(&inner.values, self.info.nullable)?;
        let ratio = heap.compression_ratio();
        if ratio < self.config.min_compression_ratio {
            debug!(column = %self.info.name, ratio, "compression not worthwhile, keeping raw values");
            inner.uncompressible = true;
            return Ok(None);
        }
        info!(
            column = %self.info.name,
            rows = heap.len(),
            bytes = heap.size_bytes(),
            ratio,
            "built compressed heap"
        );
        let heap = Arc::new(heap);
        inner.state = HeapState::Loaded {
            heap: Arc::clone(&heap),
            persisted: false,
        };
        Ok(Some(heap))
    }

    /// Try the heap file; a bad file is removed
    fn load_placeholder(&self, expected_len: usize) -> Option<MosaicHeap> {
        let path = self.heap_path()?;
        match persist::load_heap::<T>(&path, expected_len) {
            Ok(heap) => {
                info!(column = %self.info.name, ?path, bytes = heap.size_bytes(), "loaded heap file");
                Some(heap)
            }
            Err(e) => {
                warn!(column = %self.info.name, ?path, error = %e, "discarding heap file");
                self.unlink_quietly();
                None
            }
        }
    }

    /// Schedule a background write of the current heap
    ///
    /// Nothing is scheduled (`Ok(None)`) for transient or memory-only columns,
    /// with uncommitted rows, without a built heap, when the heap is already on
    /// disk, or when the queue refuses the job.
    pub fn persist(&self, queue: &PersistQueue) -> MosaicResult<Option<PersistHandle>> {
        let Some(path) = self.heap_path() else {
            return Ok(None);
        };
        if self.info.transient {
            return Ok(None);
        }
        let heap = {
            let inner = self.inner.read();
            if inner.pending > 0 {
                debug!(column = %self.info.name, "not persisting: uncommitted rows");
                return Ok(None);
            }
            match &inner.state {
                HeapState::Loaded {
                    heap,
                    persisted: false,
                } => Arc::clone(heap),
                _ => return Ok(None),
            }
        };

        let inner = Arc::clone(&self.inner);
        let name = self.info.name.clone();
        let job = move || write_if_current(&inner, &heap, &path, &name);
        match queue.submit(job) {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                warn!(column = %self.info.name, error = %e, "heap stays in memory only");
                Ok(None)
            }
        }
    }

    /// Drop the heap and remove its file
    pub fn destroy(self) -> MosaicResult<()> {
        let mut inner = self.inner.write();
        inner.state = HeapState::Absent;
        if let Some(path) = self.heap_path() {
            persist::remove_heap(&path)?;
        }
        debug!(column = %self.info.name, "destroyed column heap");
        Ok(())
    }

    /// Borrowed view over `range`
    pub fn view(&self, range: Range<RowId>) -> MosaicResult<ColumnView<'_, T>> {
        let len = self.len() as RowId;
        if range.start > range.end || range.end > len {
            return Err(MosaicError::InvalidArgument(format!(
                "view range {:?} outside column of {} rows",
                range, len
            )));
        }
        Ok(ColumnView {
            parent: self,
            range,
        })
    }

    /// Range predicate carrying this column's nullability
    pub fn predicate(
        &self,
        low: Option<T>,
        high: Option<T>,
        low_inclusive: bool,
        high_inclusive: bool,
        anti: bool,
    ) -> RangePredicate<T> {
        RangePredicate::new(low, high, low_inclusive, high_inclusive, anti, self.info.nullable)
    }

    /// Rows satisfying `predicate`, within `range` and `candidates`
    pub fn select(
        &self,
        predicate: &RangePredicate<T>,
        range: Range<RowId>,
        candidates: Option<&[RowId]>,
    ) -> MosaicResult<Vec<RowId>> {
        match self.heap_or_raw()? {
            Some(heap) => select::select_in(&heap, range, candidates, predicate),
            None => {
                let inner = self.inner.read();
                select::scan_select(&inner.values, range, candidates, predicate)
            }
        }
    }

    /// Rows where `x op value`
    pub fn theta_select(&self, op: ThetaOp, value: T) -> MosaicResult<Vec<RowId>> {
        let predicate = RangePredicate::theta(op, value, self.info.nullable);
        self.select(&predicate, 0..self.len() as RowId, None)
    }

    /// Values of `range`
    pub fn values(&self, range: Range<RowId>) -> MosaicResult<Vec<T>> {
        match self.heap_or_raw()? {
            Some(heap) => heap.open_cursor(range)?.decompress_all(),
            None => {
                let inner = self.inner.read();
                let slice = usize::try_from(range.start)
                    .ok()
                    .zip(usize::try_from(range.end).ok())
                    .and_then(|(start, end)| inner.values.get(start..end))
                    .ok_or_else(|| {
                        MosaicError::InvalidArgument(format!("row range {:?} out of bounds", range))
                    })?;
                Ok(slice.to_vec())
            }
        }
    }

    /// Values at ascending row positions
    pub fn project(&self, rows: &[RowId]) -> MosaicResult<Vec<T>> {
        if rows.windows(2).any(|w| w[0] > w[1]) {
            return Err(MosaicError::InvalidArgument(
                "projection rows must be ascending".to_string(),
            ));
        }
        match self.heap_or_raw()? {
            Some(heap) => cursor::project(&heap, rows),
            None => {
                let inner = self.inner.read();
                rows.iter()
                    .map(|r| {
                        inner.values.get(*r as usize).copied().ok_or_else(|| {
                            MosaicError::InvalidArgument(format!("row {} out of bounds", r))
                        })
                    })
                    .collect()
            }
        }
    }

    /// The heap, or `None` to read raw values; encode failures fall back to raw
    fn heap_or_raw(&self) -> MosaicResult<Option<Arc<MosaicHeap>>> {
        match self.heap() {
            Ok(heap) => Ok(heap),
            Err(MosaicError::Encode(reason)) => {
                warn!(column = %self.info.name, %reason, "compression abandoned, reading raw values");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Background part of `persist`
///
/// Holds the structural lock in upgradable mode for the write, so the heap
/// cannot be rebuilt or invalidated while its file is produced.
fn write_if_current<T: MosaicValue>(
    inner: &RwLock<ColumnInner<T>>,
    heap: &Arc<MosaicHeap>,
    path: &Path,
    name: &str,
) -> MosaicResult<()> {
    let guard = inner.upgradable_read();
    let current = matches!(
        &guard.state,
        HeapState::Loaded { heap: live, persisted: false } if Arc::ptr_eq(live, heap)
    );
    if !current || guard.pending > 0 {
        debug!(column = %name, "heap replaced before it could be persisted");
        return Ok(());
    }
    if let Err(e) = persist::write_heap(path, heap) {
        warn!(column = %name, ?path, error = %e, "heap persistence failed");
        let _ = persist::remove_heap(path);
        return Err(e);
    }
    let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
    guard.state = HeapState::Loaded {
        heap: Arc::clone(heap),
        persisted: true,
    };
    info!(column = %name, ?path, bytes = heap.size_bytes(), "persisted heap");
    Ok(())
}

/// A borrowed, read-only window onto a parent column
///
/// The view reads through the parent's heap and never owns it: there is no
/// way to persist or destroy a heap through a view. Row identifiers are those
/// of the parent.
#[derive(Clone)]
pub struct ColumnView<'a, T: MosaicValue> {
    parent: &'a MosaicColumn<T>,
    range: Range<RowId>,
}

impl<'a, T: MosaicValue> ColumnView<'a, T> {
    pub fn parent(&self) -> &'a MosaicColumn<T> {
        self.parent
    }

    pub fn range(&self) -> Range<RowId> {
        self.range.clone()
    }

    pub fn len(&self) -> usize {
        (self.range.end - self.range.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The parent's heap
    pub fn heap(&self) -> MosaicResult<Option<Arc<MosaicHeap>>> {
        self.parent.heap()
    }

    /// Parent rows inside the view satisfying `predicate`
    pub fn select(
        &self,
        predicate: &RangePredicate<T>,
        candidates: Option<&[RowId]>,
    ) -> MosaicResult<Vec<RowId>> {
        self.parent.select(predicate, self.range.clone(), candidates)
    }

    pub fn values(&self) -> MosaicResult<Vec<T>> {
        self.parent.values(self.range.clone())
    }

    /// Values at parent rows, all of which must lie inside the view
    pub fn project(&self, rows: &[RowId]) -> MosaicResult<Vec<T>> {
        if let Some(row) = rows.iter().find(|r| !self.range.contains(r)) {
            return Err(MosaicError::InvalidArgument(format!(
                "row {} outside view {:?}",
                row, self.range
            )));
        }
        self.parent.project(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::DEFAULT_MIN_ROWS;

    fn column(values: Vec<i32>) -> MosaicColumn<i32> {
        MosaicColumn::new(ColumnInfo::new("c"), values, MosaicConfig::default())
    }

    #[test]
    fn test_heap_built_lazily() {
        let col = column(vec![1, 1, 1, 2]);
        assert_eq!(col.heap_status(), HeapStatus::Absent);
        let heap = col.heap().unwrap().unwrap();
        assert_eq!(heap.len(), 4);
        assert_eq!(col.heap_status(), HeapStatus::Loaded);
        // second call hands out the same heap
        assert!(Arc::ptr_eq(&heap, &col.heap().unwrap().unwrap()));
    }

    #[test]
    fn test_append_invalidates() {
        let col = column(vec![1, 2, 3]);
        col.heap().unwrap();
        col.append(&[4]).unwrap();
        assert_eq!(col.heap_status(), HeapStatus::Absent);
        assert!(col.has_pending());
        assert_eq!(col.values(0..4).unwrap(), vec![1, 2, 3, 4]);
        col.commit();
        assert!(!col.has_pending());
    }

    #[test]
    fn test_small_columns_stay_raw() {
        let config = MosaicConfig {
            min_rows: 10,
            ..MosaicConfig::default()
        };
        assert!(config.min_rows > DEFAULT_MIN_ROWS);
        let col = MosaicColumn::new(ColumnInfo::new("c"), vec![3, 3, 4], config);
        assert!(col.heap().unwrap().is_none());
        let predicate = col.predicate(Some(3), Some(3), true, true, false);
        assert_eq!(col.select(&predicate, 0..3, None).unwrap(), vec![0, 1]);
        assert_eq!(col.project(&[2]).unwrap(), vec![4]);
    }

    #[test]
    fn test_poor_ratio_keeps_raw() {
        let config = MosaicConfig {
            min_compression_ratio: 2.0,
            ..MosaicConfig::default()
        };
        let col = MosaicColumn::new(ColumnInfo::new("c"), vec![1, 900, -5, 77], config);
        assert!(col.heap().unwrap().is_none());
        assert_eq!(col.heap_status(), HeapStatus::Absent);
        assert_eq!(col.theta_select(ThetaOp::Gt, 50).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_memory_column_never_persists() {
        let queue = PersistQueue::new(1, 1).unwrap();
        let col = column(vec![7; 100]);
        col.heap().unwrap();
        assert!(col.persist(&queue).unwrap().is_none());
        assert!(col.heap_path().is_none());
    }

    #[test]
    fn test_view_reads_parent_rows() {
        let col = column(vec![5, 5, 5, 5, 7, 7, i32::MIN, i32::MIN, 3]);
        let view = col.view(2..7).unwrap();
        assert_eq!(view.len(), 5);
        assert_eq!(view.values().unwrap(), vec![5, 5, 7, 7, i32::MIN]);

        let predicate = col.predicate(Some(5), Some(7), true, false, false);
        assert_eq!(view.select(&predicate, None).unwrap(), vec![2, 3]);
        assert_eq!(view.project(&[4, 6]).unwrap(), vec![7, i32::MIN]);
        assert!(view.project(&[1]).is_err());
        assert!(col.view(3..20).is_err());

        let heap = view.heap().unwrap().unwrap();
        assert!(Arc::ptr_eq(&heap, &col.heap().unwrap().unwrap()));
    }

    #[test]
    fn test_projection_rows_must_ascend() {
        let col = column(vec![1, 2, 3, 4]);
        assert!(col.heap().unwrap().is_some());
        assert!(col.project(&[3, 0]).is_err());
        assert!(col.project(&[0, 4]).is_err());
        assert_eq!(col.project(&[0, 0, 3]).unwrap(), vec![1, 1, 4]);

        let config = MosaicConfig {
            min_rows: 100,
            ..MosaicConfig::default()
        };
        let raw = MosaicColumn::new(ColumnInfo::new("c"), vec![1, 2, 3, 4], config);
        assert!(raw.heap().unwrap().is_none());
        assert!(raw.project(&[3, 0]).is_err());
        assert!(raw.project(&[0, 4]).is_err());
        assert_eq!(raw.project(&[0, 0, 3]).unwrap(), vec![1, 1, 4]);
    }
}
