//! Integration tests for column heaps on disk
//!
//! These tests cover the column lifecycle: lazy build, background persistence,
//! reload through a memory map, rejection of damaged files, and invalidation
//! on append.

use byteorder::{ByteOrder, LittleEndian};
use crossbeam::channel::bounded;
use prism_mosaic::storage::mosaic::heap_path;
use prism_mosaic::{
    ColumnInfo, HeapStatus, MosaicColumn, MosaicConfig, MosaicError, MosaicResult, PersistQueue,
    ThetaOp,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn values() -> Vec<i64> {
    (0..10_000).map(|i| (i / 250) * 10).collect()
}

fn open(dir: &Path, values: Vec<i64>) -> MosaicColumn<i64> {
    MosaicColumn::open(ColumnInfo::new("amount"), dir, values, MosaicConfig::default())
}

fn persist_now(column: &MosaicColumn<i64>, queue: &PersistQueue) -> MosaicResult<()> {
    let handle = column.persist(queue)?.expect("persistence scheduled");
    handle.wait()
}

#[test]
fn test_persist_and_reload() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(2, 4)?;
    let column = open(dir.path(), values());
    assert_eq!(column.heap_status(), HeapStatus::Absent);

    let heap = column.heap()?.expect("heap built");
    persist_now(&column, &queue)?;
    assert_eq!(column.heap_status(), HeapStatus::Persisted);

    let path = heap_path(dir.path(), "amount");
    assert_eq!(std::fs::read(&path)?, heap.as_bytes());

    // nothing left to write
    assert!(column.persist(&queue)?.is_none());

    let reopened = open(dir.path(), values());
    assert_eq!(reopened.heap_status(), HeapStatus::Placeholder);
    let loaded = reopened.heap()?.expect("heap loaded");
    assert!(loaded.is_mapped());
    assert_eq!(loaded.as_bytes(), heap.as_bytes());
    assert_eq!(reopened.heap_status(), HeapStatus::Persisted);
    assert_eq!(reopened.theta_select(ThetaOp::Eq, 30)?, (750..1000).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn test_bad_magic_is_discarded() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let path = heap_path(dir.path(), "amount");
    std::fs::write(&path, [0xEEu8; 64])?;

    let column = open(dir.path(), values());
    assert_eq!(column.heap_status(), HeapStatus::Placeholder);
    let heap = column.heap()?.expect("heap rebuilt");
    assert!(!heap.is_mapped());
    assert_eq!(column.heap_status(), HeapStatus::Loaded);
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_oversized_declared_size_is_discarded() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = open(dir.path(), values());
    column.heap()?;
    persist_now(&column, &queue)?;

    let path = heap_path(dir.path(), "amount");
    let mut bytes = std::fs::read(&path)?;
    let size = LittleEndian::read_u64(&bytes[8..16]);
    LittleEndian::write_u64(&mut bytes[8..16], size + 8);
    std::fs::write(&path, &bytes)?;

    let reopened = open(dir.path(), values());
    let heap = reopened.heap()?.expect("heap rebuilt");
    assert!(!heap.is_mapped());
    assert!(!path.exists());
    assert_eq!(reopened.values(0..10_000)?, values());
    Ok(())
}

#[test]
fn test_length_mismatch_is_discarded() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = open(dir.path(), values());
    column.heap()?;
    persist_now(&column, &queue)?;

    let mut longer = values();
    longer.push(7);
    let reopened = open(dir.path(), longer.clone());
    let heap = reopened.heap()?.expect("heap rebuilt");
    assert_eq!(heap.len(), longer.len());
    assert_eq!(reopened.heap_status(), HeapStatus::Loaded);
    Ok(())
}

#[test]
fn test_append_invalidates_persisted_heap() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 2)?;
    let column = open(dir.path(), values());
    column.heap()?;
    persist_now(&column, &queue)?;
    let path = heap_path(dir.path(), "amount");
    assert!(path.exists());

    column.append(&[1, 2, 3])?;
    assert_eq!(column.heap_status(), HeapStatus::Absent);
    assert!(!path.exists());

    // uncommitted rows keep the heap in memory
    let heap = column.heap()?.expect("heap rebuilt");
    assert_eq!(heap.len(), 10_003);
    assert!(column.persist(&queue)?.is_none());

    column.commit();
    persist_now(&column, &queue)?;
    assert!(path.exists());
    assert_eq!(column.project(&[0, 10_002])?, vec![0, 3]);
    Ok(())
}

#[test]
fn test_failed_write_keeps_heap_in_memory() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = open(dir.path(), values());
    let heap = column.heap()?.expect("heap built");

    // a directory in the way makes the final rename fail
    let path = heap_path(dir.path(), "amount");
    std::fs::create_dir(&path)?;
    let handle = column.persist(&queue)?.expect("persistence scheduled");
    assert!(matches!(handle.wait(), Err(MosaicError::Persistence(_))));

    assert_eq!(column.heap_status(), HeapStatus::Loaded);
    assert!(Arc::ptr_eq(&heap, &column.heap()?.expect("heap kept")));
    assert_eq!(column.values(0..10_000)?, values());
    assert_eq!(column.theta_select(ThetaOp::Eq, 30)?, (750..1000).collect::<Vec<u64>>());

    // the next attempt succeeds once the path is free
    std::fs::remove_dir(&path)?;
    persist_now(&column, &queue)?;
    assert_eq!(column.heap_status(), HeapStatus::Persisted);
    assert_eq!(std::fs::read(&path)?, heap.as_bytes());
    Ok(())
}

#[test]
fn test_stale_job_does_not_write() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 4)?;
    let column = open(dir.path(), values());
    column.heap()?;

    // hold the only worker so the persistence job waits in the queue
    let (release, gate) = bounded::<()>(0);
    let (started_tx, started) = bounded::<()>(1);
    let blocker = queue.submit(move || {
        let _ = started_tx.send(());
        let _ = gate.recv();
        Ok(())
    })?;
    started.recv().expect("blocker running");

    let job = column.persist(&queue)?.expect("persistence scheduled");
    column.append(&[5])?;
    column.commit();
    release.send(()).expect("blocker waiting");
    blocker.wait()?;
    job.wait()?;

    assert!(!heap_path(dir.path(), "amount").exists());
    assert_eq!(column.heap_status(), HeapStatus::Absent);
    Ok(())
}

#[test]
fn test_transient_column_stays_in_memory() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = MosaicColumn::open(
        ColumnInfo::new("scratch").with_transient(true),
        dir.path(),
        values(),
        MosaicConfig::default(),
    );
    column.heap()?;
    assert!(column.persist(&queue)?.is_none());
    assert!(!heap_path(dir.path(), "scratch").exists());
    Ok(())
}

#[test]
fn test_view_shares_parent_heap() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = open(dir.path(), values());
    {
        let view = column.view(500..1500)?;
        let predicate = column.predicate(Some(20), Some(30), true, true, false);
        let rows = view.select(&predicate, None)?;
        assert_eq!(rows, (500..1000).collect::<Vec<u64>>());

        let from_view = view.heap()?.expect("parent heap");
        let from_parent = column.heap()?.expect("parent heap");
        assert!(Arc::ptr_eq(&from_view, &from_parent));
    }
    persist_now(&column, &queue)?;
    assert_eq!(column.heap_status(), HeapStatus::Persisted);

    let view = column.view(9_990..10_000)?;
    assert_eq!(view.values()?, vec![390; 10]);
    Ok(())
}

#[test]
fn test_destroy_removes_file() -> MosaicResult<()> {
    let dir = TempDir::new()?;
    let queue = PersistQueue::new(1, 1)?;
    let column = open(dir.path(), values());
    column.heap()?;
    persist_now(&column, &queue)?;
    let path = heap_path(dir.path(), "amount");
    assert!(path.exists());

    column.destroy()?;
    assert!(!path.exists());
    Ok(())
}
