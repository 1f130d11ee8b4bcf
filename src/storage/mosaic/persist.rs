//! Heap files and the background persistence queue.
//!
//! A heap file is the heap image verbatim. Writes go to a temporary file in
//! the target directory, are synced, and are then renamed over the target, so
//! a crash leaves either the previous file, no file, or a stray temporary.
//! Loads map the file and run the full header and stream validation before
//! the heap is handed out.

use crate::common::config::MosaicConfig;
use crate::common::constants::MOSAIC_FILE_SUFFIX;
use crate::common::error::{MosaicError, MosaicResult};
use crate::storage::mosaic::heap::MosaicHeap;
use crate::types::MosaicValue;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Location of the heap file of `column` inside `dir`
pub fn heap_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{}.{}", column, MOSAIC_FILE_SUFFIX))
}

/// Durably write `heap` to `path`
pub fn write_heap(path: &Path, heap: &MosaicHeap) -> MosaicResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(heap.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| MosaicError::Persistence(format!("rename to {:?} failed: {}", path, e)))?;

    // make the rename itself durable
    if let Ok(parent) = File::open(dir) {
        let _ = parent.sync_all();
    }
    debug!(?path, bytes = heap.size_bytes(), "wrote heap file");
    Ok(())
}

/// Map and validate the heap file at `path`
///
/// The file must describe exactly `expected_len` values of type `T`.
pub fn load_heap<T: MosaicValue>(path: &Path, expected_len: usize) -> MosaicResult<MosaicHeap> {
    let file = File::open(path)?;
    // SAFETY: heap files are only replaced by rename, never written in place,
    // so the mapped inode does not change under us.
    let map = unsafe { Mmap::map(&file)? };
    let heap = MosaicHeap::from_mmap::<T>(map)?;
    if heap.len() != expected_len {
        return Err(crate::corrupted_err!(
            "heap file {:?} holds {} values, column has {}",
            path,
            heap.len(),
            expected_len
        ));
    }
    Ok(heap)
}

/// Delete the heap file at `path`; a missing file is not an error
pub fn remove_heap(path: &Path) -> MosaicResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(?path, "removed heap file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

type PersistWork = Box<dyn FnOnce() -> MosaicResult<()> + Send + 'static>;

struct PersistJob {
    work: PersistWork,
    done: Sender<MosaicResult<()>>,
}

/// Completion handle of a submitted job
#[derive(Debug)]
pub struct PersistHandle {
    done: Receiver<MosaicResult<()>>,
}

impl PersistHandle {
    /// Block until the job has run and return its outcome
    pub fn wait(self) -> MosaicResult<()> {
        self.done.recv().unwrap_or_else(|_| {
            Err(MosaicError::Persistence(
                "persistence worker exited before finishing the job".to_string(),
            ))
        })
    }
}

/// Bounded queue drained by a fixed set of writer threads
///
/// Submission never blocks: when the queue is full the job is refused and the
/// heap simply stays in memory until the next attempt.
pub struct PersistQueue {
    sender: Option<Sender<PersistJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl PersistQueue {
    /// Start `workers` threads sharing a queue of `depth` slots
    pub fn new(workers: usize, depth: usize) -> MosaicResult<Self> {
        if workers == 0 || depth == 0 {
            return Err(MosaicError::InvalidArgument(
                "persistence queue needs at least one worker and one slot".to_string(),
            ));
        }
        let (sender, receiver) = bounded::<PersistJob>(depth);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("mosaic-persist-{}", id))
                .spawn(move || Self::run_worker(id, receiver))?;
            handles.push(handle);
        }
        info!(workers, depth, "persistence queue started");
        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    pub fn from_config(config: &MosaicConfig) -> MosaicResult<Self> {
        Self::new(config.persist_workers, config.persist_queue_depth)
    }

    fn run_worker(id: usize, receiver: Receiver<PersistJob>) {
        for job in receiver.iter() {
            let result = (job.work)();
            if let Err(e) = &result {
                warn!(worker = id, error = %e, "persistence job failed");
            }
            // the submitter may have dropped its handle
            let _ = job.done.send(result);
        }
        debug!(worker = id, "persistence worker stopped");
    }

    /// Queue `work` for a background writer
    pub fn submit<F>(&self, work: F) -> MosaicResult<PersistHandle>
    where
        F: FnOnce() -> MosaicResult<()> + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| MosaicError::Persistence("persistence queue is shut down".to_string()))?;
        let (done, handle) = bounded(1);
        let job = PersistJob {
            work: Box::new(work),
            done,
        };
        match sender.try_send(job) {
            Ok(()) => Ok(PersistHandle { done: handle }),
            Err(TrySendError::Full(_)) => Err(MosaicError::Persistence(
                "persistence queue is full".to_string(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(MosaicError::Persistence(
                "persistence workers are gone".to_string(),
            )),
        }
    }

    /// Finish queued jobs and stop the workers
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("persistence worker panicked");
            }
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
