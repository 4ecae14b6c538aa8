//! Background re-parse scheduler.
//!
//! One queue, a fixed pool of worker threads, newest version first. A new job
//! cancels every pending or running job whose chunk set it intersects, so at
//! most one job owns a chunk at a time. Cancellation is cooperative at chunk
//! granularity: a cancelled job finishes nothing past the chunk it is on, and
//! a chunk result is only committed while the job's version is still the
//! newest scheduled for that chunk.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use log::debug;
use parking_lot::{Condvar, Mutex};
use vellum_core::Snapshot;

use crate::highlighter::Highlighter;

/// Cooperative cancellation flag shared between the scheduler and a job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Scheduler counters, readable at any time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Jobs accepted by [`Scheduler::schedule`].
    pub scheduled: u64,
    /// Jobs (or chunk commits) dropped because a newer version took over.
    pub superseded: u64,
    /// Jobs that ran every chunk to completion.
    pub completed: u64,
}

struct Job {
    version: u64,
    chunks: Vec<usize>,
    snapshot: Arc<Snapshot>,
    cancel: CancelToken,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<Job>,
    /// Chunk sets and tokens of jobs currently running on workers.
    running: Vec<(Vec<usize>, CancelToken)>,
    /// Newest version scheduled per chunk; the commit guard.
    chunk_versions: HashMap<usize, u64>,
    active: usize,
    shutdown: bool,
}

struct Inner {
    highlighter: Arc<Highlighter>,
    queue: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
    scheduled: AtomicU64,
    superseded: AtomicU64,
    completed: AtomicU64,
}

/// Background re-parse scheduler over a shared [`Highlighter`].
///
/// Dropping the scheduler drains remaining work and joins its workers.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start `workers` worker threads over `highlighter`.
    pub fn new(highlighter: Arc<Highlighter>, workers: usize) -> Self {
        let inner = Arc::new(Inner {
            highlighter,
            queue: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            scheduled: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });
        let workers = (0..workers.max(1))
            .map(|_| {
                let inner = Arc::clone(&inner);
                std::thread::spawn(move || worker_loop(&inner))
            })
            .collect();
        Self { inner, workers }
    }

    /// The highlighter the workers feed.
    pub fn highlighter(&self) -> &Arc<Highlighter> {
        &self.inner.highlighter
    }

    /// Queue a re-parse of the chunks covering `first_row..=last_row` in
    /// `snapshot`, superseding older jobs on the same chunks.
    pub fn schedule(&self, snapshot: Arc<Snapshot>, first_row: usize, last_row: usize) {
        let chunks = self
            .inner
            .highlighter
            .begin_update(&snapshot, first_row, last_row);
        self.enqueue(snapshot, chunks);
    }

    /// Queue a full re-parse of `snapshot`.
    pub fn schedule_full(&self, snapshot: Arc<Snapshot>) {
        let last_row = snapshot.rows().saturating_sub(1);
        self.schedule(snapshot, 0, last_row);
    }

    /// Current counter values.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            superseded: self.inner.superseded.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
        }
    }

    /// Block until no job is pending or running.
    pub fn wait_idle(&self) {
        let mut queue = self.inner.queue.lock();
        while !(queue.pending.is_empty() && queue.active == 0) {
            self.inner.idle.wait(&mut queue);
        }
    }

    fn enqueue(&self, snapshot: Arc<Snapshot>, chunks: Vec<usize>) {
        let version = snapshot.version();
        let chunk_limit = self.inner.highlighter.chunk_limit(&snapshot);
        let mut queue = self.inner.queue.lock();

        // Claims for chunks past the current document end are dead; drop them
        // so the map tracks the live chunk range.
        queue.chunk_versions.retain(|&chunk, _| chunk < chunk_limit);

        // One sweep under the queue lock: cancel every job the new chunk set
        // intersects, then claim the chunks for this version.
        queue.pending.retain(|job| {
            let hit = job.chunks.iter().any(|c| chunks.contains(c));
            if hit {
                job.cancel.cancel();
                self.inner.superseded.fetch_add(1, Ordering::Relaxed);
                debug!("highlight job v{} superseded before start", job.version);
            }
            !hit
        });
        for (running_chunks, token) in &queue.running {
            if running_chunks.iter().any(|c| chunks.contains(c)) {
                token.cancel();
                debug!("running highlight job cancelled by v{version}");
            }
        }
        for &chunk in &chunks {
            queue.chunk_versions.insert(chunk, version);
        }

        debug!("highlight job v{version} scheduled ({} chunks)", chunks.len());
        queue.pending.push(Job {
            version,
            chunks,
            snapshot,
            cancel: CancelToken::new(),
        });
        self.inner.scheduled.fetch_add(1, Ordering::Relaxed);
        drop(queue);
        self.inner.work_ready.notify_one();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut queue = self.inner.queue.lock();
            queue.shutdown = true;
        }
        self.inner.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(idx) = newest_job(&queue.pending) {
                    let job = queue.pending.swap_remove(idx);
                    queue.running.push((job.chunks.clone(), job.cancel.clone()));
                    queue.active += 1;
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        run_job(inner, &job);

        let mut queue = inner.queue.lock();
        queue.active -= 1;
        if let Some(idx) = queue
            .running
            .iter()
            .position(|(_, token)| token.same(&job.cancel))
        {
            queue.running.swap_remove(idx);
        }
        if queue.pending.is_empty() && queue.active == 0 {
            inner.idle.notify_all();
        }
    }
}

/// Index of the pending job with the highest version.
fn newest_job(pending: &[Job]) -> Option<usize> {
    pending
        .iter()
        .enumerate()
        .max_by_key(|(_, job)| job.version)
        .map(|(idx, _)| idx)
}

fn run_job(inner: &Inner, job: &Job) {
    let highlighter = &inner.highlighter;
    let mut chunks = job.chunks.clone();
    chunks.sort_unstable();
    chunks.dedup();

    let mut idx = 0;
    let mut complete = true;
    while idx < chunks.len() {
        let chunk = chunks[idx];
        idx += 1;
        if job.cancel.is_cancelled() {
            debug!("highlight job v{} cancelled at chunk {chunk}", job.version);
            complete = false;
            break;
        }
        let Some(result) = highlighter.process_chunk(&job.snapshot, chunk) else {
            continue;
        };
        if job.cancel.is_cancelled() {
            complete = false;
            break;
        }
        // Commit guard: skip the chunk when a newer version owns it.
        let authoritative = {
            let queue = inner.queue.lock();
            queue
                .chunk_versions
                .get(&chunk)
                .is_none_or(|&v| v <= job.version)
        };
        if !authoritative {
            inner.superseded.fetch_add(1, Ordering::Relaxed);
            debug!(
                "highlight job v{} skipping chunk {chunk}: newer version scheduled",
                job.version
            );
            complete = false;
            continue;
        }
        if highlighter.commit_chunk(&job.snapshot, chunk, result) {
            let next = chunk + 1;
            if let Err(pos) = chunks.binary_search(&next) {
                chunks.insert(pos, next);
            }
        }
    }

    if complete {
        inner.completed.fetch_add(1, Ordering::Relaxed);
        debug!("highlight job v{} completed", job.version);
    }
}
