//! Fixed worker pool with barrier-phase execution.
//!
//! An MSM runs as one job executed by every worker simultaneously; inside
//! the job, workers separate algorithm phases with [`Worker::barrier`] and
//! claim disjoint index ranges with [`Worker::range`]. The main thread
//! participates as worker 0, so a pool of size 1 (or no pool at all) is the
//! plain single-threaded execution the property tests baseline against.
//!
//! There is deliberately no work stealing and no per-element task queue: the
//! pipeline is bulk-synchronous, and the barrier is the only scheduling
//! primitive it needs.

use std::any::Any;
use std::ops::Range;
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::errors::{MsmError, Result};

/// The per-worker view of a running job.
pub struct Worker<'p> {
    pub index: usize,
    pub count: usize,
    shared: Option<&'p Shared>,
}

impl Worker<'_> {
    #[inline]
    pub fn is_main(&self) -> bool {
        self.index == 0
    }

    /// Phase barrier; a full memory fence across all workers.
    #[inline]
    pub fn barrier(&self) {
        if let Some(shared) = self.shared {
            shared.barrier.wait();
        }
    }

    /// This worker's share of `[0, n)`, balanced to within one element.
    pub fn range(&self, n: usize) -> Range<usize> {
        let start = self.index * n / self.count;
        let end = (self.index + 1) * n / self.count;
        start..end
    }

    /// Compute a value once on the main worker and hand an `Arc` of it to
    /// every worker. All workers must call this at the same point in the
    /// job; it contains two barriers.
    pub fn broadcast<T, F>(&self, build: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let Some(shared) = self.shared else {
            return Arc::new(build());
        };
        if self.is_main() {
            let value: Arc<dyn Any + Send + Sync> = Arc::new(build());
            *shared.broadcast.lock().unwrap() = Some(value);
        }
        shared.barrier.wait();
        let value = shared
            .broadcast
            .lock()
            .unwrap()
            .clone()
            .expect("broadcast slot empty")
            .downcast::<T>()
            .expect("broadcast type mismatch");
        shared.barrier.wait();
        if self.is_main() {
            *shared.broadcast.lock().unwrap() = None;
        }
        value
    }
}

/// A job reference laundered to `'static` for the worker mailboxes. Sound
/// because `ThreadPool::run` does not return until every worker has passed
/// the end-of-job barrier.
#[derive(Clone, Copy)]
struct JobPtr(&'static (dyn Fn(&Worker) + Sync));

struct JobSlot {
    seq: u64,
    job: Option<JobPtr>,
    shutdown: bool,
}

struct Shared {
    barrier: Barrier,
    slot: Mutex<JobSlot>,
    cv: Condvar,
    broadcast: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

struct PoolInner {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    threads: usize,
}

pub struct ThreadPool {
    inner: Option<PoolInner>,
}

impl ThreadPool {
    pub fn new() -> Self {
        ThreadPool { inner: None }
    }

    /// Total workers a job will run with (1 while the pool is stopped).
    pub fn threads(&self) -> usize {
        self.inner.as_ref().map_or(1, |inner| inner.threads)
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_some()
    }

    /// Spawn `threads − 1` OS workers (the caller is worker 0).
    pub fn start(&mut self, threads: usize) -> Result<()> {
        if self.inner.is_some() {
            return Err(MsmError::ThreadsAlreadyStarted);
        }
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            barrier: Barrier::new(threads),
            slot: Mutex::new(JobSlot {
                seq: 0,
                job: None,
                shutdown: false,
            }),
            cv: Condvar::new(),
            broadcast: Mutex::new(None),
        });
        let mut handles = Vec::with_capacity(threads - 1);
        for index in 1..threads {
            let shared = Arc::clone(&shared);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("msm-worker-{index}"))
                    .spawn(move || worker_loop(&shared, index, threads))
                    .expect("failed to spawn worker"),
            );
        }
        self.inner = Some(PoolInner {
            shared,
            handles,
            threads,
        });
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        let Some(inner) = self.inner.take() else {
            return Err(MsmError::ThreadsNotStarted);
        };
        {
            let mut slot = inner.shared.slot.lock().unwrap();
            slot.shutdown = true;
        }
        inner.shared.cv.notify_all();
        for handle in inner.handles {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Execute `job` on all workers and block until every one of them is
    /// done. Phase barriers inside the job must be crossed by all workers
    /// the same number of times.
    pub fn run(&self, job: &(dyn Fn(&Worker) + Sync)) {
        match &self.inner {
            None => {
                job(&Worker {
                    index: 0,
                    count: 1,
                    shared: None,
                });
            }
            Some(inner) => {
                let shared = &inner.shared;
                {
                    let mut slot = shared.slot.lock().unwrap();
                    slot.seq += 1;
                    // SAFETY: the laundered reference is only used before the
                    // end-of-job barrier below, which this call waits on.
                    let job_static: &'static (dyn Fn(&Worker) + Sync) =
                        unsafe { std::mem::transmute(job) };
                    slot.job = Some(JobPtr(job_static));
                }
                shared.cv.notify_all();
                job(&Worker {
                    index: 0,
                    count: inner.threads,
                    shared: Some(shared),
                });
                shared.barrier.wait();
                shared.slot.lock().unwrap().job = None;
            }
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.stop();
        }
    }
}

fn worker_loop(shared: &Shared, index: usize, count: usize) {
    let mut last_seq = 0u64;
    loop {
        let job = {
            let mut slot = shared.slot.lock().unwrap();
            loop {
                if slot.shutdown {
                    return;
                }
                if slot.seq != last_seq {
                    last_seq = slot.seq;
                    break slot.job.expect("job slot empty at sequence bump");
                }
                slot = shared.cv.wait(slot).unwrap();
            }
        };
        let worker = Worker {
            index,
            count,
            shared: Some(shared),
        };
        (job.0)(&worker);
        shared.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_thread_mode_runs_inline() {
        let pool = ThreadPool::new();
        let hits = AtomicUsize::new(0);
        pool.run(&|w| {
            assert_eq!(w.count, 1);
            assert!(w.is_main());
            w.barrier(); // no-op
            hits.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_workers_participate() {
        let mut pool = ThreadPool::new();
        pool.start(4).unwrap();
        let hits = AtomicUsize::new(0);
        pool.run(&|w| {
            hits.fetch_add(1, Ordering::SeqCst);
            w.barrier();
            // after the barrier every worker must see all increments
            assert_eq!(hits.load(Ordering::SeqCst), 4);
        });
        pool.stop().unwrap();
    }

    #[test]
    fn ranges_partition_evenly() {
        let mut pool = ThreadPool::new();
        pool.start(3).unwrap();
        let total = AtomicUsize::new(0);
        pool.run(&|w| {
            let r = w.range(100);
            total.fetch_add(r.len(), Ordering::SeqCst);
        });
        assert_eq!(total.load(Ordering::SeqCst), 100);
        pool.stop().unwrap();
    }

    #[test]
    fn broadcast_hands_the_same_value_to_all() {
        let mut pool = ThreadPool::new();
        pool.start(4).unwrap();
        let sum = AtomicUsize::new(0);
        pool.run(&|w| {
            let value = w.broadcast(|| 17usize);
            sum.fetch_add(*value, Ordering::SeqCst);
        });
        assert_eq!(sum.load(Ordering::SeqCst), 4 * 17);
        pool.stop().unwrap();
    }

    #[test]
    fn double_start_is_an_error() {
        let mut pool = ThreadPool::new();
        pool.start(2).unwrap();
        assert!(matches!(pool.start(2), Err(MsmError::ThreadsAlreadyStarted)));
        pool.stop().unwrap();
        assert!(matches!(pool.stop(), Err(MsmError::ThreadsNotStarted)));
    }

    #[test]
    fn sequential_jobs_reuse_the_pool() {
        let mut pool = ThreadPool::new();
        pool.start(2).unwrap();
        let counter = AtomicUsize::new(0);
        for _ in 0..10 {
            pool.run(&|_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        pool.stop().unwrap();
    }
}
