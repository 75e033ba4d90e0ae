//! Thread-pool apartment
//!
//! A fixed set of worker threads draining one shared [`PriorityWorkQueue`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::queue::PriorityWorkQueue;
use super::{Apartment, Work};
use crate::runtime::priority::Priority;

/// Thread-pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApartmentConfig {
    /// Number of worker threads.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Worker thread name prefix.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_num_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_thread_name() -> String {
    "flowrt-worker".to_string()
}

impl Default for ApartmentConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            thread_name: default_thread_name(),
        }
    }
}

/// Apartment statistics.
#[derive(Debug, Default)]
pub struct ApartmentStats {
    /// Total work items scheduled.
    pub scheduled: AtomicUsize,
    /// Total work items that ran to completion.
    pub completed: AtomicUsize,
    /// Total work items that panicked.
    pub panicked: AtomicUsize,
    /// Deepest queue observed.
    pub peak_queue_depth: AtomicUsize,
}

impl ApartmentStats {
    /// Update the peak queue depth.
    #[inline]
    fn update_depth(
        &self,
        current: usize,
    ) {
        self.peak_queue_depth.fetch_max(current, Ordering::SeqCst);
    }
}

struct PoolShared {
    queue: Mutex<PriorityWorkQueue>,
    available: Condvar,
    shutting_down: AtomicBool,
    stats: ApartmentStats,
}

/// Apartment backed by worker threads.
pub struct ThreadPoolApartment {
    config: ApartmentConfig,
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPoolApartment {
    /// Create a pool with default configuration.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(ApartmentConfig::default())
    }

    /// Create a pool with `num_workers` threads.
    pub fn with_workers(num_workers: usize) -> std::io::Result<Self> {
        Self::with_config(ApartmentConfig {
            num_workers,
            ..ApartmentConfig::default()
        })
    }

    /// Create a pool with custom configuration.
    pub fn with_config(config: ApartmentConfig) -> std::io::Result<Self> {
        let num_workers = config.num_workers.max(1);
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(PriorityWorkQueue::new()),
            available: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            stats: ApartmentStats::default(),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let shared = shared.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, worker_id))
                .spawn(move || Self::worker_loop(worker_id, &shared))?;
            workers.push(worker);
        }
        debug!(workers = num_workers, "thread pool apartment started");

        Ok(Self {
            config,
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Worker thread main loop.
    fn worker_loop(
        worker_id: usize,
        shared: &PoolShared,
    ) {
        loop {
            let work = {
                let mut queue = shared.queue.lock();
                loop {
                    if let Some(work) = queue.pop() {
                        break Some(work);
                    }
                    if shared.shutting_down.load(Ordering::SeqCst) {
                        break None;
                    }
                    shared.available.wait(&mut queue);
                }
            };
            let Some(work) = work else {
                debug!(worker_id, "apartment worker exiting");
                return;
            };

            match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(()) => {
                    shared.stats.completed.fetch_add(1, Ordering::SeqCst);
                }
                Err(_) => {
                    shared.stats.panicked.fetch_add(1, Ordering::SeqCst);
                    error!(worker_id, "scheduled work panicked");
                }
            }
        }
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &ApartmentStats {
        &self.shared.stats
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.config.num_workers.max(1)
    }

    /// Number of queued, not yet started work items.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Check if the pool accepts work.
    #[inline]
    pub fn is_running(&self) -> bool {
        !self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting work, let workers drain the queue and join them.
    pub fn shutdown(&self) {
        {
            // Flip the flag under the queue lock so no worker misses the wakeup.
            let _queue = self.shared.queue.lock();
            self.shared.shutting_down.store(true, Ordering::SeqCst);
        }
        self.shared.available.notify_all();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!("apartment worker panicked outside of scheduled work");
            }
        }
    }
}

impl Apartment for ThreadPoolApartment {
    fn schedule(
        &self,
        work: Work,
        priority: Priority,
    ) {
        if !self.is_running() {
            warn!(%priority, "work scheduled on a stopped apartment was dropped");
            return;
        }
        self.shared.stats.scheduled.fetch_add(1, Ordering::SeqCst);
        let depth = {
            let mut queue = self.shared.queue.lock();
            queue.push(work, priority);
            queue.len()
        };
        self.shared.stats.update_depth(depth);
        self.shared.available.notify_one();
    }
}

impl std::fmt::Debug for ThreadPoolApartment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ThreadPoolApartment")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for ThreadPoolApartment {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}
