//! The abstract unit of background work.
//!
//! Concrete jobs implement [`Job::perform`] and periodically call
//! `base().block_if_paused()` / check `base().is_stopped()` between atomic
//! steps. A job's shared state (`JobControl`) outlives the worker thread
//! so the owning operation can keep pausing, stopping and reading
//! statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use core_vfs::VfsHost;

use crate::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Processed,
    Skipped,
}

/// Per-processed-path report fired from the worker thread.
pub struct ItemStateReport<'a> {
    pub host: &'a dyn VfsHost,
    pub path: &'a str,
    pub status: ItemStatus,
}

pub type ItemStateReportCallback = Box<dyn Fn(&ItemStateReport<'_>) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_finish: Option<Box<dyn Fn() + Send + Sync>>,
    on_pause: Option<Box<dyn Fn() + Send + Sync>>,
    on_resume: Option<Box<dyn Fn() + Send + Sync>>,
    on_item_report: Option<ItemStateReportCallback>,
}

struct Shared {
    is_running: AtomicBool,
    is_paused: AtomicBool,
    is_stopped: AtomicBool,
    is_completed: AtomicBool,
    pause_lock: Mutex<()>,
    pause_cv: Condvar,
    callbacks: Mutex<Callbacks>,
    stats: Statistics,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            is_running: AtomicBool::new(false),
            is_paused: AtomicBool::new(false),
            is_stopped: AtomicBool::new(false),
            is_completed: AtomicBool::new(false),
            pause_lock: Mutex::new(()),
            pause_cv: Condvar::new(),
            callbacks: Mutex::new(Callbacks::default()),
            stats: Statistics::new(),
        })
    }
}

/// Embedded by every concrete job; owns the shared lifecycle state.
pub struct JobBase {
    shared: Arc<Shared>,
}

impl Default for JobBase {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBase {
    pub fn new() -> Self {
        Self { shared: Shared::new() }
    }

    /// Handle for the owner side (operation / tests).
    pub fn control(&self) -> JobControl {
        JobControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.shared.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.control().stop();
    }

    /// Parks the worker while paused; returns immediately once stopped.
    pub fn block_if_paused(&self) {
        let shared = &self.shared;
        let mut guard = shared.pause_lock.lock().unwrap();
        while shared.is_paused.load(Ordering::SeqCst) && !shared.is_stopped.load(Ordering::SeqCst) {
            guard = shared.pause_cv.wait(guard).unwrap();
        }
    }

    pub fn tell_item_report(&self, host: &dyn VfsHost, path: &str, status: ItemStatus) {
        let callbacks = self.shared.callbacks.lock().unwrap();
        if let Some(cb) = &callbacks.on_item_report {
            cb(&ItemStateReport { host, path, status });
        }
    }
}

/// A unit of work run on a dedicated worker thread.
pub trait Job: Send {
    fn perform(&mut self);
    fn base(&self) -> &JobBase;
}

/// Shared handle to a job's lifecycle; cheap to clone.
#[derive(Clone)]
pub struct JobControl {
    shared: Arc<Shared>,
}

impl JobControl {
    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.shared.is_completed.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.shared.stats
    }

    pub fn pause(&self) {
        if !self.shared.is_paused.swap(true, Ordering::SeqCst) {
            self.shared.stats.pause_timing();
            let callbacks = self.shared.callbacks.lock().unwrap();
            if let Some(cb) = &callbacks.on_pause {
                cb();
            }
        }
    }

    pub fn resume(&self) {
        if self.shared.is_paused.swap(false, Ordering::SeqCst) {
            self.shared.stats.resume_timing();
            {
                let callbacks = self.shared.callbacks.lock().unwrap();
                if let Some(cb) = &callbacks.on_resume {
                    cb();
                }
            }
            let _guard = self.shared.pause_lock.lock().unwrap();
            self.shared.pause_cv.notify_all();
        }
    }

    /// One-shot: the job aborts at its next suspension point and performs
    /// no further destructive work.
    pub fn stop(&self) {
        if !self.shared.is_stopped.swap(true, Ordering::SeqCst) {
            let _guard = self.shared.pause_lock.lock().unwrap();
            self.shared.pause_cv.notify_all();
        }
    }

    pub fn set_finish_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.lock().unwrap().on_finish = Some(Box::new(cb));
    }

    pub fn set_pause_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.lock().unwrap().on_pause = Some(Box::new(cb));
    }

    pub fn set_resume_callback(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.lock().unwrap().on_resume = Some(Box::new(cb));
    }

    pub fn set_item_state_report_callback(&self, cb: ItemStateReportCallback) {
        self.shared.callbacks.lock().unwrap().on_item_report = Some(cb);
    }

    fn fire_finish(&self) {
        let callbacks = self.shared.callbacks.lock().unwrap();
        if let Some(cb) = &callbacks.on_finish {
            cb();
        }
    }
}

/// Runs the job to completion on the calling thread: lifecycle flags,
/// statistics clock and the finish callback are managed here.
pub fn execute(job: &mut dyn Job) {
    let control = job.base().control();
    control.shared.is_running.store(true, Ordering::SeqCst);
    control.statistics().start_timing();

    job.perform();

    control.statistics().stop_timing();
    if !control.is_stopped() {
        control.shared.is_completed.store(true, Ordering::SeqCst);
    }
    control.shared.is_running.store(false, Ordering::SeqCst);
    control.fire_finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingJob {
        base: JobBase,
        steps: usize,
        performed: Arc<AtomicUsize>,
    }

    impl Job for CountingJob {
        fn perform(&mut self) {
            for _ in 0..self.steps {
                self.base.block_if_paused();
                if self.base.is_stopped() {
                    return;
                }
                self.performed.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn base(&self) -> &JobBase {
            &self.base
        }
    }

    #[test]
    fn completes_when_not_stopped() {
        let performed = Arc::new(AtomicUsize::new(0));
        let mut job = CountingJob {
            base: JobBase::new(),
            steps: 3,
            performed: Arc::clone(&performed),
        };
        let control = job.base.control();
        execute(&mut job);
        assert_eq!(performed.load(Ordering::SeqCst), 3);
        assert!(control.is_completed());
        assert!(!control.is_stopped());
        assert!(!control.is_running());
    }

    #[test]
    fn stop_preempts_completion() {
        let performed = Arc::new(AtomicUsize::new(0));
        let mut job = CountingJob {
            base: JobBase::new(),
            steps: 100,
            performed: Arc::clone(&performed),
        };
        let control = job.base.control();
        control.stop();
        execute(&mut job);
        assert_eq!(performed.load(Ordering::SeqCst), 0);
        assert!(control.is_stopped());
        assert!(!control.is_completed());
    }

    #[test]
    fn paused_worker_blocks_until_resumed() {
        let performed = Arc::new(AtomicUsize::new(0));
        let mut job = CountingJob {
            base: JobBase::new(),
            steps: 1,
            performed: Arc::clone(&performed),
        };
        let control = job.base.control();
        control.pause();
        let handle = std::thread::spawn(move || {
            execute(&mut job);
        });
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(performed.load(Ordering::SeqCst), 0);
        control.resume();
        handle.join().unwrap();
        assert_eq!(performed.load(Ordering::SeqCst), 1);
        assert!(control.is_completed());
    }

    #[test]
    fn finish_callback_fires_once_after_perform() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let mut job = CountingJob {
            base: JobBase::new(),
            steps: 1,
            performed: Arc::new(AtomicUsize::new(0)),
        };
        job.base.control().set_finish_callback(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        execute(&mut job);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
