//! User-facing façade around one job.
//!
//! Maps the job lifecycle onto an observable state machine, relays
//! pause/resume/stop, owns the mutable title and brokers dialog requests
//! between the worker thread and a host-supplied presentation callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use crate::dialog::{responses, AsyncDialogResponse, DialogRequest};
use crate::job::{execute, ItemStateReportCallback, Job, JobControl};
use crate::observable::{Observable, ObservationTicket};
use crate::statistics::{Statistics, TimingPauser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Cold,
    Running,
    Paused,
    Stopped,
    Completed,
}

pub mod notify {
    pub const START: u64 = 1 << 0;
    pub const PAUSE: u64 = 1 << 1;
    pub const RESUME: u64 = 1 << 2;
    pub const STOP: u64 = 1 << 3;
    pub const COMPLETION: u64 = 1 << 4;
    pub const TITLE_CHANGE: u64 = 1 << 5;
    pub const FINISH: u64 = STOP | COMPLETION;
    pub const STATE_CHANGE: u64 = START | PAUSE | RESUME | STOP | COMPLETION;
}

pub type DialogCallback = Box<dyn Fn(&DialogRequest, &Arc<AsyncDialogResponse>) + Send + Sync>;

pub struct Operation {
    kind: &'static str,
    control: JobControl,
    job: Mutex<Option<Box<dyn Job>>>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    started: AtomicBool,
    finished: Mutex<bool>,
    finish_cv: Condvar,
    title: Mutex<String>,
    observable: Observable,
    dialog_callback: Mutex<Option<DialogCallback>>,
    pending_response: Mutex<Weak<AsyncDialogResponse>>,
}

impl Operation {
    /// Wraps a constructed job. The job's per-error callbacks must be
    /// configured before `start`.
    pub fn new(kind: &'static str, job: Box<dyn Job>, title: impl Into<String>) -> Arc<Self> {
        let control = job.base().control();
        Arc::new(Self {
            kind,
            control,
            job: Mutex::new(Some(job)),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
            finished: Mutex::new(false),
            finish_cv: Condvar::new(),
            title: Mutex::new(title.into()),
            observable: Observable::new(),
            dialog_callback: Mutex::new(None),
            pending_response: Mutex::new(Weak::new()),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn title(&self) -> String {
        self.title.lock().unwrap().clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.lock().unwrap() = title.into();
        self.observable.fire(notify::TITLE_CHANGE);
    }

    pub fn state(&self) -> OperationState {
        if !self.started.load(Ordering::SeqCst) {
            return OperationState::Cold;
        }
        if self.control.is_completed() {
            return OperationState::Completed;
        }
        if self.control.is_stopped() {
            return OperationState::Stopped;
        }
        if self.control.is_paused() {
            return OperationState::Paused;
        }
        OperationState::Running
    }

    pub fn statistics(&self) -> &Statistics {
        self.control.statistics()
    }

    /// Spawns the worker thread. Idempotent: repeated calls are ignored.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut job) = self.job.lock().unwrap().take() else {
            return;
        };

        let weak = Arc::downgrade(self);
        self.control.set_finish_callback(move || {
            if let Some(op) = weak.upgrade() {
                op.job_finished();
            }
        });
        let weak = Arc::downgrade(self);
        self.control.set_pause_callback(move || {
            if let Some(op) = weak.upgrade() {
                op.observable.fire(notify::PAUSE);
            }
        });
        let weak = Arc::downgrade(self);
        self.control.set_resume_callback(move || {
            if let Some(op) = weak.upgrade() {
                op.observable.fire(notify::RESUME);
            }
        });

        let handle = std::thread::Builder::new()
            .name(format!("ops-{}", self.kind))
            .spawn(move || execute(&mut *job))
            .expect("failed to spawn a job worker thread");
        *self.worker.lock().unwrap() = Some(handle);
        self.observable.fire(notify::START);
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
        self.abort_ui_waiting();
        // a never-started operation still has to reach a terminal state
        if !self.started.swap(true, Ordering::SeqCst) {
            self.job.lock().unwrap().take();
            self.job_finished();
        }
    }

    fn job_finished(&self) {
        {
            let mut finished = self.finished.lock().unwrap();
            *finished = true;
            self.finish_cv.notify_all();
        }
        if self.control.is_completed() {
            self.observable.fire(notify::COMPLETION);
        } else {
            self.observable.fire(notify::STOP);
        }
    }

    /// Blocks until the operation reaches a terminal state.
    pub fn wait(&self) {
        let finished = self.finished.lock().unwrap();
        let _guard = self
            .finish_cv
            .wait_while(finished, |done| !*done)
            .unwrap();
    }

    /// Timed wait; true when the operation finished in time.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let finished = self.finished.lock().unwrap();
        let (guard, _) = self
            .finish_cv
            .wait_timeout_while(finished, timeout, |done| !*done)
            .unwrap();
        *guard
    }

    pub fn observe(
        &self,
        mask: u64,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> ObservationTicket {
        self.observable.observe(mask, callback)
    }

    pub fn observe_unticketed(&self, mask: u64, callback: impl Fn() + Send + Sync + 'static) {
        self.observable.observe_unticketed(mask, callback)
    }

    pub fn set_dialog_callback(&self, callback: DialogCallback) {
        *self.dialog_callback.lock().unwrap() = Some(callback);
    }

    pub fn is_interactive(&self) -> bool {
        self.dialog_callback.lock().unwrap().is_some()
    }

    pub fn set_item_status_callback(&self, callback: ItemStateReportCallback) {
        self.control.set_item_state_report_callback(callback);
    }

    pub fn is_waiting_for_ui_response(&self) -> bool {
        self.pending_response
            .lock()
            .unwrap()
            .upgrade()
            .map(|r| !r.is_committed())
            .unwrap_or(false)
    }

    /// Commits the default (Stop) response into whatever dialog is being
    /// waited on.
    pub fn abort_ui_waiting(&self) {
        if let Some(response) = self.pending_response.lock().unwrap().upgrade() {
            if !response.is_committed() {
                response.commit(responses::STOP);
            }
        }
    }

    /// Presents `request` through the dialog callback and blocks the
    /// calling worker until a response arrives or the job is stopped.
    /// Returns the Stop response when no presentation layer is attached.
    pub fn show_dialog(&self, request: DialogRequest) -> i64 {
        let response = Arc::new(AsyncDialogResponse::new());
        {
            let callback = self.dialog_callback.lock().unwrap();
            let Some(callback) = callback.as_ref() else {
                return responses::STOP;
            };
            callback(&request, &response);
        }
        *self.pending_response.lock().unwrap() = Arc::downgrade(&response);
        self.wait_for_dialog_response(&response)
    }

    fn wait_for_dialog_response(&self, response: &Arc<AsyncDialogResponse>) -> i64 {
        let _pauser = TimingPauser::new(self.statistics());
        loop {
            if let Some(answer) = response.wait_for(Duration::from_millis(100)) {
                return answer;
            }
            if self.control.is_stopped() {
                return responses::STOP;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobBase};
    use std::sync::atomic::AtomicUsize;

    struct SleepJob {
        base: JobBase,
        millis: u64,
    }

    impl Job for SleepJob {
        fn perform(&mut self) {
            let deadline = std::time::Instant::now() + Duration::from_millis(self.millis);
            while std::time::Instant::now() < deadline {
                self.base.block_if_paused();
                if self.base.is_stopped() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        fn base(&self) -> &JobBase {
            &self.base
        }
    }

    fn sleep_op(millis: u64) -> Arc<Operation> {
        Operation::new("test", Box::new(SleepJob { base: JobBase::new(), millis }), "sleep")
    }

    #[test]
    fn cold_until_started_then_completes() {
        let op = sleep_op(1);
        assert_eq!(op.state(), OperationState::Cold);
        op.start();
        assert!(op.wait_for(Duration::from_secs(5)));
        assert_eq!(op.state(), OperationState::Completed);
    }

    #[test]
    fn stop_yields_stopped_state() {
        let op = sleep_op(10_000);
        op.start();
        op.stop();
        assert!(op.wait_for(Duration::from_secs(5)));
        assert_eq!(op.state(), OperationState::Stopped);
    }

    #[test]
    fn pause_and_resume_are_observable() {
        let op = sleep_op(200);
        let events = Arc::new(AtomicUsize::new(0));
        let events2 = Arc::clone(&events);
        let _ticket = op.observe(notify::PAUSE | notify::RESUME, move || {
            events2.fetch_add(1, Ordering::SeqCst);
        });
        op.start();
        op.pause();
        assert_eq!(op.state(), OperationState::Paused);
        op.resume();
        assert!(op.wait_for(Duration::from_secs(5)));
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn title_change_notifies() {
        let op = sleep_op(1);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let _ticket = op.observe(notify::TITLE_CHANGE, move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        op.set_title("renamed");
        assert_eq!(op.title(), "renamed");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dialog_without_presentation_defaults_to_stop() {
        let op = sleep_op(1);
        let answer = op.show_dialog(DialogRequest {
            buttons: crate::dialog::GenericDialog::AbortRetry,
            message: "failure".into(),
            error: None,
            path: "/x".into(),
            host_tag: "mem".into(),
        });
        assert_eq!(answer, responses::STOP);
    }

    #[test]
    fn dialog_response_reaches_the_worker() {
        let op = sleep_op(1);
        op.set_dialog_callback(Box::new(|_request, response| {
            response.commit(responses::RETRY);
        }));
        op.start();
        let answer = op.show_dialog(DialogRequest {
            buttons: crate::dialog::GenericDialog::AbortRetry,
            message: "failure".into(),
            error: None,
            path: "/x".into(),
            host_tag: "mem".into(),
        });
        assert_eq!(answer, responses::RETRY);
    }
}
