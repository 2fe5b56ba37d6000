//! Bounded-concurrency scheduler of operations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::observable::{Observable, ObservationTicket};
use crate::operation::Operation;

pub mod notify {
    pub const ADDITION: u64 = 1 << 0;
    pub const REMOVAL: u64 = 1 << 1;
    pub const CHANGE: u64 = ADDITION | REMOVAL;
}

type EnqueueFilter = Box<dyn Fn(&Operation) -> bool + Send + Sync>;
type CompletionCallback = Box<dyn Fn(&Arc<Operation>) + Send + Sync>;

#[derive(Default)]
struct Queues {
    running: Vec<Arc<Operation>>,
    pending: VecDeque<Arc<Operation>>,
}

pub struct Pool {
    queues: Mutex<Queues>,
    concurrency: AtomicUsize,
    observable: Observable,
    /// Decides whether an operation obeys the concurrency bound; `false`
    /// starts it immediately regardless of the running count.
    should_be_queued: Mutex<Option<EnqueueFilter>>,
    completion_callback: Mutex<Option<CompletionCallback>>,
    weak_self: Mutex<Weak<Pool>>,
}

impl Pool {
    const DEFAULT_CONCURRENCY: usize = 5;

    pub fn make() -> Arc<Self> {
        let pool = Arc::new(Self {
            queues: Mutex::new(Queues::default()),
            concurrency: AtomicUsize::new(Self::DEFAULT_CONCURRENCY),
            observable: Observable::new(),
            should_be_queued: Mutex::new(None),
            completion_callback: Mutex::new(None),
            weak_self: Mutex::new(Weak::new()),
        });
        *pool.weak_self.lock().unwrap() = Arc::downgrade(&pool);
        pool
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.load(Ordering::Relaxed)
    }

    pub fn set_concurrency(&self, maximum: usize) {
        self.concurrency.store(maximum.max(1), Ordering::Relaxed);
        self.start_pending_operations();
    }

    pub fn set_enqueuing_callback(&self, filter: EnqueueFilter) {
        *self.should_be_queued.lock().unwrap() = Some(filter);
    }

    pub fn set_operation_completion_callback(&self, callback: CompletionCallback) {
        *self.completion_callback.lock().unwrap() = Some(callback);
    }

    pub fn observe(&self, mask: u64, cb: impl Fn() + Send + Sync + 'static) -> ObservationTicket {
        self.observable.observe(mask, cb)
    }

    pub fn observe_unticketed(&self, mask: u64, cb: impl Fn() + Send + Sync + 'static) {
        self.observable.observe_unticketed(mask, cb)
    }

    pub fn is_empty(&self) -> bool {
        let queues = self.queues.lock().unwrap();
        queues.running.is_empty() && queues.pending.is_empty()
    }

    pub fn operations_count(&self) -> usize {
        let queues = self.queues.lock().unwrap();
        queues.running.len() + queues.pending.len()
    }

    pub fn running_operations_count(&self) -> usize {
        self.queues.lock().unwrap().running.len()
    }

    pub fn operations(&self) -> Vec<Arc<Operation>> {
        let queues = self.queues.lock().unwrap();
        queues
            .running
            .iter()
            .chain(queues.pending.iter())
            .cloned()
            .collect()
    }

    pub fn running_operations(&self) -> Vec<Arc<Operation>> {
        self.queues.lock().unwrap().running.clone()
    }

    /// Starts the operation immediately when the enqueue filter exempts it
    /// or a slot is free; appends to the pending FIFO otherwise.
    pub fn enqueue(&self, operation: Arc<Operation>) {
        let obeys_queueing = self
            .should_be_queued
            .lock()
            .unwrap()
            .as_ref()
            .map(|filter| filter(&operation))
            .unwrap_or(true);

        let start_now = {
            let mut queues = self.queues.lock().unwrap();
            if !obeys_queueing || queues.running.len() < self.concurrency() {
                queues.running.push(Arc::clone(&operation));
                true
            } else {
                queues.pending.push_back(Arc::clone(&operation));
                false
            }
        };

        if start_now {
            self.start_operation(&operation);
        }
        self.observable.fire(notify::ADDITION);
    }

    fn start_operation(&self, operation: &Arc<Operation>) {
        let weak_pool = self.weak_self.lock().unwrap().clone();
        let weak_op = Arc::downgrade(operation);
        operation.observe_unticketed(crate::operation::notify::FINISH, move || {
            let (Some(pool), Some(op)) = (weak_pool.upgrade(), weak_op.upgrade()) else {
                return;
            };
            pool.operation_did_finish(&op);
        });
        operation.start();
    }

    fn operation_did_finish(&self, operation: &Arc<Operation>) {
        {
            let mut queues = self.queues.lock().unwrap();
            queues.running.retain(|op| !Arc::ptr_eq(op, operation));
        }
        if let Some(callback) = self.completion_callback.lock().unwrap().as_ref() {
            callback(operation);
        }
        self.start_pending_operations();
        self.observable.fire(notify::REMOVAL);
    }

    fn start_pending_operations(&self) {
        let mut to_start = Vec::new();
        {
            let mut queues = self.queues.lock().unwrap();
            while queues.running.len() < self.concurrency() {
                let Some(operation) = queues.pending.pop_front() else {
                    break;
                };
                queues.running.push(Arc::clone(&operation));
                to_start.push(operation);
            }
        }
        for operation in to_start {
            self.start_operation(&operation);
        }
    }

    /// Stops everything and blocks until every operation reaches a
    /// terminal state.
    pub fn stop_and_wait_for_shutdown(&self) {
        let operations = self.operations();
        for operation in &operations {
            operation.stop();
        }
        for operation in &operations {
            operation.wait();
        }
        let mut queues = self.queues.lock().unwrap();
        queues.running.clear();
        queues.pending.clear();
    }
}
