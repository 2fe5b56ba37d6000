//! Operations engine: long-running, cancellable, observable filesystem
//! jobs over the VFS abstraction.
//!
//! Layering, leaves first: `progress` -> `statistics` -> `job` ->
//! `operation` -> `pool`; the concrete jobs sit on `job` and `core-vfs`.
//! Each job runs on a dedicated worker thread, resolves every failure
//! through a per-job callbacks table and honours cooperative pause/stop
//! at defined suspension points.

pub mod dialog;
pub mod job;
pub mod jobs;
pub mod observable;
pub mod operation;
pub mod path_arena;
pub mod pool;
pub mod progress;
pub mod statistics;

pub use dialog::{AsyncDialogResponse, DialogRequest, GenericDialog};
pub use job::{execute, ItemStateReport, ItemStatus, Job, JobBase, JobControl};
pub use observable::{Observable, ObservationTicket};
pub use operation::{Operation, OperationState};
pub use pool::Pool;
pub use progress::Progress;
pub use statistics::{SourceType, Statistics, TimingPauser};
