//! Bridge between worker threads and an interactive presentation layer.
//!
//! A job blocks on an [`AsyncDialogResponse`] until the UI commits a
//! choice or the operation is told to abort the wait.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use core_vfs::VfsError;

/// Canonical button-set selections understood by the generic dialogs.
pub mod responses {
    pub const STOP: i64 = 0;
    pub const SKIP: i64 = 1;
    pub const SKIP_ALL: i64 = 2;
    pub const RETRY: i64 = 3;
    pub const OVERWRITE: i64 = 4;
    pub const OVERWRITE_OLD: i64 = 5;
    pub const APPEND: i64 = 6;
    pub const KEEP_BOTH: i64 = 7;
    pub const UNLOCK: i64 = 8;
    pub const DELETE_PERMANENTLY: i64 = 9;
    pub const CONTINUE: i64 = 10;
}

/// Which buttons a generic error dialog should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericDialog {
    AbortRetry,
    AbortSkipSkipAll,
    AbortSkipSkipAllRetry,
    AbortSkipSkipAllOverwrite,
    Continue,
}

/// Everything the presentation layer needs to render one error dialog.
#[derive(Debug, Clone)]
pub struct DialogRequest {
    pub buttons: GenericDialog,
    pub message: String,
    pub error: Option<VfsError>,
    pub path: String,
    pub host_tag: String,
}

#[derive(Default)]
struct ResponseState {
    response: Option<i64>,
    custom: HashMap<String, bool>,
}

/// One-shot completion cell filled by the UI thread and awaited by the
/// worker.
#[derive(Default)]
pub struct AsyncDialogResponse {
    state: Mutex<ResponseState>,
    cv: Condvar,
}

impl AsyncDialogResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&self, response: i64) {
        let mut state = self.state.lock().unwrap();
        state.response = Some(response);
        self.cv.notify_all();
    }

    /// Boolean side-channel, e.g. an "apply to all" checkbox.
    pub fn set_custom(&self, key: &str, value: bool) {
        self.state.lock().unwrap().custom.insert(key.to_string(), value);
    }

    pub fn custom(&self, key: &str) -> bool {
        self.state.lock().unwrap().custom.get(key).copied().unwrap_or(false)
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().unwrap().response.is_some()
    }

    /// Blocks until committed; `None` on timeout.
    pub fn wait_for(&self, timeout: Duration) -> Option<i64> {
        let state = self.state.lock().unwrap();
        let (state, _result) = self
            .cv
            .wait_timeout_while(state, timeout, |s| s.response.is_none())
            .unwrap();
        state.response
    }

    pub fn response(&self) -> Option<i64> {
        self.state.lock().unwrap().response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn commit_releases_a_waiter() {
        let response = Arc::new(AsyncDialogResponse::new());
        let remote = Arc::clone(&response);
        let waiter = std::thread::spawn(move || remote.wait_for(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        response.commit(responses::RETRY);
        assert_eq!(waiter.join().unwrap(), Some(responses::RETRY));
    }

    #[test]
    fn wait_times_out_without_commit() {
        let response = AsyncDialogResponse::new();
        assert_eq!(response.wait_for(Duration::from_millis(10)), None);
    }

    #[test]
    fn custom_fields_round_trip() {
        let response = AsyncDialogResponse::new();
        assert!(!response.custom("apply_to_all"));
        response.set_custom("apply_to_all", true);
        assert!(response.custom("apply_to_all"));
    }
}
