#![allow(dead_code)] // shared across several integration test binaries

use std::sync::{Arc, Mutex};

use core_ops::job::{ItemStatus, Job, JobBase};
use core_vfs::{Flags, ListingItem, MemHost, OpenFlags, VfsFile, VfsHost, VfsHostPtr};

pub fn make_file(host: &Arc<MemHost>, path: &str, content: &[u8]) {
    let mut file = host.create_file(path).unwrap();
    file.open(OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
    file.write(content).unwrap();
    file.close().unwrap();
}

pub fn read_file(host: &dyn VfsHost, path: &str) -> Vec<u8> {
    let mut file = host.create_file(path).unwrap();
    file.open(OpenFlags::READ).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Listing item for `directory/name`, statted off the host.
pub fn item(host: &Arc<MemHost>, directory: &str, name: &str) -> ListingItem {
    let host: VfsHostPtr = host.clone();
    ListingItem::from_stat(host, directory, name).unwrap()
}

pub fn set_mtime(host: &Arc<MemHost>, path: &str, mtime: i64) {
    host.set_times(
        path,
        core_vfs::SetTimes {
            mtime: Some(mtime),
            ..Default::default()
        },
    )
    .unwrap();
}

pub fn stat_mode(host: &Arc<MemHost>, path: &str) -> u16 {
    host.stat(path, Flags::empty()).unwrap().mode & 0o7777
}

/// Collects item-state reports fired by a job's worker.
#[derive(Clone, Default)]
pub struct ReportSink {
    entries: Arc<Mutex<Vec<(String, ItemStatus)>>>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, base: &JobBase) {
        let entries = Arc::clone(&self.entries);
        base.control()
            .set_item_state_report_callback(Box::new(move |report| {
                entries
                    .lock()
                    .unwrap()
                    .push((report.path.to_string(), report.status));
            }));
    }

    pub fn entries(&self) -> Vec<(String, ItemStatus)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn processed_paths(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, status)| *status == ItemStatus::Processed)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// A job burning wall time in small cancellable slices.
pub struct SpinJob {
    base: JobBase,
    millis: u64,
}

impl SpinJob {
    pub fn new(millis: u64) -> Self {
        Self {
            base: JobBase::new(),
            millis,
        }
    }
}

impl Job for SpinJob {
    fn perform(&mut self) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(self.millis);
        while std::time::Instant::now() < deadline {
            self.base.block_if_paused();
            if self.base.is_stopped() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}
