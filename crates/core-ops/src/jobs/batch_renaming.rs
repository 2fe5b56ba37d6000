//! Batch renaming: two parallel path arrays renamed pairwise.

use core_vfs::{lowercase_equal, VfsError, VfsHost, VfsHostPtr};

use crate::job::{ItemStatus, Job, JobBase};
use crate::statistics::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameErrorResolution {
    Stop,
    Skip,
    Retry,
}

pub struct BatchRenamingCallbacks {
    pub on_rename_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> RenameErrorResolution + Send + Sync>,
}

impl Default for BatchRenamingCallbacks {
    fn default() -> Self {
        Self {
            on_rename_error: Box::new(|_, _, _| RenameErrorResolution::Stop),
        }
    }
}

pub struct BatchRenamingJob {
    base: JobBase,
    pub callbacks: BatchRenamingCallbacks,
    sources: Vec<String>,
    destinations: Vec<String>,
    host: VfsHostPtr,
}

impl BatchRenamingJob {
    /// Panics when the vectors differ in length.
    pub fn new(sources: Vec<String>, destinations: Vec<String>, host: VfsHostPtr) -> Self {
        assert_eq!(
            sources.len(),
            destinations.len(),
            "sources and destinations must be parallel"
        );
        let job = Self {
            base: JobBase::new(),
            callbacks: BatchRenamingCallbacks::default(),
            sources,
            destinations,
            host,
        };
        job.base.statistics().set_preferred_source(SourceType::Items);
        job
    }

    fn rename(&self, src: &str, dst: &str) {
        if src == dst {
            self.base.statistics().commit_processed(SourceType::Items, 1);
            self.base.tell_item_report(&*self.host, dst, ItemStatus::Processed);
            return;
        }

        loop {
            // an existing destination is fatal unless this is a pure case
            // change of the same entry
            let rc = if self.host.exists(dst) && !lowercase_equal(src, dst) {
                Err(VfsError::posix(libc::EEXIST))
            } else {
                self.host.rename(src, dst)
            };

            match rc {
                Ok(()) => break,
                Err(err) => match (self.callbacks.on_rename_error)(err, dst, &*self.host) {
                    RenameErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        self.base.tell_item_report(&*self.host, src, ItemStatus::Skipped);
                        return;
                    }
                    RenameErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                    RenameErrorResolution::Retry => continue,
                },
            }
        }

        self.base.statistics().commit_processed(SourceType::Items, 1);
        self.base.tell_item_report(&*self.host, dst, ItemStatus::Processed);
    }
}

impl Job for BatchRenamingJob {
    fn perform(&mut self) {
        self.base
            .statistics()
            .commit_estimated(SourceType::Items, self.sources.len() as u64);

        for i in 0..self.sources.len() {
            self.base.block_if_paused();
            if self.base.is_stopped() {
                return;
            }
            self.rename(&self.sources[i], &self.destinations[i]);
        }
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::execute;
    use core_vfs::{MemHost, OpenFlags, VfsFile};

    fn touch(host: &MemHost, path: &str) {
        let mut f = host.create_file(path).unwrap();
        f.open(OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        f.close().unwrap();
    }

    #[test]
    fn renames_every_pair() {
        let host = MemHost::new();
        touch(&host, "/a");
        touch(&host, "/b");
        let mut job = BatchRenamingJob::new(
            vec!["/a".into(), "/b".into()],
            vec!["/a1".into(), "/b1".into()],
            host.clone(),
        );
        execute(&mut job);
        assert!(job.base().control().is_completed());
        assert!(host.exists("/a1") && host.exists("/b1"));
        assert!(!host.exists("/a") && !host.exists("/b"));
        assert_eq!(job.base().statistics().volume_processed(SourceType::Items), 2);
    }

    #[test]
    fn equal_paths_count_as_processed_without_touching_the_host() {
        let host = MemHost::new();
        touch(&host, "/same");
        let mut job =
            BatchRenamingJob::new(vec!["/same".into()], vec!["/same".into()], host.clone());
        execute(&mut job);
        assert!(host.exists("/same"));
        assert_eq!(job.base().statistics().volume_processed(SourceType::Items), 1);
    }

    #[test]
    fn existing_destination_surfaces_eexist() {
        let host = MemHost::new();
        touch(&host, "/x");
        touch(&host, "/y");
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen2 = std::sync::Arc::clone(&seen);
        let mut job = BatchRenamingJob::new(vec!["/x".into()], vec!["/y".into()], host.clone());
        job.callbacks.on_rename_error = Box::new(move |err, _, _| {
            *seen2.lock().unwrap() = Some(err);
            RenameErrorResolution::Skip
        });
        execute(&mut job);
        assert!(seen.lock().unwrap().unwrap().is_posix(libc::EEXIST));
        assert!(host.exists("/x"));
    }

    #[test]
    #[should_panic(expected = "parallel")]
    fn mismatched_vectors_panic() {
        let host = MemHost::new();
        let _ = BatchRenamingJob::new(vec!["/a".into()], Vec::new(), host);
    }
}
