//! Directory creation: walks a chain of names, creating what is missing.

use core_vfs::{Flags, VfsError, VfsHost, VfsHostPtr};

use crate::job::{Job, JobBase};
use crate::statistics::SourceType;

const CREATE_MODE: u16 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResolution {
    Stop,
    Retry,
}

pub struct DirectoryCreationCallbacks {
    pub on_error: Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ErrorResolution + Send + Sync>,
}

impl Default for DirectoryCreationCallbacks {
    fn default() -> Self {
        Self {
            on_error: Box::new(|_, _, _| ErrorResolution::Stop),
        }
    }
}

pub struct DirectoryCreationJob {
    base: JobBase,
    pub callbacks: DirectoryCreationCallbacks,
    directories_chain: Vec<String>,
    root_folder: String,
    host: VfsHostPtr,
}

impl DirectoryCreationJob {
    /// `directories_chain` are the consecutive components to descend into
    /// and create under `root_folder`, e.g. ["a", "b", "c"] for "a/b/c".
    pub fn new(directories_chain: Vec<String>, root_folder: String, host: VfsHostPtr) -> Self {
        let job = Self {
            base: JobBase::new(),
            callbacks: DirectoryCreationCallbacks::default(),
            directories_chain,
            root_folder,
            host,
        };
        job.base.statistics().set_preferred_source(SourceType::Items);
        job
    }

    fn make_dir(&self, path: &str) -> bool {
        // an existing directory is fine, any other existing entry is fatal
        loop {
            match self.host.stat(path, Flags::empty()) {
                Err(_) => break,
                Ok(st) if st.is_dir() => return true,
                Ok(_) => {
                    match (self.callbacks.on_error)(VfsError::posix(libc::EEXIST), path, &*self.host) {
                        ErrorResolution::Retry => continue,
                        ErrorResolution::Stop => {
                            self.base.stop();
                            return false;
                        }
                    }
                }
            }
        }

        loop {
            match self.host.create_directory(path, CREATE_MODE) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_error)(err, path, &*self.host) {
                    ErrorResolution::Retry => continue,
                    ErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                },
            }
        }
    }
}

impl Job for DirectoryCreationJob {
    fn perform(&mut self) {
        self.base
            .statistics()
            .commit_estimated(SourceType::Items, self.directories_chain.len() as u64);

        let mut path = self.root_folder.trim_end_matches('/').to_string();
        for component in &self.directories_chain {
            self.base.block_if_paused();
            if self.base.is_stopped() {
                return;
            }

            path.push('/');
            path.push_str(component);
            if !self.make_dir(&path) {
                return;
            }

            self.base.statistics().commit_processed(SourceType::Items, 1);
        }
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}
