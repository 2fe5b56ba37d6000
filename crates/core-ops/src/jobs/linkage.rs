//! Symlink / hardlink creation and symlink alteration.

use core_vfs::{mode, Flags, VfsError, VfsHost, VfsHostPtr};

use crate::job::{Job, JobBase};
use crate::statistics::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageType {
    CreateSymlink,
    AlterSymlink,
    CreateHardlink,
}

pub struct LinkageCallbacks {
    pub on_create_symlink_error: Box<dyn Fn(VfsError, &str, &dyn VfsHost) + Send + Sync>,
    pub on_alter_symlink_error: Box<dyn Fn(VfsError, &str, &dyn VfsHost) + Send + Sync>,
    pub on_create_hardlink_error: Box<dyn Fn(VfsError, &str, &dyn VfsHost) + Send + Sync>,
}

impl Default for LinkageCallbacks {
    fn default() -> Self {
        Self {
            on_create_symlink_error: Box::new(|_, _, _| {}),
            on_alter_symlink_error: Box::new(|_, _, _| {}),
            on_create_hardlink_error: Box::new(|_, _, _| {}),
        }
    }
}

pub struct LinkageJob {
    base: JobBase,
    pub callbacks: LinkageCallbacks,
    link_path: String,
    link_value: String,
    host: VfsHostPtr,
    kind: LinkageType,
}

impl LinkageJob {
    /// Panics on an empty link path.
    pub fn new(link_path: String, link_value: String, host: VfsHostPtr, kind: LinkageType) -> Self {
        assert!(!link_path.is_empty(), "the link path must not be empty");
        let job = Self {
            base: JobBase::new(),
            callbacks: LinkageCallbacks::default(),
            link_path,
            link_value,
            host,
            kind,
        };
        job.base.statistics().set_preferred_source(SourceType::Items);
        job.base.statistics().commit_estimated(SourceType::Items, 1);
        job
    }

    fn do_symlink_creation(&self) {
        match self.host.create_symlink(&self.link_path, &self.link_value) {
            Ok(()) => {
                self.base.statistics().commit_processed(SourceType::Items, 1);
            }
            Err(err) => {
                (self.callbacks.on_create_symlink_error)(err, &self.link_path, &*self.host);
                self.base.stop();
            }
        }
    }

    fn do_symlink_alteration(&self) {
        let st = match self.host.stat(&self.link_path, Flags::NO_FOLLOW) {
            Ok(st) => st,
            Err(err) => {
                (self.callbacks.on_alter_symlink_error)(err, &self.link_path, &*self.host);
                self.base.stop();
                return;
            }
        };

        if st.mode & mode::S_IFMT != mode::S_IFLNK {
            (self.callbacks.on_alter_symlink_error)(
                VfsError::posix(libc::EEXIST),
                &self.link_path,
                &*self.host,
            );
            self.base.stop();
            return;
        }

        if let Err(err) = self.host.unlink(&self.link_path) {
            (self.callbacks.on_alter_symlink_error)(err, &self.link_path, &*self.host);
            self.base.stop();
            return;
        }

        match self.host.create_symlink(&self.link_path, &self.link_value) {
            Ok(()) => {
                self.base.statistics().commit_processed(SourceType::Items, 1);
            }
            Err(err) => {
                (self.callbacks.on_alter_symlink_error)(err, &self.link_path, &*self.host);
                self.base.stop();
            }
        }
    }

    fn do_hardlink_creation(&self) {
        if !self.host.is_native_fs() {
            (self.callbacks.on_create_hardlink_error)(
                VfsError::posix(libc::ENOTSUP),
                &self.link_path,
                &*self.host,
            );
            self.base.stop();
            return;
        }

        match hardlink(&self.link_value, &self.link_path) {
            Ok(()) => {
                self.base.statistics().commit_processed(SourceType::Items, 1);
            }
            Err(err) => {
                (self.callbacks.on_create_hardlink_error)(err, &self.link_path, &*self.host);
                self.base.stop();
            }
        }
    }
}

impl Job for LinkageJob {
    fn perform(&mut self) {
        match self.kind {
            LinkageType::CreateSymlink => self.do_symlink_creation(),
            LinkageType::AlterSymlink => self.do_symlink_alteration(),
            LinkageType::CreateHardlink => self.do_hardlink_creation(),
        }
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

#[cfg(unix)]
fn hardlink(original: &str, link: &str) -> Result<(), VfsError> {
    std::fs::hard_link(original, link).map_err(VfsError::from)
}
