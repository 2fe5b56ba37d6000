//! The abstract filesystem every backend implements.

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{VfsError, VfsResult};
use crate::file::VfsFile;
use crate::stat::VfsStat;

bitflags! {
    /// Behaviour modifiers accepted by host calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// lstat-style behaviour: do not resolve a trailing symlink.
        const NO_FOLLOW = 1 << 0;
    }
}

bitflags! {
    /// Capability bits a host advertises. Jobs consult these before
    /// attempting optional operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HostFeatures: u32 {
        const SET_TIMES = 1 << 0;
        const SET_OWNERSHIP = 1 << 1;
        const SET_PERMISSIONS = 1 << 2;
        const SET_FLAGS = 1 << 3;
        const NON_EMPTY_RMDIR = 1 << 4;
        const TRASH = 1 << 5;
        const XATTRS = 1 << 6;
    }
}

/// One row yielded by `iterate_directory_listing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEnt {
    pub name: String,
    /// d_type-style discriminator; `DirEntType::Unknown` forces a stat.
    pub kind: DirEntType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntType {
    Regular,
    Directory,
    Symlink,
    Other,
    Unknown,
}

/// Timestamp tuple for `set_times`; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetTimes {
    pub btime: Option<i64>,
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
    pub atime: Option<i64>,
}

/// Cancellation probe passed into long-running host helpers.
pub type CancelChecker<'a> = &'a dyn Fn() -> bool;

/// The abstract filesystem. Implementations must be shareable across the
/// worker threads of concurrently running jobs.
pub trait VfsHost: Send + Sync {
    /// Stable identifier of the backend kind ("native", "mem", ...).
    fn tag(&self) -> &str;

    fn stat(&self, path: &str, flags: Flags) -> VfsResult<VfsStat>;

    /// Yields directory entries until exhausted or until the callback
    /// returns `false`.
    fn iterate_directory_listing(
        &self,
        path: &str,
        cb: &mut dyn FnMut(&DirEnt) -> bool,
    ) -> VfsResult<()>;

    fn create_file(&self, path: &str) -> VfsResult<Box<dyn VfsFile>>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path, Flags::empty()).is_ok()
    }

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()>;
    fn unlink(&self, path: &str) -> VfsResult<()>;

    fn trash(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::not_supported())
    }

    fn create_directory(&self, path: &str, mode: u16) -> VfsResult<()>;
    fn remove_directory(&self, path: &str) -> VfsResult<()>;

    fn create_symlink(&self, path: &str, value: &str) -> VfsResult<()>;
    fn read_symlink(&self, path: &str) -> VfsResult<String>;

    fn set_permissions(&self, path: &str, mode: u16) -> VfsResult<()>;
    fn set_ownership(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()>;
    fn set_flags(&self, path: &str, flags: u32, vfs_flags: Flags) -> VfsResult<()>;
    fn set_times(&self, path: &str, times: SetTimes) -> VfsResult<()>;

    fn is_native_fs(&self) -> bool {
        false
    }

    fn is_case_sensitive_at(&self, _path: &str) -> bool {
        true
    }

    fn features(&self) -> HostFeatures;
}

pub type VfsHostPtr = Arc<dyn VfsHost>;

/// ASCII-lowercase path equality, the comparison used by case-insensitive
/// rename detection.
pub fn lowercase_equal(lhs: &str, rhs: &str) -> bool {
    lhs.len() == rhs.len()
        && lhs
            .bytes()
            .zip(rhs.bytes())
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
}

/// Appends a trailing slash unless one is already present.
pub fn ensure_trailing_slash(path: impl Into<String>) -> String {
    let mut path = path.into();
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_equality() {
        assert!(lowercase_equal("/Foo/Bar", "/foo/bar"));
        assert!(!lowercase_equal("/foo", "/foo/"));
        assert!(!lowercase_equal("/foo", "/fop"));
    }

    #[test]
    fn trailing_slash_is_idempotent() {
        assert_eq!(ensure_trailing_slash("/a/b"), "/a/b/");
        assert_eq!(ensure_trailing_slash("/a/b/"), "/a/b/");
    }
}
