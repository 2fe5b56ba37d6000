//! Error currency shared by every host operation.
//!
//! Two domains coexist: POSIX errno values surfaced by native-backed hosts
//! and VFS-level codes for conditions that have no errno equivalent. Jobs
//! never inspect message text, only `(domain, code)` pairs.

use std::io;

/// Domain discriminator for [`VfsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    Posix,
    Vfs,
}

/// VFS-domain error codes.
pub mod codes {
    pub const GENERIC_ERROR: i32 = -1;
    pub const NOT_SUPPORTED: i32 = -2;
    pub const INVALID_CALL: i32 = -3;
    pub const NOT_FOUND: i32 = -4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("vfs error: {domain:?}/{code}")]
pub struct VfsError {
    pub domain: ErrorDomain,
    pub code: i32,
}

impl VfsError {
    pub const fn posix(errno: i32) -> Self {
        Self {
            domain: ErrorDomain::Posix,
            code: errno,
        }
    }

    pub const fn generic() -> Self {
        Self {
            domain: ErrorDomain::Vfs,
            code: codes::GENERIC_ERROR,
        }
    }

    pub const fn not_supported() -> Self {
        Self {
            domain: ErrorDomain::Vfs,
            code: codes::NOT_SUPPORTED,
        }
    }

    pub const fn invalid_call() -> Self {
        Self {
            domain: ErrorDomain::Vfs,
            code: codes::INVALID_CALL,
        }
    }

    pub const fn not_found() -> Self {
        Self {
            domain: ErrorDomain::Vfs,
            code: codes::NOT_FOUND,
        }
    }

    /// Captures the calling thread's current errno.
    #[cfg(unix)]
    pub fn from_errno() -> Self {
        Self::posix(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
    }

    pub fn is_posix(&self, errno: i32) -> bool {
        self.domain == ErrorDomain::Posix && self.code == errno
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::posix(errno),
            None => Self::generic(),
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
