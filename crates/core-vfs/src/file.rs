//! Opened file handle contract.

use bitflags::bitflags;

use crate::error::VfsResult;

bitflags! {
    /// Open disposition + POSIX permission bits for file creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ      = 1 << 16;
        const WRITE     = 1 << 17;
        const CREATE    = 1 << 18;
        const TRUNCATE  = 1 << 19;
        const APPEND    = 1 << 20;
        const EXCL      = 1 << 21;
        const NO_CACHE  = 1 << 22;
        const SH_LOCK   = 1 << 23;
        const DIRECTORY = 1 << 24;
        // creation-mode permission bits occupy the low 12 bits
        const IRUSR = 0o400;
        const IWUSR = 0o200;
        const IXUSR = 0o100;
        const IRGRP = 0o040;
        const IWGRP = 0o020;
        const IXGRP = 0o010;
        const IROTH = 0o004;
        const IWOTH = 0o002;
        const IXOTH = 0o001;
        const ISUID = 0o4000;
        const ISGID = 0o2000;
        const ISVTX = 0o1000;
    }
}

impl OpenFlags {
    /// Extracts the creation permission bits as a unix mode.
    pub fn creation_mode(self) -> u16 {
        (self.bits() & 0o7777) as u16
    }

    /// Merges unix permission bits into the flag set.
    pub fn with_mode(self, mode: u16) -> Self {
        Self::from_bits_retain(self.bits() | u32::from(mode & 0o7777))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Current,
    End,
}

/// An opened (or openable) file bound to its host.
///
/// `read`/`write` return the number of bytes transferred; short transfers
/// are legal and the copy engine loops over them.
pub trait VfsFile: Send {
    fn open(&mut self, flags: OpenFlags) -> VfsResult<()>;
    fn is_opened(&self) -> bool;
    fn close(&mut self) -> VfsResult<()>;
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;
    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;
    fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u64>;
    fn pos(&self) -> u64;
    fn size(&self) -> u64;

    /// Host's preferred transfer granularity in bytes.
    fn preferred_io_size(&self) -> usize {
        4096
    }

    /// Upload-oriented hosts may use the total expected size up-front.
    fn set_upload_size(&mut self, _size: u64) {}

    fn xattr_count(&self) -> usize {
        0
    }

    fn xattr_get(&self, _name: &str, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(crate::error::VfsError::not_supported())
    }

    fn xattr_iterate_names(&self, _cb: &mut dyn FnMut(&str) -> bool) {}

    /// Raw descriptor of the underlying OS file, when one exists. Lets
    /// callers apply fd-level affordances (preallocation, fd metadata ops)
    /// without widening the portable contract.
    #[cfg(unix)]
    fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        None
    }
}
