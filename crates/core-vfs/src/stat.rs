//! Inode snapshot returned by `VfsHost::stat`.

use bitflags::bitflags;

/// Unix file type selector bits in `VfsStat::mode`.
pub mod mode {
    pub const S_IFMT: u16 = 0o170000;
    pub const S_IFREG: u16 = 0o100000;
    pub const S_IFDIR: u16 = 0o040000;
    pub const S_IFLNK: u16 = 0o120000;
    pub const PERM_MASK: u16 = 0o7777;
}

/// BSD file flag bits carried in `VfsStat::flags`. Only the subset the
/// operations engine inspects or writes is named here.
pub mod file_flags {
    pub const UF_NODUMP: u32 = 0x0000_0001;
    pub const UF_IMMUTABLE: u32 = 0x0000_0002;
    pub const UF_APPEND: u32 = 0x0000_0004;
    pub const UF_OPAQUE: u32 = 0x0000_0008;
    pub const UF_COMPRESSED: u32 = 0x0000_0020;
    pub const UF_TRACKED: u32 = 0x0000_0040;
    pub const UF_HIDDEN: u32 = 0x0000_8000;
    pub const SF_ARCHIVED: u32 = 0x0001_0000;
    pub const SF_IMMUTABLE: u32 = 0x0002_0000;
    pub const SF_APPEND: u32 = 0x0004_0000;
    pub const SF_RESTRICTED: u32 = 0x0008_0000;
    pub const SF_NOUNLINK: u32 = 0x0010_0000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }
}

bitflags! {
    /// Which `VfsStat` fields the host actually filled in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatMeaning: u16 {
        const MODE = 1 << 0;
        const SIZE = 1 << 1;
        const UID = 1 << 2;
        const GID = 1 << 3;
        const DEV = 1 << 4;
        const INODE = 1 << 5;
        const FLAGS = 1 << 6;
        const ATIME = 1 << 7;
        const MTIME = 1 << 8;
        const CTIME = 1 << 9;
        const BTIME = 1 << 10;
    }
}

/// A filesystem inode snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VfsStat {
    pub mode: u16,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub dev: u64,
    pub inode: u64,
    pub flags: u32,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
    pub btime: TimeSpec,
    pub meaning: StatMeaning,
}

impl VfsStat {
    pub fn is_reg(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFLNK
    }
}

/// True when `lhs` was modified strictly earlier than `rhs`, comparing
/// whole seconds first and nanoseconds as the tie-breaker.
pub fn entry_is_older(lhs: &VfsStat, rhs: &VfsStat) -> bool {
    if lhs.mtime.sec < rhs.mtime.sec {
        return true;
    }
    if lhs.mtime.sec > rhs.mtime.sec {
        return false;
    }
    lhs.mtime.nsec < rhs.mtime.nsec
}
