//! fd-level affordances applied when the destination exposes a raw
//! descriptor: space preallocation and its platform-specific follow-ups.

#[cfg(unix)]
use std::os::unix::io::RawFd;

/// Preallocation below this size is not worth a syscall.
const MIN_PREALLOC_SIZE: i64 = 4096;

pub fn should_preallocate(bytes_to_write: i64) -> bool {
    bytes_to_write > MIN_PREALLOC_SIZE
}

/// Reserves `delta` bytes past the current end of file. Returns true when
/// the reservation took place.
#[cfg(target_os = "macos")]
pub fn try_preallocate(fd: RawFd, _offset: u64, delta: i64) -> bool {
    // contiguous first, chunked as the fallback
    let mut store = libc::fstore_t {
        fst_flags: libc::F_ALLOCATECONTIG,
        fst_posmode: libc::F_PEOFPOSMODE,
        fst_offset: 0,
        fst_length: delta,
        fst_bytesalloc: 0,
    };
    if unsafe { libc::fcntl(fd, libc::F_PREALLOCATE, &store) } == 0 {
        return true;
    }
    store.fst_flags = libc::F_ALLOCATEALL;
    unsafe { libc::fcntl(fd, libc::F_PREALLOCATE, &store) == 0 }
}

#[cfg(target_os = "linux")]
pub fn try_preallocate(fd: RawFd, offset: u64, delta: i64) -> bool {
    unsafe { libc::fallocate(fd, 0, offset as libc::off_t, delta as libc::off_t) == 0 }
}

#[cfg(all(unix, not(any(target_os = "macos", target_os = "linux"))))]
pub fn try_preallocate(_fd: RawFd, _offset: u64, _delta: i64) -> bool {
    false
}

/// Whether a preallocation must be followed by ftruncate to materialise.
/// HFS+ requires the truncate; APFS zero-fills the whole reservation on
/// truncate-after-preallocate and is excluded, and fallocate-style
/// reservations need no follow-up at all.
#[cfg(target_os = "macos")]
pub fn supports_fast_truncation_after_preallocation(fd: RawFd) -> bool {
    let mut fs: libc::statfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstatfs(fd, &mut fs) } != 0 {
        return false;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(fs.f_fstypename.as_ptr()) };
    name.to_str().map(|n| n == "hfs").unwrap_or(false)
}

#[cfg(not(target_os = "macos"))]
pub fn supports_fast_truncation_after_preallocation(_fd: RawFd) -> bool {
    false
}

#[cfg(unix)]
pub fn ftruncate(fd: RawFd, length: u64) -> bool {
    unsafe { libc::ftruncate(fd, length as libc::off_t) == 0 }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn preallocation_reserves_space() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("prealloc")).unwrap();
        assert!(try_preallocate(file.as_raw_fd(), 0, 1 << 16));
        assert_eq!(file.metadata().unwrap().len(), 1 << 16);
    }

    #[test]
    fn small_writes_skip_preallocation() {
        assert!(!should_preallocate(100));
        assert!(should_preallocate(100_000));
    }
}
