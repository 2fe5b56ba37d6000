//! Native filesystem host backed by std::fs and libc.
//!
//! BSD file flags and trash are platform capabilities: they are advertised
//! through `features()` only where the underlying OS provides them, so job
//! code can stay capability-driven instead of cfg-ridden.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::file::{OpenFlags, SeekWhence, VfsFile};
use crate::host::{DirEnt, DirEntType, Flags, HostFeatures, SetTimes, VfsHost};
use crate::stat::{StatMeaning, TimeSpec, VfsStat};

pub struct NativeHost;

impl NativeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

fn cpath(path: &str) -> VfsResult<CString> {
    CString::new(Path::new(path).as_os_str().as_bytes()).map_err(|_| VfsError::invalid_call())
}

fn stat_from_metadata(md: &std::fs::Metadata) -> VfsStat {
    VfsStat {
        mode: md.mode() as u16,
        size: md.size(),
        uid: md.uid(),
        gid: md.gid(),
        dev: md.dev(),
        inode: md.ino(),
        flags: 0,
        atime: TimeSpec::new(md.atime(), md.atime_nsec()),
        mtime: TimeSpec::new(md.mtime(), md.mtime_nsec()),
        ctime: TimeSpec::new(md.ctime(), md.ctime_nsec()),
        btime: TimeSpec::new(md.ctime(), md.ctime_nsec()),
        meaning: StatMeaning::MODE
            | StatMeaning::SIZE
            | StatMeaning::UID
            | StatMeaning::GID
            | StatMeaning::DEV
            | StatMeaning::INODE
            | StatMeaning::ATIME
            | StatMeaning::MTIME
            | StatMeaning::CTIME,
    }
}

impl VfsHost for NativeHost {
    fn tag(&self) -> &str {
        "native"
    }

    fn stat(&self, path: &str, flags: Flags) -> VfsResult<VfsStat> {
        let md = if flags.contains(Flags::NO_FOLLOW) {
            std::fs::symlink_metadata(path)?
        } else {
            std::fs::metadata(path)?
        };
        let mut st = stat_from_metadata(&md);
        if let Some(bits) = platform_flags(path, flags)? {
            st.flags = bits;
            st.meaning |= StatMeaning::FLAGS;
        }
        Ok(st)
    }

    fn iterate_directory_listing(
        &self,
        path: &str,
        cb: &mut dyn FnMut(&DirEnt) -> bool,
    ) -> VfsResult<()> {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            let kind = if ft.is_file() {
                DirEntType::Regular
            } else if ft.is_dir() {
                DirEntType::Directory
            } else if ft.is_symlink() {
                DirEntType::Symlink
            } else if ft.is_fifo() || ft.is_socket() || ft.is_block_device() || ft.is_char_device() {
                DirEntType::Other
            } else {
                DirEntType::Unknown
            };
            let dirent = DirEnt {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            };
            if !cb(&dirent) {
                break;
            }
        }
        Ok(())
    }

    fn create_file(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(NativeFile::new(path)))
    }

    fn exists(&self, path: &str) -> bool {
        std::fs::symlink_metadata(path).is_ok()
    }

    fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        std::fs::rename(src, dst)?;
        Ok(())
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn create_directory(&self, path: &str, mode: u16) -> VfsResult<()> {
        std::fs::create_dir(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(u32::from(mode)))?;
        Ok(())
    }

    fn remove_directory(&self, path: &str) -> VfsResult<()> {
        std::fs::remove_dir(path)?;
        Ok(())
    }

    fn create_symlink(&self, path: &str, value: &str) -> VfsResult<()> {
        std::os::unix::fs::symlink(value, path)?;
        Ok(())
    }

    fn read_symlink(&self, path: &str) -> VfsResult<String> {
        let target = std::fs::read_link(path)?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn set_permissions(&self, path: &str, mode: u16) -> VfsResult<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(u32::from(mode & 0o7777)))?;
        Ok(())
    }

    fn set_ownership(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        let path = cpath(path)?;
        let rc = unsafe { libc::chown(path.as_ptr(), uid, gid) };
        if rc != 0 {
            return Err(VfsError::from_errno());
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn set_flags(&self, path: &str, flags: u32, vfs_flags: Flags) -> VfsResult<()> {
        let path = cpath(path)?;
        let rc = if vfs_flags.contains(Flags::NO_FOLLOW) {
            unsafe { libc::lchflags(path.as_ptr(), flags) }
        } else {
            unsafe { libc::chflags(path.as_ptr(), flags) }
        };
        if rc != 0 {
            return Err(VfsError::from_errno());
        }
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn set_flags(&self, _path: &str, _flags: u32, _vfs_flags: Flags) -> VfsResult<()> {
        Err(VfsError::not_supported())
    }

    fn set_times(&self, path: &str, times: SetTimes) -> VfsResult<()> {
        if times.atime.is_none() && times.mtime.is_none() {
            return Ok(());
        }
        let to_ts = |opt: Option<i64>| libc::timespec {
            tv_sec: opt.unwrap_or(0) as libc::time_t,
            tv_nsec: if opt.is_some() { 0 } else { libc::UTIME_OMIT },
        };
        let values = [to_ts(times.atime), to_ts(times.mtime)];
        let path = cpath(path)?;
        let rc = unsafe { libc::utimensat(libc::AT_FDCWD, path.as_ptr(), values.as_ptr(), 0) };
        if rc != 0 {
            return Err(VfsError::from_errno());
        }
        Ok(())
    }

    fn is_native_fs(&self) -> bool {
        true
    }

    fn is_case_sensitive_at(&self, _path: &str) -> bool {
        cfg!(not(target_os = "macos"))
    }

    fn features(&self) -> HostFeatures {
        let mut features = HostFeatures::SET_TIMES
            | HostFeatures::SET_OWNERSHIP
            | HostFeatures::SET_PERMISSIONS
            | HostFeatures::XATTRS;
        if cfg!(target_os = "macos") {
            features |= HostFeatures::SET_FLAGS;
        }
        features
    }
}

#[cfg(target_os = "macos")]
fn platform_flags(path: &str, flags: Flags) -> VfsResult<Option<u32>> {
    let cpath = cpath(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = if flags.contains(Flags::NO_FOLLOW) {
        unsafe { libc::lstat(cpath.as_ptr(), &mut st) }
    } else {
        unsafe { libc::stat(cpath.as_ptr(), &mut st) }
    };
    if rc != 0 {
        return Err(VfsError::from_errno());
    }
    Ok(Some(st.st_flags))
}

#[cfg(not(target_os = "macos"))]
fn platform_flags(_path: &str, _flags: Flags) -> VfsResult<Option<u32>> {
    Ok(None)
}

/// A file on the native filesystem.
pub struct NativeFile {
    path: String,
    file: Option<File>,
    size: u64,
    pos: u64,
    io_size: usize,
}

impl NativeFile {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            file: None,
            size: 0,
            pos: 0,
            io_size: 4096,
        }
    }

    fn file_mut(&mut self) -> VfsResult<&mut File> {
        self.file.as_mut().ok_or_else(VfsError::invalid_call)
    }
}

impl VfsFile for NativeFile {
    fn open(&mut self, flags: OpenFlags) -> VfsResult<()> {
        if self.file.is_some() {
            return Err(VfsError::invalid_call());
        }
        let mut opts = OpenOptions::new();
        opts.read(flags.contains(OpenFlags::READ));
        opts.write(flags.contains(OpenFlags::WRITE));
        if flags.contains(OpenFlags::APPEND) {
            opts.append(true);
        }
        if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCL) {
                opts.create_new(true);
            } else {
                opts.create(true);
            }
            let mode = flags.creation_mode();
            opts.mode(u32::from(if mode == 0 { 0o644 } else { mode }));
        }
        if flags.contains(OpenFlags::TRUNCATE) {
            opts.truncate(true);
        }
        let file = opts.open(&self.path)?;
        if flags.contains(OpenFlags::SH_LOCK) {
            // Advisory only: proceed without the lock when contended, the
            // way the native copy path falls back from O_SHLOCK.
            let rc = unsafe {
                libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), libc::LOCK_SH | libc::LOCK_NB)
            };
            if rc != 0 {
                tracing::warn!(target: "vfs.native", path = %self.path, "shared_lock_unavailable");
            }
        }
        let md = file.metadata()?;
        self.size = md.size();
        self.io_size = md.blksize().clamp(4096, 1 << 20) as usize;
        self.pos = if flags.contains(OpenFlags::APPEND) { self.size } else { 0 };
        self.file = Some(file);
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) -> VfsResult<()> {
        self.file = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.file_mut()?.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let n = self.file_mut()?.write(buf)?;
        self.pos += n as u64;
        if self.pos > self.size {
            self.size = self.pos;
        }
        Ok(n)
    }

    fn seek(&mut self, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let target = match whence {
            SeekWhence::Set => SeekFrom::Start(offset as u64),
            SeekWhence::Current => SeekFrom::Current(offset),
            SeekWhence::End => SeekFrom::End(offset),
        };
        let pos = self.file_mut()?.seek(target)?;
        self.pos = pos;
        Ok(pos)
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn preferred_io_size(&self) -> usize {
        self.io_size
    }

    fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        self.file.as_ref().map(std::os::unix::io::AsRawFd::as_raw_fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_and_listing_of_a_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let host = NativeHost::new();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let st = host.stat(file_path.to_str().unwrap(), Flags::empty()).unwrap();
        assert!(st.is_reg());
        assert_eq!(st.size, 5);

        let mut names = Vec::new();
        host.iterate_directory_listing(dir.path().to_str().unwrap(), &mut |e| {
            names.push(e.name.clone());
            true
        })
        .unwrap();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[test]
    fn file_round_trip_with_seek() {
        let dir = tempfile::tempdir().unwrap();
        let host = NativeHost::new();
        let path = dir.path().join("data.bin");
        let path = path.to_str().unwrap();

        let mut file = host.create_file(path).unwrap();
        file.open(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCL)
            .unwrap();
        assert_eq!(file.write(b"0123456789").unwrap(), 10);
        file.close().unwrap();

        let mut file = host.create_file(path).unwrap();
        file.open(OpenFlags::READ).unwrap();
        assert_eq!(file.size(), 10);
        file.seek(4, SeekWhence::Set).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");
    }

    #[test]
    fn symlink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let host = NativeHost::new();
        let link = dir.path().join("link");
        let link = link.to_str().unwrap();
        host.create_symlink(link, "/target/value").unwrap();
        assert_eq!(host.read_symlink(link).unwrap(), "/target/value");
        let st = host.stat(link, Flags::NO_FOLLOW).unwrap();
        assert!(st.is_symlink());
    }
}
