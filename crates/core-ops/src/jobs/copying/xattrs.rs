//! Extended-attribute propagation between copied files.
//!
//! fd-level syscalls are used when both sides expose raw descriptors;
//! otherwise attributes read through the VFS file surface are written to
//! the destination path with the platform syscall. Hosts without any
//! native backing skip propagation entirely. Failures are advisory.

use core_vfs::{VfsFile, VfsHost};

/// Removes every xattr already present on the destination, ahead of an
/// overwrite copy.
pub fn erase_destination_xattrs(dst_file: &dyn VfsFile, dst_path: &str) {
    let Some(fd) = dst_file.as_raw_fd() else {
        return;
    };
    for name in sys::list_fd(fd) {
        if !sys::remove_fd(fd, &name) {
            tracing::warn!(target: "ops.copying", path = %dst_path, name = %name, "xattr_remove_failed");
        }
    }
}

/// Copies every xattr of the source file onto the destination.
pub fn copy_xattrs(
    src_file: &dyn VfsFile,
    dst_file: &dyn VfsFile,
    dst_path: &str,
    dst_host: &dyn VfsHost,
) {
    let dst_fd = dst_file.as_raw_fd();
    if dst_fd.is_none() && !dst_host.is_native_fs() {
        return;
    }

    if let Some(src_fd) = src_file.as_raw_fd() {
        // native source: go through the syscalls directly
        for name in sys::list_fd(src_fd) {
            let Some(value) = sys::get_fd(src_fd, &name) else {
                continue;
            };
            let ok = match dst_fd {
                Some(fd) => sys::set_fd(fd, &name, &value),
                None => sys::set_path(dst_path, &name, &value),
            };
            if !ok {
                tracing::warn!(target: "ops.copying", path = %dst_path, name = %name, "xattr_set_failed");
            }
        }
        return;
    }

    // non-native source: pull attributes through the file object
    let mut names = Vec::new();
    src_file.xattr_iterate_names(&mut |name| {
        names.push(name.to_string());
        true
    });
    let mut buf = vec![0u8; 64 * 1024];
    for name in names {
        let Ok(n) = src_file.xattr_get(&name, &mut buf) else {
            continue;
        };
        let ok = match dst_fd {
            Some(fd) => sys::set_fd(fd, &name, &buf[..n]),
            None => sys::set_path(dst_path, &name, &buf[..n]),
        };
        if !ok {
            tracing::warn!(target: "ops.copying", path = %dst_path, name = %name, "xattr_set_failed");
        }
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::os::unix::io::RawFd;

    pub fn list_fd(fd: RawFd) -> Vec<String> {
        let size = unsafe { libc::flistxattr(fd, std::ptr::null_mut(), 0) };
        if size <= 0 {
            return Vec::new();
        }
        let mut buf = vec![0u8; size as usize];
        let size = unsafe { libc::flistxattr(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if size <= 0 {
            return Vec::new();
        }
        buf[..size as usize]
            .split(|b| *b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    pub fn get_fd(fd: RawFd, name: &str) -> Option<Vec<u8>> {
        let name = CString::new(name).ok()?;
        let size = unsafe { libc::fgetxattr(fd, name.as_ptr(), std::ptr::null_mut(), 0) };
        if size < 0 {
            return None;
        }
        let mut buf = vec![0u8; size as usize];
        let size = unsafe { libc::fgetxattr(fd, name.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        if size < 0 {
            return None;
        }
        buf.truncate(size as usize);
        Some(buf)
    }

    pub fn set_fd(fd: RawFd, name: &str, value: &[u8]) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        unsafe { libc::fsetxattr(fd, name.as_ptr(), value.as_ptr().cast(), value.len(), 0) == 0 }
    }

    pub fn set_path(path: &str, name: &str, value: &[u8]) -> bool {
        let (Ok(path), Ok(name)) = (CString::new(path), CString::new(name)) else {
            return false;
        };
        unsafe {
            libc::setxattr(path.as_ptr(), name.as_ptr(), value.as_ptr().cast(), value.len(), 0) == 0
        }
    }

    pub fn remove_fd(fd: RawFd, name: &str) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        unsafe { libc::fremovexattr(fd, name.as_ptr()) == 0 }
    }
}

#[cfg(target_os = "macos")]
mod sys {
    use std::ffi::CString;
    use std::os::unix::io::RawFd;

    pub fn list_fd(fd: RawFd) -> Vec<String> {
        let size = unsafe { libc::flistxattr(fd, std::ptr::null_mut(), 0, 0) };
        if size <= 0 {
            return Vec::new();
        }
        let mut buf = vec![0u8; size as usize];
        let size = unsafe { libc::flistxattr(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if size <= 0 {
            return Vec::new();
        }
        buf[..size as usize]
            .split(|b| *b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    pub fn get_fd(fd: RawFd, name: &str) -> Option<Vec<u8>> {
        let name = CString::new(name).ok()?;
        let size = unsafe { libc::fgetxattr(fd, name.as_ptr(), std::ptr::null_mut(), 0, 0, 0) };
        if size < 0 {
            return None;
        }
        let mut buf = vec![0u8; size as usize];
        let size =
            unsafe { libc::fgetxattr(fd, name.as_ptr(), buf.as_mut_ptr().cast(), buf.len(), 0, 0) };
        if size < 0 {
            return None;
        }
        buf.truncate(size as usize);
        Some(buf)
    }

    pub fn set_fd(fd: RawFd, name: &str, value: &[u8]) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        unsafe {
            libc::fsetxattr(fd, name.as_ptr(), value.as_ptr().cast(), value.len(), 0, 0) == 0
        }
    }

    pub fn set_path(path: &str, name: &str, value: &[u8]) -> bool {
        let (Ok(path), Ok(name)) = (CString::new(path), CString::new(name)) else {
            return false;
        };
        unsafe {
            libc::setxattr(path.as_ptr(), name.as_ptr(), value.as_ptr().cast(), value.len(), 0, 0)
                == 0
        }
    }

    pub fn remove_fd(fd: RawFd, name: &str) -> bool {
        let Ok(name) = CString::new(name) else {
            return false;
        };
        unsafe { libc::fremovexattr(fd, name.as_ptr(), 0) == 0 }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod sys {
    use std::os::unix::io::RawFd;

    pub fn list_fd(_fd: RawFd) -> Vec<String> {
        Vec::new()
    }

    pub fn get_fd(_fd: RawFd, _name: &str) -> Option<Vec<u8>> {
        None
    }

    pub fn set_fd(_fd: RawFd, _name: &str, _value: &[u8]) -> bool {
        false
    }

    pub fn set_path(_path: &str, _name: &str, _value: &[u8]) -> bool {
        false
    }

    pub fn remove_fd(_fd: RawFd, _name: &str) -> bool {
        false
    }
}
