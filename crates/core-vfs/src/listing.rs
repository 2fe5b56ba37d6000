//! A row of a directory listing bound to its host.

use std::sync::Arc;

use crate::host::{ensure_trailing_slash, DirEntType, VfsHost, VfsHostPtr};
use crate::stat::mode;

/// A single listed item: the unit of work jobs receive from the client.
#[derive(Clone)]
pub struct ListingItem {
    host: VfsHostPtr,
    directory: String,
    filename: String,
    kind: DirEntType,
    size: u64,
    inode: u64,
}

impl ListingItem {
    pub fn new(
        host: VfsHostPtr,
        directory: impl Into<String>,
        filename: impl Into<String>,
        kind: DirEntType,
        size: u64,
        inode: u64,
    ) -> Self {
        Self {
            host,
            directory: ensure_trailing_slash(directory.into()),
            filename: filename.into(),
            kind,
            size,
            inode,
        }
    }

    /// Builds an item by statting `directory/filename` on the host.
    pub fn from_stat(host: VfsHostPtr, directory: &str, filename: &str) -> crate::VfsResult<Self> {
        let directory = ensure_trailing_slash(directory.to_string());
        let path = format!("{directory}{filename}");
        let st = host.stat(&path, crate::host::Flags::NO_FOLLOW)?;
        let kind = match st.mode & mode::S_IFMT {
            mode::S_IFREG => DirEntType::Regular,
            mode::S_IFDIR => DirEntType::Directory,
            mode::S_IFLNK => DirEntType::Symlink,
            _ => DirEntType::Other,
        };
        Ok(Self {
            host,
            directory,
            filename: filename.to_string(),
            kind,
            size: st.size,
            inode: st.inode,
        })
    }

    pub fn host(&self) -> &VfsHostPtr {
        &self.host
    }

    pub fn host_ref(&self) -> &dyn VfsHost {
        &*self.host
    }

    /// Directory part, always with a trailing slash.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Absolute path of the item.
    pub fn path(&self) -> String {
        format!("{}{}", self.directory, self.filename)
    }

    pub fn unix_type(&self) -> DirEntType {
        self.kind
    }

    pub fn is_reg(&self) -> bool {
        self.kind == DirEntType::Regular
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == DirEntType::Symlink
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// True when both items reference the same host object.
    pub fn same_host(&self, other: &dyn VfsHost) -> bool {
        Arc::as_ptr(&self.host) as *const () == other as *const dyn VfsHost as *const ()
    }
}

impl std::fmt::Debug for ListingItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingItem")
            .field("host", &self.host.tag())
            .field("path", &self.path())
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish()
    }
}
