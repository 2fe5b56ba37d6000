//! Scanned-source database: every item discovered by the scanning stage.
//!
//! Hosts and base directories are interned linearly (a copy operation
//! touches a handful of each); items reference their parent record so a
//! full path is the base directory plus the parent chain.

use std::sync::Arc;

use core_vfs::{ensure_trailing_slash, mode, VfsHost, VfsHostPtr, VfsStat};

#[derive(Debug)]
struct SourceItem {
    /// Directory names carry a trailing slash.
    name: String,
    size: u64,
    parent: Option<u32>,
    base_dir_index: u16,
    host_index: u16,
    mode: u16,
    dev: u64,
}

#[derive(Default)]
pub struct SourceItems {
    items: Vec<SourceItem>,
    hosts: Vec<VfsHostPtr>,
    base_dirs: Vec<String>,
    total_reg_bytes: u64,
}

impl SourceItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(
        &mut self,
        host_index: u16,
        base_dir_index: u16,
        parent: Option<u32>,
        name: impl Into<String>,
        stat: &VfsStat,
    ) -> u32 {
        assert!((host_index as usize) < self.hosts.len(), "unknown host index");
        assert!((base_dir_index as usize) < self.base_dirs.len(), "unknown base dir index");
        if let Some(parent) = parent {
            assert!((parent as usize) < self.items.len(), "dangling parent index");
        }
        if stat.is_reg() {
            self.total_reg_bytes += stat.size;
        }
        let name = name.into();
        let name = if stat.is_dir() { ensure_trailing_slash(name) } else { name };
        self.items.push(SourceItem {
            name,
            size: stat.size,
            parent,
            base_dir_index,
            host_index,
            mode: stat.mode,
            dev: stat.dev,
        });
        (self.items.len() - 1) as u32
    }

    pub fn items_amount(&self) -> usize {
        self.items.len()
    }

    pub fn total_reg_bytes(&self) -> u64 {
        self.total_reg_bytes
    }

    /// Relative path under the base directory, without a trailing slash.
    pub fn compose_relative_path(&self, item: u32) -> String {
        let mut chain = Vec::new();
        let mut current = Some(item);
        while let Some(index) = current {
            let entry = &self.items[index as usize];
            chain.push(entry.name.as_str());
            current = entry.parent;
        }
        let mut path: String = chain.iter().rev().copied().collect();
        if path.ends_with('/') {
            path.pop();
        }
        path
    }

    pub fn compose_full_path(&self, item: u32) -> String {
        let base = &self.base_dirs[self.items[item as usize].base_dir_index as usize];
        format!("{base}{}", self.compose_relative_path(item))
    }

    pub fn item_name(&self, item: u32) -> &str {
        &self.items[item as usize].name
    }

    pub fn item_mode(&self, item: u32) -> u16 {
        self.items[item as usize].mode
    }

    pub fn item_is_reg(&self, item: u32) -> bool {
        self.item_mode(item) & mode::S_IFMT == mode::S_IFREG
    }

    pub fn item_is_dir(&self, item: u32) -> bool {
        self.item_mode(item) & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn item_is_symlink(&self, item: u32) -> bool {
        self.item_mode(item) & mode::S_IFMT == mode::S_IFLNK
    }

    pub fn item_size(&self, item: u32) -> u64 {
        self.items[item as usize].size
    }

    pub fn item_dev(&self, item: u32) -> u64 {
        self.items[item as usize].dev
    }

    pub fn item_host(&self, item: u32) -> &VfsHostPtr {
        &self.hosts[self.items[item as usize].host_index as usize]
    }

    pub fn host(&self, index: u16) -> &VfsHostPtr {
        &self.hosts[index as usize]
    }

    pub fn insert_or_find_host(&mut self, host: &VfsHostPtr) -> u16 {
        if let Some(index) = self
            .hosts
            .iter()
            .position(|h| Arc::ptr_eq(h, host))
        {
            return index as u16;
        }
        self.hosts.push(Arc::clone(host));
        (self.hosts.len() - 1) as u16
    }

    pub fn base_dir(&self, index: u16) -> &str {
        &self.base_dirs[index as usize]
    }

    pub fn insert_or_find_base_dir(&mut self, dir: &str) -> u16 {
        let dir = ensure_trailing_slash(dir.to_string());
        if let Some(index) = self.base_dirs.iter().position(|d| d == &dir) {
            return index as u16;
        }
        self.base_dirs.push(dir);
        (self.base_dirs.len() - 1) as u16
    }

    /// True when `host` is the same object as the item's host.
    pub fn item_host_is(&self, item: u32, host: &dyn VfsHost) -> bool {
        Arc::as_ptr(self.item_host(item)) as *const () == host as *const dyn VfsHost as *const ()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_vfs::{MemHost, StatMeaning, TimeSpec};

    fn stat(mode_bits: u16, size: u64) -> VfsStat {
        VfsStat {
            mode: mode_bits,
            size,
            uid: 0,
            gid: 0,
            dev: 1,
            inode: 0,
            flags: 0,
            atime: TimeSpec::default(),
            mtime: TimeSpec::default(),
            ctime: TimeSpec::default(),
            btime: TimeSpec::default(),
            meaning: StatMeaning::all(),
        }
    }

    #[test]
    fn composes_nested_paths_and_counts_bytes() {
        let host: VfsHostPtr = MemHost::new();
        let mut db = SourceItems::new();
        let host_index = db.insert_or_find_host(&host);
        let base = db.insert_or_find_base_dir("/src");
        let dir = db.insert_item(host_index, base, None, "dir", &stat(mode::S_IFDIR | 0o755, 0));
        let file = db.insert_item(host_index, base, Some(dir), "f.txt", &stat(mode::S_IFREG | 0o644, 10));
        assert_eq!(db.compose_relative_path(dir), "dir");
        assert_eq!(db.compose_full_path(file), "/src/dir/f.txt");
        assert_eq!(db.total_reg_bytes(), 10);
        assert_eq!(db.items_amount(), 2);
    }

    #[test]
    fn interners_deduplicate() {
        let host: VfsHostPtr = MemHost::new();
        let mut db = SourceItems::new();
        assert_eq!(db.insert_or_find_host(&host), db.insert_or_find_host(&host));
        assert_eq!(db.insert_or_find_base_dir("/a"), db.insert_or_find_base_dir("/a/"));
        assert_ne!(db.insert_or_find_base_dir("/a"), db.insert_or_find_base_dir("/b"));
    }
}
