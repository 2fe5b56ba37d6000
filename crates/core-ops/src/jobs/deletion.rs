//! Trash / permanent deletion job.
//!
//! Scans the source set into a LIFO script: directories are pushed before
//! their descendants are explored, so popping yields children first.
//! Trash failures can be rewritten into permanent deletions, which
//! re-scans the directory's children into the script.

use std::sync::Arc;

use core_vfs::{
    ensure_trailing_slash, file_flags, DirEntType, Flags, HostFeatures, ListingItem, VfsError,
    VfsHost,
};

use crate::job::{Job, JobBase};
use crate::path_arena::{PathArena, PathNode};
use crate::statistics::SourceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionType {
    Permanent,
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedItemBehavior {
    Ask,
    SkipAll,
    UnlockAll,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct DeletionOptions {
    pub kind: DeletionType,
    pub locked_items_behavior: LockedItemBehavior,
}

impl DeletionOptions {
    pub fn new(kind: DeletionType) -> Self {
        Self {
            kind,
            locked_items_behavior: LockedItemBehavior::Ask,
        }
    }
}

impl From<DeletionType> for DeletionOptions {
    fn from(kind: DeletionType) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDirErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmdirErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashErrorResolution {
    Stop,
    Skip,
    DeletePermanently,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedItemResolution {
    Stop,
    Skip,
    Unlock,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockErrorResolution {
    Stop,
    Skip,
    Retry,
}

pub struct DeletionCallbacks {
    pub on_read_dir_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ReadDirErrorResolution + Send + Sync>,
    pub on_unlink_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> UnlinkErrorResolution + Send + Sync>,
    pub on_rmdir_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> RmdirErrorResolution + Send + Sync>,
    pub on_trash_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> TrashErrorResolution + Send + Sync>,
    pub on_locked_item:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost, DeletionType) -> LockedItemResolution + Send + Sync>,
    pub on_unlock_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> UnlockErrorResolution + Send + Sync>,
}

impl Default for DeletionCallbacks {
    fn default() -> Self {
        Self {
            on_read_dir_error: Box::new(|_, _, _| ReadDirErrorResolution::Stop),
            on_unlink_error: Box::new(|_, _, _| UnlinkErrorResolution::Stop),
            on_rmdir_error: Box::new(|_, _, _| RmdirErrorResolution::Stop),
            on_trash_error: Box::new(|_, _, _| TrashErrorResolution::Stop),
            on_locked_item: Box::new(|_, _, _, _| LockedItemResolution::Stop),
            on_unlock_error: Box::new(|_, _, _| UnlockErrorResolution::Stop),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScriptItem {
    listing_item_index: usize,
    filename: PathNode,
    kind: DeletionType,
}

pub struct DeletionJob {
    base: JobBase,
    pub callbacks: DeletionCallbacks,
    source_items: Vec<ListingItem>,
    options: DeletionOptions,
    paths: PathArena,
    script: Vec<ScriptItem>,
}

impl DeletionJob {
    /// Panics when trash deletion is requested for non-native items.
    pub fn new(items: Vec<ListingItem>, options: impl Into<DeletionOptions>) -> Self {
        let options = options.into();
        assert!(
            options.kind != DeletionType::Trash || items.iter().all(|i| i.host().is_native_fs()),
            "trashing requires native sources"
        );
        let job = Self {
            base: JobBase::new(),
            callbacks: DeletionCallbacks::default(),
            source_items: items,
            options,
            paths: PathArena::new(),
            script: Vec::new(),
        };
        job.base.statistics().set_preferred_source(SourceType::Items);
        job
    }

    fn resolve_locked_item(
        &self,
        err: VfsError,
        path: &str,
        host: &dyn VfsHost,
        kind: DeletionType,
    ) -> LockedItemResolution {
        match self.options.locked_items_behavior {
            LockedItemBehavior::Ask => (self.callbacks.on_locked_item)(err, path, host, kind),
            LockedItemBehavior::SkipAll => LockedItemResolution::Skip,
            LockedItemBehavior::UnlockAll => LockedItemResolution::Unlock,
            LockedItemBehavior::Stop => LockedItemResolution::Stop,
        }
    }

    /// Remaining script entries, exposed for estimation and assertions.
    pub fn items_in_script(&self) -> usize {
        self.script.len()
    }

    fn stopped(&self) -> bool {
        self.base.block_if_paused();
        self.base.is_stopped()
    }

    fn do_scan(&mut self) {
        for index in 0..self.source_items.len() {
            if self.stopped() {
                return;
            }

            let item = self.source_items[index].clone();
            self.base.statistics().commit_estimated(SourceType::Items, 1);

            if item.is_dir() {
                let node = self
                    .paths
                    .push(ensure_trailing_slash(item.filename().to_string()), None);
                self.script.push(ScriptItem {
                    listing_item_index: index,
                    filename: node,
                    kind: self.options.kind,
                });

                let nonempty_rmdir = item
                    .host()
                    .features()
                    .contains(HostFeatures::NON_EMPTY_RMDIR);
                if self.options.kind == DeletionType::Permanent && !nonempty_rmdir {
                    self.scan_directory(&item.path(), index, node);
                }
            } else if !is_ea_storage(&**item.host(), item.directory(), item.filename(), item.unix_type()) {
                let node = self.paths.push(item.filename().to_string(), None);
                self.script.push(ScriptItem {
                    listing_item_index: index,
                    filename: node,
                    kind: self.options.kind,
                });
            }
        }
    }

    fn scan_directory(&mut self, path: &str, listing_item_index: usize, prefix: PathNode) {
        let host = Arc::clone(self.source_items[listing_item_index].host());

        let mut entries = Vec::new();
        loop {
            if self.stopped() {
                return;
            }
            entries.clear();
            let rc = host.iterate_directory_listing(path, &mut |e| {
                entries.push(e.clone());
                true
            });
            match rc {
                Ok(()) => break,
                Err(err) => match (self.callbacks.on_read_dir_error)(err, path, &*host) {
                    ReadDirErrorResolution::Retry => continue,
                    ReadDirErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                    ReadDirErrorResolution::Skip => return,
                },
            }
        }

        for entry in &entries {
            if self.stopped() {
                return;
            }

            self.base.statistics().commit_estimated(SourceType::Items, 1);
            if entry.kind == DirEntType::Directory {
                let node = self
                    .paths
                    .push(ensure_trailing_slash(entry.name.clone()), Some(prefix));
                self.script.push(ScriptItem {
                    listing_item_index,
                    filename: node,
                    kind: DeletionType::Permanent,
                });
                let nested = format!("{}{}", ensure_trailing_slash(path.to_string()), entry.name);
                self.scan_directory(&nested, listing_item_index, node);
            } else if !is_ea_storage(&*host, path, &entry.name, entry.kind) {
                let node = self.paths.push(entry.name.clone(), Some(prefix));
                self.script.push(ScriptItem {
                    listing_item_index,
                    filename: node,
                    kind: DeletionType::Permanent,
                });
            }
        }
    }

    fn do_delete(&mut self) {
        while let Some(entry) = {
            if self.stopped() {
                return;
            }
            self.script.pop()
        } {
            let item = &self.source_items[entry.listing_item_index];
            let path = format!("{}{}", item.directory(), self.paths.compose(entry.filename));
            let host = Arc::clone(item.host());

            match entry.kind {
                DeletionType::Permanent => {
                    // a trailing slash marks the entry as a directory
                    if path.ends_with('/') {
                        self.do_rmdir(path.trim_end_matches('/'), &*host);
                    } else {
                        self.do_unlink(&path, &*host);
                    }
                }
                DeletionType::Trash => self.do_trash(&path, &*host, entry),
            }
        }
    }

    fn do_unlock(&self, path: &str, host: &dyn VfsHost) -> bool {
        loop {
            match unlock_item(path, host) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_unlock_error)(err, path, host) {
                    UnlockErrorResolution::Retry => continue,
                    UnlockErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return false;
                    }
                    UnlockErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                },
            }
        }
    }

    fn do_unlink(&self, path: &str, host: &dyn VfsHost) {
        loop {
            match host.unlink(path) {
                Ok(()) => {
                    self.base.statistics().commit_processed(SourceType::Items, 1);
                    return;
                }
                Err(err) if is_native_locked_item(err, path, host) => {
                    match self.resolve_locked_item(err, path, host, DeletionType::Permanent) {
                        LockedItemResolution::Unlock => {
                            if !self.do_unlock(path, host) {
                                return;
                            }
                            continue;
                        }
                        LockedItemResolution::Retry => continue,
                        LockedItemResolution::Skip => {
                            self.base.statistics().commit_skipped(SourceType::Items, 1);
                            return;
                        }
                        LockedItemResolution::Stop => {
                            self.base.stop();
                            return;
                        }
                    }
                }
                Err(err) => match (self.callbacks.on_unlink_error)(err, path, host) {
                    UnlinkErrorResolution::Retry => continue,
                    UnlinkErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return;
                    }
                    UnlinkErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                },
            }
        }
    }

    fn do_rmdir(&self, path: &str, host: &dyn VfsHost) {
        loop {
            match host.remove_directory(path) {
                Ok(()) => {
                    self.base.statistics().commit_processed(SourceType::Items, 1);
                    return;
                }
                Err(err) if is_native_locked_item(err, path, host) => {
                    match self.resolve_locked_item(err, path, host, DeletionType::Permanent) {
                        LockedItemResolution::Unlock => {
                            if !self.do_unlock(path, host) {
                                return;
                            }
                            continue;
                        }
                        LockedItemResolution::Retry => continue,
                        LockedItemResolution::Skip => {
                            self.base.statistics().commit_skipped(SourceType::Items, 1);
                            return;
                        }
                        LockedItemResolution::Stop => {
                            self.base.stop();
                            return;
                        }
                    }
                }
                Err(err) => match (self.callbacks.on_rmdir_error)(err, path, host) {
                    RmdirErrorResolution::Retry => continue,
                    RmdirErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return;
                    }
                    RmdirErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                },
            }
        }
    }

    fn do_trash(&mut self, path: &str, host: &dyn VfsHost, entry: ScriptItem) {
        loop {
            match host.trash(path.trim_end_matches('/')) {
                Ok(()) => {
                    self.base.statistics().commit_processed(SourceType::Items, 1);
                    return;
                }
                Err(err) if is_native_locked_item(err, path, host) => {
                    match self.resolve_locked_item(err, path, host, DeletionType::Trash) {
                        LockedItemResolution::Unlock => {
                            if !self.do_unlock(path, host) {
                                return;
                            }
                            continue;
                        }
                        LockedItemResolution::Retry => continue,
                        LockedItemResolution::Skip => {
                            self.base.statistics().commit_skipped(SourceType::Items, 1);
                            return;
                        }
                        LockedItemResolution::Stop => {
                            self.base.stop();
                            return;
                        }
                    }
                }
                Err(err) => match (self.callbacks.on_trash_error)(err, path, host) {
                    TrashErrorResolution::Retry => continue,
                    TrashErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return;
                    }
                    TrashErrorResolution::DeletePermanently => {
                        // requeue as permanent and let the children follow
                        let requeued = ScriptItem {
                            kind: DeletionType::Permanent,
                            ..entry
                        };
                        self.script.push(requeued);
                        if path.ends_with('/') {
                            self.scan_directory(path, entry.listing_item_index, entry.filename);
                        }
                        return;
                    }
                    TrashErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                },
            }
        }
    }
}

impl Job for DeletionJob {
    fn perform(&mut self) {
        self.do_scan();

        if self.stopped() {
            return;
        }

        self.do_delete();
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

fn is_native_locked_item(err: VfsError, path: &str, host: &dyn VfsHost) -> bool {
    if !err.is_posix(libc::EPERM) || !host.is_native_fs() {
        return false;
    }
    host.stat(path.trim_end_matches('/'), Flags::NO_FOLLOW)
        .map(|st| st.flags & file_flags::UF_IMMUTABLE != 0)
        .unwrap_or(false)
}

fn unlock_item(path: &str, host: &dyn VfsHost) -> Result<(), VfsError> {
    let path = path.trim_end_matches('/');
    let st = host.stat(path, Flags::NO_FOLLOW)?;
    host.set_flags(path, st.flags & !file_flags::UF_IMMUTABLE, Flags::NO_FOLLOW)
}

/// A regular "._name" next to an existing "name" on a native host is an
/// attribute sidecar handled by the OS, not payload to delete separately.
fn is_ea_storage(host: &dyn VfsHost, directory: &str, filename: &str, kind: DirEntType) -> bool {
    if kind != DirEntType::Regular || !host.is_native_fs() {
        return false;
    }
    let Some(origin) = filename.strip_prefix("._") else {
        return false;
    };
    if origin.is_empty() {
        return false;
    }
    let origin_path = format!("{}{}", ensure_trailing_slash(directory.to_string()), origin);
    host.exists(&origin_path)
}
