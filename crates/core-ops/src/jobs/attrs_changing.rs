//! Attribute-changing job: chmod / chown / chflags / set-times over a set
//! of items, optionally recursing into directories.
//!
//! Permission and flag updates carry a tri-state per bit (leave / clear /
//! set) encoded as a value+mask pair; the applied result is
//! `(current & !mask) | (value & mask)` and a no-op when equal.

use std::sync::Arc;

use core_vfs::{
    ensure_trailing_slash, file_flags, DirEnt, Flags, ListingItem, SetTimes, VfsError, VfsHost,
    VfsStat,
};

use crate::job::{ItemStatus, Job, JobBase};
use crate::path_arena::{PathArena, PathNode};
use crate::statistics::SourceType;

/// Tri-state permission bits; `None` leaves the bit untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Permissions {
    pub usr_r: Option<bool>,
    pub usr_w: Option<bool>,
    pub usr_x: Option<bool>,
    pub grp_r: Option<bool>,
    pub grp_w: Option<bool>,
    pub grp_x: Option<bool>,
    pub oth_r: Option<bool>,
    pub oth_w: Option<bool>,
    pub oth_x: Option<bool>,
    pub suid: Option<bool>,
    pub sgid: Option<bool>,
    pub sticky: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ownage {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Tri-state BSD file flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagChanges {
    pub u_nodump: Option<bool>,
    pub u_immutable: Option<bool>,
    pub u_append: Option<bool>,
    pub u_opaque: Option<bool>,
    pub u_tracked: Option<bool>,
    pub u_hidden: Option<bool>,
    pub u_compressed: Option<bool>,
    pub s_archived: Option<bool>,
    pub s_immutable: Option<bool>,
    pub s_append: Option<bool>,
    pub s_restricted: Option<bool>,
    pub s_nounlink: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Times {
    pub atime: Option<i64>,
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
    pub btime: Option<i64>,
}

/// The full change request.
#[derive(Default)]
pub struct AttrsChangingCommand {
    pub items: Vec<ListingItem>,
    pub permissions: Option<Permissions>,
    pub ownage: Option<Ownage>,
    pub flags: Option<FlagChanges>,
    pub times: Option<Times>,
    pub apply_to_subdirs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAccessErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeErrorResolution {
    Stop,
    Skip,
    Retry,
}

pub struct AttrsChangingCallbacks {
    pub on_source_access_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> SourceAccessErrorResolution + Send + Sync>,
    pub on_chmod_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ChangeErrorResolution + Send + Sync>,
    pub on_chown_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ChangeErrorResolution + Send + Sync>,
    pub on_flags_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ChangeErrorResolution + Send + Sync>,
    pub on_times_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> ChangeErrorResolution + Send + Sync>,
}

impl Default for AttrsChangingCallbacks {
    fn default() -> Self {
        Self {
            on_source_access_error: Box::new(|_, _, _| SourceAccessErrorResolution::Stop),
            on_chmod_error: Box::new(|_, _, _| ChangeErrorResolution::Stop),
            on_chown_error: Box::new(|_, _, _| ChangeErrorResolution::Stop),
            on_flags_error: Box::new(|_, _, _| ChangeErrorResolution::Stop),
            on_times_error: Box::new(|_, _, _| ChangeErrorResolution::Stop),
        }
    }
}

struct Meta {
    stat: VfsStat,
    origin_item: usize,
    filename: PathNode,
}

pub struct AttrsChangingJob {
    base: JobBase,
    pub callbacks: AttrsChangingCallbacks,
    command: AttrsChangingCommand,
    chmod_command: Option<(u16, u16)>,
    chflag_command: Option<(u32, u32)>,
    metas: Vec<Meta>,
    filenames: PathArena,
}

impl AttrsChangingJob {
    pub fn new(command: AttrsChangingCommand) -> Self {
        let chmod_command = command.permissions.as_ref().map(permissions_value_and_mask);
        let chflag_command = command.flags.as_ref().map(flags_value_and_mask);
        let job = Self {
            base: JobBase::new(),
            callbacks: AttrsChangingCallbacks::default(),
            command,
            chmod_command,
            chflag_command,
            metas: Vec::new(),
            filenames: PathArena::new(),
        };
        job.base.statistics().set_preferred_source(SourceType::Items);
        job
    }

    fn stopped(&self) -> bool {
        self.base.block_if_paused();
        self.base.is_stopped()
    }

    fn do_scan(&mut self) {
        for index in 0..self.command.items.len() {
            if self.stopped() {
                return;
            }
            let item = self.command.items[index].clone();
            self.scan_root_item(&item, index);
        }
    }

    fn scan_root_item(&mut self, item: &ListingItem, origin: usize) {
        let host = Arc::clone(item.host());
        let path = item.path();

        let Some(st) = self.stat_with_retries(&path, &*host) else {
            return;
        };

        let filename = if item.is_dir() {
            ensure_trailing_slash(item.filename().to_string())
        } else {
            item.filename().to_string()
        };
        let node = self.filenames.push(filename, None);
        self.metas.push(Meta { stat: st, origin_item: origin, filename: node });
        self.base.statistics().commit_estimated(SourceType::Items, 1);

        if self.command.apply_to_subdirs && item.is_dir() {
            self.scan_children(&path, origin, node, &*host);
        }
    }

    fn scan_nested_item(&mut self, full_path: &str, filename: &str, origin: usize, prefix: PathNode) {
        let host = Arc::clone(self.command.items[origin].host());

        let Some(st) = self.stat_with_retries(full_path, &*host) else {
            return;
        };

        let stored = if st.is_dir() {
            ensure_trailing_slash(filename.to_string())
        } else {
            filename.to_string()
        };
        let node = self.filenames.push(stored, Some(prefix));
        self.metas.push(Meta { stat: st, origin_item: origin, filename: node });
        self.base.statistics().commit_estimated(SourceType::Items, 1);

        if self.command.apply_to_subdirs && st.is_dir() {
            self.scan_children(full_path, origin, node, &*host);
        }
    }

    fn scan_children(&mut self, path: &str, origin: usize, prefix: PathNode, host: &dyn VfsHost) {
        let mut entries: Vec<DirEnt> = Vec::new();
        loop {
            entries.clear();
            let rc = host.iterate_directory_listing(path, &mut |e| {
                entries.push(e.clone());
                true
            });
            match rc {
                Ok(()) => break,
                Err(err) => match (self.callbacks.on_source_access_error)(err, path, host) {
                    SourceAccessErrorResolution::Stop => {
                        self.base.stop();
                        return;
                    }
                    SourceAccessErrorResolution::Skip => return,
                    SourceAccessErrorResolution::Retry => continue,
                },
            }
        }
        for entry in &entries {
            if self.stopped() {
                return;
            }
            let nested = format!("{}/{}", path.trim_end_matches('/'), entry.name);
            self.scan_nested_item(&nested, &entry.name, origin, prefix);
        }
    }

    fn stat_with_retries(&self, path: &str, host: &dyn VfsHost) -> Option<VfsStat> {
        loop {
            match host.stat(path, Flags::empty()) {
                Ok(st) => return Some(st),
                Err(err) => match (self.callbacks.on_source_access_error)(err, path, host) {
                    SourceAccessErrorResolution::Stop => {
                        self.base.stop();
                        return None;
                    }
                    SourceAccessErrorResolution::Skip => return None,
                    SourceAccessErrorResolution::Retry => continue,
                },
            }
        }
    }

    fn do_change(&mut self) {
        for n in 0..self.metas.len() {
            let meta = &self.metas[n];
            let origin = &self.command.items[meta.origin_item];
            let host = Arc::clone(origin.host());
            let path = format!("{}{}", origin.directory(), self.filenames.compose(meta.filename));
            let path = path.trim_end_matches('/').to_string();
            let stat = meta.stat;

            let success = self.alter_single_item(&path, &*host, &stat);
            if success {
                self.base.statistics().commit_processed(SourceType::Items, 1);
                self.base.tell_item_report(&*host, &path, ItemStatus::Processed);
            } else {
                self.base.tell_item_report(&*host, &path, ItemStatus::Skipped);
            }

            if self.stopped() {
                return;
            }
        }
    }

    fn alter_single_item(&self, path: &str, host: &dyn VfsHost, stat: &VfsStat) -> bool {
        if self.chmod_command.is_some() && !self.chmod_single_item(path, host, stat) {
            return false;
        }
        if self.command.ownage.is_some() && !self.chown_single_item(path, host, stat) {
            return false;
        }
        if self.chflag_command.is_some() && !self.chflag_single_item(path, host, stat) {
            return false;
        }
        if self.command.times.is_some() && !self.chtimes_single_item(path, host) {
            return false;
        }
        true
    }

    fn chmod_single_item(&self, path: &str, host: &dyn VfsHost, stat: &VfsStat) -> bool {
        let (value, mask) = self.chmod_command.expect("checked by the caller");
        let mode = (stat.mode & !mask) | (value & mask);
        if mode == stat.mode {
            return true;
        }
        loop {
            match host.set_permissions(path, mode & 0o7777) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_chmod_error)(err, path, host) {
                    ChangeErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                    ChangeErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return false;
                    }
                    ChangeErrorResolution::Retry => continue,
                },
            }
        }
    }

    fn chown_single_item(&self, path: &str, host: &dyn VfsHost, stat: &VfsStat) -> bool {
        let ownage = self.command.ownage.expect("checked by the caller");
        let new_uid = ownage.uid.unwrap_or(stat.uid);
        let new_gid = ownage.gid.unwrap_or(stat.gid);
        if new_uid == stat.uid && new_gid == stat.gid {
            return true;
        }
        loop {
            match host.set_ownership(path, new_uid, new_gid) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_chown_error)(err, path, host) {
                    ChangeErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                    ChangeErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return false;
                    }
                    ChangeErrorResolution::Retry => continue,
                },
            }
        }
    }

    fn chflag_single_item(&self, path: &str, host: &dyn VfsHost, stat: &VfsStat) -> bool {
        let (value, mask) = self.chflag_command.expect("checked by the caller");
        let flags = (stat.flags & !mask) | (value & mask);
        if flags == stat.flags {
            return true;
        }
        loop {
            match host.set_flags(path, flags, Flags::empty()) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_flags_error)(err, path, host) {
                    ChangeErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                    ChangeErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return false;
                    }
                    ChangeErrorResolution::Retry => continue,
                },
            }
        }
    }

    fn chtimes_single_item(&self, path: &str, host: &dyn VfsHost) -> bool {
        let times = self.command.times.expect("checked by the caller");
        let times = SetTimes {
            btime: times.btime,
            mtime: times.mtime,
            ctime: times.ctime,
            atime: times.atime,
        };
        loop {
            match host.set_times(path, times) {
                Ok(()) => return true,
                Err(err) => match (self.callbacks.on_times_error)(err, path, host) {
                    ChangeErrorResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                    ChangeErrorResolution::Skip => {
                        self.base.statistics().commit_skipped(SourceType::Items, 1);
                        return false;
                    }
                    ChangeErrorResolution::Retry => continue,
                },
            }
        }
    }
}

impl Job for AttrsChangingJob {
    fn perform(&mut self) {
        if self.command.permissions.is_none()
            && self.command.ownage.is_none()
            && self.command.flags.is_none()
            && self.command.times.is_none()
        {
            return;
        }

        self.do_scan();

        if self.stopped() {
            return;
        }

        self.do_change();
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

fn permissions_value_and_mask(p: &Permissions) -> (u16, u16) {
    let mut value = 0u16;
    let mut mask = 0u16;
    let mut merge = |v: Option<bool>, bit: u16| {
        if let Some(v) = v {
            mask |= bit;
            if v {
                value |= bit;
            }
        }
    };
    merge(p.usr_r, 0o400);
    merge(p.usr_w, 0o200);
    merge(p.usr_x, 0o100);
    merge(p.grp_r, 0o040);
    merge(p.grp_w, 0o020);
    merge(p.grp_x, 0o010);
    merge(p.oth_r, 0o004);
    merge(p.oth_w, 0o002);
    merge(p.oth_x, 0o001);
    merge(p.suid, 0o4000);
    merge(p.sgid, 0o2000);
    merge(p.sticky, 0o1000);
    (value, mask)
}

fn flags_value_and_mask(f: &FlagChanges) -> (u32, u32) {
    let mut value = 0u32;
    let mut mask = 0u32;
    let mut merge = |v: Option<bool>, bit: u32| {
        if let Some(v) = v {
            mask |= bit;
            if v {
                value |= bit;
            }
        }
    };
    merge(f.u_nodump, file_flags::UF_NODUMP);
    merge(f.u_immutable, file_flags::UF_IMMUTABLE);
    merge(f.u_append, file_flags::UF_APPEND);
    merge(f.u_opaque, file_flags::UF_OPAQUE);
    merge(f.u_tracked, file_flags::UF_TRACKED);
    merge(f.u_hidden, file_flags::UF_HIDDEN);
    merge(f.u_compressed, file_flags::UF_COMPRESSED);
    merge(f.s_archived, file_flags::SF_ARCHIVED);
    merge(f.s_immutable, file_flags::SF_IMMUTABLE);
    merge(f.s_append, file_flags::SF_APPEND);
    merge(f.s_restricted, file_flags::SF_RESTRICTED);
    merge(f.s_nounlink, file_flags::SF_NOUNLINK);
    (value, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_masks_cover_only_requested_bits() {
        let p = Permissions {
            grp_r: Some(false),
            grp_x: Some(false),
            oth_r: Some(false),
            oth_x: Some(false),
            ..Default::default()
        };
        let (value, mask) = permissions_value_and_mask(&p);
        assert_eq!(value, 0);
        assert_eq!(mask, 0o055);
        // 0755 with those bits cleared is 0700
        assert_eq!((0o755 & !mask) | (value & mask), 0o700);
    }

    #[test]
    fn flag_masks_encode_set_and_clear() {
        let f = FlagChanges {
            u_hidden: Some(true),
            u_nodump: Some(false),
            ..Default::default()
        };
        let (value, mask) = flags_value_and_mask(&f);
        assert_eq!(value, file_flags::UF_HIDDEN);
        assert_eq!(mask, file_flags::UF_HIDDEN | file_flags::UF_NODUMP);
    }
}
