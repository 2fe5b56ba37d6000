//! Copy / move / rename job.
//!
//! Runs in stages: Preparing (destination analysis + scan), Process
//! (per-item dispatch), Verify (optional checksum pass), Cleaning (source
//! removal for moves). Every failure is resolved through the callbacks
//! table; a Stop answer aborts at the next suspension point with no
//! further destructive work.

pub mod callbacks;
pub mod checksum;
pub mod native_helpers;
pub mod options;
pub mod source_items;
mod xattrs;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use core_vfs::{
    ensure_trailing_slash, entry_is_older, file_flags, find_non_existing_item_path, lowercase_equal,
    Flags, HostFeatures, ListingItem, OpenFlags, SeekWhence, SetTimes, StatMeaning, VfsError,
    VfsFile, VfsHost, VfsHostPtr, VfsStat,
};

use crate::job::{ItemStatus, Job, JobBase};
use crate::statistics::SourceType;

use callbacks::*;
use checksum::ChecksumExpectation;
use options::{ChecksumVerification, CopyingOptions, ExistBehavior};
use source_items::SourceItems;

const BUFFER_SIZE: usize = 2 * 1024 * 1024;
/// More consecutive zero-byte reads/writes than this is an error, the
/// same threshold Apple's copyfile() uses.
const MAX_IO_LOOPS: u32 = 5;
const NEW_DIRECTORY_MODE: u16 = 0o755;

type Buffers = Option<(Vec<u8>, Vec<u8>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Default = 0,
    Preparing = 1,
    Process = 2,
    Verify = 3,
    Cleaning = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepResult {
    Ok,
    Stop,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathComposition {
    /// final path = destination + relative source path
    PathPrefix,
    /// final path = destination as given; collides when more than one
    /// item is processed
    FixedPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceItemAftermath {
    NoChanges,
    Moved,
    NeedsToBeDeleted,
}

pub struct CopyingJob {
    base: JobBase,
    pub callbacks: CopyingCallbacks,
    initial_items: Vec<ListingItem>,
    initial_destination_path: String,
    destination_path: String,
    destination_host: VfsHostPtr,
    destination_is_native: bool,
    destination_dev: u64,
    options: CopyingOptions,
    source_items: SourceItems,
    checksums: Vec<ChecksumExpectation>,
    items_to_delete: Vec<u32>,
    composition: PathComposition,
    single_initial_item: bool,
    single_scanned_item: bool,
    single_directory_case_renaming: bool,
    stage: AtomicU8,
    buffers: Buffers,
}

impl CopyingJob {
    /// Panics when the destination path is not absolute.
    pub fn new(
        items: Vec<ListingItem>,
        destination_path: &str,
        destination_host: VfsHostPtr,
        options: CopyingOptions,
    ) -> Self {
        assert!(
            destination_path.starts_with('/'),
            "the destination path must be absolute"
        );
        if items.is_empty() {
            tracing::warn!(target: "ops.copying", "constructed_with_an_empty_items_list");
        }
        let single_initial_item = items.len() == 1;
        let destination_is_native = destination_host.is_native_fs();
        let job = Self {
            base: JobBase::new(),
            callbacks: CopyingCallbacks::default(),
            initial_items: items,
            initial_destination_path: destination_path.to_string(),
            destination_path: String::new(),
            destination_host,
            destination_is_native,
            destination_dev: 0,
            options,
            source_items: SourceItems::new(),
            checksums: Vec::new(),
            items_to_delete: Vec::new(),
            composition: PathComposition::FixedPath,
            single_initial_item,
            single_scanned_item: false,
            single_directory_case_renaming: false,
            stage: AtomicU8::new(Stage::Default as u8),
            buffers: None,
        };
        job.base.statistics().set_preferred_source(SourceType::Bytes);
        job
    }

    pub fn stage(&self) -> Stage {
        match self.stage.load(Ordering::Relaxed) {
            1 => Stage::Preparing,
            2 => Stage::Process,
            3 => Stage::Verify,
            4 => Stage::Cleaning,
            _ => Stage::Default,
        }
    }

    pub fn is_single_initial_item_processing(&self) -> bool {
        self.single_initial_item
    }

    pub fn is_single_scanned_item_processing(&self) -> bool {
        self.single_scanned_item
    }

    pub fn destination_path(&self) -> &str {
        &self.destination_path
    }

    pub fn options(&self) -> &CopyingOptions {
        &self.options
    }

    fn set_stage(&self, stage: Stage) {
        if self.stage.swap(stage as u8, Ordering::Relaxed) != stage as u8 {
            (self.callbacks.on_stage_changed)();
        }
    }

    fn stopped(&self) -> bool {
        self.base.block_if_paused();
        self.base.is_stopped()
    }

    // ---------------------------------------------------------------------
    // preparation
    // ---------------------------------------------------------------------

    fn analyze_initial_destination(&mut self) -> (PathComposition, bool) {
        if let Ok(st) = self
            .destination_host
            .stat(&self.initial_destination_path, Flags::empty())
        {
            self.single_directory_case_renaming = self.is_single_directory_case_renaming(&st);
            if st.is_dir() && !self.single_directory_case_renaming {
                self.destination_path = ensure_trailing_slash(self.initial_destination_path.clone());
                return (PathComposition::PathPrefix, false);
            }
            // a second processed item will collide on this fixed path
            self.destination_path = self.initial_destination_path.clone();
            return (PathComposition::FixedPath, false);
        }
        // nonexistent destination: parents may have to be built
        if self.initial_destination_path.ends_with('/') || self.initial_items.len() > 1 {
            self.destination_path = ensure_trailing_slash(self.initial_destination_path.clone());
            (PathComposition::PathPrefix, true)
        } else {
            self.destination_path = self.initial_destination_path.clone();
            (PathComposition::FixedPath, true)
        }
    }

    fn is_single_directory_case_renaming(&self, dst_stat: &VfsStat) -> bool {
        if !dst_stat.is_dir() || self.options.docopy || self.initial_items.len() != 1 {
            return false;
        }
        let item = &self.initial_items[0];
        if !item.is_dir() || !item.same_host(&*self.destination_host) {
            return false;
        }
        if item.host().is_native_fs() {
            item.inode() == dst_stat.inode
        } else {
            !self
                .destination_host
                .is_case_sensitive_at(&self.initial_destination_path)
                && lowercase_equal(&self.initial_destination_path, &item.path())
        }
    }

    /// Creates every missing parent of the destination path, deepest last.
    fn build_destination_directory(&self) -> StepResult {
        let mut to_build = Vec::new();
        let path = &self.destination_path;
        let mut end = path.len();
        while let Some(slash) = path[..end].rfind('/') {
            let prefix = &path[..slash + 1];
            if slash == 0 || self.destination_host.exists(prefix) {
                break;
            }
            to_build.push(prefix.to_string());
            end = slash;
        }
        to_build.reverse();

        // all or nothing, no skipping here
        for dir in to_build {
            loop {
                match self.destination_host.create_directory(&dir, NEW_DIRECTORY_MODE) {
                    Ok(()) => break,
                    Err(err) => match (self.callbacks.on_cant_create_destination_root_dir)(
                        err,
                        &dir,
                        &*self.destination_host,
                    ) {
                        CantCreateDestinationRootDirResolution::Stop => return StepResult::Stop,
                        CantCreateDestinationRootDirResolution::Retry => continue,
                    },
                }
            }
        }
        StepResult::Ok
    }

    /// Device id of the deepest existing ancestor of the destination.
    fn find_destination_dev(&self) -> Option<u64> {
        let mut path = self.destination_path.as_str();
        loop {
            if let Ok(st) = self.destination_host.stat(path, Flags::empty()) {
                return Some(st.dev);
            }
            let trimmed = path.trim_end_matches('/');
            let slash = trimmed.rfind('/')?;
            if slash == 0 {
                return self.destination_host.stat("/", Flags::empty()).ok().map(|st| st.dev);
            }
            path = &trimmed[..slash];
        }
    }

    // ---------------------------------------------------------------------
    // scanning
    // ---------------------------------------------------------------------

    fn scan_source_items(&self) -> (StepResult, SourceItems) {
        let mut db = SourceItems::new();
        let stat_flags = if self.options.preserve_symlinks {
            Flags::NO_FOLLOW
        } else {
            Flags::empty()
        };

        for item in &self.initial_items {
            if self.stopped() {
                return (StepResult::Stop, SourceItems::new());
            }
            let host_index = db.insert_or_find_host(item.host());
            let base_index = db.insert_or_find_base_dir(item.directory());
            let result = self.scan_item(
                &mut db,
                host_index,
                base_index,
                None,
                item.filename(),
                item.filename(),
                stat_flags,
            );
            if result != StepResult::Ok {
                return (result, SourceItems::new());
            }
        }
        (StepResult::Ok, db)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_item(
        &self,
        db: &mut SourceItems,
        host_index: u16,
        base_index: u16,
        parent: Option<u32>,
        relative_path: &str,
        item_name: &str,
        stat_flags: Flags,
    ) -> StepResult {
        let host = Arc::clone(db.host(host_index));
        let path = format!("{}{}", db.base_dir(base_index), relative_path);

        let st = loop {
            match host.stat(&path, stat_flags) {
                Ok(st) => break st,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, &path, &*host) {
                    CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                    CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };

        if st.is_reg() {
            // "._xxx" sidecars are materialised by xattr propagation, not
            // copied as payload
            if !is_external_ea_storage(&*host, &path, item_name) {
                db.insert_item(host_index, base_index, parent, item_name, &st);
            }
        } else if st.is_symlink() {
            db.insert_item(host_index, base_index, parent, item_name, &st);
        } else if st.is_dir() {
            let my_index = db.insert_item(host_index, base_index, parent, item_name, &st);

            let mut should_go_inside = self.options.docopy;
            if !should_go_inside && !db.item_host_is(my_index, &*self.destination_host) {
                should_go_inside = true;
            }
            if !should_go_inside && self.destination_is_native && st.dev != self.destination_dev {
                should_go_inside = true;
            }
            if !should_go_inside && !self.single_directory_case_renaming {
                let dest_path = self.compose_destination_name_in_db(my_index, db);
                if !lowercase_equal(&path, &dest_path) && self.destination_host.exists(&dest_path) {
                    should_go_inside = true;
                }
            }

            if should_go_inside {
                let mut entries = Vec::new();
                loop {
                    entries.clear();
                    let rc = host.iterate_directory_listing(&path, &mut |e| {
                        entries.push(e.name.clone());
                        true
                    });
                    match rc {
                        Ok(()) => break,
                        Err(err) => {
                            match (self.callbacks.on_cant_access_source_item)(err, &path, &*host) {
                                CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                                CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                                CantAccessSourceItemResolution::Retry => continue,
                            }
                        }
                    }
                }
                for entry in entries {
                    if self.stopped() {
                        return StepResult::Stop;
                    }
                    let nested = format!("{relative_path}/{entry}");
                    // nested failures were already resolved per-entry
                    let _ = self.scan_item(db, host_index, base_index, Some(my_index), &nested, &entry, stat_flags);
                }
            }
        }
        StepResult::Ok
    }

    fn compose_destination_name_in_db(&self, item: u32, db: &SourceItems) -> String {
        let relative = db.compose_relative_path(item);
        match self.composition {
            PathComposition::PathPrefix => format!("{}{relative}", self.destination_path),
            PathComposition::FixedPath => {
                // nested entries keep their path below the first component
                let mut result = self.destination_path.clone();
                if let Some(slash) = relative.find('/') {
                    result.push_str(&relative[slash..]);
                }
                result
            }
        }
    }

    fn compose_destination_name(&self, item: u32) -> String {
        self.compose_destination_name_in_db(item, &self.source_items)
    }

    // ---------------------------------------------------------------------
    // processing
    // ---------------------------------------------------------------------

    fn process_items(&mut self) {
        self.set_stage(Stage::Process);
        self.base
            .statistics()
            .commit_estimated(SourceType::Bytes, self.source_items.total_reg_bytes());

        for index in 0..self.source_items.items_amount() as u32 {
            let step_result = self.process_item(index);
            if step_result == StepResult::Stop {
                self.base.stop();
                return;
            }
            if self.stopped() {
                return;
            }
        }

        let mut all_matched = true;
        if !self.checksums.is_empty() {
            self.set_stage(Stage::Verify);
            let checksums = std::mem::take(&mut self.checksums);
            for expectation in &checksums {
                let (step_result, matched) = self.verify_copied_file(expectation);
                if step_result != StepResult::Ok || !matched {
                    (self.callbacks.on_file_verification_failed)(
                        &expectation.destination_path,
                        &*self.destination_host,
                    );
                    all_matched = false;
                }
            }
            self.checksums = checksums;
        }

        if self.stopped() {
            return;
        }

        // cleaning only ever runs after a fully successful pass
        if all_matched {
            self.set_stage(Stage::Cleaning);
            self.clear_source_items();
        }
    }

    fn process_item(&mut self, index: u32) -> StepResult {
        let source_host = Arc::clone(self.source_items.item_host(index));
        let source_size = self.source_items.item_size(index);
        let source_path = self.source_items.compose_full_path(index);
        let mut destination_path = self.compose_destination_name(index);

        let step_result = if self.source_items.item_is_reg(index) {
            let mut hash: Option<md5::Context> = None;
            let wants_hash = self.options.verification == ChecksumVerification::Always
                || (!self.options.docopy
                    && self.options.verification >= ChecksumVerification::WhenMoves);

            let same_host = self.source_items.item_host_is(index, &*self.destination_host);
            let same_native_volume = source_host.is_native_fs()
                && same_host
                && self.source_items.item_dev(index) == self.destination_dev;

            let result;
            if source_host.is_native_fs() && self.destination_is_native {
                if self.options.docopy {
                    result = self.copy_file(
                        &*source_host,
                        &source_path,
                        &mut destination_path,
                        wants_hash.then_some(&mut hash),
                    );
                } else if same_native_volume {
                    result = self.rename_file(&*source_host, &source_path, &mut destination_path);
                    if result == StepResult::Ok {
                        self.base.statistics().commit_processed(SourceType::Bytes, source_size);
                    }
                } else {
                    result = self.copy_file(
                        &*source_host,
                        &source_path,
                        &mut destination_path,
                        wants_hash.then_some(&mut hash),
                    );
                    if result == StepResult::Ok {
                        self.items_to_delete.push(index);
                    }
                }
            } else if self.destination_is_native || self.options.docopy || !same_host {
                result = self.copy_file(
                    &*source_host,
                    &source_path,
                    &mut destination_path,
                    wants_hash.then_some(&mut hash),
                );
                if !self.options.docopy && result == StepResult::Ok {
                    self.items_to_delete.push(index);
                }
            } else {
                // moving within one non-native host is a rename
                result = self.rename_file(&*source_host, &source_path, &mut destination_path);
                if result == StepResult::Ok {
                    self.base.statistics().commit_processed(SourceType::Bytes, source_size);
                }
            }

            if let Some(context) = hash {
                let digest = context.compute();
                self.checksums.push(ChecksumExpectation::new(
                    index,
                    destination_path.clone(),
                    &digest.0,
                ));
            }
            result
        } else if self.source_items.item_is_dir(index) {
            self.process_directory_item(&*source_host, &source_path, index, &destination_path)
        } else if self.source_items.item_is_symlink(index) {
            self.process_symlink_item(&*source_host, &source_path, index, &mut destination_path)
        } else {
            StepResult::Ok
        };

        match step_result {
            StepResult::Ok => {
                self.base.tell_item_report(&*source_host, &source_path, ItemStatus::Processed)
            }
            StepResult::Skipped => {
                self.base.tell_item_report(&*source_host, &source_path, ItemStatus::Skipped)
            }
            StepResult::Stop => {}
        }
        step_result
    }

    fn process_directory_item(
        &mut self,
        source_host: &dyn VfsHost,
        source_path: &str,
        index: u32,
        destination_path: &str,
    ) -> StepResult {
        let same_host = self.source_items.item_host_is(index, &*self.destination_host);
        let same_native_volume = source_host.is_native_fs()
            && same_host
            && self.source_items.item_dev(index) == self.destination_dev;
        let both_native = source_host.is_native_fs() && self.destination_is_native;

        if self.options.docopy {
            return self.copy_directory(source_host, source_path, destination_path);
        }

        let can_rename = if both_native {
            same_native_volume
        } else {
            same_host && !self.destination_is_native
        };
        if can_rename {
            let (result, aftermath) = self.rename_directory(source_host, source_path, destination_path);
            if result == StepResult::Ok && aftermath == SourceItemAftermath::NeedsToBeDeleted {
                // rename fell back into "copy attributes + delete source"
                self.items_to_delete.push(index);
            }
            result
        } else {
            let result = self.copy_directory(source_host, source_path, destination_path);
            if result == StepResult::Ok {
                self.items_to_delete.push(index);
            }
            result
        }
    }

    fn process_symlink_item(
        &mut self,
        source_host: &dyn VfsHost,
        source_path: &str,
        index: u32,
        destination_path: &mut String,
    ) -> StepResult {
        let same_native_volume = source_host.is_native_fs()
            && self.destination_is_native
            && self.source_items.item_host_is(index, &*self.destination_host)
            && self.source_items.item_dev(index) == self.destination_dev;

        if self.options.docopy {
            return self.copy_symlink(source_host, source_path, destination_path);
        }
        if same_native_volume {
            return self.rename_file(source_host, source_path, destination_path);
        }
        let result = self.copy_symlink(source_host, source_path, destination_path);
        if result == StepResult::Ok {
            self.items_to_delete.push(index);
        }
        result
    }

    // ---------------------------------------------------------------------
    // regular file engine
    // ---------------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn copy_file(
        &mut self,
        source_host: &dyn VfsHost,
        source_path: &str,
        destination_path: &mut String,
        mut data_feedback: Option<&mut Option<md5::Context>>,
    ) -> StepResult {
        let Self {
            ref base,
            ref callbacks,
            ref destination_host,
            ref options,
            ref mut buffers,
            ..
        } = *self;
        let destination_host: &dyn VfsHost = &**destination_host;

        // stat the source
        let src_stat = loop {
            match source_host.stat(source_path, Flags::empty()) {
                Ok(st) => break st,
                Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, source_host) {
                    CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                    CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };

        // open the source, failing early when it cannot be read at all
        let mut src_file = loop {
            match source_host.create_file(source_path) {
                Ok(file) => break file,
                Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, source_host) {
                    CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                    CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };
        let mut src_open_flags = OpenFlags::READ | OpenFlags::SH_LOCK;
        if options.disable_system_caches {
            src_open_flags |= OpenFlags::NO_CACHE;
        }
        loop {
            match src_file.open(src_open_flags) {
                Ok(()) => break,
                Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, source_host) {
                    CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                    CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        }

        // copying scenario: fresh target, overwrite or append
        let mut dst_open_flags = OpenFlags::WRITE;
        let mut do_erase_xattrs = false;
        let mut do_copy_xattrs = true;
        let mut do_unlink_on_stop = false;
        let mut do_set_times = true;
        let mut do_set_unix_flags = true;
        let mut initial_writing_offset: u64 = 0;
        let mut preallocate_delta: i64 = src_stat.size as i64;

        match destination_host.stat(destination_path, Flags::empty()) {
            Ok(dst_stat) => {
                let resolution = match options.exist_behavior {
                    ExistBehavior::Ask => (callbacks.on_copy_destination_already_exists)(
                        &src_stat,
                        &dst_stat,
                        destination_path,
                    ),
                    ExistBehavior::SkipAll => CopyDestExistsResolution::Skip,
                    ExistBehavior::OverwriteAll => CopyDestExistsResolution::Overwrite,
                    ExistBehavior::OverwriteOld => CopyDestExistsResolution::OverwriteOld,
                    ExistBehavior::AppendAll => CopyDestExistsResolution::Append,
                    ExistBehavior::KeepBoth => CopyDestExistsResolution::KeepBoth,
                    ExistBehavior::Stop => return StepResult::Stop,
                };
                match resolution {
                    CopyDestExistsResolution::Skip => return StepResult::Skipped,
                    CopyDestExistsResolution::OverwriteOld if !entry_is_older(&dst_stat, &src_stat) => {
                        return StepResult::Skipped
                    }
                    CopyDestExistsResolution::Overwrite | CopyDestExistsResolution::OverwriteOld => {
                        dst_open_flags |= OpenFlags::TRUNCATE;
                        do_unlink_on_stop = true;
                        do_erase_xattrs = true;
                        preallocate_delta = src_stat.size as i64 - dst_stat.size as i64;
                    }
                    CopyDestExistsResolution::Append => {
                        dst_open_flags |= OpenFlags::APPEND;
                        do_copy_xattrs = false;
                        do_set_times = false;
                        do_set_unix_flags = false;
                        initial_writing_offset = dst_stat.size;
                    }
                    CopyDestExistsResolution::KeepBoth => {
                        let stopped = || base.is_stopped();
                        let fresh =
                            find_non_existing_item_path(destination_path, destination_host, Some(&stopped));
                        if !fresh.is_empty() {
                            *destination_path = fresh;
                        }
                        dst_open_flags |= OpenFlags::CREATE | OpenFlags::EXCL;
                        do_unlink_on_stop = true;
                    }
                    CopyDestExistsResolution::Stop => return StepResult::Stop,
                }
            }
            Err(_) => {
                dst_open_flags |= OpenFlags::CREATE | OpenFlags::EXCL;
                do_unlink_on_stop = true;
            }
        }

        if options.disable_system_caches {
            dst_open_flags |= OpenFlags::NO_CACHE;
        }
        let creation_mode = if options.copy_unix_flags {
            src_stat.mode & 0o7777
        } else {
            0o644
        };
        dst_open_flags = dst_open_flags.with_mode(creation_mode);

        // open the destination
        let mut dst_file = loop {
            match destination_host.create_file(destination_path) {
                Ok(file) => break file,
                Err(err) => {
                    match (callbacks.on_cant_open_destination_file)(err, destination_path, destination_host) {
                        CantOpenDestinationFileResolution::Skip => return StepResult::Skipped,
                        CantOpenDestinationFileResolution::Stop => return StepResult::Stop,
                        CantOpenDestinationFileResolution::Retry => continue,
                    }
                }
            }
        };
        loop {
            match dst_file.open(dst_open_flags) {
                Ok(()) => break,
                Err(err) => {
                    if is_native_locked_item(err, destination_path, destination_host) {
                        match resolve_locked(
                            options,
                            callbacks,
                            LockedItemCause::Opening,
                            err,
                            destination_path,
                            destination_host,
                        ) {
                            LockedItemResolution::Unlock => {
                                match do_unlock(callbacks, destination_path, destination_host) {
                                    StepResult::Ok => continue,
                                    other => return other,
                                }
                            }
                            LockedItemResolution::Retry => continue,
                            LockedItemResolution::Skip => return StepResult::Skipped,
                            LockedItemResolution::Stop => return StepResult::Stop,
                        }
                    }
                    match (callbacks.on_cant_open_destination_file)(err, destination_path, destination_host) {
                        CantOpenDestinationFileResolution::Skip => return StepResult::Skipped,
                        CantOpenDestinationFileResolution::Stop => return StepResult::Stop,
                        CantOpenDestinationFileResolution::Retry => continue,
                    }
                }
            }
        }

        // fd-level preallocation when the target exposes a descriptor
        if let Some(fd) = dst_file.as_raw_fd() {
            if native_helpers::should_preallocate(preallocate_delta)
                && native_helpers::try_preallocate(fd, initial_writing_offset, preallocate_delta)
                && native_helpers::supports_fast_truncation_after_preallocation(fd)
            {
                let total = initial_writing_offset + src_stat.size;
                if !native_helpers::ftruncate(fd, total) {
                    tracing::warn!(target: "ops.copying", path = %destination_path, "post_preallocation_truncate_failed");
                }
            }
        }

        dst_file.set_upload_size(src_stat.size);

        // position the destination
        if dst_file.pos() != initial_writing_offset {
            loop {
                match dst_file.seek(initial_writing_offset as i64, SeekWhence::Set) {
                    Ok(_) => break,
                    Err(err) => match (callbacks.on_destination_file_write_error)(
                        err,
                        destination_path,
                        destination_host,
                    ) {
                        DestinationFileWriteErrorResolution::Skip => return StepResult::Skipped,
                        DestinationFileWriteErrorResolution::Stop => return StepResult::Stop,
                        DestinationFileWriteErrorResolution::Retry => continue,
                    },
                }
            }
        }

        let transfer = transfer_contents(
            buffers,
            base,
            callbacks,
            &mut *src_file,
            &mut *dst_file,
            &src_stat,
            source_host,
            source_path,
            destination_path,
            destination_host,
            &mut data_feedback,
        );
        if transfer != StepResult::Ok {
            // revert what has been done so far
            let _ = dst_file.close();
            if do_unlink_on_stop {
                let _ = destination_host.unlink(destination_path);
            }
            return transfer;
        }

        // metadata propagation; failures here are advisory
        if options.copy_xattrs {
            if do_erase_xattrs {
                xattrs::erase_destination_xattrs(&*dst_file, destination_path);
            }
            if do_copy_xattrs {
                xattrs::copy_xattrs(&*src_file, &*dst_file, destination_path, destination_host);
            }
        }

        let _ = src_file.close();
        let _ = dst_file.close();

        let features = destination_host.features();
        if options.copy_unix_flags
            && do_set_unix_flags
            && src_stat.meaning.contains(StatMeaning::FLAGS)
            && features.contains(HostFeatures::SET_FLAGS)
        {
            if let Err(err) = destination_host.set_flags(destination_path, src_stat.flags, Flags::empty()) {
                tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_flags_failed");
            }
        }
        if options.copy_unix_owners && features.contains(HostFeatures::SET_OWNERSHIP) {
            if let Err(err) = destination_host.set_ownership(destination_path, src_stat.uid, src_stat.gid) {
                tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_ownership_failed");
            }
        }
        if options.copy_file_times && do_set_times && features.contains(HostFeatures::SET_TIMES) {
            let times = SetTimes {
                btime: Some(src_stat.btime.sec),
                mtime: Some(src_stat.mtime.sec),
                ctime: Some(src_stat.ctime.sec),
                atime: Some(src_stat.atime.sec),
            };
            if let Err(err) = destination_host.set_times(destination_path, times) {
                tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_times_failed");
            }
        }

        StepResult::Ok
    }

    // ---------------------------------------------------------------------
    // rename routines
    // ---------------------------------------------------------------------

    fn rename_file(
        &self,
        host: &dyn VfsHost,
        source_path: &str,
        destination_path: &mut String,
    ) -> StepResult {
        let callbacks = &self.callbacks;

        if let Ok(dst_stat) = host.stat(destination_path, Flags::NO_FOLLOW) {
            let src_stat = loop {
                match host.stat(source_path, Flags::NO_FOLLOW) {
                    Ok(st) => break st,
                    Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, host) {
                        CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                        CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                        CantAccessSourceItemResolution::Retry => continue,
                    },
                }
            };

            let same_entry = src_stat.dev == dst_stat.dev && src_stat.inode == dst_stat.inode;
            if !same_entry {
                // renaming into the destination would erase it
                match (callbacks.on_rename_destination_already_exists)(&src_stat, &dst_stat, destination_path)
                {
                    RenameDestExistsResolution::Skip => return StepResult::Skipped,
                    RenameDestExistsResolution::OverwriteOld
                        if !entry_is_older(&dst_stat, &src_stat) =>
                    {
                        return StepResult::Skipped
                    }
                    RenameDestExistsResolution::Overwrite | RenameDestExistsResolution::OverwriteOld => {}
                    RenameDestExistsResolution::KeepBoth => {
                        let stopped = || self.base.is_stopped();
                        let fresh = find_non_existing_item_path(destination_path, host, Some(&stopped));
                        if !fresh.is_empty() {
                            *destination_path = fresh;
                        }
                    }
                    RenameDestExistsResolution::Stop => return StepResult::Stop,
                }
            }
        }

        loop {
            match host.rename(source_path, destination_path) {
                Ok(()) => return StepResult::Ok,
                Err(err) => {
                    if is_native_locked_item(err, source_path, host) {
                        match resolve_locked(&self.options, callbacks, LockedItemCause::Moving, err, source_path, host) {
                            LockedItemResolution::Unlock => match do_unlock(callbacks, source_path, host) {
                                StepResult::Ok => continue,
                                other => return other,
                            },
                            LockedItemResolution::Retry => continue,
                            LockedItemResolution::Skip => return StepResult::Skipped,
                            LockedItemResolution::Stop => return StepResult::Stop,
                        }
                    }
                    match (callbacks.on_destination_file_write_error)(err, destination_path, host) {
                        DestinationFileWriteErrorResolution::Skip => return StepResult::Skipped,
                        DestinationFileWriteErrorResolution::Stop => return StepResult::Stop,
                        DestinationFileWriteErrorResolution::Retry => continue,
                    }
                }
            }
        }
    }

    fn rename_directory(
        &self,
        host: &dyn VfsHost,
        source_path: &str,
        destination_path: &str,
    ) -> (StepResult, SourceItemAftermath) {
        use SourceItemAftermath::NoChanges;
        let callbacks = &self.callbacks;

        let dst_stat = host.stat(destination_path, Flags::NO_FOLLOW).ok();
        let mut dst_dir_is_dummy = false;

        if let Some(st) = &dst_stat {
            if !st.is_dir() {
                // replace the offending entry with a directory, if allowed
                match (callbacks.on_not_a_directory)(destination_path, host) {
                    NotADirectoryResolution::Skip => return (StepResult::Skipped, NoChanges),
                    NotADirectoryResolution::Stop => return (StepResult::Stop, NoChanges),
                    NotADirectoryResolution::Overwrite => {}
                }
                loop {
                    match host.unlink(destination_path) {
                        Ok(()) => break,
                        Err(err) => match (callbacks.on_cant_delete_destination_file)(err, destination_path, host) {
                            CantDeleteDestinationFileResolution::Skip => {
                                return (StepResult::Skipped, NoChanges)
                            }
                            CantDeleteDestinationFileResolution::Stop => {
                                return (StepResult::Stop, NoChanges)
                            }
                            CantDeleteDestinationFileResolution::Retry => continue,
                        },
                    }
                }
                loop {
                    match host.create_directory(destination_path, NEW_DIRECTORY_MODE) {
                        Ok(()) => break,
                        Err(err) => match (callbacks.on_cant_create_destination_dir)(err, destination_path, host) {
                            CantCreateDestinationDirResolution::Skip => {
                                return (StepResult::Skipped, NoChanges)
                            }
                            CantCreateDestinationDirResolution::Stop => return (StepResult::Stop, NoChanges),
                            CantCreateDestinationDirResolution::Retry => continue,
                        },
                    }
                }
                dst_dir_is_dummy = true;
            }
        }

        if let Some(dst_stat) = &dst_stat {
            let case_renaming = if host.is_native_fs() {
                host.stat(source_path, Flags::NO_FOLLOW)
                    .map(|src| src.inode == dst_stat.inode)
                    .unwrap_or(false)
            } else {
                !host.is_case_sensitive_at(destination_path)
                    && lowercase_equal(destination_path, source_path)
            };

            if !case_renaming {
                let src_stat = loop {
                    match host.stat(source_path, Flags::NO_FOLLOW) {
                        Ok(st) => break st,
                        Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, host) {
                            CantAccessSourceItemResolution::Skip => {
                                return (StepResult::Skipped, NoChanges)
                            }
                            CantAccessSourceItemResolution::Stop => return (StepResult::Stop, NoChanges),
                            CantAccessSourceItemResolution::Retry => continue,
                        },
                    }
                };

                if !dst_dir_is_dummy {
                    match (callbacks.on_rename_destination_already_exists)(&src_stat, dst_stat, destination_path) {
                        RenameDestExistsResolution::Skip => return (StepResult::Skipped, NoChanges),
                        RenameDestExistsResolution::OverwriteOld
                            if !entry_is_older(dst_stat, &src_stat) =>
                        {
                            return (StepResult::Skipped, NoChanges)
                        }
                        RenameDestExistsResolution::Overwrite | RenameDestExistsResolution::OverwriteOld => {}
                        _ => return (StepResult::Stop, NoChanges),
                    }
                }

                // graft attributes onto the surviving target directory and
                // sentence the source to deletion
                self.copy_entry_attributes(&src_stat, destination_path);
                return (StepResult::Ok, SourceItemAftermath::NeedsToBeDeleted);
            }
        }

        loop {
            match host.rename(source_path, destination_path) {
                Ok(()) => return (StepResult::Ok, SourceItemAftermath::Moved),
                Err(err) => {
                    if is_native_locked_item(err, source_path, host) {
                        match resolve_locked(&self.options, callbacks, LockedItemCause::Moving, err, source_path, host) {
                            LockedItemResolution::Unlock => match do_unlock(callbacks, source_path, host) {
                                StepResult::Ok => continue,
                                StepResult::Skipped => return (StepResult::Skipped, NoChanges),
                                StepResult::Stop => return (StepResult::Stop, NoChanges),
                            },
                            LockedItemResolution::Retry => continue,
                            LockedItemResolution::Skip => return (StepResult::Skipped, NoChanges),
                            LockedItemResolution::Stop => return (StepResult::Stop, NoChanges),
                        }
                    }
                    match (callbacks.on_destination_file_write_error)(err, destination_path, host) {
                        DestinationFileWriteErrorResolution::Skip => return (StepResult::Skipped, NoChanges),
                        DestinationFileWriteErrorResolution::Stop => return (StepResult::Stop, NoChanges),
                        DestinationFileWriteErrorResolution::Retry => continue,
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // directory copy
    // ---------------------------------------------------------------------

    fn copy_directory(
        &self,
        source_host: &dyn VfsHost,
        source_path: &str,
        destination_path: &str,
    ) -> StepResult {
        let callbacks = &self.callbacks;
        let destination_host = &*self.destination_host;

        match destination_host.stat(destination_path, Flags::NO_FOLLOW) {
            Ok(st) if st.is_dir() => {
                // exists already: only attributes are refreshed below
            }
            Ok(_) => {
                match (callbacks.on_not_a_directory)(destination_path, destination_host) {
                    NotADirectoryResolution::Skip => return StepResult::Skipped,
                    NotADirectoryResolution::Stop => return StepResult::Stop,
                    NotADirectoryResolution::Overwrite => {}
                }
                loop {
                    match destination_host.unlink(destination_path) {
                        Ok(()) => break,
                        Err(err) => match (callbacks.on_cant_delete_destination_file)(
                            err,
                            destination_path,
                            destination_host,
                        ) {
                            CantDeleteDestinationFileResolution::Skip => return StepResult::Skipped,
                            CantDeleteDestinationFileResolution::Stop => return StepResult::Stop,
                            CantDeleteDestinationFileResolution::Retry => continue,
                        },
                    }
                }
                if let Err(result) = self.make_destination_directory(destination_path) {
                    return result;
                }
            }
            Err(_) => {
                if let Err(result) = self.make_destination_directory(destination_path) {
                    return result;
                }
            }
        }

        // attribute propagation is best-effort
        if let Ok(src_stat) = source_host.stat(source_path, Flags::empty()) {
            self.copy_entry_attributes(&src_stat, destination_path);
        }
        StepResult::Ok
    }

    fn make_destination_directory(&self, destination_path: &str) -> Result<(), StepResult> {
        loop {
            match self
                .destination_host
                .create_directory(destination_path, NEW_DIRECTORY_MODE)
            {
                Ok(()) => return Ok(()),
                Err(err) => match (self.callbacks.on_cant_create_destination_dir)(
                    err,
                    destination_path,
                    &*self.destination_host,
                ) {
                    CantCreateDestinationDirResolution::Skip => return Err(StepResult::Skipped),
                    CantCreateDestinationDirResolution::Stop => return Err(StepResult::Stop),
                    CantCreateDestinationDirResolution::Retry => continue,
                },
            }
        }
    }

    /// mode / flags / ownership / times of `src_stat` onto the target,
    /// gated by options and destination capabilities. Errors are logged
    /// and otherwise ignored.
    fn copy_entry_attributes(&self, src_stat: &VfsStat, destination_path: &str) {
        let destination_host = &*self.destination_host;
        let features = destination_host.features();

        if self.options.copy_unix_flags {
            let mut mode_bits = src_stat.mode & 0o7777;
            if mode_bits & 0o777 == 0 {
                // guard against malformed archives
                mode_bits |= 0o750;
            }
            if features.contains(HostFeatures::SET_PERMISSIONS) {
                if let Err(err) = destination_host.set_permissions(destination_path, mode_bits) {
                    tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_permissions_failed");
                }
            }
            if src_stat.meaning.contains(StatMeaning::FLAGS) && features.contains(HostFeatures::SET_FLAGS) {
                if let Err(err) = destination_host.set_flags(destination_path, src_stat.flags, Flags::empty()) {
                    tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_flags_failed");
                }
            }
        }
        if self.options.copy_unix_owners && features.contains(HostFeatures::SET_OWNERSHIP) {
            if let Err(err) = destination_host.set_ownership(destination_path, src_stat.uid, src_stat.gid) {
                tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_ownership_failed");
            }
        }
        if self.options.copy_file_times && features.contains(HostFeatures::SET_TIMES) {
            let times = SetTimes {
                btime: Some(src_stat.btime.sec),
                mtime: Some(src_stat.mtime.sec),
                ctime: Some(src_stat.ctime.sec),
                atime: Some(src_stat.atime.sec),
            };
            if let Err(err) = destination_host.set_times(destination_path, times) {
                tracing::warn!(target: "ops.copying", path = %destination_path, ?err, "set_times_failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // symlinks
    // ---------------------------------------------------------------------

    fn copy_symlink(
        &self,
        source_host: &dyn VfsHost,
        source_path: &str,
        destination_path: &mut String,
    ) -> StepResult {
        let callbacks = &self.callbacks;
        let destination_host = &*self.destination_host;

        let link_value = loop {
            match source_host.read_symlink(source_path) {
                Ok(value) => break value,
                Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, source_host) {
                    CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                    CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };

        if let Ok(dst_stat) = destination_host.stat(destination_path, Flags::NO_FOLLOW) {
            let src_stat = loop {
                match source_host.stat(source_path, Flags::NO_FOLLOW) {
                    Ok(st) => break st,
                    Err(err) => match (callbacks.on_cant_access_source_item)(err, source_path, source_host) {
                        CantAccessSourceItemResolution::Skip => return StepResult::Skipped,
                        CantAccessSourceItemResolution::Stop => return StepResult::Stop,
                        CantAccessSourceItemResolution::Retry => continue,
                    },
                }
            };

            let same_entry = source_host.is_native_fs()
                && destination_host.is_native_fs()
                && src_stat.dev == dst_stat.dev
                && src_stat.inode == dst_stat.inode;
            if same_entry {
                return StepResult::Ok;
            }

            let mut keep_both = false;
            match (callbacks.on_rename_destination_already_exists)(&src_stat, &dst_stat, destination_path) {
                RenameDestExistsResolution::Skip => return StepResult::Skipped,
                RenameDestExistsResolution::OverwriteOld if !entry_is_older(&dst_stat, &src_stat) => {
                    return StepResult::Skipped
                }
                RenameDestExistsResolution::Overwrite | RenameDestExistsResolution::OverwriteOld => {}
                RenameDestExistsResolution::KeepBoth => {
                    let stopped = || self.base.is_stopped();
                    let fresh = find_non_existing_item_path(destination_path, destination_host, Some(&stopped));
                    if !fresh.is_empty() {
                        *destination_path = fresh;
                    }
                    keep_both = true;
                }
                RenameDestExistsResolution::Stop => return StepResult::Stop,
            }

            if !keep_both && destination_host.trash(destination_path).is_err() {
                loop {
                    let rc = if dst_stat.is_dir() {
                        destination_host.remove_directory(destination_path)
                    } else {
                        destination_host.unlink(destination_path)
                    };
                    match rc {
                        Ok(()) => break,
                        Err(err) => match (callbacks.on_cant_delete_destination_file)(
                            err,
                            destination_path,
                            destination_host,
                        ) {
                            CantDeleteDestinationFileResolution::Skip => return StepResult::Skipped,
                            CantDeleteDestinationFileResolution::Stop => return StepResult::Stop,
                            CantDeleteDestinationFileResolution::Retry => continue,
                        },
                    }
                }
            }
        }

        loop {
            match destination_host.create_symlink(destination_path, &link_value) {
                Ok(()) => return StepResult::Ok,
                Err(err) => match (callbacks.on_destination_file_write_error)(err, destination_path, destination_host)
                {
                    DestinationFileWriteErrorResolution::Skip => return StepResult::Skipped,
                    DestinationFileWriteErrorResolution::Stop => return StepResult::Stop,
                    DestinationFileWriteErrorResolution::Retry => continue,
                },
            }
        }
    }

    // ---------------------------------------------------------------------
    // verification & cleanup
    // ---------------------------------------------------------------------

    fn verify_copied_file(&mut self, expectation: &ChecksumExpectation) -> (StepResult, bool) {
        let Self {
            ref base,
            ref callbacks,
            ref destination_host,
            ref mut buffers,
            ..
        } = *self;
        let destination_host: &dyn VfsHost = &**destination_host;
        let path = &expectation.destination_path;

        let mut file = match destination_host.create_file(path) {
            Ok(file) => file,
            Err(err) => {
                return match (callbacks.on_destination_file_read_error)(err, path, destination_host) {
                    DestinationFileReadErrorResolution::Skip => (StepResult::Skipped, false),
                    DestinationFileReadErrorResolution::Stop => (StepResult::Stop, false),
                };
            }
        };
        if let Err(err) = file.open(OpenFlags::READ | OpenFlags::SH_LOCK | OpenFlags::NO_CACHE) {
            return match (callbacks.on_destination_file_read_error)(err, path, destination_host) {
                DestinationFileReadErrorResolution::Skip => (StepResult::Skipped, false),
                DestinationFileReadErrorResolution::Stop => (StepResult::Stop, false),
            };
        }

        let (mut buffer, other) = buffers
            .take()
            .unwrap_or_else(|| (vec![0u8; BUFFER_SIZE], vec![0u8; BUFFER_SIZE]));

        let mut context = md5::Context::new();
        let mut left = file.size();
        let mut failure = None;
        while left > 0 {
            base.block_if_paused();
            if base.is_stopped() {
                failure = Some(StepResult::Stop);
                break;
            }
            let chunk = (left as usize).min(buffer.len());
            match file.read(&mut buffer[..chunk]) {
                // a short file hashes short and fails the comparison
                Ok(0) => break,
                Ok(n) => {
                    left -= n as u64;
                    context.consume(&buffer[..n]);
                }
                Err(err) => match (callbacks.on_destination_file_read_error)(err, path, destination_host) {
                    DestinationFileReadErrorResolution::Skip => {
                        failure = Some(StepResult::Skipped);
                        break;
                    }
                    DestinationFileReadErrorResolution::Stop => {
                        failure = Some(StepResult::Stop);
                        break;
                    }
                },
            }
        }
        let _ = file.close();
        *buffers = Some((buffer, other));

        if let Some(failure) = failure {
            return (failure, false);
        }
        let digest = context.compute();
        (StepResult::Ok, expectation.matches(&digest.0))
    }

    /// Deletes moved-away sources in reverse scan order, children first.
    fn clear_source_items(&mut self) {
        let to_delete = std::mem::take(&mut self.items_to_delete);
        for &index in to_delete.iter().rev() {
            let is_dir = self.source_items.item_is_dir(index);
            let host = Arc::clone(self.source_items.item_host(index));
            let path = self.source_items.compose_full_path(index);
            self.clear_source_item(&path, is_dir, &*host);
            if self.stopped() {
                return;
            }
        }
    }

    fn clear_source_item(&self, path: &str, is_dir: bool, host: &dyn VfsHost) {
        let callbacks = &self.callbacks;
        loop {
            let rc = if is_dir { host.remove_directory(path) } else { host.unlink(path) };
            match rc {
                Ok(()) => return,
                Err(err) => {
                    if is_native_locked_item(err, path, host) {
                        match resolve_locked(&self.options, callbacks, LockedItemCause::Deletion, err, path, host) {
                            LockedItemResolution::Unlock => match do_unlock(callbacks, path, host) {
                                StepResult::Ok => continue,
                                StepResult::Skipped => return,
                                StepResult::Stop => {
                                    self.base.stop();
                                    return;
                                }
                            },
                            LockedItemResolution::Retry => continue,
                            LockedItemResolution::Skip => return,
                            LockedItemResolution::Stop => {
                                self.base.stop();
                                return;
                            }
                        }
                    }
                    match (callbacks.on_cant_delete_source_item)(err, path, host) {
                        CantDeleteSourceFileResolution::Skip => return,
                        CantDeleteSourceFileResolution::Stop => {
                            self.base.stop();
                            return;
                        }
                        CantDeleteSourceFileResolution::Retry => continue,
                    }
                }
            }
        }
    }
}

impl Job for CopyingJob {
    fn perform(&mut self) {
        self.set_stage(Stage::Preparing);

        let (composition, need_to_build) = self.analyze_initial_destination();
        self.composition = composition;
        if need_to_build && self.build_destination_directory() != StepResult::Ok {
            self.base.stop();
            return;
        }

        if self.destination_is_native {
            let Some(dev) = self.find_destination_dev() else {
                self.base.stop();
                return;
            };
            self.destination_dev = dev;
        }

        let (scan_result, db) = self.scan_source_items();
        if scan_result != StepResult::Ok {
            self.base.stop();
            return;
        }
        self.source_items = db;
        self.single_scanned_item = self.source_items.items_amount() == 1;

        self.process_items();

        if self.stopped() {
            return;
        }
        self.set_stage(Stage::Default);
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

/// The read side runs on the calling thread while the previous buffer's
/// write overlaps on a writer thread; both sides synchronise after every
/// read/write pair and rotate the two buffers.
#[allow(clippy::too_many_arguments)]
fn transfer_contents(
    buffers: &mut Buffers,
    base: &JobBase,
    callbacks: &CopyingCallbacks,
    src_file: &mut dyn VfsFile,
    dst_file: &mut dyn VfsFile,
    src_stat: &VfsStat,
    source_host: &dyn VfsHost,
    source_path: &str,
    destination_path: &str,
    destination_host: &dyn VfsHost,
    data_feedback: &mut Option<&mut Option<md5::Context>>,
) -> StepResult {
    let (mut read_buffer, mut write_buffer) = buffers
        .take()
        .unwrap_or_else(|| (vec![0u8; BUFFER_SIZE], vec![0u8; BUFFER_SIZE]));

    let src_io_size = src_file.preferred_io_size().clamp(1, BUFFER_SIZE);
    let dst_io_size = dst_file.preferred_io_size().clamp(1, BUFFER_SIZE);

    let mut bytes_to_write = 0usize;
    let mut source_bytes_read: u64 = 0;
    let mut destination_bytes_written: u64 = 0;
    let mut outcome = StepResult::Ok;

    std::thread::scope(|scope| {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<(Vec<u8>, usize)>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<(Vec<u8>, usize, Option<StepResult>)>(1);

        scope.spawn(move || {
            for (buffer, length) in work_rx.iter() {
                let mut left_to_write = length;
                let mut has_written = 0usize;
                let mut write_loops = 0u32;
                let mut failure = None;
                'write: while left_to_write > 0 {
                    let chunk = left_to_write.min(dst_io_size);
                    match dst_file.write(&buffer[has_written..has_written + chunk]) {
                        Ok(n) if n > 0 => {
                            has_written += n;
                            left_to_write -= n;
                            write_loops = 0;
                        }
                        result => {
                            let err = match result {
                                Err(err) => err,
                                Ok(_) => {
                                    write_loops += 1;
                                    if write_loops <= MAX_IO_LOOPS {
                                        continue;
                                    }
                                    VfsError::posix(libc::EIO)
                                }
                            };
                            match (callbacks.on_destination_file_write_error)(
                                err,
                                destination_path,
                                destination_host,
                            ) {
                                DestinationFileWriteErrorResolution::Skip => {
                                    failure = Some(StepResult::Skipped);
                                    break 'write;
                                }
                                DestinationFileWriteErrorResolution::Stop => {
                                    failure = Some(StepResult::Stop);
                                    break 'write;
                                }
                                DestinationFileWriteErrorResolution::Retry => continue,
                            }
                        }
                    }
                }
                if done_tx.send((buffer, has_written, failure)).is_err() || failure.is_some() {
                    return;
                }
            }
        });

        while destination_bytes_written != src_stat.size {
            base.block_if_paused();
            if base.is_stopped() {
                outcome = StepResult::Stop;
                return;
            }

            // hand the previous chunk to the writer
            if work_tx.send((std::mem::take(&mut write_buffer), bytes_to_write)).is_err() {
                outcome = StepResult::Stop;
                return;
            }

            // read the next chunk on this thread; a slow source is drained
            // up to the larger of the two preferred sizes
            let mut to_read = (src_io_size.max(dst_io_size) as u64)
                .min(src_stat.size - source_bytes_read) as usize;
            let mut has_read = 0usize;
            let mut read_loops = 0u32;
            let mut read_failure: Option<StepResult> = None;
            while to_read != 0 {
                let chunk = to_read.min(src_io_size);
                match src_file.read(&mut read_buffer[has_read..has_read + chunk]) {
                    Ok(n) if n > 0 => {
                        if let Some(feedback) = data_feedback.as_deref_mut() {
                            feedback
                                .get_or_insert_with(md5::Context::new)
                                .consume(&read_buffer[has_read..has_read + n]);
                        }
                        source_bytes_read += n as u64;
                        has_read += n;
                        to_read -= n;
                        read_loops = 0;
                    }
                    result => {
                        let err = match result {
                            Err(err) => err,
                            Ok(_) => {
                                read_loops += 1;
                                if read_loops <= MAX_IO_LOOPS {
                                    continue;
                                }
                                VfsError::posix(libc::EIO)
                            }
                        };
                        match (callbacks.on_source_file_read_error)(err, source_path, source_host) {
                            SourceFileReadErrorResolution::Skip => {
                                read_failure = Some(StepResult::Skipped);
                            }
                            SourceFileReadErrorResolution::Stop => {
                                read_failure = Some(StepResult::Stop);
                            }
                            SourceFileReadErrorResolution::Retry => continue,
                        }
                        break;
                    }
                }
            }

            // synchronise with the writer
            let Ok((returned_buffer, written_now, write_failure)) = done_rx.recv() else {
                outcome = StepResult::Stop;
                return;
            };
            write_buffer = returned_buffer;
            destination_bytes_written += written_now as u64;

            if let Some(failure) = write_failure {
                outcome = failure;
                return;
            }
            if let Some(failure) = read_failure {
                outcome = failure;
                return;
            }

            base.statistics().commit_processed(SourceType::Bytes, bytes_to_write as u64);

            std::mem::swap(&mut read_buffer, &mut write_buffer);
            bytes_to_write = has_read;
        }
    });

    if !read_buffer.is_empty() && !write_buffer.is_empty() {
        *buffers = Some((read_buffer, write_buffer));
    }
    outcome
}

/// Consults the operation-wide locked-item policy before asking.
fn resolve_locked(
    options: &CopyingOptions,
    callbacks: &CopyingCallbacks,
    cause: LockedItemCause,
    err: VfsError,
    path: &str,
    host: &dyn VfsHost,
) -> LockedItemResolution {
    use options::LockedItemBehavior;
    match options.locked_items_behavior {
        LockedItemBehavior::Ask => (callbacks.on_locked_item_issue)(cause, err, path, host),
        LockedItemBehavior::SkipAll => LockedItemResolution::Skip,
        LockedItemBehavior::UnlockAll => LockedItemResolution::Unlock,
        LockedItemBehavior::Stop => LockedItemResolution::Stop,
    }
}

fn do_unlock(callbacks: &CopyingCallbacks, path: &str, host: &dyn VfsHost) -> StepResult {
    loop {
        match unlock_item(path, host) {
            Ok(()) => return StepResult::Ok,
            Err(err) => match (callbacks.on_unlock_error)(err, path, host) {
                UnlockErrorResolution::Retry => continue,
                UnlockErrorResolution::Skip => return StepResult::Skipped,
                UnlockErrorResolution::Stop => return StepResult::Stop,
            },
        }
    }
}

/// EPERM on a native host with the immutable flag set in a no-follow stat.
fn is_native_locked_item(err: VfsError, path: &str, host: &dyn VfsHost) -> bool {
    if !err.is_posix(libc::EPERM) || !host.is_native_fs() {
        return false;
    }
    host.stat(path, Flags::NO_FOLLOW)
        .map(|st| st.flags & file_flags::UF_IMMUTABLE != 0)
        .unwrap_or(false)
}

fn unlock_item(path: &str, host: &dyn VfsHost) -> Result<(), VfsError> {
    let st = host.stat(path, Flags::NO_FOLLOW)?;
    host.set_flags(path, st.flags & !file_flags::UF_IMMUTABLE, Flags::NO_FOLLOW)
}

/// "._name" next to an existing "name" on a native volume without real
/// xattr support holds extended attributes, not payload.
fn is_external_ea_storage(host: &dyn VfsHost, path: &str, item_name: &str) -> bool {
    if !host.is_native_fs() || host.features().contains(HostFeatures::XATTRS) {
        return false;
    }
    let Some(origin_name) = item_name.strip_prefix("._") else {
        return false;
    };
    if origin_name.is_empty() {
        return false;
    }
    let Some(slash) = path.rfind('/') else {
        return false;
    };
    let origin = format!("{}{}", &path[..slash + 1], origin_name);
    host.exists(&origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "absolute")]
    fn rejects_a_relative_destination() {
        let host: VfsHostPtr = core_vfs::MemHost::new();
        let _ = CopyingJob::new(Vec::new(), "relative/path", host, CopyingOptions::default());
    }

    #[test]
    fn sidecar_detection_requires_a_sibling() {
        let host = core_vfs::MemHost::new();
        host.set_features(
            HostFeatures::SET_TIMES | HostFeatures::SET_PERMISSIONS | HostFeatures::SET_FLAGS,
        );
        let mut file = host.create_file("/origin").unwrap();
        file.open(OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        file.close().unwrap();

        assert!(is_external_ea_storage(&*host, "/._origin", "._origin"));
        assert!(!is_external_ea_storage(&*host, "/._orphan", "._orphan"));
        assert!(!is_external_ea_storage(&*host, "/._", "._"));
    }
}
