//! Compression job: packs the source set into a ZIP on the destination
//! host, streaming file contents through the VFS file surface. Supports
//! optional AES-256 encryption and writes a placeholder entry for an
//! empty source set so the produced archive is never an invalid file.

use std::io::{self, Seek, Write};
use std::sync::Arc;

use core_vfs::{
    ensure_trailing_slash, find_non_existing_item_path, Flags, ListingItem, OpenFlags, SeekWhence,
    VfsError, VfsFile, VfsHost, VfsHostPtr,
};
use zip::write::{FileOptions, SimpleFileOptions};
use zip::{AesMode, CompressionMethod, ZipWriter};

use crate::job::{ItemStatus, Job, JobBase};
use crate::path_arena::{PathArena, PathNode};
use crate::statistics::SourceType;

const STREAM_CHUNK: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantAccessSourceItemResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceReadErrorResolution {
    Stop,
    Skip,
}

pub struct CompressionCallbacks {
    pub on_cant_access_source_item:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantAccessSourceItemResolution + Send + Sync>,
    pub on_source_read_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> SourceReadErrorResolution + Send + Sync>,
    pub on_target_write_error: Box<dyn Fn(VfsError, &str, &dyn VfsHost) + Send + Sync>,
    /// Fired once the archive filename has been chosen.
    pub on_target_path_defined: Box<dyn Fn(&str) + Send + Sync>,
}

impl Default for CompressionCallbacks {
    fn default() -> Self {
        Self {
            on_cant_access_source_item: Box::new(|_, _, _| CantAccessSourceItemResolution::Stop),
            on_source_read_error: Box::new(|_, _, _| SourceReadErrorResolution::Stop),
            on_target_write_error: Box::new(|_, _, _| {}),
            on_target_path_defined: Box::new(|_| {}),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Regular,
    Directory,
    Symlink,
}

struct ItemMeta {
    filename: PathNode,
    base_path_index: u16,
    base_host_index: u16,
    kind: EntryKind,
}

#[derive(Default)]
struct Source {
    filenames: PathArena,
    metas: Vec<ItemMeta>,
    hosts: Vec<VfsHostPtr>,
    base_paths: Vec<String>,
}

impl Source {
    fn find_or_insert_host(&mut self, host: &VfsHostPtr) -> u16 {
        if let Some(i) = self.hosts.iter().position(|h| Arc::ptr_eq(h, host)) {
            return i as u16;
        }
        self.hosts.push(Arc::clone(host));
        (self.hosts.len() - 1) as u16
    }

    fn find_or_insert_base_path(&mut self, path: &str) -> u16 {
        let path = ensure_trailing_slash(path.to_string());
        if let Some(i) = self.base_paths.iter().position(|p| p == &path) {
            return i as u16;
        }
        self.base_paths.push(path);
        (self.base_paths.len() - 1) as u16
    }
}

pub struct CompressionJob {
    base: JobBase,
    pub callbacks: CompressionCallbacks,
    initial_items: Vec<ListingItem>,
    dst_root: String,
    dst_host: VfsHostPtr,
    password: String,
    target_archive_path: String,
    source: Source,
}

impl CompressionJob {
    pub fn new(
        items: Vec<ListingItem>,
        dst_root: &str,
        dst_host: VfsHostPtr,
        password: String,
    ) -> Self {
        let job = Self {
            base: JobBase::new(),
            callbacks: CompressionCallbacks::default(),
            initial_items: items,
            dst_root: ensure_trailing_slash(dst_root.to_string()),
            dst_host,
            password,
            target_archive_path: String::new(),
            source: Source::default(),
        };
        job.base.statistics().set_preferred_source(SourceType::Bytes);
        job
    }

    pub fn target_archive_path(&self) -> &str {
        &self.target_archive_path
    }

    pub fn is_encrypted(&self) -> bool {
        !self.password.is_empty()
    }

    fn stopped(&self) -> bool {
        self.base.block_if_paused();
        self.base.is_stopped()
    }

    fn find_suitable_filename(&self, proposed: &str) -> String {
        let path = format!("{}{}.zip", self.dst_root, proposed);
        if !self.dst_host.exists(&path) {
            return path;
        }
        let stopped = || self.base.is_stopped();
        find_non_existing_item_path(&path, &*self.dst_host, Some(&stopped))
    }

    fn entry_options(&self, mode: u16) -> FileOptions<'_, ()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(u32::from(mode & 0o7777))
            .large_file(true);
        if self.password.is_empty() {
            options
        } else {
            options.with_aes_encryption(AesMode::Aes256, &self.password)
        }
    }

    // -----------------------------------------------------------------
    // scanning
    // -----------------------------------------------------------------

    fn scan_items(&mut self) -> bool {
        for index in 0..self.initial_items.len() {
            if self.stopped() {
                return false;
            }
            let item = self.initial_items[index].clone();
            if !self.scan_item(&item) {
                return false;
            }
        }
        true
    }

    fn scan_item(&mut self, item: &ListingItem) -> bool {
        let host_index = self.source.find_or_insert_host(item.host());
        let base_index = self.source.find_or_insert_base_path(item.directory());
        self.scan_entry(item.filename(), &item.path(), None, host_index, base_index)
    }

    fn scan_entry(
        &mut self,
        name: &str,
        full_path: &str,
        parent: Option<PathNode>,
        host_index: u16,
        base_index: u16,
    ) -> bool {
        let host = Arc::clone(&self.source.hosts[host_index as usize]);

        let st = loop {
            match host.stat(full_path, Flags::NO_FOLLOW) {
                Ok(st) => break st,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, full_path, &*host) {
                    CantAccessSourceItemResolution::Skip => return true,
                    CantAccessSourceItemResolution::Stop => {
                        self.base.stop();
                        return false;
                    }
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };

        if st.is_reg() {
            let node = self.source.filenames.push(name.to_string(), parent);
            self.source.metas.push(ItemMeta {
                filename: node,
                base_path_index: base_index,
                base_host_index: host_index,
                kind: EntryKind::Regular,
            });
            self.base.statistics().commit_estimated(SourceType::Bytes, st.size);
        } else if st.is_symlink() {
            let node = self.source.filenames.push(name.to_string(), parent);
            self.source.metas.push(ItemMeta {
                filename: node,
                base_path_index: base_index,
                base_host_index: host_index,
                kind: EntryKind::Symlink,
            });
        } else if st.is_dir() {
            let node = self
                .source
                .filenames
                .push(ensure_trailing_slash(name.to_string()), parent);
            self.source.metas.push(ItemMeta {
                filename: node,
                base_path_index: base_index,
                base_host_index: host_index,
                kind: EntryKind::Directory,
            });

            let mut entries = Vec::new();
            loop {
                if self.stopped() {
                    return false;
                }
                entries.clear();
                let rc = host.iterate_directory_listing(full_path, &mut |e| {
                    entries.push(e.name.clone());
                    true
                });
                match rc {
                    Ok(()) => break,
                    Err(err) => {
                        match (self.callbacks.on_cant_access_source_item)(err, full_path, &*host) {
                            CantAccessSourceItemResolution::Skip => return true,
                            CantAccessSourceItemResolution::Stop => {
                                self.base.stop();
                                return false;
                            }
                            CantAccessSourceItemResolution::Retry => continue,
                        }
                    }
                }
            }
            for entry in entries {
                if self.stopped() {
                    return false;
                }
                let nested = format!("{}/{}", full_path.trim_end_matches('/'), entry);
                if !self.scan_entry(&entry, &nested, Some(node), host_index, base_index) {
                    return false;
                }
            }
        }
        true
    }

    // -----------------------------------------------------------------
    // archive writing
    // -----------------------------------------------------------------

    fn build_archive(&self) -> bool {
        let mut target = match self.dst_host.create_file(&self.target_archive_path) {
            Ok(file) => file,
            Err(err) => {
                (self.callbacks.on_target_write_error)(err, &self.target_archive_path, &*self.dst_host);
                self.base.stop();
                return false;
            }
        };
        let open_flags = OpenFlags::WRITE
            | OpenFlags::CREATE
            | OpenFlags::IRUSR
            | OpenFlags::IWUSR
            | OpenFlags::IRGRP;
        if let Err(err) = target.open(open_flags) {
            (self.callbacks.on_target_write_error)(err, &self.target_archive_path, &*self.dst_host);
            self.base.stop();
            return false;
        }

        let writer = VfsFileWriter { file: target };
        let mut zip = ZipWriter::new(writer);

        let mut ok = true;
        if self.source.metas.is_empty() {
            // an archive without a single entry confuses unpackers
            let _ = zip.add_directory("", SimpleFileOptions::default());
        } else {
            for index in 0..self.source.metas.len() {
                if self.stopped() {
                    ok = false;
                    break;
                }
                if !self.process_entry(&mut zip, index) {
                    ok = false;
                    break;
                }
            }
        }

        let finished = match zip.finish() {
            Ok(mut writer) => writer.file.close().is_ok(),
            Err(err) => {
                tracing::warn!(target: "ops.compression", ?err, "archive_finalisation_failed");
                false
            }
        };

        if !ok || !finished {
            let _ = self.dst_host.unlink(&self.target_archive_path);
            self.base.stop();
            return false;
        }
        true
    }

    fn process_entry(&self, zip: &mut ZipWriter<VfsFileWriter>, index: usize) -> bool {
        let meta = &self.source.metas[index];
        let kind = meta.kind;
        let host = Arc::clone(&self.source.hosts[meta.base_host_index as usize]);
        let relative = self.source.filenames.compose(meta.filename);
        let full_path = format!(
            "{}{}",
            self.source.base_paths[meta.base_path_index as usize], relative
        );

        match kind {
            EntryKind::Directory => self.write_directory_entry(zip, &relative, &full_path, &*host),
            EntryKind::Symlink => self.write_symlink_entry(zip, &relative, &full_path, &*host),
            EntryKind::Regular => self.write_regular_entry(zip, &relative, &full_path, &*host),
        }
    }

    fn write_directory_entry(
        &self,
        zip: &mut ZipWriter<VfsFileWriter>,
        relative: &str,
        full_path: &str,
        host: &dyn VfsHost,
    ) -> bool {
        let mode = host
            .stat(full_path, Flags::NO_FOLLOW)
            .map(|st| st.mode)
            .unwrap_or(0o755);
        if let Err(err) = zip.add_directory(relative.trim_end_matches('/'), self.entry_options(mode)) {
            tracing::warn!(target: "ops.compression", path = %relative, ?err, "directory_entry_failed");
            return false;
        }
        true
    }

    fn write_symlink_entry(
        &self,
        zip: &mut ZipWriter<VfsFileWriter>,
        relative: &str,
        full_path: &str,
        host: &dyn VfsHost,
    ) -> bool {
        let value = loop {
            match host.read_symlink(full_path) {
                Ok(value) => break value,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, full_path, host) {
                    CantAccessSourceItemResolution::Skip => return true,
                    CantAccessSourceItemResolution::Stop => return false,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };
        if let Err(err) = zip.add_symlink(relative, &value, self.entry_options(0o777)) {
            tracing::warn!(target: "ops.compression", path = %relative, ?err, "symlink_entry_failed");
            return false;
        }
        true
    }

    fn write_regular_entry(
        &self,
        zip: &mut ZipWriter<VfsFileWriter>,
        relative: &str,
        full_path: &str,
        host: &dyn VfsHost,
    ) -> bool {
        let st = loop {
            match host.stat(full_path, Flags::NO_FOLLOW) {
                Ok(st) => break st,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, full_path, host) {
                    CantAccessSourceItemResolution::Skip => return true,
                    CantAccessSourceItemResolution::Stop => return false,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };

        let mut file = loop {
            match host.create_file(full_path) {
                Ok(file) => break file,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, full_path, host) {
                    CantAccessSourceItemResolution::Skip => return true,
                    CantAccessSourceItemResolution::Stop => return false,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        };
        loop {
            match file.open(OpenFlags::READ | OpenFlags::SH_LOCK) {
                Ok(()) => break,
                Err(err) => match (self.callbacks.on_cant_access_source_item)(err, full_path, host) {
                    CantAccessSourceItemResolution::Skip => return true,
                    CantAccessSourceItemResolution::Stop => return false,
                    CantAccessSourceItemResolution::Retry => continue,
                },
            }
        }

        if let Err(err) = zip.start_file(relative, self.entry_options(st.mode)) {
            tracing::warn!(target: "ops.compression", path = %relative, ?err, "file_entry_failed");
            return false;
        }

        let mut buffer = vec![0u8; STREAM_CHUNK];
        loop {
            if self.stopped() {
                return false;
            }
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => match (self.callbacks.on_source_read_error)(err, full_path, host) {
                    SourceReadErrorResolution::Skip => {
                        self.base
                            .statistics()
                            .commit_skipped(SourceType::Bytes, st.size);
                        self.base.tell_item_report(host, full_path, ItemStatus::Skipped);
                        return true;
                    }
                    SourceReadErrorResolution::Stop => return false,
                },
            };
            if let Err(err) = zip.write_all(&buffer[..n]) {
                tracing::warn!(target: "ops.compression", path = %relative, ?err, "archive_write_failed");
                return false;
            }
            self.base
                .statistics()
                .commit_processed(SourceType::Bytes, n as u64);
        }
        let _ = file.close();
        self.base.tell_item_report(host, full_path, ItemStatus::Processed);
        true
    }
}

impl Job for CompressionJob {
    fn perform(&mut self) {
        let proposed = if self.initial_items.len() == 1 {
            self.initial_items[0].filename().to_string()
        } else {
            "Archive".to_string()
        };

        self.target_archive_path = self.find_suitable_filename(&proposed);
        if self.target_archive_path.is_empty() {
            self.base.stop();
            return;
        }
        (self.callbacks.on_target_path_defined)(&self.target_archive_path);

        if !self.scan_items() {
            return;
        }

        self.build_archive();
    }

    fn base(&self) -> &JobBase {
        &self.base
    }
}

/// Adapts the archive writer's byte stream onto a VFS file.
struct VfsFileWriter {
    file: Box<dyn VfsFile>,
}

impl Write for VfsFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .write(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for VfsFileWriter {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(offset) => (offset as i64, SeekWhence::Set),
            io::SeekFrom::Current(offset) => (offset, SeekWhence::Current),
            io::SeekFrom::End(offset) => (offset, SeekWhence::End),
        };
        self.file
            .seek(offset, whence)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}
