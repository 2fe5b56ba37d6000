//! Per-error resolution callbacks of the copying job.
//!
//! Every failure path is resolved through one of these; defaults answer
//! Stop so a non-interactive run fails closed. Each resolution alphabet
//! is a closed set: the job never invents outcomes outside it.

use core_vfs::{VfsError, VfsHost, VfsStat};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantAccessSourceItemResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDestExistsResolution {
    Stop,
    Skip,
    Overwrite,
    OverwriteOld,
    Append,
    KeepBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameDestExistsResolution {
    Stop,
    Skip,
    Overwrite,
    OverwriteOld,
    KeepBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantOpenDestinationFileResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFileReadErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationFileReadErrorResolution {
    Stop,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationFileWriteErrorResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantCreateDestinationRootDirResolution {
    Stop,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantCreateDestinationDirResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantDeleteDestinationFileResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CantDeleteSourceFileResolution {
    Stop,
    Skip,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotADirectoryResolution {
    Stop,
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedItemResolution {
    Stop,
    Skip,
    Unlock,
    Retry,
}

/// What the locked item was being subjected to when the lock fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedItemCause {
    Moving,
    Deletion,
    Opening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockErrorResolution {
    Stop,
    Skip,
    Retry,
}

pub struct CopyingCallbacks {
    pub on_cant_access_source_item:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantAccessSourceItemResolution + Send + Sync>,
    pub on_copy_destination_already_exists:
        Box<dyn Fn(&VfsStat, &VfsStat, &str) -> CopyDestExistsResolution + Send + Sync>,
    pub on_rename_destination_already_exists:
        Box<dyn Fn(&VfsStat, &VfsStat, &str) -> RenameDestExistsResolution + Send + Sync>,
    pub on_cant_open_destination_file:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantOpenDestinationFileResolution + Send + Sync>,
    pub on_source_file_read_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> SourceFileReadErrorResolution + Send + Sync>,
    pub on_destination_file_read_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> DestinationFileReadErrorResolution + Send + Sync>,
    pub on_destination_file_write_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> DestinationFileWriteErrorResolution + Send + Sync>,
    pub on_cant_create_destination_root_dir:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantCreateDestinationRootDirResolution + Send + Sync>,
    pub on_cant_create_destination_dir:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantCreateDestinationDirResolution + Send + Sync>,
    pub on_cant_delete_destination_file:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantDeleteDestinationFileResolution + Send + Sync>,
    pub on_cant_delete_source_item:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> CantDeleteSourceFileResolution + Send + Sync>,
    pub on_not_a_directory: Box<dyn Fn(&str, &dyn VfsHost) -> NotADirectoryResolution + Send + Sync>,
    pub on_locked_item_issue:
        Box<dyn Fn(LockedItemCause, VfsError, &str, &dyn VfsHost) -> LockedItemResolution + Send + Sync>,
    pub on_unlock_error:
        Box<dyn Fn(VfsError, &str, &dyn VfsHost) -> UnlockErrorResolution + Send + Sync>,
    pub on_file_verification_failed: Box<dyn Fn(&str, &dyn VfsHost) + Send + Sync>,
    pub on_stage_changed: Box<dyn Fn() + Send + Sync>,
}

impl Default for CopyingCallbacks {
    fn default() -> Self {
        Self {
            on_cant_access_source_item: Box::new(|_, _, _| CantAccessSourceItemResolution::Stop),
            on_copy_destination_already_exists: Box::new(|_, _, _| CopyDestExistsResolution::Stop),
            on_rename_destination_already_exists: Box::new(|_, _, _| RenameDestExistsResolution::Stop),
            on_cant_open_destination_file: Box::new(|_, _, _| CantOpenDestinationFileResolution::Stop),
            on_source_file_read_error: Box::new(|_, _, _| SourceFileReadErrorResolution::Stop),
            on_destination_file_read_error: Box::new(|_, _, _| DestinationFileReadErrorResolution::Stop),
            on_destination_file_write_error: Box::new(|_, _, _| DestinationFileWriteErrorResolution::Stop),
            on_cant_create_destination_root_dir: Box::new(|_, _, _| {
                CantCreateDestinationRootDirResolution::Stop
            }),
            on_cant_create_destination_dir: Box::new(|_, _, _| CantCreateDestinationDirResolution::Stop),
            on_cant_delete_destination_file: Box::new(|_, _, _| CantDeleteDestinationFileResolution::Stop),
            on_cant_delete_source_item: Box::new(|_, _, _| CantDeleteSourceFileResolution::Stop),
            on_not_a_directory: Box::new(|_, _| NotADirectoryResolution::Stop),
            on_locked_item_issue: Box::new(|_, _, _, _| LockedItemResolution::Stop),
            on_unlock_error: Box::new(|_, _, _| UnlockErrorResolution::Stop),
            on_file_verification_failed: Box::new(|_, _| {}),
            on_stage_changed: Box::new(|| {}),
        }
    }
}
