//! Knobs controlling a copy/move operation.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChecksumVerification {
    Never,
    WhenMoves,
    Always,
}

/// What to do when a destination entry already exists, decided up-front
/// for the whole operation. `Ask` routes every conflict through the
/// destination-exists callback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistBehavior {
    Ask,
    SkipAll,
    OverwriteAll,
    OverwriteOld,
    AppendAll,
    Stop,
    KeepBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockedItemBehavior {
    Ask,
    SkipAll,
    UnlockAll,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct CopyingOptions {
    /// false turns the operation into renaming/moving.
    pub docopy: bool,
    pub preserve_symlinks: bool,
    pub copy_xattrs: bool,
    pub copy_file_times: bool,
    pub copy_unix_flags: bool,
    pub copy_unix_owners: bool,
    pub disable_system_caches: bool,
    pub verification: ChecksumVerification,
    pub exist_behavior: ExistBehavior,
    pub locked_items_behavior: LockedItemBehavior,
}

impl Default for CopyingOptions {
    fn default() -> Self {
        Self {
            docopy: true,
            preserve_symlinks: true,
            copy_xattrs: true,
            copy_file_times: true,
            copy_unix_flags: true,
            copy_unix_owners: true,
            disable_system_caches: false,
            verification: ChecksumVerification::Never,
            exist_behavior: ExistBehavior::Ask,
            locked_items_behavior: LockedItemBehavior::Ask,
        }
    }
}
