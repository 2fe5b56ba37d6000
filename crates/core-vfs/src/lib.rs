//! Virtual file system contract consumed by the operations engine.
//!
//! The trait pair `VfsHost`/`VfsFile` is the seam between jobs and
//! backends. Two backends ship with the crate: the native host over the
//! local filesystem and an in-memory host carrying the full capability
//! surface for tests and scratch trees.

pub mod error;
pub mod file;
pub mod helpers;
pub mod host;
pub mod listing;
pub mod mem;
pub mod native;
pub mod stat;

pub use error::{ErrorDomain, VfsError, VfsResult};
pub use file::{OpenFlags, SeekWhence, VfsFile};
pub use helpers::find_non_existing_item_path;
pub use host::{
    ensure_trailing_slash, lowercase_equal, CancelChecker, DirEnt, DirEntType, Flags, HostFeatures,
    SetTimes, VfsHost, VfsHostPtr,
};
pub use listing::ListingItem;
pub use mem::MemHost;
pub use native::NativeHost;
pub use stat::{entry_is_older, file_flags, mode, StatMeaning, TimeSpec, VfsStat};
