//! Path helpers shared by the operation jobs.

use crate::host::{CancelChecker, VfsHost};

/// Proposes the first "name N[.ext]" path, N >= 2, that does not exist on
/// the host. `existing` itself is never probed. Returns an empty string
/// when cancelled.
pub fn find_non_existing_item_path(
    existing: &str,
    host: &dyn VfsHost,
    cancel: Option<CancelChecker<'_>>,
) -> String {
    let (stem, extension) = match split_extension(existing) {
        Some((stem, ext)) => (format!("{stem} "), ext.to_string()),
        None => (format!("{existing} "), String::new()),
    };

    let cancelled = || cancel.map(|c| c()).unwrap_or(false);
    for index in 2.. {
        if cancelled() {
            return String::new();
        }
        let path = format!("{stem}{index}{extension}");
        if !host.exists(&path) {
            if cancelled() {
                return String::new();
            }
            return path;
        }
    }
    unreachable!()
}

/// Splits "/dir/name.ext" into ("/dir/name", ".ext"). A leading dot of a
/// hidden file is not an extension separator.
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let filename_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let filename = &path[filename_start..];
    let dot = filename.rfind('.')?;
    if dot == 0 {
        return None;
    }
    let split = filename_start + dot;
    Some((&path[..split], &path[split..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_splitting() {
        assert_eq!(split_extension("/d/item.zip"), Some(("/d/item", ".zip")));
        assert_eq!(split_extension("/d/item"), None);
        assert_eq!(split_extension("/d/.hidden"), None);
        assert_eq!(split_extension("/d.ir/item"), None);
    }
}
