//! Filesystem helpers shared by the fetcher and the rewriter

use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

/// Unique scratch file in the same directory as `destination`, to be
/// renamed onto it when complete. Every invocation gets its own file, so
/// overlapping cycles writing the same artifact each publish one complete
/// body and the last rename wins; readers never see interleaved writes.
/// A scratch file that is never persisted is deleted on drop.
pub fn scratch_for(destination: &Path) -> io::Result<NamedTempFile> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let stem = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!("{stem}."))
        .suffix(".part")
        .tempfile_in(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_files_are_unique_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("list_matched.m3u");

        let a = scratch_for(&dest).unwrap();
        let b = scratch_for(&dest).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), Some(dir.path()));
        assert!(a.path().to_string_lossy().ends_with(".part"));
    }

    #[test]
    fn test_unpersisted_scratch_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("list.m3u");

        let path = {
            let scratch = scratch_for(&dest).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
