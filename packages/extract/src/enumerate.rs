//! Lists media files under a library root.
//!
//! The order is deterministic for an unchanged tree (entries are sorted by
//! file name at every level), but the indexing stage still persists the
//! list it gets rather than re-enumerating on resume.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::{ExtractError, MediaKind};

/// Returns every image/video file under `root`, skipping hidden files and
/// directories.
///
/// Unreadable entries are logged and skipped.
///
/// # Errors
///
/// Returns [`ExtractError::LibraryNotFound`] if `root` is not a directory.
pub fn enumerate_media(root: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    if !root.is_dir() {
        return Err(ExtractError::LibraryNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut unreadable = 0u64;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable library entry: {e}");
                unreadable += 1;
                continue;
            }
        };

        if entry.file_type().is_file() && MediaKind::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }

    log::info!(
        "Found {} media files under {} ({unreadable} unreadable entries)",
        files.len(),
        root.display()
    );

    Ok(files)
}

/// Path of `path` relative to the library root, for display and storage.
#[must_use]
pub fn relative_filename(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn lists_media_in_stable_order() {
        let root = std::env::temp_dir().join("media_atlas_enumerate_order");
        let _ = std::fs::remove_dir_all(&root);

        touch(&root.join("2021/b.JPG"));
        touch(&root.join("2021/a.mov"));
        touch(&root.join("2020/z.heic"));
        touch(&root.join("2020/notes.txt"));
        touch(&root.join(".thumbnails/x.jpg"));
        touch(&root.join("2020/.hidden.png"));

        let files = enumerate_media(&root).unwrap();
        let names: Vec<String> = files.iter().map(|p| relative_filename(&root, p)).collect();
        let expected: Vec<String> = ["2020/z.heic", "2021/a.mov", "2021/b.JPG"]
            .iter()
            .map(|p| Path::new(p).to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, expected);

        assert_eq!(enumerate_media(&root).unwrap(), files);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = std::env::temp_dir().join("media_atlas_enumerate_missing");
        let _ = std::fs::remove_dir_all(&root);
        assert!(matches!(
            enumerate_media(&root),
            Err(ExtractError::LibraryNotFound(_))
        ));
    }

    #[test]
    fn relative_filename_falls_back_to_full_path() {
        assert_eq!(
            relative_filename(Path::new("/lib"), Path::new("/other/a.jpg")),
            "/other/a.jpg"
        );
    }
}
