use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::constants::classify::INPUT_SUFFIX;
use crate::filter::SegmentFilter;

/// Input files found directly inside one directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryUnit {
    /// Directory holding the files.
    pub dir: PathBuf,
    /// `.csv.gz` files, sorted by name.
    pub files: Vec<PathBuf>,
}

/// Filesystem transport that yields the input tree one directory at a time.
///
/// Directories with an excluded segment are pruned: neither they nor anything
/// below them is read.
pub struct DirectoryWalker {
    root: PathBuf,
    filter: SegmentFilter,
    follow_links: bool,
}

impl DirectoryWalker {
    /// Create a walker rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, filter: SegmentFilter) -> Self {
        Self {
            root: root.into(),
            filter,
            follow_links: false,
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Lazily walk the tree top-down, one unit per visited directory.
    ///
    /// Directories are visited in file-name order so repeated runs see the
    /// same sequence. Unreadable entries are logged and skipped.
    pub fn units(&self) -> impl Iterator<Item = DirectoryUnit> + '_ {
        WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(root = %self.root.display(), error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| DirectoryUnit {
                files: list_input_files(entry.path(), self.follow_links),
                dir: entry.into_path(),
            })
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let segments = relative_segments(&self.root, entry.path());
        self.filter.prunes(&segments)
    }
}

/// True if the path ends in `.csv.gz`.
pub fn is_input_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(INPUT_SUFFIX))
}

/// `.csv.gz` regular files directly in `dir`. Symlinked files only count
/// when links are followed.
fn list_input_files(dir: &Path, follow_links: bool) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed listing directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_ok_and(|file_type| {
                file_type.is_file()
                    || (follow_links && file_type.is_symlink() && entry.path().is_file())
            })
        })
        .map(|entry| entry.path())
        .filter(|path| is_input_file(path))
        .collect();
    files.sort();
    files
}

fn relative_segments(root: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(root)
        .map(|relative| {
            relative
                .iter()
                .map(|part| part.to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}
