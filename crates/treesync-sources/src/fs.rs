/// Filesystem adapter: directories are containers, everything else a leaf.
///
/// Identities are absolute paths, so a rename or move rewrites a whole
/// subtree by prefix substitution. Listing uses one `read_dir` pass per
/// directory; recursive copies for drag-and-drop go through `jwalk`.
use compact_str::CompactString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use treesync_core::{Element, NodeKind, Source, SourceError};

/// A handle to one path. Cheap: no metadata is cached beyond `is_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl FsEntry {
    /// Stat `path` without following a trailing symlink.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let meta = fs::symlink_metadata(&path).map_err(|e| SourceError::io(&path, e))?;
        Ok(Self {
            is_dir: meta.is_dir(),
            path,
        })
    }
}

impl Element for FsEntry {
    type Id = PathBuf;

    fn identity(&self) -> PathBuf {
        self.path.clone()
    }

    fn display_name(&self) -> CompactString {
        CompactString::new(display_name(&self.path))
    }

    fn kind(&self) -> NodeKind {
        if self.is_dir {
            NodeKind::Container
        } else {
            NodeKind::Leaf
        }
    }

    fn read_children(&self) -> Result<Vec<Self>, SourceError> {
        if !self.is_dir {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.path).map_err(|e| SourceError::io(&self.path, e))?;
        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    trace!(dir = %self.path.display(), %err, "skipping unreadable entry");
                    continue;
                }
            };
            // `DirEntry::file_type` does not follow symlinks.
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            children.push(FsEntry {
                path: entry.path(),
                is_dir,
            });
        }
        Ok(children)
    }

    fn accept(&self, candidate: &Self, is_copy: bool) -> Result<Option<PathBuf>, SourceError> {
        if !self.is_dir {
            return Err(SourceError::Rejected(format!("{} is not a directory", self.path.display())));
        }
        let name = candidate
            .path
            .file_name()
            .ok_or_else(|| SourceError::Rejected(format!("cannot transfer {}", candidate.path.display())))?;
        let dest = self.path.join(name);
        if dest.exists() {
            return Err(SourceError::Rejected(format!("{} already exists", dest.display())));
        }

        if is_copy {
            copy_entry(candidate, &dest)?;
        } else {
            fs::rename(&candidate.path, &dest).map_err(|e| SourceError::io(&candidate.path, e))?;
        }
        debug!(
            from = %candidate.path.display(),
            to = %dest.display(),
            copy = is_copy,
            "transfer complete"
        );
        Ok(Some(dest))
    }

    fn relocated(&self, id: &PathBuf) -> Self {
        Self {
            path: id.clone(),
            is_dir: self.is_dir,
        }
    }
}

/// Copy a file, or a directory with everything below it, to `dest`.
fn copy_entry(src: &FsEntry, dest: &Path) -> Result<(), SourceError> {
    if !src.is_dir {
        fs::copy(&src.path, dest).map_err(|e| SourceError::io(&src.path, e))?;
        return Ok(());
    }

    let walker = jwalk::WalkDir::new(&src.path)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true);
    for entry in walker {
        let entry = entry.map_err(|e| SourceError::io(&src.path, io::Error::other(e)))?;
        let path = entry.path();
        let rel = path.strip_prefix(&src.path).unwrap_or(Path::new(""));
        let target = if rel.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(rel)
        };
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| SourceError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| SourceError::io(parent, e))?;
            }
            fs::copy(&path, &target).map_err(|e| SourceError::io(&path, e))?;
        }
    }
    Ok(())
}

/// The name shown for a path: its last component, or the whole path for
/// a filesystem root ("/" or "C:\").
pub fn display_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            let s = path.to_string_lossy();
            let trimmed = s.trim_end_matches(['/', '\\']);
            if trimmed.is_empty() {
                s.into_owned()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// A directory tree rooted at one path.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// A relative `root` is made absolute against the current directory, so
    /// identities never carry a `./` prefix. Symlinks are left alone.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

impl Source for FsSource {
    type Element = FsEntry;

    fn root(&self) -> Result<FsEntry, SourceError> {
        let entry = FsEntry::open(&self.root)?;
        if !entry.is_dir {
            return Err(SourceError::Rejected(format!("{} is not a directory", self.root.display())));
        }
        Ok(entry)
    }

    fn resolve(&self, id: &PathBuf) -> Option<FsEntry> {
        if !self.contains(id) {
            return None;
        }
        FsEntry::open(id).ok()
    }

    fn parent_of(&self, id: &PathBuf) -> Option<PathBuf> {
        if id == &self.root || !self.contains(id) {
            return None;
        }
        id.parent().map(Path::to_path_buf)
    }
}
