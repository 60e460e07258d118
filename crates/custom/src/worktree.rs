//! Working copy of the template tree

use kiwix_core::error::Result;
use kiwix_core::tree::remove_path;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFIX: &str = "android-custom-";

/// Directory the custom app is generated in
///
/// When marked disposable the tree is removed on drop, so an aborted run
/// that asked for `--clean` does not leave it behind.
#[derive(Debug)]
pub struct WorkTree {
    path: PathBuf,
    disposable: bool,
}

impl WorkTree {
    /// Reserve a fresh, empty directory next to the template
    pub fn reserve(template_dir: &Path) -> Result<Self> {
        let template_dir = std::path::absolute(template_dir)?;
        let parent = template_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| template_dir.clone());
        let path = parent.join(format!("{}{}", PREFIX, uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;
        debug!(path = %path.display(), "work tree reserved");
        Ok(Self {
            path,
            disposable: false,
        })
    }

    /// Reuse an existing directory, e.g. to resume a partial run
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = std::path::absolute(path.into())?;
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            disposable: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_disposable(&mut self, disposable: bool) {
        self.disposable = disposable;
    }

    pub fn is_disposable(&self) -> bool {
        self.disposable
    }
}

impl Drop for WorkTree {
    fn drop(&mut self) {
        if self.disposable {
            if let Err(e) = remove_path(&self.path) {
                warn!(path = %self.path.display(), error = %e, "could not remove work tree");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_next_to_template() {
        let root = tempfile::tempdir().unwrap();
        let template = root.path().join("kiwix-android");
        std::fs::create_dir_all(&template).unwrap();

        let tree = WorkTree::reserve(&template).unwrap();
        assert_eq!(tree.path().parent(), Some(root.path()));
        assert!(tree
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(PREFIX));
        assert!(tree.path().is_dir());
    }

    #[test]
    fn test_disposable_tree_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let kept = WorkTree::at(root.path().join("kept")).unwrap();
        let path = kept.path().to_path_buf();
        drop(kept);
        assert!(path.is_dir());

        let mut tree = WorkTree::at(root.path().join("gone")).unwrap();
        tree.set_disposable(true);
        let path = tree.path().to_path_buf();
        drop(tree);
        assert!(!path.exists());
    }
}
