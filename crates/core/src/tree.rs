//! Directory tree operations: copy, move, prune

use crate::error::{Error, ErrorCode, Result, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copy `src` into `dst` recursively, keeping symlinks as symlinks
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Err(Error::new(
            ErrorCode::DirectoryNotFound,
            format!("Template tree not found: {}", src.display()),
        ));
    }

    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(Error::from)
                .context(format!("copying {}", entry.path().display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(windows)]
fn symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(link, target)?;
    Ok(())
}

/// Symlink `target` into `dir` under its own file name, replacing any previous entry
pub fn link_into(target: &Path, dir: &Path) -> Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| {
        Error::new(ErrorCode::InvalidPath, format!("Nothing to link: {}", target.display()))
    })?;
    fs::create_dir_all(dir)?;
    let link = dir.join(name);
    remove_path(&link)?;
    symlink_dir(target, &link)?;
    Ok(link)
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link)?;
    Ok(())
}

/// Move a directory to a new location, creating missing parents
///
/// Goes through a staging name next to `from`, so `to` may lie inside
/// `from` (e.g. `org/kiwix` → `org/kiwix/custom`).
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Err(Error::new(
            ErrorCode::DirectoryNotFound,
            format!("Directory to move not found: {}", from.display()),
        ));
    }
    if to.exists() && !is_empty_dir(to) {
        return Err(Error::new(
            ErrorCode::InvalidPath,
            format!("Destination already exists: {}", to.display()),
        ));
    }

    let staging = staging_path(from);
    fs::rename(from, &staging)?;
    if to.exists() {
        fs::remove_dir(to)?;
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&staging, to)?;
    if let Some(parent) = from.parent() {
        prune_empty_dirs(parent, to)?;
    }
    Ok(())
}

fn staging_path(from: &Path) -> PathBuf {
    let name = from
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    from.with_file_name(format!(".{}.moving-{}", name, std::process::id()))
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Remove `dir` and its ancestors while they are empty
///
/// Stops at the first non-empty directory, or at any ancestor of `keep`.
pub fn prune_empty_dirs(dir: &Path, keep: &Path) -> Result<()> {
    let mut current = Some(dir.to_path_buf());
    while let Some(d) = current {
        if keep.starts_with(&d) || !is_empty_dir(&d) {
            break;
        }
        fs::remove_dir(&d)?;
        current = d.parent().map(Path::to_path_buf);
    }
    Ok(())
}

/// Remove a file or directory tree if it exists
pub fn remove_path(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path)?;
            Ok(true)
        }
        Ok(_) => {
            fs::remove_file(path)?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Move a file, falling back to copy + delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)
            .map_err(Error::from)
            .context(format!("moving {}", from.display()))?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_tree_copies_nested_files() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("res/values")).unwrap();
        fs::write(src.path().join("res/values/strings.xml"), "<resources/>").unwrap();
        fs::write(src.path().join("build.gradle"), "apply plugin").unwrap();

        let target = dst.path().join("clone");
        let copied = copy_tree(src.path(), &target).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(target.join("res/values/strings.xml")).unwrap(),
            "<resources/>"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_keeps_symlinks() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("link.txt")).unwrap();

        let target = dst.path().join("clone");
        copy_tree(src.path(), &target).unwrap();
        let meta = fs::symlink_metadata(target.join("link.txt")).unwrap();
        assert!(meta.file_type().is_symlink());
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let dst = tempfile::tempdir().unwrap();
        let err = copy_tree(Path::new("/nonexistent/template"), dst.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DirectoryNotFound);
    }

    #[test]
    fn test_move_dir_prunes_old_parents() {
        let root = tempfile::tempdir().unwrap();
        let from = root.path().join("src/a/b/c");
        fs::create_dir_all(&from).unwrap();
        fs::write(from.join("Main.java"), "").unwrap();

        let to = root.path().join("src/x/y/z");
        move_dir(&from, &to).unwrap();

        assert!(to.join("Main.java").exists());
        assert!(!root.path().join("src/a").exists());
        assert!(root.path().join("src").exists());
    }

    #[test]
    fn test_move_dir_into_itself() {
        let root = tempfile::tempdir().unwrap();
        let from = root.path().join("src/org/kiwix");
        fs::create_dir_all(&from).unwrap();
        fs::write(from.join("Main.java"), "").unwrap();

        let to = root.path().join("src/org/kiwix/custom");
        move_dir(&from, &to).unwrap();
        assert!(to.join("Main.java").exists());
        assert!(!from.join("Main.java").exists());
    }

    #[test]
    fn test_move_dir_refuses_to_overwrite() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::create_dir_all(root.path().join("b")).unwrap();
        fs::write(root.path().join("b/keep"), "").unwrap();
        let err = move_dir(&root.path().join("a"), &root.path().join("b")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPath);
        assert!(root.path().join("a").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_link_into_replaces_existing() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("platform/libexec");
        fs::create_dir_all(&target).unwrap();
        let dir = root.path().join("platform/arm-linux-androideabi");
        fs::create_dir_all(dir.join("libexec")).unwrap();

        let link = link_into(&target, &dir).unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(link.is_dir());
    }

    #[test]
    fn test_remove_path() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("f");
        fs::write(&file, "").unwrap();
        assert!(remove_path(&file).unwrap());
        assert!(!remove_path(&file).unwrap());
    }
}
