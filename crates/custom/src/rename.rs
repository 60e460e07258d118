//! Package renaming of an Android source tree
//!
//! A rename moves the package directories under each source root and then
//! rewrites every textual reference. It is planned first so preconditions
//! are checked before anything moves, then applied and verified.

use kiwix_core::error::{Error, Result};
use kiwix_core::file_scanner::FileScanner;
use kiwix_core::tree::move_dir;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source roots holding package directories, relative to the project
pub const SOURCE_ROOTS: [&str; 3] = ["src", "src/test/java", "src/androidTest/java"];

/// Files whose text may reference the package
const TEXT_EXTENSIONS: &[&str] = &["java", "kt", "xml"];

/// Whether `package` is a dotted Java package name
pub fn is_valid_package(package: &str) -> bool {
    !package.is_empty()
        && package.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Directory of `package` below `root`
pub fn package_dir(root: &Path, package: &str) -> PathBuf {
    package.split('.').fold(root.to_path_buf(), |p, s| p.join(s))
}

/// A package rename, with extra packages rewritten alongside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRename {
    from: String,
    to: String,
    aliases: Vec<(String, String)>,
}

/// Directory moves checked against the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub moves: Vec<(PathBuf, PathBuf)>,
}

/// What an applied rename touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    pub moved: usize,
    pub rewritten: Vec<PathBuf>,
}

impl PackageRename {
    pub fn new(from: &str, to: &str) -> Result<Self> {
        for package in [from, to] {
            if !is_valid_package(package) {
                return Err(Error::descriptor(format!(
                    "`{}` is not a valid package name",
                    package
                ))
                .with_suggestion("Use dotted identifiers such as org.example.app"));
            }
        }
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            aliases: Vec::new(),
        })
    }

    /// Also rewrite `from` into `<new package>.<suffix>`
    pub fn alias(mut self, from: &str, suffix: &str) -> Self {
        self.aliases
            .push((from.to_string(), format!("{}.{}", self.to, suffix)));
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    /// Check the tree and list the directory moves
    ///
    /// The main source root must hold the old package; the test roots are
    /// optional. A non-empty destination is refused.
    pub fn plan(&self, project: &Path) -> Result<RenamePlan> {
        let mut moves = Vec::new();
        for root in SOURCE_ROOTS {
            let root = project.join(root);
            let old = package_dir(&root, &self.from);
            if !old.is_dir() {
                debug!(dir = %old.display(), "no package directory");
                continue;
            }
            let new = package_dir(&root, &self.to);
            if new != old && is_non_empty_dir(&new)? && !new.starts_with(&old) {
                return Err(Error::rewrite(format!(
                    "Cannot move {} into non-empty {}",
                    old.display(),
                    new.display()
                )));
            }
            moves.push((old, new));
        }

        let main = package_dir(&project.join("src"), &self.from);
        if !moves.iter().any(|(old, _)| *old == main) {
            return Err(Error::rewrite(format!(
                "Package directory {} not found",
                main.display()
            )));
        }
        Ok(RenamePlan { moves })
    }

    /// Move the directories, rewrite references and verify the result
    pub fn apply(&self, project: &Path, plan: &RenamePlan) -> Result<RenameReport> {
        let mut report = RenameReport::default();
        for (old, new) in &plan.moves {
            if old != new {
                move_dir(old, new)?;
                report.moved += 1;
            }
        }

        for file in self.text_files(project)? {
            let content = fs::read_to_string(&file)?;
            let rewritten = self.rewrite_text(&content);
            if rewritten != content {
                fs::write(&file, rewritten)?;
                report.rewritten.push(file);
            }
        }

        self.verify(project)?;
        info!(
            from = %self.from,
            to = %self.to,
            moved = report.moved,
            files = report.rewritten.len(),
            "package renamed"
        );
        Ok(report)
    }

    /// Apply the text substitutions to one file's content
    pub fn rewrite_text(&self, content: &str) -> String {
        let renamed = content.replace(&self.from, &self.to);
        self.aliases
            .iter()
            .fold(renamed, |text, (from, to)| text.replace(from, to))
    }

    /// Fail when any text file still references the old package
    pub fn verify(&self, project: &Path) -> Result<()> {
        let mut leftovers = Vec::new();
        for file in self.text_files(project)? {
            let content = fs::read_to_string(&file)?;
            if content.replace(&self.to, "").contains(&self.from) {
                leftovers.push(file);
            }
        }
        if leftovers.is_empty() {
            return Ok(());
        }
        let listed = leftovers
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::rewrite(format!(
            "{} still referenced after rename",
            self.from
        ))
        .with_context(listed))
    }

    fn text_files(&self, project: &Path) -> Result<Vec<PathBuf>> {
        FileScanner::new(project)
            .with_extensions(TEXT_EXTENSIONS)
            .exclude(&["build/**"])
            .scan()
    }
}

fn is_non_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_some())
}
