//! File scanning utilities
//!
//! Finds the source and resource files a rewrite has to touch.

use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File scanner with configurable filters
pub struct FileScanner {
    root: PathBuf,
    extensions: Vec<String>,
    exclude_patterns: Vec<glob::Pattern>,
}

impl FileScanner {
    /// Create a new file scanner rooted at the given path
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Filter by file extensions (e.g., "java", "kt", "xml")
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add glob patterns, relative to the root, to exclude
    pub fn exclude(mut self, patterns: &[&str]) -> Self {
        self.exclude_patterns = patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        self
    }

    /// Scan and return matching files, sorted; dot-directories are skipped
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            if !self.matches_extension(path) {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.exclude_patterns.iter().any(|p| p.matches_path(relative)) {
                continue;
            }

            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.extensions.iter().any(|e| e == ext)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n != "." && n != "..")
        .unwrap_or(false)
}

/// Get file size in bytes
pub fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Files directly under `dir` whose names match a glob, sorted
pub fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let mut found: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
        .map_err(|e| crate::error::Error::io(format!("Bad pattern {}: {}", pattern, e)))?
        .filter_map(|p| p.ok())
        .collect();
    found.sort();
    Ok(found)
}
