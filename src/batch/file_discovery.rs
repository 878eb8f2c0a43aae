//! Locating slice files for a batch.

use std::path::{Path, PathBuf};

use crate::error::{RenderError, Result};

/// Finds DICOM slices under a directory.
///
/// Matching is case-insensitive on the file name. Output is sorted so that
/// batch indices follow the on-disk slice order.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    recursive: bool,
    patterns: Vec<String>,
    max_depth: Option<usize>,
    follow_symlinks: bool,
    include_extensionless: bool,
    skip_hidden: bool,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDiscovery {
    /// Non-recursive discovery of `*.dcm` files.
    pub fn new() -> Self {
        Self {
            recursive: false,
            patterns: vec!["*.dcm".to_string()],
            max_depth: None,
            follow_symlinks: false,
            include_extensionless: false,
            skip_hidden: true,
        }
    }

    /// Descend into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Stop descending below `depth` (0 = only the given directory).
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Replace the file name patterns (`*` and `?` wildcards).
    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Add a file name pattern.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }

    /// Follow symbolic links to files and directories.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Also accept files without an extension, as written by many scanners.
    pub fn include_extensionless(mut self, include: bool) -> Self {
        self.include_extensionless = include;
        self
    }

    /// Skip dot-files and dot-directories.
    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// List matching files under `dir`, sorted by path.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Err(RenderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory not found: {}", dir.display()),
            )));
        }
        if !dir.is_dir() {
            return Err(RenderError::Config(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        self.walk(dir, 0, &mut files)?;
        files.sort();
        log::debug!("discovered {} files under {}", files.len(), dir.display());
        Ok(files)
    }

    fn walk(&self, dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<()> {
        if self.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            RenderError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read directory {}: {}", dir.display(), e),
            ))
        })?;

        for entry in entries {
            let path = entry?.path();
            if self.skip_hidden && is_hidden(&path) {
                continue;
            }

            let metadata = if self.follow_symlinks {
                std::fs::metadata(&path)
            } else {
                std::fs::symlink_metadata(&path)
            };
            // Unreadable entries are skipped rather than failing the scan.
            let Ok(metadata) = metadata else { continue };

            if metadata.is_dir() {
                if self.recursive {
                    self.walk(&path, depth + 1, files)?;
                }
            } else if metadata.is_file() && self.accepts(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();

        if self.include_extensionless && path.extension().is_none() {
            return true;
        }
        self.patterns
            .iter()
            .any(|pattern| glob_match(&name, &pattern.to_lowercase()))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Wildcard match supporting `*` (any run) and `?` (any one character).
fn glob_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            t = absorbed + 1;
            backtrack = Some((star, t));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Sorted DICOM files in `dir`.
pub fn discover_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    FileDiscovery::new().recursive(recursive).discover(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_series() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("slice_002.dcm"), "content").unwrap();
        fs::write(dir.path().join("slice_001.DCM"), "content").unwrap();
        fs::write(dir.path().join("notes.txt"), "content").unwrap();
        fs::write(dir.path().join("IM0001"), "content").unwrap();
        fs::write(dir.path().join(".hidden.dcm"), "content").unwrap();

        let series = dir.path().join("series2");
        fs::create_dir(&series).unwrap();
        fs::write(series.join("slice_010.dcm"), "content").unwrap();

        dir
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_discovery_non_recursive_sorted() {
        let dir = create_series();
        let files = FileDiscovery::new().discover(dir.path()).unwrap();
        assert_eq!(names(&files), vec!["slice_001.DCM", "slice_002.dcm"]);
    }

    #[test]
    fn test_discovery_recursive() {
        let dir = create_series();
        let files = discover_files(dir.path(), true).unwrap();
        assert_eq!(files.len(), 3);
        // "series2" sorts before "slice_*"
        assert!(files[0].ends_with("series2/slice_010.dcm"));
    }

    #[test]
    fn test_discovery_max_depth() {
        let dir = create_series();
        let files = FileDiscovery::new()
            .recursive(true)
            .max_depth(0)
            .discover(dir.path())
            .unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_extensionless_and_hidden() {
        let dir = create_series();
        let files = FileDiscovery::new()
            .include_extensionless(true)
            .skip_hidden(false)
            .discover(dir.path())
            .unwrap();
        assert_eq!(
            names(&files),
            vec![".hidden.dcm", "IM0001", "slice_001.DCM", "slice_002.dcm"]
        );
    }

    #[test]
    fn test_custom_pattern() {
        let dir = create_series();
        let files = FileDiscovery::new()
            .patterns(vec!["*.txt".to_string()])
            .discover(dir.path())
            .unwrap();
        assert_eq!(names(&files), vec!["notes.txt"]);
    }

    #[test]
    fn test_missing_directory() {
        let result = FileDiscovery::new().discover(Path::new("/nonexistent/series"));
        assert!(matches!(result, Err(RenderError::Io(_))));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = create_series();
        let result = FileDiscovery::new().discover(&dir.path().join("notes.txt"));
        assert!(matches!(result, Err(RenderError::Config(_))));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("slice.dcm", "*.dcm"));
        assert!(glob_match("slice.dcm", "slice.dcm"));
        assert!(glob_match("slice.dcm", "slice.*"));
        assert!(glob_match("slice.dcm", "*.*"));
        assert!(glob_match("slice.dcm", "sl?ce.dcm"));
        assert!(glob_match("a.b.dcm", "*.dcm"));
        assert!(glob_match("anything", "*"));
        assert!(glob_match("", "*"));
        assert!(!glob_match("slice.dcm", "*.txt"));
        assert!(!glob_match("slice.dcm", "other.dcm"));
        assert!(!glob_match("slice.dcm", "slice.dcm?"));
    }
}
