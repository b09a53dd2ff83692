//! Script directory change detection for hot reloading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Differences between two scans of the script directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub changed: Vec<PathBuf>,
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ScanResult {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Tracks `.lua` files and their modification times between scans
pub struct ScriptScanner {
    script_dir: PathBuf,
    known: HashMap<PathBuf, SystemTime>,
}

impl ScriptScanner {
    /// The files present now form the baseline; they are not reported as added
    pub fn new(script_dir: PathBuf) -> Self {
        let known = lua_files(&script_dir);
        Self { script_dir, known }
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Number of scripts seen in the last scan
    pub fn tracked(&self) -> usize {
        self.known.len()
    }

    /// Compare the directory to the previous scan and remember the new state
    pub fn scan(&mut self) -> ScanResult {
        let current = lua_files(&self.script_dir);
        let mut result = ScanResult::default();

        for (path, modified) in &current {
            match self.known.get(path) {
                Some(previous) if previous != modified => {
                    debug!(target: "scripting", "Script changed: {}", path.display());
                    result.changed.push(path.clone());
                }
                Some(_) => {}
                None => {
                    debug!(target: "scripting", "Script added: {}", path.display());
                    result.added.push(path.clone());
                }
            }
        }

        for path in self.known.keys().filter(|p| !current.contains_key(*p)) {
            debug!(target: "scripting", "Script removed: {}", path.display());
            result.removed.push(path.clone());
        }

        result.changed.sort();
        result.added.sort();
        result.removed.sort();
        self.known = current;
        result
    }
}

fn lua_files(dir: &Path) -> HashMap<PathBuf, SystemTime> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(target: "scripting", "Script directory not readable: {}", dir.display());
        return HashMap::new();
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("lua"))
        .filter_map(|path| match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => Some((path, modified)),
            Err(e) => {
                warn!(
                    target: "scripting",
                    "Failed to read modification time for {}: {}",
                    path.display(),
                    e
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_existing_files_are_baseline() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("a.lua")).unwrap();

        let mut scanner = ScriptScanner::new(temp_dir.path().to_path_buf());
        assert_eq!(scanner.tracked(), 1);
        assert!(!scanner.scan().has_changes());
    }

    #[test]
    fn test_detect_added_and_removed() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("old.lua");
        File::create(&old).unwrap();
        let mut scanner = ScriptScanner::new(temp_dir.path().to_path_buf());

        fs::remove_file(&old).unwrap();
        let new = temp_dir.path().join("new.lua");
        File::create(&new).unwrap();

        let result = scanner.scan();
        assert_eq!(result.added, vec![new]);
        assert_eq!(result.removed, vec![old]);
        assert!(result.changed.is_empty());
    }

    #[test]
    fn test_detect_modified_script() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dice.lua");
        File::create(&path).unwrap().write_all(b"-- v1").unwrap();
        let mut scanner = ScriptScanner::new(temp_dir.path().to_path_buf());

        let file = File::options().write(true).open(&path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        file.set_modified(later).unwrap();

        let result = scanner.scan();
        assert_eq!(result.changed, vec![path]);
        assert!(result.added.is_empty());
    }

    #[test]
    fn test_ignores_other_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let mut scanner = ScriptScanner::new(temp_dir.path().to_path_buf());

        File::create(temp_dir.path().join("notes.txt")).unwrap();
        File::create(temp_dir.path().join("script.js")).unwrap();

        assert!(!scanner.scan().has_changes());
        assert_eq!(scanner.tracked(), 0);
    }

    #[test]
    fn test_missing_directory() {
        let mut scanner = ScriptScanner::new(PathBuf::from("/tmp/mycelium_missing_scripts_dir"));
        assert!(!scanner.scan().has_changes());
    }
}
