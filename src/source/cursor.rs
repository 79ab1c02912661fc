use crate::error::SourceError;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Artifact extension the cursor looks for
const ARTIFACT_EXTENSION: &str = ".json";

/// Cursor over a watched directory of JSON artifacts
///
/// Remembers which artifacts have been folded by name. Discovery never marks
/// anything itself: the caller marks an artifact once its events are folded,
/// so a failure in the middle of a batch never loses an artifact.
#[derive(Debug)]
pub struct FileCursor {
    /// Directory being watched
    directory: PathBuf,
    /// Names of artifacts already folded (or permanently skipped)
    processed: HashSet<String>,
}

impl FileCursor {
    /// Create a cursor over `directory` with nothing processed yet
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            processed: HashSet::new(),
        }
    }

    /// The watched directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// List unseen artifacts, sorted lexicographically
    ///
    /// A missing or unreadable directory is treated as "no artifacts yet".
    pub fn discover(&self) -> Vec<String> {
        match self.try_discover() {
            Ok(names) => names,
            Err(SourceError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                debug!("Source directory {} does not exist yet", self.directory.display());
                Vec::new()
            }
            Err(e) => {
                warn!("{} ({})", e, self.directory.display());
                Vec::new()
            }
        }
    }

    fn try_discover(&self) -> Result<Vec<String>, SourceError> {
        let entries = fs::read_dir(&self.directory).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SourceError::IoError(e),
            _ => SourceError::Discovery(e.to_string()),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            // An entry can vanish between listing and stat; skip it
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!("Skipping non UTF-8 artifact name {:?}", raw);
                    continue;
                }
            };

            if !name.ends_with(ARTIFACT_EXTENSION) || self.processed.contains(&name) {
                continue;
            }

            match entry.file_type() {
                Ok(kind) if kind.is_dir() => continue,
                Ok(_) => names.push(name),
                Err(e) => debug!("Skipping {}: {}", name, e),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Full path of an artifact in the watched directory
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Record that an artifact has been folded (or permanently skipped)
    pub fn mark_processed(&mut self, name: impl Into<String>) {
        self.processed.insert(name.into());
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(name)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), "[]").unwrap();
    }

    #[test]
    fn test_discover_sorted_json_only() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "b.json");
        touch(&dir, "a.json");
        touch(&dir, "notes.txt");
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let cursor = FileCursor::new(dir.path());
        assert_eq!(cursor.discover(), vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_discover_does_not_mark() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.json");

        let cursor = FileCursor::new(dir.path());
        assert_eq!(cursor.discover().len(), 1);
        assert_eq!(cursor.discover().len(), 1);
        assert_eq!(cursor.processed_count(), 0);
    }

    #[test]
    fn test_mark_processed_excludes_artifact() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.json");
        touch(&dir, "b.json");

        let mut cursor = FileCursor::new(dir.path());
        cursor.mark_processed("a.json");

        assert!(cursor.is_processed("a.json"));
        assert_eq!(cursor.discover(), vec!["b.json"]);

        touch(&dir, "c.json");
        assert_eq!(cursor.discover(), vec!["b.json", "c.json"]);
    }

    #[test]
    fn test_rewritten_artifact_with_seen_name_is_ignored() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.json");

        let mut cursor = FileCursor::new(dir.path());
        cursor.mark_processed("a.json");
        fs::write(dir.path().join("a.json"), r#"{"message": "new"}"#).unwrap();

        assert!(cursor.discover().is_empty());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let cursor = FileCursor::new(dir.path().join("not-there"));
        assert!(cursor.discover().is_empty());
    }

    #[test]
    fn test_unreadable_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "batch.json");

        // A regular file in place of the directory
        let cursor = FileCursor::new(dir.path().join("batch.json"));
        assert!(matches!(
            cursor.try_discover(),
            Err(SourceError::Discovery(_))
        ));
        assert!(cursor.discover().is_empty());
    }
}
