use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// File-backed store for the list of alert names already seen.
///
/// The file is a JSON array of strings. Anything else on disk (missing file,
/// invalid JSON, non-array top level) loads as an empty list so a damaged
/// state file starts the watcher fresh instead of wedging it.
pub struct KnownStore {
    path: PathBuf,
}

impl KnownStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted known list. Never fails; unreadable state is empty.
    pub fn load(&self) -> Vec<String> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Persist the known list atomically: write a temp file in the target's
    /// directory, then rename over the target. A reader (or a crash) sees
    /// either the fully-old or fully-new content, never a partial write.
    pub fn save(&self, names: &[String]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        // NamedTempFile removes the temp artifact on drop if persist fails.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, names)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> KnownStore {
        KnownStore::new(dir.path().join("safety_alerts.json"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());

        // Valid JSON but not an array of strings
        fs::write(store.path(), r#"{"alerts": []}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let names = vec!["alpha".to_string(), "alert no 12".to_string()];
        store.save(&names).unwrap();
        assert_eq!(store.load(), names);
    }

    #[test]
    fn save_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&["alpha".to_string()]).unwrap();
        store.save(&["alpha".to_string(), "beta".to_string()]).unwrap();
        assert_eq!(store.load(), vec!["alpha", "beta"]);
    }

    #[test]
    fn save_leaves_no_temp_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&["alpha".to_string()]).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn failed_replace_cleans_up_and_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("known.json");
        // Renaming a file over a directory fails, standing in for an
        // interrupted replace.
        fs::create_dir(&target).unwrap();
        let store = KnownStore::new(target.clone());
        assert!(store.save(&["alpha".to_string()]).is_err());

        // Temp artifact is gone and the target was not mangled.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(target.is_dir());
    }

    #[test]
    fn persisted_format_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&["alpha".to_string()]).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed.is_array());
    }
}
