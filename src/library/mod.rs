//! On-disk script library: one directory per category, one `.ps1` file per
//! script. The engine itself never walks the filesystem; it goes through
//! this provider.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

pub trait ScriptLibrary: Send + Sync {
    /// Category names in stable (sorted) order. Empty if the root is missing.
    fn categories(&self) -> Vec<String>;
    /// Script names (file stems) within a category, sorted.
    fn scripts(&self, category: &str) -> Vec<String>;
    /// Absolute path a (category, script) pair resolves to.
    fn resolve(&self, category: &str, script: &str) -> PathBuf;
}

pub struct DirLibrary {
    root: PathBuf,
}

impl DirLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.script_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptLibrary for DirLibrary {
    fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(&self.root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn scripts(&self, category: &str) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.root.join(category)) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "ps1"))
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn resolve(&self, category: &str, script: &str) -> PathBuf {
        self.root.join(category).join(format!("{script}.ps1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_categories_and_scripts_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for cat in ["network", "accounts"] {
            fs::create_dir(dir.path().join(cat)).unwrap();
        }
        fs::write(dir.path().join("accounts/new-user.ps1"), "").unwrap();
        fs::write(dir.path().join("accounts/audit.ps1"), "").unwrap();
        fs::write(dir.path().join("accounts/notes.txt"), "").unwrap();

        let lib = DirLibrary::new(dir.path());
        assert_eq!(lib.categories(), vec!["accounts", "network"]);
        assert_eq!(lib.scripts("accounts"), vec!["audit", "new-user"]);
        assert_eq!(lib.scripts("network"), Vec::<String>::new());
        assert_eq!(
            lib.resolve("accounts", "audit"),
            dir.path().join("accounts/audit.ps1")
        );
    }

    #[test]
    fn missing_root_yields_empty() {
        let lib = DirLibrary::new("/nonexistent/scriptdeck-root");
        assert!(lib.categories().is_empty());
    }
}
