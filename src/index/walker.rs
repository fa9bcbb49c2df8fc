use ignore::WalkBuilder;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::config::IndexerConfig;

/// Enumerates candidate files under the configured include paths,
/// respecting .gitignore and custom ignore patterns.
pub struct Walker {
    root: PathBuf,
    include_paths: Vec<PathBuf>,
    extensions: HashSet<String>,
    ignore_patterns: Vec<String>,
}

impl Walker {
    /// Create a new Walker rooted at the project directory.
    pub fn new(root: PathBuf, config: &IndexerConfig) -> Self {
        let include_paths = config
            .include_paths
            .iter()
            .map(|p| root.join(p))
            .collect();

        Self {
            root,
            include_paths,
            extensions: config.extensions.iter().cloned().collect(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    /// Include paths that actually exist on disk.
    pub fn resolved_include_paths(&self) -> Vec<PathBuf> {
        self.include_paths
            .iter()
            .filter(|p| p.exists())
            .cloned()
            .collect()
    }

    /// Walk all include paths and collect matching files.
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for base in self.resolved_include_paths() {
            files.extend(self.walk_one(&base));
        }
        files.sort();
        files.dedup();
        files
    }

    fn walk_one(&self, base: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(base);

        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);
        builder.hidden(true);

        let mut override_builder = ignore::overrides::OverrideBuilder::new(&self.root);
        for pattern in &self.ignore_patterns {
            // "!" prefix excludes in override terms
            let _ = override_builder.add(&format!("!{}", pattern));
            let _ = override_builder.add(&format!("!{}/**", pattern));
        }
        if let Ok(overrides) = override_builder.build() {
            builder.overrides(overrides);
        }

        let extensions = self.extensions.clone();
        let ignore_patterns = self.ignore_patterns.clone();

        builder
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .filter(move |entry| {
                let path_str = entry.path().to_string_lossy();
                !ignore_patterns.iter().any(|p| path_str.contains(p.as_str()))
            })
            .filter(move |entry| {
                entry
                    .path()
                    .extension()
                    .and_then(OsStr::to_str)
                    .map(|ext| extensions.contains(ext))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_config() -> IndexerConfig {
        IndexerConfig {
            include_paths: vec![".".to_string()],
            extensions: vec!["rs".to_string(), "py".to_string()],
            ignore_patterns: vec!["target".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_walker_finds_matching_files() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();

        fs::write(src_dir.join("main.rs"), "fn main() {}").unwrap();
        fs::write(src_dir.join("lib.rs"), "pub fn foo() {}").unwrap();
        fs::write(src_dir.join("readme.md"), "# Readme").unwrap();

        let walker = Walker::new(dir.path().to_path_buf(), &test_config());
        let files = walker.collect_files();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "rs"));
    }

    #[test]
    fn test_walker_ignores_patterns() {
        let dir = tempdir().unwrap();
        let target_dir = dir.path().join("target");
        fs::create_dir_all(&target_dir).unwrap();

        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(target_dir.join("build.rs"), "fn build() {}").unwrap();

        let walker = Walker::new(dir.path().to_path_buf(), &test_config());
        let files = walker.collect_files();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.rs"));
    }

    #[test]
    fn test_walker_scoped_include_paths() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let other_dir = dir.path().join("other");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&other_dir).unwrap();

        fs::write(src_dir.join("a.rs"), "").unwrap();
        fs::write(other_dir.join("b.rs"), "").unwrap();

        let mut config = test_config();
        config.include_paths = vec!["src".to_string()];

        let walker = Walker::new(dir.path().to_path_buf(), &config);
        let files = walker.collect_files();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.rs"));
    }

    #[test]
    fn test_missing_include_path_resolves_to_nothing() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.include_paths = vec!["does-not-exist".to_string()];

        let walker = Walker::new(dir.path().to_path_buf(), &config);
        assert!(walker.resolved_include_paths().is_empty());
        assert!(walker.collect_files().is_empty());
    }
}
