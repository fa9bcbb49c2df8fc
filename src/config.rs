use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".symdex";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directories to index, relative to the project root
    #[serde(default = "default_include_paths")]
    pub include_paths: Vec<String>,

    /// File extensions to index
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to ignore (in addition to .gitignore)
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Path to the tag-generation tool (universal-ctags compatible)
    #[serde(default = "default_tagger_path")]
    pub tagger_path: String,

    /// Number of worker threads (None = detected CPU count)
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            include_paths: default_include_paths(),
            extensions: default_extensions(),
            ignore_patterns: default_ignore_patterns(),
            tagger_path: default_tagger_path(),
            workers: None,
        }
    }
}

fn default_include_paths() -> Vec<String> {
    vec![".".to_string()]
}

fn default_extensions() -> Vec<String> {
    vec![
        "rs".to_string(),
        "py".to_string(),
        "ts".to_string(),
        "tsx".to_string(),
        "js".to_string(),
        "jsx".to_string(),
        "go".to_string(),
        "java".to_string(),
        "c".to_string(),
        "cc".to_string(),
        "cpp".to_string(),
        "cxx".to_string(),
        "h".to_string(),
        "hpp".to_string(),
    ]
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "target".to_string(),
        ".git".to_string(),
        "dist".to_string(),
        "build".to_string(),
        "__pycache__".to_string(),
        ".venv".to_string(),
        "vendor".to_string(),
    ]
}

fn default_tagger_path() -> String {
    "ctags".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Whether semantic search is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Path to the embedding backend executable
    #[serde(default)]
    pub backend_path: Option<String>,

    /// Lines per chunk
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Overlapping lines between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend_path: None,
            chunk_lines: default_chunk_lines(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_chunk_lines() -> usize {
    40
}

fn default_chunk_overlap() -> usize {
    10
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Events arriving within this window after startup are dropped.
    /// Editors tend to touch files right after a workspace loads.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            startup_grace_ms: default_startup_grace_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_startup_grace_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether file logging is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (relative paths resolve against the project root)
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Rotation strategy: hourly, daily, never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_log_prefix(),
            rotation: default_log_rotation(),
            stderr: default_true(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".symdex/logs")
}

fn default_log_prefix() -> String {
    "symdex.log".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the .symdex directory
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the .symdex directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the path to the .symdex directory
    pub fn symdex_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Check if symdex is initialized in the given directory
    pub fn is_initialized(root: &Path) -> bool {
        Self::symdex_dir(root).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.indexer.extensions.contains(&"rs".to_string()));
        assert_eq!(config.indexer.include_paths, vec!["."]);
        assert_eq!(config.indexer.tagger_path, "ctags");
        assert!(!config.embeddings.enabled);
        assert_eq!(config.embeddings.chunk_lines, 40);
        assert_eq!(config.embeddings.chunk_overlap, 10);
        assert_eq!(config.watcher.debounce_ms, 500);
        assert_eq!(config.watcher.startup_grace_ms, 2000);
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.indexer.workers = Some(4);
        config.embeddings.enabled = true;

        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();

        assert_eq!(loaded.indexer.workers, Some(4));
        assert!(loaded.embeddings.enabled);
        assert_eq!(config.indexer.extensions, loaded.indexer.extensions);
    }

    #[test]
    fn test_load_missing_config_returns_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.watcher.debounce_ms, 500);
    }
}
