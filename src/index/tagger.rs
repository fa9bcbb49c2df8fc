//! Tag-generation subprocess adapter.
//!
//! Runs a universal-ctags-compatible tool against one file and parses its
//! JSON-lines output into a flat symbol list. The output format is the only
//! contract the core depends on; parsing is a pure function so it can be
//! tested without the tool installed.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::error::CoreError;

use super::{FileIndex, IndexSymbol, SymbolKind};

/// One JSON line of tag-tool output.
#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(rename = "_type", default)]
    entry_type: Option<String>,
    name: String,
    /// 1-based start line.
    line: Option<usize>,
    /// 1-based end line; absent for one-line symbols.
    end: Option<usize>,
    kind: Option<String>,
}

/// Runs the configured tag tool per file.
#[derive(Debug, Clone)]
pub struct Tagger {
    tool_path: String,
}

impl Tagger {
    pub fn new(tool_path: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }

    /// Index a single file: read it, tag it, build the symbol tree.
    ///
    /// Any failure (unreadable file, tool crash, malformed output line) is
    /// reported as a per-file `CoreError::Index`; malformed individual
    /// lines are skipped rather than failing the file.
    pub fn index_file(&self, path: &Path) -> Result<FileIndex, CoreError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::index(path, format!("read failed: {}", e)))?;
        let mtime = file_mtime(path).unwrap_or(0);

        let output = Command::new(&self.tool_path)
            .args(["--output-format=json", "--fields=+ne", "--sort=no", "-o", "-"])
            .arg(path)
            .output()
            .map_err(|e| {
                CoreError::index(path, format!("failed to spawn '{}': {}", self.tool_path, e))
            })?;

        if !output.status.success() {
            return Err(CoreError::index(
                path,
                format!(
                    "'{}' exited with {}: {}",
                    self.tool_path,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let flat = parse_tag_output(&String::from_utf8_lossy(&output.stdout));
        debug!(path = %path.display(), symbols = flat.len(), "tagged file");

        Ok(FileIndex::build(path.to_path_buf(), mtime, flat, &content))
    }
}

/// Parse JSON-lines tag output into flat symbols.
///
/// Lines that are not valid tag objects are skipped. Tag lines are 1-based;
/// the symbol model is 0-based.
pub fn parse_tag_output(stdout: &str) -> Vec<IndexSymbol> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<TagEntry>(line).ok())
        .filter(|entry| {
            entry
                .entry_type
                .as_deref()
                .map(|t| t == "tag")
                .unwrap_or(true)
        })
        .filter_map(|entry| {
            let start = entry.line?.checked_sub(1)?;
            let end = entry.end.and_then(|e| e.checked_sub(1)).unwrap_or(start);
            let kind = SymbolKind::from_tag_kind(entry.kind.as_deref().unwrap_or(""));
            Some(IndexSymbol::new(entry.name, kind, start, end.max(start)))
        })
        .collect()
}

/// Modification time of a file as Unix timestamp seconds.
pub fn file_mtime(path: &Path) -> Option<i64> {
    let metadata = fs::metadata(path).ok()?;
    metadata
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .ok()
}

/// Check whether a cached index's fingerprint is still current.
///
/// Mtime has second granularity, so the on-disk length is compared too.
/// A same-second rewrite of identical length still passes; the watcher
/// invalidates explicitly, so that window only affects unwatched use.
pub fn is_fresh(path: &Path, cached: &FileIndex) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    match mtime {
        Some(m) => m <= cached.mtime && metadata.len() == cached.size,
        None => false,
    }
}
