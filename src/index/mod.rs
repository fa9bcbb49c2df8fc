//! Per-file symbol index and container resolution.
//!
//! A `FileIndex` is built once from the tag tool's flat output and never
//! mutated; re-indexing replaces the whole object behind an `Arc` so
//! concurrent readers always see a complete snapshot.

pub mod tagger;
pub mod walker;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Attribute key under which the computed fully-qualified name is stored.
pub const ATTR_FQN: &str = "fqn";

/// Scope separator used in fully-qualified names.
pub const SCOPE_SEPARATOR: &str = "::";

/// Kind of an indexed symbol, normalized from the tag tool's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Namespace,
    Class,
    Enum,
    Function,
    Method,
    Constructor,
    Variable,
    Other,
}

impl SymbolKind {
    /// Container kinds may lexically nest other symbols.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Namespace | Self::Class | Self::Enum)
    }

    /// Leaf kinds resolve directly as the containing symbol of a line.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Function | Self::Method | Self::Constructor)
    }

    /// Normalize a tag-tool kind string.
    pub fn from_tag_kind(kind: &str) -> Self {
        match kind.to_lowercase().as_str() {
            "namespace" | "module" | "package" => Self::Namespace,
            "class" | "struct" | "interface" | "trait" | "impl" => Self::Class,
            "enum" => Self::Enum,
            "function" | "func" => Self::Function,
            "method" | "member" => Self::Method,
            "constructor" => Self::Constructor,
            "variable" | "field" | "constant" | "property" => Self::Variable,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Class => "class",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Variable => "variable",
            Self::Other => "other",
        }
    }
}

/// A symbol with its lexical range and computed attributes.
///
/// Lines and columns are 0-based. Invariant: `start_line <= end_line`; a
/// child's range lies within its parent's range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    /// Computed attributes; at minimum the fully-qualified name.
    pub attributes: HashMap<String, String>,
    pub children: Vec<IndexSymbol>,
}

impl IndexSymbol {
    /// A flat symbol with no children or attributes yet.
    pub fn new(name: impl Into<String>, kind: SymbolKind, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            start_line,
            end_line: end_line.max(start_line),
            start_column: 0,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    fn contains_range(&self, other: &IndexSymbol) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }

    /// The fully-qualified name computed at index build time.
    pub fn fqn(&self) -> &str {
        self.attributes
            .get(ATTR_FQN)
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// A single line search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// Trimmed line text.
    pub text: String,
}

/// Immutable per-file index: symbol tree plus staleness fingerprint.
#[derive(Debug, Clone)]
pub struct FileIndex {
    pub path: PathBuf,
    /// Staleness fingerprint: mtime seconds plus content length. Mtime
    /// alone has second granularity, so a rewrite landing in the same
    /// second would otherwise pass as fresh.
    pub mtime: i64,
    pub size: u64,
    symbols: Vec<IndexSymbol>,
    /// Byte offset of each line start, for byte<->line conversion.
    line_offsets: Vec<usize>,
    symbol_count: usize,
}

impl FileIndex {
    /// Build an index from the tag tool's flat symbol list.
    ///
    /// Symbols are nested into a tree by range containment and every
    /// symbol gets its fully-qualified name attribute.
    pub fn build(path: PathBuf, mtime: i64, flat: Vec<IndexSymbol>, content: &str) -> Self {
        let symbol_count = flat.len();
        let mut symbols = nest_by_range(flat);
        compute_fqns(&mut symbols, &[]);

        Self {
            path,
            mtime,
            size: content.len() as u64,
            symbols,
            line_offsets: line_offsets(content),
            symbol_count,
        }
    }

    /// An index for a file with no symbols (unparseable or empty).
    pub fn empty(path: PathBuf, mtime: i64) -> Self {
        Self {
            path,
            mtime,
            size: 0,
            symbols: Vec::new(),
            line_offsets: Vec::new(),
            symbol_count: 0,
        }
    }

    /// Top-level symbols in declaration order.
    pub fn symbols(&self) -> &[IndexSymbol] {
        &self.symbols
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    /// Find the innermost symbol whose range contains `line` (0-based).
    ///
    /// Container kinds are recursed into first so the deepest match wins;
    /// leaf kinds (function/method/constructor) resolve directly. Data
    /// symbols never act as containers.
    pub fn container_at(&self, line: usize) -> Option<&IndexSymbol> {
        resolve_container(&self.symbols, line)
    }

    /// Find a symbol by name, preferring one whose range contains `line`.
    pub fn find_symbol(&self, name: &str, line: usize) -> Option<&IndexSymbol> {
        let mut fallback = None;
        let mut stack: Vec<&IndexSymbol> = self.symbols.iter().collect();

        while let Some(sym) = stack.pop() {
            if sym.name == name {
                if sym.contains_line(line) {
                    return Some(sym);
                }
                fallback.get_or_insert(sym);
            }
            stack.extend(sym.children.iter());
        }

        fallback
    }

    /// Fully qualified name of the named symbol at `line`, if known.
    pub fn fully_qualified_name(&self, name: &str, line: usize) -> Option<String> {
        self.find_symbol(name, line).map(|s| s.fqn().to_string())
    }

    /// Byte offset of the start of a 0-based line.
    pub fn line_to_offset(&self, line: usize) -> Option<usize> {
        self.line_offsets.get(line).copied()
    }

    /// 0-based line containing a byte offset.
    pub fn offset_to_line(&self, offset: usize) -> usize {
        match self.line_offsets.binary_search(&offset) {
            Ok(line) => line,
            Err(insert) => insert.saturating_sub(1),
        }
    }
}

fn resolve_container<'a>(symbols: &'a [IndexSymbol], line: usize) -> Option<&'a IndexSymbol> {
    for sym in symbols {
        if !sym.contains_line(line) {
            continue;
        }
        if sym.kind.is_container() {
            if let Some(inner) = resolve_container(&sym.children, line) {
                return Some(inner);
            }
            return Some(sym);
        }
        if sym.kind.is_leaf() {
            // Nested local definitions still win by depth.
            if let Some(inner) = resolve_container(&sym.children, line) {
                return Some(inner);
            }
            return Some(sym);
        }
    }
    None
}

/// Nest a flat symbol list into a tree by range containment.
///
/// Sort order (start ascending, span descending) guarantees a parent is
/// visited before anything inside it, so a stack walk suffices.
fn nest_by_range(mut flat: Vec<IndexSymbol>) -> Vec<IndexSymbol> {
    flat.sort_by(|a, b| {
        a.start_line
            .cmp(&b.start_line)
            .then(b.end_line.cmp(&a.end_line))
    });

    let mut roots: Vec<IndexSymbol> = Vec::new();
    // Stack of (range) mirrors the current nesting chain; the actual nodes
    // live inside `roots`, addressed through the index path.
    let mut chain: Vec<(usize, usize)> = Vec::new();
    let mut path: Vec<usize> = Vec::new();

    for sym in flat {
        while let Some(&(start, end)) = chain.last() {
            if start <= sym.start_line && sym.end_line <= end {
                break;
            }
            chain.pop();
            path.pop();
        }

        let range = (sym.start_line, sym.end_line);
        let siblings = siblings_at_path(&mut roots, &path);
        siblings.push(sym);
        let idx = siblings.len() - 1;

        chain.push(range);
        path.push(idx);
    }

    roots
}

fn siblings_at_path<'a>(roots: &'a mut Vec<IndexSymbol>, path: &[usize]) -> &'a mut Vec<IndexSymbol> {
    let mut current = roots;
    for &idx in path {
        current = &mut current[idx].children;
    }
    current
}

/// Attach the fully-qualified name attribute to every symbol.
///
/// Only ancestor container-kind names contribute to the prefix; a method
/// inside `Namespace::Class` becomes `Namespace::Class::method` no matter
/// what leaf symbols sit in between.
fn compute_fqns(symbols: &mut [IndexSymbol], container_chain: &[String]) {
    for sym in symbols {
        let fqn = if container_chain.is_empty() {
            sym.name.clone()
        } else {
            format!("{}{}{}", container_chain.join(SCOPE_SEPARATOR), SCOPE_SEPARATOR, sym.name)
        };
        sym.attributes.insert(ATTR_FQN.to_string(), fqn);

        if sym.children.is_empty() {
            continue;
        }
        if sym.kind.is_container() {
            let mut chain = container_chain.to_vec();
            chain.push(sym.name.clone());
            compute_fqns(&mut sym.children, &chain);
        } else {
            compute_fqns(&mut sym.children, container_chain);
        }
    }
}

fn line_offsets(content: &str) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(128);
    if content.is_empty() {
        return offsets;
    }
    offsets.push(0);
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' && i + 1 < content.len() {
            offsets.push(i + 1);
        }
    }
    offsets
}
