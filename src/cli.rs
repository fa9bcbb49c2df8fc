use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "symdex")]
#[command(author, version, about = "Local code index: glob line search with symbol context and semantic search")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize symdex in the current directory
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Build the index over the configured source tree
    Index,

    /// Search lines; every whitespace-separated glob term must match
    Search {
        /// Query: glob terms (`*` any, `?` one char), case-insensitive
        query: String,

        /// Only files matching these glob patterns
        #[arg(long)]
        include: Vec<String>,

        /// Skip files matching these glob patterns
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Show the innermost symbol containing a line
    Container {
        /// File to inspect
        file: PathBuf,

        /// 0-based line number
        line: usize,
    },

    /// Show the fully qualified name of a symbol
    Fqn {
        /// File containing the symbol
        file: PathBuf,

        /// Symbol name
        name: String,

        /// 0-based line number near the symbol
        line: usize,
    },

    /// Semantic nearest-neighbor search over embedded chunks
    Semantic {
        /// Natural-language query
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
    },

    /// Watch for file changes and re-index automatically
    Watch {
        /// Debounce delay in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Show index statistics
    Stats,
}
