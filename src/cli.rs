use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "papersift",
    about = "Semantic and full-text search over a local paper library"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage paper collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// Index new and changed papers (incremental)
    Index(IndexArgs),
    /// Semantic search over indexed chunks
    Search(SearchArgs),
    /// Regex search over reconstructed full texts
    Grep(GrepArgs),
    /// Print the reconstructed full text of a paper
    Show(ShowArgs),
    /// Read and write settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show library status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Collection subcommands --

#[derive(Debug, Subcommand)]
pub enum CollectionAction {
    /// Register a directory of papers as a named collection
    Add {
        /// Path to the directory
        path: PathBuf,
        /// Collection name
        #[arg(long)]
        name: String,
    },
    /// Remove a collection and drop chunks no other collection needs
    Remove {
        /// Name of the collection to remove
        name: String,
    },
    /// List all registered collections with their document counts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the documents of a collection with their keys and titles
    Show {
        /// Collection name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Config subcommands --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the stored value of a setting
    Get {
        key: String,
    },
    /// Store a setting
    Set {
        key: String,
        value: String,
    },
    /// Print every resolved setting
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Index --

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Index only these collections (default: all)
    #[arg(short = 'c', long = "collection")]
    pub collections: Vec<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// One or more queries; results are fused. A single argument holding a
    /// JSON array of strings is read as a query list.
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Nearest chunks to fetch per query
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Search only within these collections
    #[arg(short = 'c', long = "collection")]
    pub collections: Vec<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Grep --

#[derive(Debug, Parser)]
pub struct GrepArgs {
    /// Regex patterns; every pattern must match
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Search only within these collections
    #[arg(short = 'c', long = "collection")]
    pub collections: Vec<String>,

    /// Case-insensitive matching
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Scan every candidate's full text instead of pre-filtering on chunks
    #[arg(long)]
    pub bypass_index: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Show --

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Document key
    pub key: String,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "papersift",
            &mut std::io::stdout(),
        );
    }
}
