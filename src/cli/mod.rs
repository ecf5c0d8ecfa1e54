//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "reelseek",
    version,
    about = "Semantic search over a festival film catalogue",
    long_about = "Reelseek embeds the descriptions of a film catalogue, builds one similarity \
                  collection per index configuration, answers free-text queries against them and \
                  benchmarks the configurations side by side."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/reelseek/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed the catalogue and build every configured collection
    Build {
        /// Catalogue CSV (defaults to catalogue.path)
        #[arg(long, value_name = "FILE")]
        catalogue: Option<PathBuf>,

        /// Column to embed (defaults to catalogue.text_field)
        #[arg(short, long)]
        field: Option<String>,
    },

    /// Search a built collection
    Query {
        /// Search query text
        query: String,

        /// Index label or collection name (e.g. "HNSW_L2"); defaults to the first configured
        #[arg(short, long)]
        index: Option<String>,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Catalogue used to resolve titles (defaults to catalogue.path)
        #[arg(long, value_name = "FILE")]
        catalogue: Option<PathBuf>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the sample queries against every configured collection
    Bench {
        /// Report path (defaults to benchmark.output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the report as JSON instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// List collections in the vector store
    Collections,

    /// List catalogue rows whose description contains a term
    Filter {
        /// Case-insensitive search term
        term: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
