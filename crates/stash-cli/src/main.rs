use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and edit a local persistent vector store", long_about = None)]
pub struct Cli {
    /// Storage directory (defaults to $STASH_PATH, then ./chroma_db)
    #[arg(short, long, global = true, value_name = "DIR")]
    path: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List collections
    Collections,
    /// Create a collection
    Create {
        name: String,
        /// Distance space: l2, ip or cosine
        #[arg(long)]
        space: Option<String>,
        /// Collection metadata as key=value, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = commands::parse_key_val)]
        meta: Vec<(String, String)>,
    },
    /// Delete a collection and all of its records
    Delete { name: String },
    /// Print the number of records in a collection
    Count { name: String },
    /// Show the first records of a collection
    Peek {
        name: String,
        #[arg(short = 'n', long, default_value_t = stash_core::DEFAULT_PEEK_LIMIT)]
        limit: usize,
    },
    /// List collections, then count and sample one of them
    Inspect {
        name: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
    /// Fetch records by id and/or metadata
    Get {
        name: String,
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,
        /// Metadata equality filter as key=value, repeatable
        #[arg(long = "where", value_name = "KEY=VALUE", value_parser = commands::parse_key_val)]
        filter: Vec<(String, String)>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Include embeddings in the output
        #[arg(long)]
        embeddings: bool,
    },
    /// Nearest-neighbour search with a literal vector
    Query {
        name: String,
        /// Comma separated floats, e.g. 0.1,0.2,0.3
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        vector: Vec<f32>,
        #[arg(short = 'k', long, default_value_t = stash_core::DEFAULT_N_RESULTS)]
        n_results: usize,
    },
    /// Load records from a JSON-lines file, creating the collection if needed
    Import {
        name: String,
        #[arg(short, long)]
        file: PathBuf,
        /// Replace records whose ids already exist
        #[arg(long)]
        upsert: bool,
    },
    /// Delete records by id
    Remove {
        name: String,
        #[arg(long = "id", value_name = "ID", required = true)]
        ids: Vec<String>,
    },
    /// Delete every collection (needs STASH_ALLOW_RESET=true)
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    // Logs go to stderr so --json output stays clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "stash=info,stash_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(".env file loaded from: {:?}", path),
        Err(_) => tracing::debug!("No .env file loaded, using process environment"),
    }

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    commands::run(cli, &mut stdout).await
}
