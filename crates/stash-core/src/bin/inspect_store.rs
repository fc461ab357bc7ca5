use stash_core::{PersistentClient, Settings};
use std::path::PathBuf;

const DEFAULT_COLLECTION: &str = "your_collection_name";
const SAMPLE_SIZE: usize = 5;

/// Usage: inspect_store [path] [name]
fn parse_args(args: impl IntoIterator<Item = String>) -> (Option<PathBuf>, String) {
    let mut args = args.into_iter();
    let path = args.next().map(PathBuf::from);
    let name = args.next().unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
    (path, name)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (path, name) = parse_args(std::env::args().skip(1));
    let mut settings = Settings::from_env();
    if let Some(path) = path {
        settings.path = path;
    }

    let client = PersistentClient::with_settings(settings).await?;

    // List collections
    println!("{:?}", client.list_collections().await?);

    // Inspect a collection
    let collection = client.get_collection(&name).await?;
    println!("Count: {}", collection.count().await?);
    println!("First {} items: {:?}", SAMPLE_SIZE, collection.peek(SAMPLE_SIZE).await?);

    Ok(())
}
