use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

/// Storage directory used when nothing else is configured.
pub const DEFAULT_STORE_PATH: &str = "./chroma_db";

/// Name of the SQLite file kept inside the storage directory.
pub const DB_FILE_NAME: &str = "stash.sqlite3";

static STASH_PATH: Lazy<Option<String>> = Lazy::new(|| env::var("STASH_PATH").ok());
static STASH_ALLOW_RESET: Lazy<bool> = Lazy::new(|| {
    env::var("STASH_ALLOW_RESET")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub path: PathBuf,
    /// `PersistentClient::reset` refuses to run unless this is set.
    pub allow_reset: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            allow_reset: false,
        }
    }
}

impl Settings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Reads `STASH_PATH` and `STASH_ALLOW_RESET`, after loading `.env` if present.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(".env file loaded from: {:?}", path),
            Err(_) => tracing::debug!("No .env file loaded, using process environment"),
        }
        Self {
            path: STASH_PATH
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            allow_reset: *STASH_ALLOW_RESET,
        }
    }

    pub fn allow_reset(mut self, allow: bool) -> Self {
        self.allow_reset = allow;
        self
    }

    pub fn db_file(&self) -> PathBuf {
        self.path.join(DB_FILE_NAME)
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
