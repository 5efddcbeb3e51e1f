//! CLI subcommands.

pub mod init;
pub mod outbox;
pub mod report;
pub mod round;
pub mod rubric;
pub mod serve;
pub mod students;
pub mod submit;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use peereval_providers::config::{load_config_from, PeerEvalConfig};
use peereval_store::Database;

/// Loaded configuration plus the open database.
pub struct Context {
    pub config: PeerEvalConfig,
    pub db: Arc<Database>,
}

impl Context {
    /// Load the config and open the database. `--database` wins over the
    /// config file and environment.
    pub fn load(config_path: Option<&Path>, database: Option<PathBuf>) -> Result<Self> {
        let mut config = load_config_from(config_path)?;
        if let Some(path) = database {
            config.database = path;
        }
        let db = Database::open(&config.database)
            .with_context(|| format!("failed to open database {}", config.database.display()))?;
        Ok(Self {
            config,
            db: Arc::new(db),
        })
    }
}
