//! Chain database - persistence of the learned chain state
//!
//! A database owns the on-disk copy of the chain: loading it at install,
//! debouncing saves across observed notes, rotating oversized files with
//! decay, and wiping everything on an operator reset.

pub mod onlyone;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::ChainModel;
use crate::config::Config;
use crate::platform::Platform;

pub use onlyone::OnlyOneDatabase;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database file not found: {0}")]
    Missing(PathBuf),
    #[error("Database I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize chain state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Unknown database type: {0}")]
    UnknownKind(String),
}

impl DatabaseError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return DatabaseError::Missing(path.into());
        }
        DatabaseError::Io { path: path.into(), source }
    }
}

/// What a completed save did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// State written, file below the size limit
    Saved { size: u64 },
    /// File reached the size limit and was archived; the decayed state replaced it
    Rotated { size: u64, archive: PathBuf },
}

/// Persistence backend for a chain model
#[async_trait::async_trait]
pub trait ChainDatabase: Send {
    /// Database type name, as configured
    fn kind(&self) -> &'static str;

    /// Load the persisted state into the model; never fails
    fn load(&mut self, markov: &mut dyn ChainModel);

    /// Write the model state, rotating when the file grew too large
    async fn save(&mut self, markov: &mut dyn ChainModel) -> Result<SaveOutcome, DatabaseError>;

    /// Count one observed note and save once enough have accumulated
    async fn update_save(
        &mut self,
        markov: &mut dyn ChainModel,
    ) -> Result<Option<SaveOutcome>, DatabaseError>;

    /// Archive the current state and start over empty. Returns the archive path.
    fn reset(&mut self, markov: &mut dyn ChainModel) -> Result<PathBuf, DatabaseError>;

    /// Current on-disk size in bytes
    fn size(&self) -> Result<u64, DatabaseError>;

    /// Notes counted since the last save
    fn pending(&self) -> u32;

    /// Shutdown hook: save regardless of the debounce counter
    async fn on_interrupted(&mut self, markov: &mut dyn ChainModel) -> Result<(), DatabaseError> {
        self.save(markov).await.map(|_| ())
    }
}

/// Create the database implementation named by `database.type`
pub fn create_database(
    config: &Config,
    platform: Arc<dyn Platform>,
) -> Result<Box<dyn ChainDatabase>, DatabaseError> {
    match config.database.kind.as_str() {
        "onlyOne" | "onlyone" | "only-one" => Ok(Box::new(OnlyOneDatabase::new(config, platform))),
        other => Err(DatabaseError::UnknownKind(other.to_string())),
    }
}
