//! Single-file chain database
//!
//! Keeps the whole chain state in one JSON file. When a save leaves the file
//! at or above `max_size`, the file is archived as `<path>-<unix-seconds>`
//! and every count is attenuated, so recently reinforced chains survive while
//! rare ones fall away.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ChainDatabase, DatabaseError, SaveOutcome};
use crate::chain::{attenuate, state_from_json, state_to_json, ChainModel, ChainState};
use crate::config::Config;
use crate::platform::{Platform, Visibility};

pub struct OnlyOneDatabase {
    path: PathBuf,
    max_size: u64,
    save_frequency: u32,
    attenuation_rate: f64,
    visibility: Visibility,
    platform: Arc<dyn Platform>,
    unsaved_post_count: u32,
}

impl OnlyOneDatabase {
    pub fn new(config: &Config, platform: Arc<dyn Platform>) -> Self {
        Self {
            path: config.database.path.clone(),
            max_size: config.database.max_size,
            save_frequency: config.database.save_frequency.max(1),
            attenuation_rate: config.database.attenuation_rate,
            visibility: config.visibility,
            platform,
            unsaved_post_count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>-<unix-seconds>`, or `<path>-<unix-seconds>-<n>` when that name is taken
    fn archive_path(&self) -> PathBuf {
        let mut base = self.path.as_os_str().to_owned();
        base.push(format!("-{}", Utc::now().timestamp()));

        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            let mut name = base.clone();
            name.push(format!("-{}", n));
            candidate = PathBuf::from(name);
            n += 1;
        }
        candidate
    }

    /// Write the state through a temp file so the database is never half-written.
    /// Returns the resulting file size.
    fn write_state(&self, state: &ChainState) -> Result<u64, DatabaseError> {
        let json = state_to_json(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::io(parent, e))?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| DatabaseError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| DatabaseError::io(&self.path, e))?;
        self.size()
    }

    fn archive(&self) -> Result<PathBuf, DatabaseError> {
        let archive = self.archive_path();
        std::fs::rename(&self.path, &archive).map_err(|e| DatabaseError::io(&self.path, e))?;
        Ok(archive)
    }

    async fn notify_rotation(&self, size: u64) {
        let text = format!(
            "【Information】\n```\nThe database reached its size limit ({} bytes) and has been rotated.\nmax = {} <= size = {}\n```",
            self.max_size, self.max_size, size
        );
        match self.platform.create_note(&text, self.visibility, false).await {
            Ok(()) => debug!("Rotation notice posted"),
            Err(e) => warn!("Failed to post rotation notice: {:#}", e),
        }
    }

    /// Archive the oversized file and reload the attenuated state
    async fn rotate(
        &mut self,
        markov: &mut dyn ChainModel,
        written: &ChainState,
        size: u64,
    ) -> Result<PathBuf, DatabaseError> {
        info!("Database is too big. max = {} <= size = {}", self.max_size, size);
        self.notify_rotation(size).await;

        let archive = self.archive()?;
        info!("Archived database to {}", archive.display());

        let decayed = attenuate(written, self.attenuation_rate);
        debug!(
            "Attenuated {} entries to {} (rate {})",
            written.len(),
            decayed.len(),
            self.attenuation_rate
        );

        // Persist the decayed state right away so a crash cannot lose the decay step
        self.write_state(&decayed)?;
        markov.import_state(decayed);
        Ok(archive)
    }
}

#[async_trait::async_trait]
impl ChainDatabase for OnlyOneDatabase {
    fn kind(&self) -> &'static str {
        "onlyOne"
    }

    fn load(&mut self, markov: &mut dyn ChainModel) {
        let loaded = std::fs::read_to_string(&self.path)
            .map_err(|e| DatabaseError::io(&self.path, e))
            .and_then(|json| state_from_json(&json).map_err(DatabaseError::from));

        match loaded {
            Ok(state) => {
                info!("Loaded {} chain entries from {}", state.len(), self.path.display());
                markov.import_state(state);
            }
            Err(e) => {
                warn!("Starting with an empty chain: {}", e);
                markov.import_state(ChainState::new());
            }
        }
    }

    async fn save(&mut self, markov: &mut dyn ChainModel) -> Result<SaveOutcome, DatabaseError> {
        let state = markov.export_state();
        let size = self.write_state(&state)?;
        self.unsaved_post_count = 0;
        debug!("Saved {} chain entries ({} bytes)", state.len(), size);

        if self.max_size == 0 || size < self.max_size {
            return Ok(SaveOutcome::Saved { size });
        }

        let archive = self.rotate(markov, &state, size).await?;
        Ok(SaveOutcome::Rotated { size, archive })
    }

    async fn update_save(
        &mut self,
        markov: &mut dyn ChainModel,
    ) -> Result<Option<SaveOutcome>, DatabaseError> {
        self.unsaved_post_count += 1;
        if self.unsaved_post_count < self.save_frequency {
            return Ok(None);
        }
        self.save(markov).await.map(Some)
    }

    fn reset(&mut self, markov: &mut dyn ChainModel) -> Result<PathBuf, DatabaseError> {
        self.write_state(&markov.export_state())?;
        let archive = self.archive()?;
        markov.import_state(ChainState::new());
        self.write_state(&ChainState::new())?;
        self.unsaved_post_count = 0;
        info!("Database reset, previous state archived to {}", archive.display());
        Ok(archive)
    }

    fn size(&self) -> Result<u64, DatabaseError> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| DatabaseError::io(&self.path, e))
    }

    fn pending(&self) -> u32 {
        self.unsaved_post_count
    }
}
