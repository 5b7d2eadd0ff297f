//! Markov speaking module
//!
//! Binds platform events to the chain:
//! - every observed note counts toward the debounced save and, if it passes
//!   the word filter and visibility policy, is learned
//! - mentions are always learned and answered with generated text
//! - `markov` commands let operators reset or prune the chain
//! - an optional timer posts generated text on its own

pub mod interval;

use anyhow::{bail, Context, Result};
use rand::Rng;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainModel, ChainState};
use crate::config::{Config, LengthRange};
use crate::database::{create_database, ChainDatabase};
use crate::filter::WordFilter;
use crate::platform::{Message, Note, Platform, User, Visibility};

pub use interval::{IntervalPoster, PostOutcome};
use interval::IntervalContext;

/// Reply used when nothing could be generated
pub const PLACEHOLDER: &str = "...";

const PERMISSION_DENIED: &str = "👎(You don't have a permission)";
const HELP: &str = "markov: /markov <reset|delete>\nOnly op-ed users can run this command.";

/// `@user` and `@user@host`
static MENTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@[A-Za-z0-9_]+(?:@[A-Za-z0-9.\-]+[A-Za-z0-9])?").unwrap()
});

/// Module lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Uninstalled,
    Installed,
    Running,
    Interrupted,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleState::Uninstalled => write!(f, "Uninstalled"),
            ModuleState::Installed => write!(f, "Installed"),
            ModuleState::Running => write!(f, "Running"),
            ModuleState::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Who may run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Anyone,
    Op,
}

/// An admin command exposed by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub name: &'static str,
    pub desc: &'static str,
    pub permission: Permission,
}

pub const COMMANDS: [Command; 2] = [
    Command {
        name: "markov reset",
        desc: "Explode the DB of NLP related data",
        permission: Permission::Op,
    },
    Command {
        name: "markov delete",
        desc: "Remove chains containing specified morphemes",
        permission: Permission::Op,
    },
];

/// Chain and its database; always locked together
pub(crate) struct Speech {
    pub markov: Box<dyn ChainModel>,
    pub database: Box<dyn ChainDatabase>,
}

/// Sentences per generation: uniform in the configured range, else 1
pub fn sentence_length(range: Option<LengthRange>) -> usize {
    match range {
        Some(LengthRange { start, end }) => {
            let (lo, hi) = (start.min(end), start.max(end));
            rand::rng().random_range(lo..=hi)
        }
        None => 1,
    }
}

/// Remove mention addresses from text
pub fn strip_mentions(text: &str) -> String {
    MENTION_PATTERN.replace_all(text, "").into_owned()
}

/// Generate a reply, falling back to the placeholder
fn speak(markov: &mut dyn ChainModel, sentences: usize) -> String {
    let speech = match markov.generate(sentences) {
        Ok(sentences) => sentences.join("\n"),
        Err(e) => {
            debug!("Generation failed: {:#}", e);
            String::new()
        }
    };
    if speech.trim().is_empty() {
        PLACEHOLDER.to_string()
    } else {
        speech
    }
}

pub struct MarkovSpeaking {
    config: Arc<Config>,
    platform: Arc<dyn Platform>,
    speech: Arc<Mutex<Speech>>,
    filter: WordFilter,
    state: ModuleState,
    interval: Option<IntervalPoster>,
}

impl MarkovSpeaking {
    pub fn new(config: Config, platform: Arc<dyn Platform>, markov: Box<dyn ChainModel>) -> Result<Self> {
        let database = create_database(&config, platform.clone())
            .context("Failed to create chain database")?;
        let filter = WordFilter::from_config(&config);

        Ok(Self {
            config: Arc::new(config),
            platform,
            speech: Arc::new(Mutex::new(Speech { markov, database })),
            filter,
            state: ModuleState::Uninstalled,
            interval: None,
        })
    }

    pub fn name(&self) -> &'static str {
        "markovSpeaking"
    }

    pub fn commands(&self) -> &'static [Command] {
        &COMMANDS
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Whether the interval poster is running
    pub fn is_posting(&self) -> bool {
        self.interval.is_some()
    }

    /// Load persisted state and filters, then start interval posting
    pub async fn install(&mut self) -> Result<()> {
        if self.state != ModuleState::Uninstalled {
            bail!("Module is already installed (current state: {})", self.state);
        }

        {
            let mut speech = self.speech.lock().await;
            let Speech { markov, database } = &mut *speech;
            database.load(markov.as_mut());
        }
        self.filter.init().await;
        self.state = ModuleState::Installed;

        if self.config.interval_post {
            match self.config.interval_post_duration.period() {
                Some(period) => {
                    let context = IntervalContext {
                        speech: self.speech.clone(),
                        platform: self.platform.clone(),
                        visibility: self.config.visibility,
                        sentence_range: self.config.sentence_length_range,
                    };
                    self.interval = Some(IntervalPoster::start(period, context));
                }
                None => error!("Bad duration setting. intervalPost feature is disabled."),
            }
        }

        self.state = ModuleState::Running;
        info!("{} installed", self.name());
        Ok(())
    }

    fn is_running(&self, event: &str) -> bool {
        if self.state == ModuleState::Running {
            true
        } else {
            warn!("Ignoring {} while {}", event, self.state);
            false
        }
    }

    fn learn(&self, markov: &mut dyn ChainModel, sender: &User, message: &str) {
        if !self.config.markov_speaking.allow_learn {
            return;
        }
        if message.is_empty() || self.platform.is_blocked(sender) {
            return;
        }
        markov.learn(&strip_mentions(message));
    }

    /// Learning policy for observed notes
    fn note_is_learnable(&self, note: &Note, bad: bool) -> bool {
        let settings = &self.config.markov_speaking;
        !bad
            && !(!settings.allow_learn_cw && note.cw.is_some())
            && !(!settings.allow_learn_vis_followers && note.visibility == Visibility::Followers)
    }

    /// Observe a timeline note. Never replies.
    pub async fn on_note(&self, note: &Note) {
        if !self.is_running("note") {
            return;
        }

        let text = note.text.as_deref().unwrap_or("");
        let bad = self.filter.is_bad(text);

        {
            let mut speech = self.speech.lock().await;
            let Speech { markov, database } = &mut *speech;
            if let Err(e) = database.update_save(markov.as_mut()).await {
                error!("Failed to save chain database: {}", e);
            }
            if self.note_is_learnable(note, bad) {
                self.learn(markov.as_mut(), &note.user, text);
            }
        }

        info!(
            "{}{}|{}({}): {}",
            if self.platform.is_blocked(&note.user) { "><" } else { "" },
            if bad { "B* " } else { "" },
            note.user.display_name(),
            self.platform.user_id(&note.user),
            text
        );
    }

    /// Answer a message directed at the bot. Returns whether it was handled.
    pub async fn on_mention(&self, msg: &Message) -> bool {
        if !self.is_running("mention") {
            return false;
        }

        if msg.is_message {
            info!(
                "{}*{}(@{}): {}",
                if self.platform.is_blocked(&msg.user) { "><" } else { "" },
                msg.user.display_name(),
                self.platform.user_id(&msg.user),
                msg.text()
            );
        }

        let reply = {
            let mut speech = self.speech.lock().await;
            self.learn(speech.markov.as_mut(), &msg.user, msg.text());
            speak(speech.markov.as_mut(), sentence_length(self.config.sentence_length_range))
        };

        match self.platform.reply(msg, &reply).await {
            Ok(()) => true,
            Err(e) => {
                error!("Couldn't reply to {}: {:#}", msg.user.acct(), e);
                false
            }
        }
    }

    /// Handle `markov ...` commands. Other namespaces are left to other handlers.
    pub async fn on_command(&self, msg: &Message, cmd: &[&str]) -> bool {
        if cmd.first() != Some(&"markov") {
            return false;
        }
        if !self.is_running("command") {
            return false;
        }

        let is_op = self.platform.is_op(&msg.user);
        let reply = match cmd.get(1).copied() {
            Some("reset") if is_op => match self.reset().await {
                Ok(archive) => {
                    info!("{} reset the chain database ({})", msg.user.acct(), archive.display());
                    "👍".to_string()
                }
                Err(e) => {
                    error!("{:#}", e);
                    format!("👎(Reset failed: {})", e)
                }
            },
            Some("delete") if is_op => {
                let morphemes: Vec<String> = cmd[2..].iter().map(|m| m.to_string()).collect();
                let removed = self.speech.lock().await.markov.remove_matching(&morphemes);
                info!("{} deleted {} chains containing {:?}", msg.user.acct(), removed, morphemes);
                format!("👍\n`{}`", morphemes.join(","))
            }
            Some("reset") | Some("delete") => PERMISSION_DENIED.to_string(),
            _ => HELP.to_string(),
        };

        if let Err(e) = self.platform.reply(msg, &reply).await {
            error!("Couldn't reply to command: {:#}", e);
        }
        true
    }

    /// Archive the database and start over with an empty chain
    pub async fn reset(&self) -> Result<PathBuf> {
        let mut speech = self.speech.lock().await;
        let Speech { markov, database } = &mut *speech;
        database
            .reset(markov.as_mut())
            .context("Failed to reset chain database")
    }

    /// Status report
    pub async fn info(&self) -> Result<String> {
        let speech = self.speech.lock().await;
        let size = speech.database.size().context("Failed to read database size")?;
        let max_size = self.config.database.max_size;
        let percent = if max_size == 0 {
            0.0
        } else {
            size as f64 / max_size as f64 * 100.0
        };
        Ok(format!(
            "Database: {}, {} / {} ({:.1}%) \nFilters: {}",
            speech.database.kind(),
            size,
            max_size,
            percent,
            self.filter.sources()
        ))
    }

    /// Generate text without learning or posting
    pub async fn generate(&self) -> String {
        let mut speech = self.speech.lock().await;
        speak(speech.markov.as_mut(), sentence_length(self.config.sentence_length_range))
    }

    /// Notes counted since the last save
    pub async fn pending_saves(&self) -> u32 {
        self.speech.lock().await.database.pending()
    }

    /// Snapshot of the learned chain
    pub async fn chain_state(&self) -> ChainState {
        self.speech.lock().await.markov.export_state()
    }

    /// Shutdown hook: stop posting and persist everything learned so far
    pub async fn on_interrupted(&mut self) -> Result<()> {
        if self.state == ModuleState::Interrupted {
            return Ok(());
        }
        if let Some(poster) = self.interval.take() {
            poster.stop().await;
        }

        let result = {
            let mut speech = self.speech.lock().await;
            let Speech { markov, database } = &mut *speech;
            database.on_interrupted(markov.as_mut()).await
        };
        self.state = ModuleState::Interrupted;
        result.context("Failed to save chain database on shutdown")?;
        info!("{} saved and stopped", self.name());
        Ok(())
    }
}
