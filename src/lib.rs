//! Markov Speaking - chat bot module that learns to talk from the timeline
//!
//! - Passive learning from observed notes, gated by a word filter
//! - Replies to mentions with text generated from a Markov chain
//! - Size-bounded JSON persistence with rotation and decay
//! - Optional autonomous posting on an interval
//!
//! # Example
//!
//! ```ignore
//! use markov_speaking::{Config, MarkovSpeaking, MisskeyClient, TripletChain};
//! use markov_speaking::platform::misskey::MisskeyConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let platform = Arc::new(MisskeyClient::new(MisskeyConfig::from_config(&config))?);
//!     let mut module = MarkovSpeaking::new(config, platform, Box::new(TripletChain::new()))?;
//!     module.install().await?;
//!     println!("{}", module.generate().await);
//!     module.on_interrupted().await
//! }
//! ```

pub mod chain;
pub mod config;
pub mod database;
pub mod filter;
pub mod platform;
pub mod speaking;
pub mod cli;

pub use chain::{ChainModel, ChainState, TripletChain};
pub use config::Config;
pub use database::{create_database, ChainDatabase, DatabaseError, OnlyOneDatabase, SaveOutcome};
pub use filter::WordFilter;
pub use platform::{Message, MisskeyClient, Note, Platform, User, Visibility};
pub use speaking::{MarkovSpeaking, ModuleState, PLACEHOLDER};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Markov chain speaking module", NAME, VERSION)
}
