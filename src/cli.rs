//! CLI interface for markov-speaking

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::chain::TripletChain;
use crate::config::{self, Config};
use crate::platform::misskey::{MisskeyClient, MisskeyConfig};
use crate::platform::{Note, User, Visibility};
use crate::speaking::MarkovSpeaking;

#[derive(Parser)]
#[command(name = "markov-speaking")]
#[command(about = "Markov chain speaking module: learns from notes, replies and posts", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "MARKOV_SPEAKING_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the module: interval posting until Ctrl+C, then save
    Run,
    /// Show database size and filter sources
    Info,
    /// Print generated text
    Generate {
        /// Number of generations
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Learn every line of a file as an observed public note
    Learn {
        /// Text file, one note per line
        file: PathBuf,
    },
    /// Archive the database and start over
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the default configuration
    DefaultConfig,
}

/// Build and install the module from configuration
async fn install(config: Config) -> Result<MarkovSpeaking> {
    let misskey = MisskeyConfig::from_config(&config);
    if !misskey.is_configured() {
        warn!("Platform is not configured; replies and posts will fail");
    }
    let platform = Arc::new(MisskeyClient::new(misskey)?);

    let mut module = MarkovSpeaking::new(config, platform, Box::new(TripletChain::new()))?;
    module.install().await?;
    Ok(module)
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let mut module = install(load_config(cli.config)?).await?;
            println!("{} is running. Press Ctrl+C to stop.", module.name());

            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
            println!("\nShutting down...");
            module.on_interrupted().await?;
        }
        Commands::Info => {
            let module = install(load_config(cli.config)?).await?;
            println!("{}", module.info().await?);
        }
        Commands::Generate { count } => {
            let module = install(load_config(cli.config)?).await?;
            for _ in 0..count {
                println!("{}", module.generate().await);
            }
        }
        Commands::Learn { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut module = install(load_config(cli.config)?).await?;

            let user = User {
                id: "cli".to_string(),
                username: "cli".to_string(),
                ..Default::default()
            };
            let mut count = 0;
            for (i, line) in contents.lines().filter(|l| !l.trim().is_empty()).enumerate() {
                let note = Note {
                    id: format!("cli-{}", i),
                    user: user.clone(),
                    text: Some(line.to_string()),
                    cw: None,
                    visibility: Visibility::Public,
                };
                module.on_note(&note).await;
                count += 1;
            }
            module.on_interrupted().await?;
            println!("Observed {} notes from {}", count, file.display());
        }
        Commands::Reset { yes } => {
            if !yes {
                println!("This archives the chain database and starts over. Re-run with --yes to confirm.");
                return Ok(());
            }
            let module = install(load_config(cli.config)?).await?;
            let archive = module.reset().await?;
            println!("Database archived to {}", archive.display());
        }
        Commands::DefaultConfig => {
            println!("{}", config::default_config_toml());
        }
    }

    Ok(())
}
