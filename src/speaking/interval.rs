//! Interval posting - autonomous generated notes on a fixed period

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::{sentence_length, Speech};
use crate::config::LengthRange;
use crate::platform::{Platform, Visibility};

/// Result of a single interval tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted(String),
    /// Nothing worth posting could be generated
    Skipped,
    Failed(String),
}

/// Everything a tick needs
#[derive(Clone)]
pub(crate) struct IntervalContext {
    pub speech: Arc<Mutex<Speech>>,
    pub platform: Arc<dyn Platform>,
    pub visibility: Visibility,
    pub sentence_range: Option<LengthRange>,
}

impl IntervalContext {
    /// Generate a body and post it
    pub async fn tick(&self) -> PostOutcome {
        let body = {
            let mut speech = self.speech.lock().await;
            match speech.markov.generate(sentence_length(self.sentence_range)) {
                Ok(sentences) => sentences.join("\n"),
                Err(e) => {
                    info!("Interval post generation failed: {:#}", e);
                    String::new()
                }
            }
        };
        if body.trim().is_empty() {
            return PostOutcome::Skipped;
        }

        match self.platform.create_note(&body, self.visibility, true).await {
            Ok(()) => PostOutcome::Posted(body),
            Err(e) => PostOutcome::Failed(format!("{:#}", e)),
        }
    }
}

/// Handle to the running posting task
pub struct IntervalPoster {
    period: Duration,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl IntervalPoster {
    pub(crate) fn start(period: Duration, context: IntervalContext) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(period, context, shutdown_rx));
        Self {
            period,
            shutdown_tx,
            handle,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the task and wait for an in-flight tick to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("Interval post task ended abnormally: {}", e);
        }
    }
}

async fn run(period: Duration, context: IntervalContext, mut shutdown_rx: broadcast::Receiver<()>) {
    info!("Interval posting started (every {:?})", period);

    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match context.tick().await {
                    PostOutcome::Posted(_) => info!("Successfully posted on interval"),
                    PostOutcome::Skipped => info!("Interval post skipped: nothing to say"),
                    PostOutcome::Failed(e) => error!("An error occurred while creating the interval post: {}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Interval posting shutting down");
                break;
            }
        }
    }
}
