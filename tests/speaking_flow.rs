//! End-to-end flow of the speaking module over a real chain and database file

use markov_speaking::chain::state_from_json;
use markov_speaking::{
    ChainState, Config, MarkovSpeaking, Message, ModuleState, Note, Platform, TripletChain, User,
    Visibility, PLACEHOLDER,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Platform double that records everything sent through it
#[derive(Default)]
struct RecordingPlatform {
    replies: Mutex<Vec<String>>,
    notes: Mutex<Vec<(String, Visibility, bool)>>,
    ops: Vec<String>,
}

impl RecordingPlatform {
    fn with_op(op: &str) -> Self {
        Self {
            ops: vec![op.to_string()],
            ..Default::default()
        }
    }

    fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }

    fn notes(&self) -> Vec<(String, Visibility, bool)> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Platform for RecordingPlatform {
    async fn reply(&self, _msg: &Message, text: &str) -> anyhow::Result<()> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn create_note(&self, text: &str, visibility: Visibility, local_only: bool) -> anyhow::Result<()> {
        self.notes.lock().unwrap().push((text.to_string(), visibility, local_only));
        Ok(())
    }

    fn is_blocked(&self, user: &User) -> bool {
        user.username == "blocked"
    }

    fn is_op(&self, user: &User) -> bool {
        self.ops.contains(&user.username)
    }
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.database.path = dir.join("markov.json");
    config
}

fn user(name: &str) -> User {
    User {
        id: name.to_string(),
        username: name.to_string(),
        ..Default::default()
    }
}

fn note(text: &str) -> Note {
    Note {
        id: "note".to_string(),
        user: user("alice"),
        text: Some(text.to_string()),
        cw: None,
        visibility: Visibility::Home,
    }
}

fn message(from: &str, text: &str) -> Message {
    Message {
        id: "msg".to_string(),
        user: user(from),
        text: Some(text.to_string()),
        is_message: false,
    }
}

fn read_state(path: &Path) -> ChainState {
    state_from_json(&std::fs::read_to_string(path).unwrap()).unwrap()
}

async fn install(config: Config, platform: Arc<RecordingPlatform>) -> MarkovSpeaking {
    let mut module = MarkovSpeaking::new(config, platform, Box::new(TripletChain::with_seed(11))).unwrap();
    module.install().await.unwrap();
    module
}

#[tokio::test]
async fn test_learn_save_and_reload_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let platform = Arc::new(RecordingPlatform::default());

    let mut module = install(config.clone(), platform.clone()).await;
    module.on_note(&note("the weather is lovely today")).await;
    module.on_note(&note("the weather is awful today")).await;
    let learned = module.chain_state().await;
    module.on_interrupted().await.unwrap();
    assert_eq!(module.state(), ModuleState::Interrupted);
    assert_eq!(read_state(&config.database.path), learned);

    let restarted = install(config, platform.clone()).await;
    assert_eq!(restarted.chain_state().await, learned);

    assert!(restarted.on_mention(&message("bob", "how is the weather?")).await);
    let replies = platform.replies();
    assert_eq!(replies.len(), 1);
    assert_ne!(replies[0], PLACEHOLDER);
}

#[tokio::test]
async fn test_debounce_example() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let path = config.database.path.clone();
    let module = install(config, Arc::new(RecordingPlatform::default())).await;

    for text in ["one fish", "two fish", "red fish", "blue fish"] {
        module.on_note(&note(text)).await;
    }
    assert_eq!(module.pending_saves().await, 4);
    assert!(!path.exists());

    module.on_note(&note("this one has a little star")).await;
    assert_eq!(module.pending_saves().await, 0);
    let saved = read_state(&path);
    assert!(saved.keys().any(|k| k.contains("blue fish")));
}

#[tokio::test]
async fn test_rotation_example() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.database.max_size = 20;
    config.database.save_frequency = 1;
    config.database.attenuation_rate = 0.5;
    config.visibility = Visibility::Followers;
    std::fs::write(&config.database.path, r#"{"a b c":10,"d e f":1}"#).unwrap();

    let platform = Arc::new(RecordingPlatform::default());
    let module = install(config.clone(), platform.clone()).await;

    // Empty text: counts toward the save, learns nothing
    module.on_note(&note("")).await;

    let expected: ChainState = [("a b c".to_string(), 5)].into_iter().collect();
    assert_eq!(module.chain_state().await, expected);
    assert_eq!(read_state(&config.database.path), expected);

    let archives: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("markov.json-"))
        .collect();
    assert_eq!(archives.len(), 1);
    let archived = read_state(&archives[0]);
    assert_eq!(archived.get("a b c"), Some(&10));
    assert_eq!(archived.get("d e f"), Some(&1));

    let notes = platform.notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].0.contains("max = 20"));
    assert_eq!(notes[0].1, Visibility::Followers);
}

#[tokio::test]
async fn test_blocked_sender_is_never_learned() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(RecordingPlatform::default());
    let module = install(config_in(dir.path()), platform.clone()).await;

    let mut blocked = note("do not learn this");
    blocked.user = user("blocked");
    module.on_note(&blocked).await;
    assert!(module.on_mention(&message("blocked", "or this either")).await);

    assert!(module.chain_state().await.is_empty());
    assert_eq!(platform.replies(), vec![PLACEHOLDER.to_string()]);
}

#[tokio::test]
async fn test_operator_reset_flow() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let platform = Arc::new(RecordingPlatform::with_op("admin"));
    let mut module = install(config.clone(), platform.clone()).await;

    module.on_note(&note("something worth keeping")).await;
    assert!(module.on_command(&message("mallory", ""), &["markov", "reset"]).await);
    assert!(!module.chain_state().await.is_empty());

    assert!(module.on_command(&message("admin", ""), &["markov", "reset"]).await);
    assert!(module.chain_state().await.is_empty());
    assert!(read_state(&config.database.path).is_empty());

    let info = module.info().await.unwrap();
    assert!(info.starts_with("Database: onlyOne, 2 / 0 (0.0%) \nFilters: "), "{}", info);

    assert_eq!(
        platform.replies(),
        vec!["👎(You don't have a permission)".to_string(), "👍".to_string()]
    );
    module.on_interrupted().await.unwrap();
}
