//! Chat platform integration
//!
//! The speaking module only needs a handful of capabilities from the
//! platform: replying, posting, and looking up blocked users and operators.
//! Those live behind the [`Platform`] trait so the client can be swapped.

pub mod misskey;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use misskey::MisskeyClient;

/// Note visibility
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Home,
    Followers,
    Specified,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Home => write!(f, "home"),
            Visibility::Followers => write!(f, "followers"),
            Visibility::Specified => write!(f, "specified"),
        }
    }
}

/// Platform user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Remote host; None for local users
    #[serde(default)]
    pub host: Option<String>,
}

impl User {
    /// `username` for local users, `username@host` for remote ones
    pub fn acct(&self) -> String {
        match &self.host {
            Some(host) => format!("{}@{}", self.username, host),
            None => self.username.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// A note observed on the timeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub user: User,
    #[serde(default)]
    pub text: Option<String>,
    /// Content warning
    #[serde(default)]
    pub cw: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// A message directed at the bot: a mention, a reply, or a direct message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Note or message id
    pub id: String,
    pub user: User,
    #[serde(default)]
    pub text: Option<String>,
    /// Direct message rather than a note
    #[serde(default)]
    pub is_message: bool,
}

impl Message {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Capabilities the speaking module consumes from the platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Reply to a message
    async fn reply(&self, msg: &Message, text: &str) -> Result<()>;

    /// Create a new note
    async fn create_note(&self, text: &str, visibility: Visibility, local_only: bool) -> Result<()>;

    /// Whether the user is on the block list
    fn is_blocked(&self, user: &User) -> bool;

    /// Whether the user may run operator commands
    fn is_op(&self, user: &User) -> bool;

    /// Stable user id for logging
    fn user_id(&self, user: &User) -> String {
        user.acct()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acct() {
        let local = User { username: "alice".into(), ..Default::default() };
        assert_eq!(local.acct(), "alice");

        let remote = User {
            username: "bob".into(),
            host: Some("example.com".into()),
            ..Default::default()
        };
        assert_eq!(remote.acct(), "bob@example.com");
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user = User { username: "alice".into(), ..Default::default() };
        assert_eq!(user.display_name(), "alice");
        let user = User { username: "alice".into(), name: Some("Alice".into()), ..Default::default() };
        assert_eq!(user.display_name(), "Alice");
    }

    #[test]
    fn test_note_deserializes_platform_json() {
        let note: Note = serde_json::from_str(
            r#"{"id":"n1","user":{"id":"u1","username":"alice","host":null},
                "text":"hello","cw":"spoiler","visibility":"followers"}"#,
        )
        .unwrap();
        assert_eq!(note.visibility, Visibility::Followers);
        assert_eq!(note.cw.as_deref(), Some("spoiler"));
        assert_eq!(note.user.acct(), "alice");
    }
}
