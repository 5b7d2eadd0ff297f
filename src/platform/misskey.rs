//! Misskey platform client
//!
//! Talks to the Misskey HTTP API. Every endpoint is a JSON `POST` to
//! `{url}/api/{endpoint}` carrying the access token as `i` in the body.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::platform::{Message, Platform, User, Visibility};

/// Misskey client configuration
#[derive(Debug, Clone)]
pub struct MisskeyConfig {
    /// Instance base URL, without trailing slash
    pub url: String,
    /// API access token
    pub token: String,
    /// Operator user ids
    pub op: Vec<String>,
    /// Blocked user ids
    pub blocked: Vec<String>,
}

impl MisskeyConfig {
    /// Load from main config
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.platform.url.trim_end_matches('/').to_string(),
            token: config.platform.token.clone(),
            op: config.op.clone(),
            blocked: config.blocked.clone(),
        }
    }

    /// Check if the client can talk to an instance
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.token.is_empty()
    }

    /// Get API URL for an endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.url, endpoint)
    }
}

/// Note creation request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateNoteRequest<'a> {
    text: &'a str,
    visibility: Visibility,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    local_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_id: Option<&'a str>,
}

/// Direct message request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessageRequest<'a> {
    user_id: &'a str,
    text: &'a str,
}

/// Misskey API client
#[derive(Debug, Clone)]
pub struct MisskeyClient {
    config: MisskeyConfig,
    http_client: reqwest::Client,
}

impl MisskeyClient {
    /// Create a new Misskey client
    pub fn new(config: MisskeyConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, http_client })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Call an API endpoint. The body must serialize to a JSON object.
    pub async fn api<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<Value> {
        let mut body = serde_json::to_value(body).context("Failed to serialize request")?;
        match body.as_object_mut() {
            Some(map) => {
                map.insert("i".to_string(), json!(self.config.token));
            }
            None => bail!("Request body for {} is not an object", endpoint),
        }

        debug!("Calling Misskey API {}", endpoint);

        let response = self
            .http_client
            .post(self.config.api_url(endpoint))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call Misskey API {}", endpoint))?;

        let status = response.status();
        // Some endpoints answer 204 with an empty body
        let text = response.text().await.context("Failed to read Misskey response")?;
        let value: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).context("Failed to parse Misskey response")?
        };

        if let Some(err) = value.get("error") {
            error!("Misskey API error on {}: {}", endpoint, err);
            bail!("Misskey API error: {}", err);
        }
        if !status.is_success() {
            bail!("Misskey API {} returned {}", endpoint, status);
        }

        Ok(value)
    }

    fn matches(list: &[String], user: &User) -> bool {
        let acct = user.acct();
        list.iter().any(|entry| {
            let entry = entry.trim_start_matches('@');
            entry == acct || entry == user.id
        })
    }
}

#[async_trait::async_trait]
impl Platform for MisskeyClient {
    async fn reply(&self, msg: &Message, text: &str) -> Result<()> {
        if msg.is_message {
            let request = CreateMessageRequest { user_id: &msg.user.id, text };
            self.api("messaging/messages/create", &request).await?;
        } else {
            let request = CreateNoteRequest {
                text,
                visibility: Visibility::Home,
                local_only: false,
                reply_id: Some(&msg.id),
            };
            self.api("notes/create", &request).await?;
        }
        info!("Replied to {}", msg.user.acct());
        Ok(())
    }

    async fn create_note(&self, text: &str, visibility: Visibility, local_only: bool) -> Result<()> {
        let request = CreateNoteRequest {
            text,
            visibility,
            local_only,
            reply_id: None,
        };
        self.api("notes/create", &request).await?;
        Ok(())
    }

    fn is_blocked(&self, user: &User) -> bool {
        Self::matches(&self.config.blocked, user)
    }

    fn is_op(&self, user: &User) -> bool {
        Self::matches(&self.config.op, user)
    }
}
