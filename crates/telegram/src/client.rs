use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    tracing::debug,
};

use crate::error::{Error, Result};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// The bot's own account, from `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    pub chat: Option<Chat>,
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<ChatEvent>,
    #[serde(default)]
    pub my_chat_member: Option<ChatEvent>,
}

impl Update {
    /// The chat and sender, from a message or a membership change.
    pub fn participants(&self) -> (Option<&Chat>, Option<&User>) {
        let chat = self
            .message
            .as_ref()
            .and_then(|m| m.chat.as_ref())
            .or_else(|| self.my_chat_member.as_ref().and_then(|m| m.chat.as_ref()));
        let from = self
            .message
            .as_ref()
            .and_then(|m| m.from.as_ref())
            .or_else(|| self.my_chat_member.as_ref().and_then(|m| m.from.as_ref()));
        (chat, from)
    }
}

/// Minimal Bot API client.
#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    base: String,
    token: Secret<String>,
}

impl BotApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base(TELEGRAM_API_BASE, token)
    }

    /// Client against a different API host (tests, local Bot API servers).
    pub fn with_base(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base: base.into().trim_end_matches('/').to_string(),
            token: Secret::new(token.into()),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/bot{}/{method}", self.base, self.token.expose_secret());
        // Error responses still carry the JSON envelope, so the status is not
        // checked separately.
        let resp: ApiResponse<T> = self.client.get(url).query(query).send().await?.json().await?;
        debug!(method, ok = resp.ok, "telegram API call");
        match (resp.ok, resp.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(Error::Api {
                method,
                description: resp
                    .description
                    .unwrap_or_else(|| "no description".into()),
            }),
        }
    }

    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &[]).await
    }

    pub async fn get_updates(&self, limit: u32) -> Result<Vec<Update>> {
        let limit = limit.to_string();
        self.call("getUpdates", &[("limit", limit.as_str())]).await
    }
}
