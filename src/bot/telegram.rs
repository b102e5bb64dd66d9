//! Minimal Telegram Bot API client.
//!
//! Only the two calls needed to hand out course access are implemented.
//! Every call is a JSON POST to `{base}/bot{token}/{method}`; Telegram answers
//! with an `{ok, result, description}` envelope.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

/// Public Bot API endpoint
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Upper bound for one Bot API call, connect included
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateChatInviteLink {
    chat_id: i64,
    member_limit: u32,
}

/// Invite link returned by `createChatInviteLink`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatInviteLink {
    /// Link to share with the user
    pub invite_link: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sent message, only the id is kept
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message id within the chat
    pub message_id: i64,
}

/// HTTP client bound to one bot token
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url embeds the bot token
        f.debug_struct("TelegramClient").finish_non_exhaustive()
    }
}

impl TelegramClient {
    /// Client for the public Bot API
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_url(DEFAULT_API_URL, token)
    }

    /// Client for a custom Bot API server
    pub fn with_api_url(api_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(api_url, token, REQUEST_TIMEOUT)
    }

    fn with_timeout(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response: ApiResponse<R> = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .json(params)
            .send()
            .await
            // The request URL carries the token
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        debug!(method, ok = response.ok, "Telegram call finished");

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(Error::Telegram {
                method: method.to_string(),
                description: description.unwrap_or_else(|| "empty result".to_string()),
            }),
        }
    }

    /// Creates an invite link that admits a single member.
    pub async fn create_chat_invite_link(&self, chat_id: i64) -> Result<ChatInviteLink> {
        self.call(
            "createChatInviteLink",
            &CreateChatInviteLink {
                chat_id,
                member_limit: 1,
            },
        )
        .await
    }

    /// Sends an HTML formatted message.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                parse_mode: "HTML",
            },
        )
        .await
    }
}
