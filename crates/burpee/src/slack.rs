//! Slack Web API クライアント。
//!
//! 使うのは `conversations.list` と `chat.postMessage` の 2 つだけ。

use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
    #[error("Unexpected response from {method}: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SlackError>;

/// チャンネル名と ID の組。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// `conversations.list` の 1 ページ分。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    /// 次のページのカーソル。最終ページでは `None`
    pub next_cursor: Option<String>,
}

/// チャンネル一覧の取得条件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChannels<'a> {
    pub limit: u32,
    pub cursor: Option<&'a str>,
}

/// `chat.postMessage` の結果。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// チャットプラットフォームへの操作。
///
/// 公開・未アーカイブのチャンネルだけを列挙する。
pub trait ChatClient {
    fn list_channels(
        &self,
        request: ListChannels<'_>,
    ) -> impl Future<Output = Result<ChannelPage>>;

    fn post_message(&self, channel: &str, text: &str)
    -> impl Future<Output = Result<PostedMessage>>;
}

pub struct SlackClient {
    http_client: reqwest::Client,
    base_url: String,
    auth: HeaderValue,
}

impl SlackClient {
    pub fn new(
        token: &str,
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("Slack token contains invalid characters")?;
        auth.set_sensitive(true);

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client for Slack")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn list_channels_request(&self, request: &ListChannels<'_>) -> Result<reqwest::Request> {
        let mut query = vec![
            ("types", "public_channel".to_string()),
            ("exclude_archived", "true".to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(cursor) = request.cursor {
            query.push(("cursor", cursor.to_string()));
        }

        Ok(self
            .http_client
            .get(self.url("conversations.list"))
            .header(AUTHORIZATION, self.auth.clone())
            .query(&query)
            .build()?)
    }

    fn post_message_request(&self, channel: &str, text: &str) -> Result<reqwest::Request> {
        Ok(self
            .http_client
            .post(self.url("chat.postMessage"))
            .header(AUTHORIZATION, self.auth.clone())
            .json(&PostMessageRequest {
                channel,
                text,
                mrkdwn: false,
            })
            .build()?)
    }

    async fn call(&self, request: reqwest::Request) -> Result<String> {
        Ok(self
            .http_client
            .execute(request)
            .await?
            .error_for_status()?
            .text()
            .await?)
    }
}

impl ChatClient for SlackClient {
    async fn list_channels(&self, request: ListChannels<'_>) -> Result<ChannelPage> {
        let body = self.call(self.list_channels_request(&request)?).await?;
        parse_channel_page(&body)
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage> {
        let body = self.call(self.post_message_request(channel, text)?).await?;
        parse_posted_message(&body)
    }
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    mrkdwn: bool,
}

/// Slack のレスポンスは常に `ok` を持ち、失敗時は `error` にコードが入る。
#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    payload: Option<T>,
}

#[derive(Deserialize)]
struct ConversationsList {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

fn unwrap_envelope<T: DeserializeOwned>(method: &'static str, body: &str) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|source| SlackError::Decode { method, source })?;

    if !envelope.ok {
        return Err(SlackError::Api(
            envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
        ));
    }

    envelope.payload.ok_or_else(|| SlackError::Api(format!("{method}: empty response")))
}

fn parse_channel_page(body: &str) -> Result<ChannelPage> {
    let list: ConversationsList = unwrap_envelope("conversations.list", body)?;
    let next_cursor = list
        .response_metadata
        .map(|m| m.next_cursor)
        .filter(|c| !c.is_empty());

    debug!(
        channels = list.channels.len(),
        next_cursor = next_cursor.as_deref().unwrap_or(""),
        "Fetched channel page"
    );

    Ok(ChannelPage {
        channels: list.channels,
        next_cursor,
    })
}

fn parse_posted_message(body: &str) -> Result<PostedMessage> {
    unwrap_envelope("chat.postMessage", body)
}
