//! Slack Web API client.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SlackError};

const API_BASE: &str = "https://slack.com/api";

/// One message from a Slack thread.
///
/// The timestamp doubles as the message identifier; Slack timestamps are
/// monotonically increasing within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackMessage {
    /// Message timestamp, e.g. "1712345678.123456".
    pub ts: String,
    /// Message text. Empty when absent.
    #[serde(default)]
    pub text: String,
    /// Author user ID. Empty when absent (e.g. bot messages).
    #[serde(default)]
    pub user: String,
}

/// A Slack Web API client bound to one bot token.
///
/// Cheap to clone; clones share the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl SlackClient {
    /// Create a client from a bot token.
    pub fn new(token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_base: API_BASE.to_string(),
        }
    }

    /// Post a message to a channel. Returns the message timestamp, which
    /// identifies the thread for later replies.
    pub async fn post_to_channel(&self, channel: &str, text: &str) -> Result<String> {
        let body = json!({ "channel": channel, "text": text });
        let response = self.call("chat.postMessage", &body).await?;
        parse_post_response(&response)
    }

    /// Post a message into an existing thread. Returns the reply timestamp.
    pub async fn post_to_thread(&self, channel: &str, parent_ts: &str, text: &str) -> Result<String> {
        let body = json!({ "channel": channel, "thread_ts": parent_ts, "text": text });
        let response = self.call("chat.postMessage", &body).await?;
        parse_post_response(&response)
    }

    /// Fetch thread replies newer than `after_ts`, oldest first.
    ///
    /// The parent message itself is never included; when `after_ts` is set,
    /// it is passed as `oldest` so the server trims the page, and anything at
    /// or below it is filtered out as already seen (`oldest` is inclusive).
    pub async fn fetch_replies(
        &self,
        channel: &str,
        parent_ts: &str,
        after_ts: Option<&str>,
    ) -> Result<Vec<SlackMessage>> {
        let url = format!("{}/conversations.replies", self.api_base);
        let response: Value = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&replies_query(channel, parent_ts, after_ts))
            .send()
            .await?
            .json()
            .await?;
        parse_replies_response(&response, parent_ts, after_ts)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{method}", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        Ok(response)
    }
}

/// True when timestamp `a` is strictly newer than `b`.
///
/// Slack timestamps are decimal seconds; compare numerically so "999.0"
/// sorts before "1000.0".
pub(crate) fn ts_newer(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(a), Ok(b)) => a > b,
        _ => a > b,
    }
}

fn replies_query<'a>(
    channel: &'a str,
    parent_ts: &'a str,
    after_ts: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut query = vec![("channel", channel), ("ts", parent_ts)];
    if let Some(after) = after_ts {
        query.push(("oldest", after));
    }
    query
}

fn check_envelope(response: &Value) -> Result<()> {
    if response.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = response
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(SlackError::Api(error.to_string()))
}

fn parse_post_response(response: &Value) -> Result<String> {
    check_envelope(response)?;
    response
        .get("ts")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SlackError::InvalidResponse("missing ts in post response".into()))
}

fn parse_replies_response(
    response: &Value,
    parent_ts: &str,
    after_ts: Option<&str>,
) -> Result<Vec<SlackMessage>> {
    check_envelope(response)?;
    let messages = response
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| SlackError::InvalidResponse("missing messages in replies".into()))?;

    let mut replies = Vec::new();
    for message in messages {
        let Ok(message) = serde_json::from_value::<SlackMessage>(message.clone()) else {
            // One malformed entry should not poison the batch.
            continue;
        };
        if message.ts == parent_ts {
            continue;
        }
        if let Some(after) = after_ts {
            if !ts_newer(&message.ts, after) {
                continue;
            }
        }
        replies.push(message);
    }
    Ok(replies)
}
