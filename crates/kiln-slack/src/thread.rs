//! Poll-based thread reply watching.
//!
//! Slack can push replies over webhooks, but that needs an inbound endpoint.
//! The watcher instead polls `conversations.replies` on a fixed interval and
//! hands each new reply to a handler, tracking a timestamp watermark so a
//! reply is delivered at most once.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{SlackClient, SlackMessage};
use crate::error::Result;

/// Default poll interval for thread watching.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Poll for thread replies until cancelled.
///
/// Each cycle fetches the replies newer than the current watermark and
/// invokes `handler` once per reply, oldest first. The watermark advances
/// after every handler invocation whether or not it succeeded: a failing
/// handler never causes re-delivery and never blocks later replies. A fetch
/// error counts as an empty cycle; polling continues on the next interval
/// with no backoff. Cancellation is observed during the fetch and during the
/// sleep.
pub async fn watch_replies<Fetch, FetchFut, Handle, HandleFut>(
    mut fetch: Fetch,
    mut handler: Handle,
    mut last_seen_ts: Option<String>,
    interval: Duration,
    token: CancellationToken,
) where
    Fetch: FnMut(Option<String>) -> FetchFut,
    FetchFut: Future<Output = Result<Vec<SlackMessage>>>,
    Handle: FnMut(SlackMessage) -> HandleFut,
    HandleFut: Future<Output = Result<()>>,
{
    loop {
        let batch = tokio::select! {
            _ = token.cancelled() => {
                debug!("thread watcher cancelled");
                return;
            }
            result = fetch(last_seen_ts.clone()) => match result {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("fetching thread replies failed: {e}");
                    Vec::new()
                }
            },
        };

        for reply in batch {
            let ts = reply.ts.clone();
            if let Err(e) = handler(reply).await {
                warn!("reply handler failed for {ts}: {e}");
            }
            // Advance regardless of handler outcome: forward progress over
            // guaranteed delivery.
            last_seen_ts = Some(ts);
        }

        tokio::select! {
            _ = token.cancelled() => {
                debug!("thread watcher cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

impl SlackClient {
    /// Watch one thread's replies with this client.
    ///
    /// Convenience wrapper around [`watch_replies`] with
    /// `conversations.replies` as the fetch step.
    pub async fn watch_thread<Handle, HandleFut>(
        &self,
        channel: &str,
        parent_ts: &str,
        last_seen_ts: Option<String>,
        interval: Duration,
        token: CancellationToken,
        handler: Handle,
    ) where
        Handle: FnMut(SlackMessage) -> HandleFut,
        HandleFut: Future<Output = Result<()>>,
    {
        let client = self.clone();
        let channel = channel.to_string();
        let parent_ts = parent_ts.to_string();
        let fetch = move |after: Option<String>| {
            let client = client.clone();
            let channel = channel.clone();
            let parent_ts = parent_ts.clone();
            async move {
                client
                    .fetch_replies(&channel, &parent_ts, after.as_deref())
                    .await
            }
        };
        watch_replies(fetch, handler, last_seen_ts, interval, token).await;
    }
}
