#![warn(missing_docs)]

//! Slack relay for kiln.
//!
//! This crate provides:
//! - Posting to a channel or into a thread (`chat.postMessage`)
//! - Fetching thread replies (`conversations.replies`)
//! - A poll-based reply watcher, so replies work without inbound webhooks
//!
//! The client is an optional capability: callers hold an
//! `Option<SlackClient>` and an unconfigured deployment simply never
//! constructs one.
//!
//! # Example
//!
//! ```ignore
//! use kiln_slack::SlackClient;
//!
//! let client = SlackClient::new("xoxb-...".to_string());
//! let ts = client.post_to_channel("C123", "monitoring started").await?;
//! client.post_to_thread("C123", &ts, "hello thread").await?;
//! ```

pub mod client;
pub mod error;
pub mod thread;

pub use client::{SlackClient, SlackMessage};
pub use error::{Result, SlackError};
pub use thread::{watch_replies, DEFAULT_POLL_INTERVAL};
