#![warn(missing_docs)]

//! Bambu Lab LAN transport for kiln.
//!
//! This crate provides:
//! - Passive printer discovery from SSDP announcements
//! - Subscribe-only MQTT telemetry (`device/{serial}/report`)
//! - Status report decoding with a delta-merge cache
//!
//! The transport is strictly read-only: nothing in this crate publishes a
//! command to a printer.
//!
//! # Example
//!
//! ```ignore
//! use kiln_bambu::{discover_devices, BambuMqttSubscription};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! tokio::spawn(discover_devices(tx, CancellationToken::new()));
//!
//! let device = rx.recv().await.unwrap();
//! let mut sub = BambuMqttSubscription::connect(&device, "access_code").await?;
//! while let Ok(report) = sub.next_report().await {
//!     println!("{:?} {:?}", report.gcode_state, report.mc_percent);
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod mqtt;
pub mod report;

pub use discovery::{discover_devices, BambuDevice, DISCOVERY_PORT};
pub use error::{BambuError, Result};
pub use mqtt::BambuMqttSubscription;
pub use report::BambuStatusReport;
