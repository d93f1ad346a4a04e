#![warn(missing_docs)]

//! Print-job lifecycle tracking for kiln.
//!
//! This crate turns a stream of printer status reports into discrete
//! lifecycle transitions and the human-readable notification text for each.
//! Nothing here performs I/O: [`advance`] is a pure function from
//! `(JobState, report)` to `(JobState, transitions)`, and rendering takes the
//! clock as an argument, so the whole table is testable by replay.
//!
//! # Example
//!
//! ```
//! use kiln_bambu::BambuStatusReport;
//! use kiln_track::{advance, JobPhase, JobState};
//!
//! let report = BambuStatusReport {
//!     gcode_state: Some("RUNNING".into()),
//!     gcode_file: Some("benchy.3mf".into()),
//!     ..Default::default()
//! };
//! let (state, transitions) = advance(&JobState::default(), &report);
//! assert_eq!(state.phase, JobPhase::Printing);
//! assert_eq!(transitions.len(), 1);
//! ```

pub mod eta;
pub mod notify;
pub mod state;

pub use eta::{format_duration, format_eta, round_up, Eta};
pub use notify::{describe_error_code, render};
pub use state::{advance, JobPhase, JobState, Transition};
