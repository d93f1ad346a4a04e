//! Configuration loading.
//!
//! Configuration is a single JSON file mapping printer serials to access
//! codes plus the Slack settings. Everything is optional: with no Slack
//! token the monitor runs notification-free, and a printer with no entry is
//! discovered but never subscribed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

/// Per-printer settings, keyed by serial number.
#[derive(Debug, Clone, Deserialize)]
pub struct PrinterConfig {
    /// LAN access code from the printer's settings screen.
    pub access_code: String,
    /// Fixed IP address, overriding the discovered one.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Log file prefix, overriding the default (lowercased serial).
    #[serde(default)]
    pub filename_prefix: Option<String>,
}

/// Slack relay settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackConfig {
    /// Bot token. Absent means the relay is disabled.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Channel for print lifecycle notifications.
    #[serde(default)]
    pub print_notification_channel: Option<String>,
    /// Channel for monitor status (startup message and its reply thread).
    #[serde(default)]
    pub error_notification_channel: Option<String>,
}

/// Full configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Printer settings by serial number.
    #[serde(default)]
    pub printers: HashMap<String, PrinterConfig>,
    /// Slack settings.
    #[serde(default)]
    pub slack: SlackConfig,
}

/// Default config file location: `$XDG_CONFIG_HOME/kiln.json`, falling back
/// to `~/.config/kiln.json`, falling back to `./kiln.json`.
pub fn default_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            return Path::new(&dir).join("kiln.json");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Path::new(&home).join(".config").join("kiln.json");
        }
    }
    PathBuf::from("kiln.json")
}

/// Load configuration.
///
/// An explicitly given path must exist and parse. With no path, a missing
/// default file yields the empty configuration with a warning, but a file
/// that exists and fails to parse is still a startup error.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (default_path(), false),
    };

    if !path.exists() {
        if explicit {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        warn!(
            "no config file at {}, running with empty configuration",
            path.display()
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "printers": {{
                    "00M00A2B012345": {{
                        "access_code": "12345678",
                        "ip_address": "192.168.1.100"
                    }}
                }},
                "slack": {{
                    "access_token": "xoxb-test",
                    "print_notification_channel": "C111",
                    "error_notification_channel": "C222"
                }}
            }}"#
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        let printer = &config.printers["00M00A2B012345"];
        assert_eq!(printer.access_code, "12345678");
        assert_eq!(printer.ip_address.as_deref(), Some("192.168.1.100"));
        assert_eq!(printer.filename_prefix, None);
        assert_eq!(config.slack.access_token.as_deref(), Some("xoxb-test"));
        assert_eq!(
            config.slack.print_notification_channel.as_deref(),
            Some("C111")
        );
    }

    #[test]
    fn test_load_empty_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert!(config.printers.is_empty());
        assert!(config.slack.access_token.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_access_code_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"printers": {{"SERIAL": {{}}}}}}"#).unwrap();
        assert!(load(Some(file.path())).is_err());
    }
}
