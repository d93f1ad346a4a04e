//! Per-printer report log files.
//!
//! Every decoded report is appended to `{prefix}.log` as one line of
//! `"{rfc3339-utc} {report-json}"`, which makes an easy corpus for replaying
//! against the transition table later.

use std::path::Path;

use chrono::{DateTime, Utc};
use kiln_bambu::BambuStatusReport;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// An open report log for one printer.
pub struct ReportLog {
    file: File,
}

impl ReportLog {
    /// Open (creating if needed) the log file for a printer.
    pub async fn open(dir: &Path, prefix: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.join(format!("{prefix}.log")))
            .await?;
        Ok(Self { file })
    }

    /// Append one report.
    pub async fn append(&mut self, report: &BambuStatusReport) -> std::io::Result<()> {
        let line = format_line(Utc::now(), report);
        self.file.write_all(line.as_bytes()).await
    }
}

fn format_line(now: DateTime<Utc>, report: &BambuStatusReport) -> String {
    // Serializing a plain struct of options cannot fail.
    let json = serde_json::to_string(report).unwrap_or_default();
    format!("{} {}\n", now.to_rfc3339(), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_line() {
        let report = BambuStatusReport {
            gcode_state: Some("RUNNING".into()),
            mc_percent: Some(50.0),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let line = format_line(now, &report);
        assert!(line.starts_with("2023-06-01T12:00:00+00:00 {"));
        assert!(line.ends_with("}\n"));
        assert!(line.contains(r#""gcode_state":"RUNNING""#));
    }

    #[tokio::test]
    async fn test_append_accumulates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ReportLog::open(dir.path(), "printer1").await.unwrap();
        let report = BambuStatusReport {
            gcode_state: Some("IDLE".into()),
            ..Default::default()
        };
        log.append(&report).await.unwrap();
        log.append(&report).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("printer1.log"))
            .await
            .unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
