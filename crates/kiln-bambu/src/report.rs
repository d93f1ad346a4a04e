//! Printer status reports.
//!
//! The printer's report topic pushes deltas: a payload carries only the
//! fields that changed since the previous push. [`ReportCache`] overlays each
//! delta on the last known values so every report handed to a consumer is a
//! full snapshot.

use serde::{Deserialize, Serialize};

/// One decoded status snapshot from a printer.
///
/// Every field is optional; a field stays `None` until the printer has
/// reported it at least once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BambuStatusReport {
    /// Printer state string (e.g. "RUNNING", "PAUSE", "FINISH", "FAILED").
    pub gcode_state: Option<String>,
    /// Name of the file being printed.
    pub gcode_file: Option<String>,
    /// Print progress (0-100).
    pub mc_percent: Option<f64>,
    /// Estimated remaining time in minutes.
    pub mc_remaining_time: Option<u32>,
    /// Current layer number.
    pub layer_num: Option<u32>,
    /// Total layer count.
    pub total_layer_num: Option<u32>,
    /// Printer error code, zero when healthy.
    pub print_error: Option<u64>,
    /// Bed temperature (°C).
    pub bed_temper: Option<f64>,
    /// Target bed temperature (°C).
    pub bed_target_temper: Option<f64>,
    /// Nozzle temperature (°C).
    pub nozzle_temper: Option<f64>,
    /// Target nozzle temperature (°C).
    pub nozzle_target_temper: Option<f64>,
    /// Chamber temperature (°C), if the printer has a chamber sensor.
    pub chamber_temper: Option<f64>,
    /// Part cooling fan speed.
    pub cooling_fan_speed: Option<String>,
    /// WiFi signal strength (e.g. "-44dBm").
    pub wifi_signal: Option<String>,
}

macro_rules! overlay {
    ($cache:expr, $delta:expr, $($field:ident),+ $(,)?) => {
        $(
            if $delta.$field.is_some() {
                $cache.$field = $delta.$field;
            }
        )+
    };
}

/// Accumulates report deltas into full snapshots.
#[derive(Debug, Clone, Default)]
pub struct ReportCache {
    current: BambuStatusReport,
}

impl ReportCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one MQTT payload and merge it into the cache.
    ///
    /// Returns the merged snapshot, or `None` when the payload is valid JSON
    /// but not a status report (the report topic also carries `system` and
    /// `info` messages). A payload that is not JSON at all is an error.
    pub fn apply_payload(&mut self, payload: &[u8]) -> Result<Option<BambuStatusReport>, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        let Some(print) = value.get("print") else {
            return Ok(None);
        };
        let delta: BambuStatusReport = serde_json::from_value(print.clone())?;
        self.merge(delta);
        Ok(Some(self.current.clone()))
    }

    /// Overlay a delta onto the cached snapshot. Absent fields keep their
    /// previous value.
    pub fn merge(&mut self, delta: BambuStatusReport) {
        overlay!(
            self.current,
            delta,
            gcode_state,
            gcode_file,
            mc_percent,
            mc_remaining_time,
            layer_num,
            total_layer_num,
            print_error,
            bed_temper,
            bed_target_temper,
            nozzle_temper,
            nozzle_target_temper,
            chamber_temper,
            cooling_fan_speed,
            wifi_signal,
        );
    }

    /// The latest merged snapshot.
    pub fn current(&self) -> &BambuStatusReport {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_report() {
        let payload = br#"{"print":{"gcode_state":"RUNNING","gcode_file":"benchy.3mf","mc_percent":42.0,"mc_remaining_time":90,"bed_temper":60.0,"nozzle_temper":210.0}}"#;
        let mut cache = ReportCache::new();
        let report = cache.apply_payload(payload).unwrap().unwrap();
        assert_eq!(report.gcode_state.as_deref(), Some("RUNNING"));
        assert_eq!(report.gcode_file.as_deref(), Some("benchy.3mf"));
        assert_eq!(report.mc_percent, Some(42.0));
        assert_eq!(report.mc_remaining_time, Some(90));
        assert_eq!(report.bed_temper, Some(60.0));
    }

    #[test]
    fn test_delta_merge_keeps_previous_fields() {
        let mut cache = ReportCache::new();
        cache
            .apply_payload(br#"{"print":{"gcode_state":"RUNNING","gcode_file":"a.3mf","mc_percent":10.0}}"#)
            .unwrap();
        let report = cache
            .apply_payload(br#"{"print":{"mc_percent":11.0}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(report.gcode_state.as_deref(), Some("RUNNING"));
        assert_eq!(report.gcode_file.as_deref(), Some("a.3mf"));
        assert_eq!(report.mc_percent, Some(11.0));
    }

    #[test]
    fn test_non_print_payload_is_skipped() {
        let mut cache = ReportCache::new();
        let result = cache
            .apply_payload(br#"{"system":{"command":"get_access_code"}}"#)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut cache = ReportCache::new();
        assert!(cache.apply_payload(b"not json").is_err());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let payload = br#"{"print":{"gcode_state":"IDLE","spd_lvl":2,"lights_report":[{"node":"chamber_light","mode":"on"}]}}"#;
        let mut cache = ReportCache::new();
        let report = cache.apply_payload(payload).unwrap().unwrap();
        assert_eq!(report.gcode_state.as_deref(), Some("IDLE"));
    }

    #[test]
    fn test_never_seen_fields_stay_none() {
        let mut cache = ReportCache::new();
        let report = cache
            .apply_payload(br#"{"print":{"gcode_state":"IDLE"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(report.mc_percent, None);
        assert_eq!(report.chamber_temper, None);
    }
}
