//! Notification text for lifecycle transitions.

use chrono::NaiveDateTime;

use crate::eta::format_eta;
use crate::state::{JobPhase, Transition};

/// Known printer error codes and their descriptions.
///
/// Anything not in the table renders as its raw hex code.
const KNOWN_ERRORS: &[(u64, &str)] = &[
    (0x0700_8011, "AMS filament ran out"),
    (0x0300_8003, "heatbed temperature abnormal"),
    (0x0300_400A, "nozzle temperature abnormal"),
    (0x0C00_8004, "first layer inspection found defects"),
];

/// Describe a printer error code.
pub fn describe_error_code(code: u64) -> String {
    for (known, description) in KNOWN_ERRORS {
        if *known == code {
            return (*description).to_string();
        }
    }
    format!("error code 0x{code:08X}")
}

/// Render the notification text for one transition.
///
/// Pure: the clock is an argument so the same transition always renders the
/// same text for the same `now`.
pub fn render(device_name: &str, transition: &Transition, now: NaiveDateTime) -> String {
    match transition.to {
        JobPhase::Printing if transition.from == JobPhase::Paused => {
            format!(":arrow_forward: {device_name}: Print resumed")
        }
        JobPhase::Printing => {
            let mut message = match &transition.job_name {
                Some(job) => format!(":progress_bar: {device_name}: Print started ({job})"),
                None => format!(":progress_bar: {device_name}: Print started"),
            };
            if let Some(minutes) = transition.remaining_min {
                let eta = format_eta(minutes, now);
                message.push_str(&format!(
                    ", {}, done around {}",
                    eta.duration, eta.finish_time
                ));
            }
            message
        }
        JobPhase::Paused => format!(":double_vertical_bar: {device_name}: Print paused"),
        JobPhase::Completed => format!(":white_check_mark: {device_name}: Print finished!"),
        JobPhase::Failed => match transition.error_code {
            Some(code) => format!(
                ":x: {device_name}: Print failed!\nMessage from printer: {}",
                describe_error_code(code)
            ),
            None => format!(":x: {device_name}: Print failed!"),
        },
        JobPhase::Idle => format!("{device_name}: Printer idle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn transition(from: JobPhase, to: JobPhase) -> Transition {
        Transition {
            from,
            to,
            job_name: Some("benchy.3mf".into()),
            progress: None,
            remaining_min: None,
            error_code: None,
        }
    }

    #[test]
    fn test_start_message_includes_eta() {
        let mut t = transition(JobPhase::Idle, JobPhase::Printing);
        t.remaining_min = Some(125);
        let text = render("Voron", &t, noon());
        assert_eq!(
            text,
            ":progress_bar: Voron: Print started (benchy.3mf), 2.5 hours, done around 02:30 PM"
        );
    }

    #[test]
    fn test_start_message_without_estimate() {
        let t = transition(JobPhase::Idle, JobPhase::Printing);
        let text = render("Voron", &t, noon());
        assert_eq!(text, ":progress_bar: Voron: Print started (benchy.3mf)");
    }

    #[test]
    fn test_pause_and_resume_messages() {
        let paused = transition(JobPhase::Printing, JobPhase::Paused);
        assert_eq!(
            render("Voron", &paused, noon()),
            ":double_vertical_bar: Voron: Print paused"
        );
        let resumed = transition(JobPhase::Paused, JobPhase::Printing);
        assert_eq!(
            render("Voron", &resumed, noon()),
            ":arrow_forward: Voron: Print resumed"
        );
    }

    #[test]
    fn test_failure_message_with_known_code() {
        let mut t = transition(JobPhase::Printing, JobPhase::Failed);
        t.error_code = Some(0x0700_8011);
        let text = render("Voron", &t, noon());
        assert!(text.contains("Print failed!"));
        assert!(text.contains("AMS filament ran out"));
    }

    #[test]
    fn test_failure_message_with_unknown_code() {
        let mut t = transition(JobPhase::Printing, JobPhase::Failed);
        t.error_code = Some(0xDEAD_BEEF);
        let text = render("Voron", &t, noon());
        assert!(text.contains("error code 0xDEADBEEF"));
    }

    #[test]
    fn test_completed_and_idle_messages() {
        let done = transition(JobPhase::Printing, JobPhase::Completed);
        assert_eq!(
            render("Voron", &done, noon()),
            ":white_check_mark: Voron: Print finished!"
        );
        let idle = transition(JobPhase::Completed, JobPhase::Idle);
        assert_eq!(render("Voron", &idle, noon()), "Voron: Printer idle");
    }
}
