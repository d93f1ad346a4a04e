//! The job lifecycle transition table.

use kiln_bambu::BambuStatusReport;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobPhase {
    /// No job running.
    #[default]
    Idle,
    /// A job is printing (includes the preparation stage).
    Printing,
    /// The job is paused.
    Paused,
    /// The job finished successfully.
    Completed,
    /// The job ended with an error.
    Failed,
}

impl JobPhase {
    /// Map a printer state string onto a phase.
    ///
    /// Returns `None` for states the table does not know; an unknown state
    /// never fires a transition.
    pub fn parse(gcode_state: &str) -> Option<Self> {
        match gcode_state.to_uppercase().as_str() {
            "IDLE" => Some(Self::Idle),
            "RUNNING" | "PREPARE" | "SLICING" => Some(Self::Printing),
            "PAUSE" => Some(Self::Paused),
            "FINISH" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Tracked state for one printer.
///
/// Exactly one of these exists per monitored printer, owned by that
/// printer's monitor task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobState {
    /// Current lifecycle phase.
    pub phase: JobPhase,
    /// Name of the job the phase applies to, once known.
    pub job_name: Option<String>,
    /// Last seen progress (0-100), if the printer has reported one.
    pub progress: Option<f64>,
}

/// One fired lifecycle transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Phase before the transition.
    pub from: JobPhase,
    /// Phase after the transition.
    pub to: JobPhase,
    /// Job the transition applies to.
    pub job_name: Option<String>,
    /// Progress at the time of the transition, if known.
    pub progress: Option<f64>,
    /// Estimated remaining minutes, if known.
    pub remaining_min: Option<u32>,
    /// Printer error code, when the printer reported a nonzero one.
    pub error_code: Option<u64>,
}

/// Apply one report to the tracked state.
///
/// Returns the next state and the transitions that fired, in order. An
/// identical consecutive report fires nothing; a report whose job name
/// changes while printing fires an implicit completion of the old job
/// followed by the start of the new one (printers do not reliably emit an
/// idle tick between back-to-back jobs). A report with an unknown or absent
/// state string leaves the state untouched.
pub fn advance(state: &JobState, report: &BambuStatusReport) -> (JobState, Vec<Transition>) {
    let Some(new_phase) = report.gcode_state.as_deref().and_then(JobPhase::parse) else {
        return (state.clone(), Vec::new());
    };

    let report_job = report.gcode_file.clone();
    let job_changed = matches!(
        (&report_job, &state.job_name),
        (Some(new), Some(old)) if new != old
    );
    let error_code = report.print_error.filter(|code| *code != 0);

    // Same phase, same job: at most a silent progress refresh.
    if new_phase == state.phase && !job_changed {
        let next = JobState {
            phase: state.phase,
            job_name: state.job_name.clone().or(report_job),
            progress: report.mc_percent.or(state.progress),
        };
        return (next, Vec::new());
    }

    // Job switch without an intervening idle: close out the old job first.
    if state.phase == JobPhase::Printing && new_phase == JobPhase::Printing && job_changed {
        let completed = Transition {
            from: JobPhase::Printing,
            to: JobPhase::Completed,
            job_name: state.job_name.clone(),
            progress: None,
            remaining_min: None,
            error_code: None,
        };
        let started = Transition {
            from: JobPhase::Completed,
            to: JobPhase::Printing,
            job_name: report_job.clone(),
            progress: report.mc_percent,
            remaining_min: report.mc_remaining_time,
            error_code,
        };
        let next = JobState {
            phase: JobPhase::Printing,
            job_name: report_job,
            progress: report.mc_percent,
        };
        return (next, vec![completed, started]);
    }

    // Same phase, changed job name, not printing: refresh the name silently.
    // A self-loop is not a lifecycle edge and must not notify.
    if new_phase == state.phase {
        let next = JobState {
            phase: state.phase,
            job_name: report_job.or_else(|| state.job_name.clone()),
            progress: report.mc_percent.or(state.progress),
        };
        return (next, Vec::new());
    }

    let job_name = report_job.or_else(|| state.job_name.clone());
    let transition = Transition {
        from: state.phase,
        to: new_phase,
        job_name: job_name.clone(),
        progress: report.mc_percent.or(state.progress),
        remaining_min: report.mc_remaining_time,
        error_code,
    };
    let next = JobState {
        phase: new_phase,
        job_name,
        progress: report.mc_percent.or(state.progress),
    };
    (next, vec![transition])
}
