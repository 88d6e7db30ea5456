//! Shared progress state between a job worker and its pollers.

use std::sync::{Mutex, PoisonError};

use haikyo_core::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

/// Receives progress from a running job.
pub trait ProgressSink: Send + Sync {
    /// `percent` is advisory; sinks clamp and keep it monotonic.
    fn report(&self, percent: f64, message: &str);

    /// Called once per finished location, in target order.
    fn location_done(&self, _location: &Location) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _percent: f64, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub message: String,
    pub status: JobStatus,
}

#[derive(Debug)]
struct BoardState {
    percent: f64,
    message: String,
    status: JobStatus,
    results: Vec<Location>,
    drained: bool,
    export_file: Option<String>,
}

/// Lock-guarded progress record for one job.
///
/// Every read and write goes through the mutex, so a poller never observes a
/// half-applied update. `percent` never decreases while the job runs.
#[derive(Debug)]
pub struct ProgressBoard {
    state: Mutex<BoardState>,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BoardState {
                percent: 0.0,
                message: "Idle".to_owned(),
                status: JobStatus::Idle,
                results: Vec::new(),
                drained: false,
                export_file: None,
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BoardState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Moves to `Running` and clears everything from a previous run.
    pub fn start(&self, message: &str) {
        self.with_state(|s| {
            s.percent = 0.0;
            s.message = message.to_owned();
            s.status = JobStatus::Running;
            s.results.clear();
            s.drained = false;
            s.export_file = None;
        });
    }

    pub fn finish(&self, message: &str, export_file: Option<String>) {
        self.with_state(|s| {
            s.percent = 100.0;
            s.message = message.to_owned();
            s.status = JobStatus::Done;
            s.export_file = export_file;
        });
    }

    /// Moves to `Failed`; `percent` is left where it was.
    pub fn fail(&self, message: &str) {
        self.with_state(|s| {
            s.message = message.to_owned();
            s.status = JobStatus::Failed;
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.with_state(|s| ProgressSnapshot {
            percent: s.percent,
            message: s.message.clone(),
            status: s.status,
        })
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.with_state(|s| s.status)
    }

    /// Records completed so far, in target order.
    #[must_use]
    pub fn partial_results(&self) -> Vec<Location> {
        self.with_state(|s| s.results.clone())
    }

    /// The finished record list, handed out once.
    ///
    /// `None` while the job has not finished or after a previous call already
    /// took the list. The records stay available to [`Self::partial_results`]
    /// for export.
    #[must_use]
    pub fn take_results(&self) -> Option<Vec<Location>> {
        self.with_state(|s| {
            if s.status != JobStatus::Done || s.drained {
                return None;
            }
            s.drained = true;
            Some(s.results.clone())
        })
    }

    #[must_use]
    pub fn export_file(&self) -> Option<String> {
        self.with_state(|s| s.export_file.clone())
    }
}

impl ProgressSink for ProgressBoard {
    fn report(&self, percent: f64, message: &str) {
        self.with_state(|s| {
            if s.status != JobStatus::Running {
                return;
            }
            if percent.is_finite() {
                s.percent = s.percent.max(percent.clamp(0.0, 100.0));
            }
            s.message = message.to_owned();
        });
    }

    fn location_done(&self, location: &Location) {
        self.with_state(|s| s.results.push(location.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_monotonic_and_clamped() {
        let board = ProgressBoard::new();
        board.start("go");
        board.report(40.0, "a");
        board.report(30.0, "b");
        assert!((board.snapshot().percent - 40.0).abs() < f64::EPSILON);
        assert_eq!(board.snapshot().message, "b");
        board.report(250.0, "c");
        assert!((board.snapshot().percent - 100.0).abs() < f64::EPSILON);
        board.report(f64::NAN, "d");
        assert!((board.snapshot().percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reports_are_ignored_outside_running() {
        let board = ProgressBoard::new();
        board.report(50.0, "early");
        let snap = board.snapshot();
        assert_eq!(snap.status, JobStatus::Idle);
        assert!(snap.percent.abs() < f64::EPSILON);
    }

    #[test]
    fn results_drain_once_after_done() {
        let board = ProgressBoard::new();
        board.start("go");
        board.location_done(&Location::new("1", "https://haikyo.info/s/1.html"));
        assert!(board.take_results().is_none());

        board.finish("done", None);
        assert_eq!(board.take_results().map(|r| r.len()), Some(1));
        assert!(board.take_results().is_none());
        assert_eq!(board.partial_results().len(), 1);
    }

    #[test]
    fn restart_clears_previous_run() {
        let board = ProgressBoard::new();
        board.start("first");
        board.location_done(&Location::new("1", "u"));
        board.finish("done", Some("f.kml".to_owned()));

        board.start("second");
        let snap = board.snapshot();
        assert_eq!(snap.status, JobStatus::Running);
        assert!(snap.percent.abs() < f64::EPSILON);
        assert!(board.partial_results().is_empty());
        assert!(board.export_file().is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), "\"running\"");
    }
}
