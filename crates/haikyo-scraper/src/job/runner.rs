//! One scrape run: discovery, per-URL extraction, export file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use haikyo_core::Location;
use haikyo_export::{render, ExportFormat, ExportOptions};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};

use super::progress::{JobStatus, ProgressBoard, ProgressSink, ProgressSnapshot};
use crate::context::ScrapeSettings;
use crate::discovery::{discover_targets, ScrapeTarget};
use crate::error::JobAbortError;
use crate::extract::LocationExtractor;

/// Progress reserved for discovery.
const LOOP_START: f64 = 20.0;
/// Progress spread across the per-URL loop.
const LOOP_SPAN: f64 = 70.0;
const EXPORT_START: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub target: ScrapeTarget,
    /// Falls back to the configured default when absent.
    pub max_locations: Option<usize>,
    /// Zero-based indices into the discovered target list.
    #[serde(default)]
    pub selected_ids: Vec<usize>,
}

impl JobRequest {
    #[must_use]
    pub fn new(target: ScrapeTarget) -> Self {
        Self {
            target,
            max_locations: None,
            selected_ids: Vec::new(),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub locations: Vec<Location>,
    /// File name (not path) of the written KML, if any.
    pub export_file: Option<String>,
    pub cancelled: bool,
    pub message: String,
}

pub struct ScrapeJob {
    id: String,
    target: ScrapeTarget,
    max_locations: usize,
    selected_ids: Vec<usize>,
    base_url: String,
    extractor: LocationExtractor,
    export_dir: Option<PathBuf>,
    export_options: ExportOptions,
    cancel: Arc<AtomicBool>,
}

impl ScrapeJob {
    #[must_use]
    pub fn new(
        id: String,
        request: JobRequest,
        extractor: LocationExtractor,
        settings: &ScrapeSettings,
    ) -> Self {
        Self {
            id,
            target: request.target,
            max_locations: request
                .max_locations
                .unwrap_or(settings.default_max_locations)
                .max(1),
            selected_ids: request.selected_ids,
            base_url: settings.base_url.clone(),
            extractor,
            export_dir: settings.export_dir.clone(),
            export_options: settings.export_options.clone(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The flag checked before each per-URL iteration.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the job to completion on the current task.
    ///
    /// A failing URL degrades its own record and never stops the loop.
    ///
    /// # Errors
    ///
    /// Returns [`JobAbortError`] only when discovery fails before any URL is
    /// processed.
    pub async fn run(&self, sink: &dyn ProgressSink) -> Result<JobReport, JobAbortError> {
        sink.report(5.0, &format!("Discovering locations for {}", self.target.describe()));

        let targets = discover_targets(
            self.extractor.fetcher(),
            &self.base_url,
            &self.target,
            self.max_locations,
            &self.selected_ids,
        )
        .await?;

        let total = targets.len();
        sink.report(LOOP_START, &format!("Found {total} locations"));
        tracing::info!(job_id = %self.id, total, "job targets discovered");

        let mut locations: Vec<Location> = Vec::with_capacity(total);
        let mut cancelled = false;
        for (index, url) in targets.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!(job_id = %self.id, completed = index, "job cancelled");
                cancelled = true;
                break;
            }
            sink.report(
                loop_percent(index, total),
                &format!("Processing location {} of {total}", index + 1),
            );

            let location = self.extractor.extract(url).await;
            sink.location_done(&location);
            sink.report(
                loop_percent(index + 1, total),
                &format!("Processed {} of {total}: {}", index + 1, location.name),
            );
            locations.push(location);
        }

        sink.report(EXPORT_START, "Writing export file");
        let (export_file, export_note) = match self.export_dir.as_deref() {
            Some(dir) => match self.write_export(dir, &locations).await {
                Ok(name) => (Some(name), None),
                Err(reason) => {
                    tracing::warn!(job_id = %self.id, error = %reason, "export file not written");
                    (None, Some(reason))
                }
            },
            None => (None, None),
        };

        let resolved = locations.iter().filter(|l| l.coordinate.is_some()).count();
        let mut message = if cancelled {
            format!(
                "Cancelled after {} of {total} locations ({resolved} with coordinates)",
                locations.len()
            )
        } else {
            format!("Completed {total} locations ({resolved} with coordinates)")
        };
        if let Some(note) = export_note {
            message.push_str(&format!("; export file failed: {note}"));
        }

        Ok(JobReport {
            locations,
            export_file,
            cancelled,
            message,
        })
    }

    fn export_file_name(&self) -> String {
        format!("haikyo_locations_{}.{}", self.id, ExportFormat::Kml.extension())
    }

    async fn write_export(&self, dir: &Path, locations: &[Location]) -> Result<String, String> {
        let body = render(ExportFormat::Kml, locations, &self.export_options)
            .map_err(|e| e.to_string())?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("{}: {e}", dir.display()))?;
        let name = self.export_file_name();
        let path = dir.join(&name);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| format!("{}: {e}", path.display()))?;
        tracing::info!(job_id = %self.id, path = %path.display(), "export file written");
        Ok(name)
    }

    /// Starts the job on a background task and returns its handle.
    ///
    /// The board moves to `Running` before this returns, so the first poll
    /// already sees the new run.
    #[must_use]
    pub fn spawn(self) -> JobHandle {
        let board = Arc::new(ProgressBoard::new());
        board.start(&format!("Starting job {}", self.id));
        let monitor = JobMonitor {
            id: self.id.clone(),
            board: Arc::clone(&board),
            cancel: self.cancel_flag(),
        };

        let job_id = self.id.clone();
        let task = tokio::spawn(async move {
            let worker_board = Arc::clone(&board);
            let worker = tokio::spawn(async move { self.run(worker_board.as_ref()).await });
            match worker.await {
                Ok(Ok(report)) => {
                    tracing::info!(job_id = %job_id, locations = report.locations.len(), "job finished");
                    board.finish(&report.message, report.export_file);
                }
                Ok(Err(abort)) => {
                    tracing::warn!(job_id = %job_id, error = %abort, "job failed");
                    board.fail(&abort.to_string());
                }
                Err(join_err) => {
                    tracing::error!(job_id = %job_id, error = %join_err, "job worker stopped");
                    board.fail("job worker stopped unexpectedly");
                }
            }
        });

        JobHandle { monitor, task }
    }
}

fn loop_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return LOOP_START + LOOP_SPAN;
    }
    #[allow(clippy::cast_precision_loss)]
    let fraction = done as f64 / total as f64;
    LOOP_START + fraction * LOOP_SPAN
}

/// Cheap, cloneable view of a running or finished job.
#[derive(Debug, Clone)]
pub struct JobMonitor {
    id: String,
    board: Arc<ProgressBoard>,
    cancel: Arc<AtomicBool>,
}

impl JobMonitor {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn board(&self) -> &ProgressBoard {
        &self.board
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.board.snapshot()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.board.status() == JobStatus::Running
    }

    /// Requests cooperative cancellation; the current URL still finishes.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Owning handle returned at job start; supports join and cancel.
#[derive(Debug)]
pub struct JobHandle {
    monitor: JobMonitor,
    task: JoinHandle<()>,
}

impl JobHandle {
    #[must_use]
    pub fn id(&self) -> &str {
        self.monitor.id()
    }

    #[must_use]
    pub fn monitor(&self) -> JobMonitor {
        self.monitor.clone()
    }

    pub fn cancel(&self) {
        self.monitor.cancel();
    }

    /// Waits for the job to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if the supervising task itself panicked.
    pub async fn join(self) -> Result<ProgressSnapshot, JoinError> {
        self.task.await?;
        Ok(self.monitor.snapshot())
    }
}
