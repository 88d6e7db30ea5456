//! Background scrape jobs and the progress model pollers read.
//!
//! A job is started through [`JobRegistry::start`] (or [`ScrapeJob::spawn`]
//! directly) and runs on its own Tokio task. Callers never block on it; they
//! read [`ProgressSnapshot`]s through a [`JobMonitor`].

mod progress;
mod registry;
mod runner;

pub use progress::{JobStatus, NullProgress, ProgressBoard, ProgressSink, ProgressSnapshot};
pub use registry::JobRegistry;
pub use runner::{JobHandle, JobMonitor, JobReport, JobRequest, ScrapeJob};
