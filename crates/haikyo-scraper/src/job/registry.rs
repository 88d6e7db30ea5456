use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use super::runner::{JobMonitor, JobRequest};
use crate::context::ScrapeContext;
use crate::error::JobConflict;

#[derive(Default)]
struct RegistryState {
    jobs: HashMap<String, JobMonitor>,
    latest: Option<String>,
}

/// Process-wide job table.
///
/// At most one job runs at a time; a start request while one is running is
/// rejected with [`JobConflict`]. Finished jobs stay addressable by id.
pub struct JobRegistry {
    context: ScrapeContext,
    state: Mutex<RegistryState>,
}

impl JobRegistry {
    #[must_use]
    pub fn new(context: ScrapeContext) -> Self {
        Self {
            context,
            state: Mutex::new(RegistryState::default()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &ScrapeContext {
        &self.context
    }

    /// Spawns a new job unless another one is still running.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`JobConflict`] naming the running job.
    pub fn start(&self, request: JobRequest) -> Result<JobMonitor, JobConflict> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = state.jobs.values().find(|job| job.is_running()) {
            return Err(JobConflict {
                running_job_id: running.id().to_owned(),
            });
        }

        let id = Uuid::new_v4().simple().to_string();
        let handle = self.context.job(id.clone(), request).spawn();
        let monitor = handle.monitor();
        tracing::info!(job_id = %id, "job started");

        state.jobs.insert(id.clone(), monitor.clone());
        state.latest = Some(id);
        Ok(monitor)
    }

    /// The job with `id`, or the most recently started job when `id` is `None`.
    #[must_use]
    pub fn get(&self, id: Option<&str>) -> Option<JobMonitor> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = id.or(state.latest.as_deref())?;
        state.jobs.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
