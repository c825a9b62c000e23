// ============================================================================
// REMOTE PROCESSING: generation, upscale and background removal services
// ============================================================================
//
// The editor never talks to a service directly. A `RemoteBackend` starts a
// prediction and reports its status; `run_remote_task` polls it a bounded
// number of times. The result is a URL the caller fetches and ingests like
// any other upload, so nothing here touches session state.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EditError, Result};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteTask {
    Generate { prompt: String },
    /// `image` is a data URI.
    Upscale { image: String },
    RemoveBackground { image: String },
}

impl RemoteTask {
    pub fn label(&self) -> &'static str {
        match self {
            RemoteTask::Generate { .. } => "generate",
            RemoteTask::Upscale { .. } => "upscale",
            RemoteTask::RemoveBackground { .. } => "remove background",
        }
    }

    /// Checks that need no network round trip.
    pub fn validate(&self) -> Result<()> {
        match self {
            RemoteTask::Generate { prompt } if prompt.trim().is_empty() => Err(EditError::EmptyPrompt),
            RemoteTask::Upscale { image } | RemoteTask::RemoveBackground { image } if image.is_empty() => {
                Err(EditError::MalformedDataUri("empty image".into()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded(String),
    Failed(String),
}

/// A prediction service.
pub trait RemoteBackend {
    /// Submit the task, returning the prediction id.
    fn start(&self, task: &RemoteTask) -> Result<String>;
    fn status(&self, id: &str) -> Result<PredictionStatus>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_millis(500),
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            attempts: settings.remote_poll_attempts.max(1),
            interval: settings.poll_interval(),
        }
    }
}

/// Start `task` and poll until it settles. Returns the output URL.
///
/// A status error costs one attempt and polling carries on; only the
/// start call fails immediately.
pub fn run_remote_task<B: RemoteBackend + ?Sized>(backend: &B, task: &RemoteTask, policy: PollPolicy) -> Result<String> {
    task.validate()?;
    let id = backend.start(task)?;
    log_info!("Remote {} started: {}", task.label(), id);

    for attempt in 1..=policy.attempts {
        match backend.status(&id) {
            Ok(PredictionStatus::Succeeded(url)) => {
                log_info!("Remote {} finished after {} poll(s)", task.label(), attempt);
                return Ok(url);
            }
            Ok(PredictionStatus::Failed(msg)) => {
                log_warn!("Remote {} failed: {}", task.label(), msg);
                return Err(EditError::RemoteFailed(msg));
            }
            Ok(PredictionStatus::Starting | PredictionStatus::Processing) => {}
            Err(e) => {
                log_warn!("Remote {} poll {} errored: {}", task.label(), attempt, e);
            }
        }
        if attempt < policy.attempts && !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }

    log_warn!("Remote {} timed out after {} attempts", task.label(), policy.attempts);
    Err(EditError::RemoteTimeout { attempts: policy.attempts })
}

/// Run on the rayon pool; the receiver yields exactly one result.
pub fn spawn_remote_task(
    backend: Arc<dyn RemoteBackend + Send + Sync>,
    task: RemoteTask,
    policy: PollPolicy,
) -> mpsc::Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel();
    rayon::spawn(move || {
        let _ = tx.send(run_remote_task(backend.as_ref(), &task, policy));
    });
    rx
}
