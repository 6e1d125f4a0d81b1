//! Background task supervisor.
//!
//! Tasks are registered by name and run on their own tokio worker. Stopping
//! a task is cooperative: its token fires, which wakes [`TaskContext::sleep`],
//! and the body is expected to return. A body that fails or panics is
//! recorded as `crashed` with the failure as its status; nothing propagates.

mod builtin;
mod task;

pub use builtin::{ReconnectTask, StalenessTask};
pub use task::{BackgroundTask, TaskContext};

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use ctsd_types::{TaskInfo, TaskState};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, NotFoundKind, Result};
use task::TaskShared;

struct Worker {
    token: CancellationToken,
    body: AbortHandle,
    monitor: JoinHandle<()>,
}

struct TaskEntry {
    task: Arc<dyn BackgroundTask>,
    shared: Arc<TaskShared>,
    worker: Mutex<Option<Worker>>,
}

#[derive(Default)]
pub struct Supervisor {
    tasks: RwLock<Vec<Arc<TaskEntry>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Names must be unique.
    pub fn register(&self, task: Arc<dyn BackgroundTask>) -> Result<()> {
        let mut tasks = self.tasks.write();
        if tasks.iter().any(|t| t.task.name() == task.name()) {
            return Err(Error::invalid(format!(
                "background task '{}' is already registered",
                task.name()
            )));
        }
        tasks.push(Arc::new(TaskEntry {
            shared: Arc::new(TaskShared::new(task.initial_status())),
            task,
            worker: Mutex::new(None),
        }));
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Arc<TaskEntry>> {
        self.tasks
            .read()
            .iter()
            .find(|t| t.task.name() == name)
            .cloned()
            .ok_or_else(|| Error::not_found(NotFoundKind::BackgroundTask, name))
    }

    /// Launch a registered task. A no-op while it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_background_task(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::invalid("background tasks need a running tokio runtime"))?;

        let mut worker = entry.worker.lock();
        if entry.shared.state().is_active() {
            return Ok(());
        }

        let token = CancellationToken::new();
        let ctx = TaskContext::new(token.clone(), entry.shared.clone());
        entry.shared.set_state(TaskState::Running);

        let task = entry.task.clone();
        let body = runtime.spawn(async move { task.run(ctx).await });
        let abort = body.abort_handle();

        let shared = entry.shared.clone();
        let task_name = name.to_string();
        let monitor = runtime.spawn(async move {
            let outcome = match body.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(e) if e.is_panic() => Some(panic_message(e.into_panic())),
                Err(_) => Some("aborted".to_string()),
            };
            match outcome {
                None => {
                    shared.set_state(TaskState::Complete);
                    info!(task = %task_name, "Background task complete");
                }
                Some(message) => {
                    let fault = Error::TaskFault {
                        task: task_name.clone(),
                        message: message.clone(),
                    };
                    warn!(task = %task_name, error = %fault, "Background task crashed");
                    *shared.status.write() = message;
                    shared.set_state(TaskState::Crashed);
                }
            }
        });

        *worker = Some(Worker {
            token,
            body: abort,
            monitor,
        });
        info!(task = name, "Background task started");
        Ok(())
    }

    /// Signal a task to stop. Does not wait for it to finish.
    pub fn stop_background_task(&self, name: &str) -> Result<()> {
        let entry = self.entry(name)?;
        Self::signal(&entry);
        Ok(())
    }

    fn signal(entry: &TaskEntry) {
        let worker = entry.worker.lock();
        if let Some(worker) = worker.as_ref() {
            if !worker.token.is_cancelled() {
                worker.token.cancel();
                entry.task.cancel();
                info!(task = entry.task.name(), "Background task stop requested");
            }
        }
    }

    /// `(name, state, status)` for every task in registration order.
    pub fn get_background_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .iter()
            .map(|t| TaskInfo {
                name: t.task.name().to_string(),
                state: t.shared.state(),
                status: t.shared.status(),
            })
            .collect()
    }

    /// Cancel every task and wait up to `grace` for them to finish.
    /// Workers still running after that are aborted.
    pub async fn stop_all(&self, grace: Duration) {
        let entries: Vec<Arc<TaskEntry>> = self.tasks.read().clone();
        for entry in &entries {
            Self::signal(entry);
        }

        let deadline = tokio::time::Instant::now() + grace;
        for entry in &entries {
            let Some(worker) = entry.worker.lock().take() else {
                continue;
            };
            let Worker { body, mut monitor, .. } = worker;
            if tokio::time::timeout_at(deadline, &mut monitor).await.is_err() {
                warn!(task = entry.task.name(), "Background task ignored cancellation, aborting");
                body.abort();
                let _ = monitor.await;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}
