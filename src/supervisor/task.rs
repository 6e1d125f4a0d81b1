//! The background task contract and the context handed to a running body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ctsd_types::TaskState;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// A named long-running worker owned by the [`Supervisor`](super::Supervisor).
///
/// `run` is expected to loop, waiting between units of work with
/// [`TaskContext::sleep`], and to return once that wait reports
/// cancellation. Returning an error or panicking marks the task `crashed`.
#[async_trait]
pub trait BackgroundTask: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Status shown before the body publishes its own.
    fn initial_status(&self) -> String {
        String::new()
    }

    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()>;

    /// Extra hook called when the task is stopped, after the token fires.
    fn cancel(&self) {}
}

/// State and status of one task, shared between its worker and readers.
#[derive(Debug)]
pub(crate) struct TaskShared {
    pub state: RwLock<TaskState>,
    pub status: RwLock<String>,
}

impl TaskShared {
    pub fn new(status: String) -> Self {
        Self {
            state: RwLock::new(TaskState::Idle),
            status: RwLock::new(status),
        }
    }

    pub fn set_state(&self, state: TaskState) {
        *self.state.write() = state;
    }

    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    pub fn status(&self) -> String {
        self.status.read().clone()
    }
}

/// Handle given to a task body for its cancellable wait and status updates.
#[derive(Debug, Clone)]
pub struct TaskContext {
    token: CancellationToken,
    shared: Arc<TaskShared>,
}

impl TaskContext {
    pub(crate) fn new(token: CancellationToken, shared: Arc<TaskShared>) -> Self {
        Self { token, shared }
    }

    /// Wait up to `duration` or until the task is stopped.
    ///
    /// Returns `true` when the wait ended because of cancellation. The task
    /// reports `sleep` for the duration of the wait.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        self.shared.set_state(TaskState::Sleep);
        let cancelled = tokio::select! {
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        };
        self.shared.set_state(TaskState::Running);
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Publish a new status string, polled by `get_background_tasks`.
    pub fn set_status(&self, status: impl Into<String>) {
        *self.shared.status.write() = status.into();
    }

    pub fn status(&self) -> String {
        self.shared.status()
    }

    /// The token itself, for bodies that select on other futures.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
