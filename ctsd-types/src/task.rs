//! Background task status rows.

use core::fmt;

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TaskState {
    /// Registered but never started.
    #[default]
    Idle,
    /// Waiting inside its cancellable sleep.
    Sleep,
    Running,
    /// Body returned normally.
    Complete,
    /// Body returned an error or panicked.
    Crashed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Sleep => "sleep",
            TaskState::Running => "running",
            TaskState::Complete => "complete",
            TaskState::Crashed => "crashed",
        }
    }

    /// True while a worker exists for the task.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Sleep | TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time summary of a running server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerStatus {
    /// Active limit set.
    pub limits_set: String,
    pub limits_event_subscribers: usize,
    pub packet_subscribers: usize,
    pub server_message_subscribers: usize,
    pub interfaces: usize,
    pub routers: usize,
    pub background_tasks: usize,
    /// Tasks currently sleeping or running.
    pub active_tasks: usize,
}

/// One row of `get_background_tasks`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskInfo {
    pub name: String,
    pub state: TaskState,
    pub status: String,
}
