use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::offer::{OfferId, Resource};

/// Fixed resource shape of every monitoring task.
pub const TASK_CPUS: f64 = 0.1;
pub const TASK_MEM: f64 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Running,
    Finished,
    Lost,
    Killed,
    Failed,
}

impl TaskState {
    pub fn is_abnormal(&self) -> bool {
        matches!(self, TaskState::Lost | TaskState::Killed | TaskState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        *self == TaskState::Finished || self.is_abnormal()
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            TaskState::Staging => "TASK_STAGING",
            TaskState::Running => "TASK_RUNNING",
            TaskState::Finished => "TASK_FINISHED",
            TaskState::Lost => "TASK_LOST",
            TaskState::Killed => "TASK_KILLED",
            TaskState::Failed => "TASK_FAILED",
        };
        write!(f, "{}", name)
    }
}

/// A monitoring task that was accepted into an offer. Its id is the id of
/// the node it monitors, so a node never has two tasks.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedTask {
    pub task_id: NodeId,
    pub offer_id: OfferId,
    pub status: TaskState,
    pub launched_at: DateTime<Utc>,
}

impl LaunchedTask {
    pub fn new(task_id: NodeId, offer_id: OfferId) -> Self {
        LaunchedTask {
            task_id,
            offer_id,
            status: TaskState::Staging,
            launched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: String,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub uris: Vec<String>,
}

impl ExecutorInfo {
    pub fn new(command: &str, uris: Vec<String>) -> Self {
        ExecutorInfo {
            executor_id: "default".to_string(),
            name: "Stellar Executor".to_string(),
            command: command.to_string(),
            uris,
        }
    }
}

/// Opaque to the scheduler, read by the agent on the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub target_hostname: String,
    pub agent_status_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: NodeId,
    pub host_ref: String,
    pub name: String,
    pub executor: ExecutorInfo,
    pub resources: Vec<Resource>,
    pub data: TaskPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: String,
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<String>,
}
