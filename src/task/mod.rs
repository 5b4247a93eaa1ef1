mod state_machine;
mod task;
mod tracker;

pub use state_machine::{is_valid_transition, state_transition_map};
pub use task::{
    ExecutorInfo, LaunchedTask, StatusUpdate, TaskInfo, TaskPayload, TaskState, TASK_CPUS,
    TASK_MEM,
};
pub use tracker::{Alert, Tracker};
