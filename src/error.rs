use thiserror::Error;

use crate::node::{NodeId, NodeState};
use crate::task::TaskState;

#[derive(Debug, Error)]
pub enum Error {
    // membership
    #[error("could not load {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    // registry
    #[error("node {node} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        node: NodeId,
        from: NodeState,
        to: NodeState,
    },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    // offers
    #[error("resource {name} has invalid value {value}")]
    InvalidResource { name: String, value: f64 },

    // tasks
    #[error("unknown task {0}")]
    UnknownTask(String),

    #[error("task {task} cannot move from {from:?} to {to:?}")]
    InvalidTaskTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("control loop is no longer running")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        Error::TransientFetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Registry transitions driven by the reconciler and the matcher are never
/// expected to fail. Trips in debug builds, logged and skipped otherwise.
pub(crate) fn invariant_violated(err: &Error) {
    tracing::error!(error = %err, "Scheduler state invariant violated");
    if cfg!(debug_assertions) {
        panic!("scheduler state invariant violated: {}", err);
    }
}
