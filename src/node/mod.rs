mod node;
mod registry;
mod state_machine;

pub use node::{Node, NodeId, NodeState};
pub use registry::{Registry, RegistrySnapshot, StagedLaunch};
pub use state_machine::{is_valid_transition, state_transition_map};
