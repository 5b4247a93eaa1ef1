use super::node::NodeState;

type S = NodeState;

// Staged and Monitoring may fall back to Discovered when their task dies.
pub fn state_transition_map(state: NodeState) -> &'static [NodeState] {
    match state {
        S::Discovered => &[S::Pending, S::Unmonitoring],
        S::Pending => &[S::Staged, S::Unmonitoring],
        S::Staged => &[S::Monitoring, S::Discovered, S::Unmonitoring],
        S::Monitoring => &[S::Discovered, S::Unmonitoring],
        S::Unmonitoring => &[S::Removed],
        S::Removed => &[],
    }
}

pub fn is_valid_transition(from: NodeState, to: NodeState) -> bool {
    state_transition_map(from).contains(&to)
}
