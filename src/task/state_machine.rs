use super::task::TaskState;

type S = TaskState;

pub fn state_transition_map(state: TaskState) -> &'static [TaskState] {
    match state {
        S::Staging => &[S::Staging, S::Running, S::Lost, S::Killed, S::Failed],
        S::Running => &[S::Running, S::Finished, S::Lost, S::Killed, S::Failed],
        S::Finished => &[],
        S::Lost => &[],
        S::Killed => &[],
        S::Failed => &[],
    }
}

pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
    state_transition_map(from).contains(&to)
}
