use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::state_machine::is_valid_transition;
use super::task::{LaunchedTask, StatusUpdate, TaskState};
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeState, Registry};
use crate::offer::OfferId;

/// An abnormal task termination, meant for whoever operates the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub node_id: NodeId,
    pub hostname: Option<String>,
    pub state: TaskState,
    pub message: Option<String>,
    pub relaunched: bool,
    pub at: DateTime<Utc>,
}

/// Follows launched monitoring tasks through their status updates and keeps
/// the registry in step with them.
#[derive(Debug, Default)]
pub struct Tracker {
    tasks: HashMap<NodeId, LaunchedTask>,
    relaunch_on_failure: bool,
}

impl Tracker {
    pub fn new(relaunch_on_failure: bool) -> Self {
        Tracker {
            tasks: HashMap::new(),
            relaunch_on_failure,
        }
    }

    pub fn track(&mut self, task_id: NodeId, offer_id: OfferId) {
        self.tasks.insert(task_id, LaunchedTask::new(task_id, offer_id));
    }

    pub fn forget(&mut self, task_id: &NodeId) -> Option<LaunchedTask> {
        self.tasks.remove(task_id)
    }

    pub fn get(&self, task_id: &NodeId) -> Option<&LaunchedTask> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &LaunchedTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Applies one status update. Returns an alert when the task ended
    /// lost, killed or failed.
    pub fn handle(
        &mut self,
        registry: &mut Registry,
        update: &StatusUpdate,
    ) -> Result<Option<Alert>> {
        info!("Task {} is in state {}", update.task_id, update.state);

        let id: NodeId = update
            .task_id
            .parse()
            .map_err(|_| Error::UnknownTask(update.task_id.clone()))?;
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::UnknownTask(update.task_id.clone()))?;

        if !is_valid_transition(task.status, update.state) {
            return Err(Error::InvalidTaskTransition {
                task: update.task_id.clone(),
                from: task.status,
                to: update.state,
            });
        }
        task.status = update.state;
        if update.state.is_terminal() {
            self.tasks.remove(&id);
        }

        let node_state = registry.get(&id).map(|n| n.state);
        match update.state {
            TaskState::Staging => Ok(None),
            TaskState::Running => {
                if node_state == Some(NodeState::Staged) {
                    registry.mark_monitoring(id)?;
                }
                Ok(None)
            }
            TaskState::Finished => {
                // monitoring tasks are long running, nothing is done about a clean exit
                warn!(task_id = %id, "Monitoring task finished");
                Ok(None)
            }
            TaskState::Lost | TaskState::Killed | TaskState::Failed => {
                let mut relaunched = false;
                if matches!(node_state, Some(NodeState::Staged | NodeState::Monitoring)) {
                    registry.revert_launch(id)?;
                    if self.relaunch_on_failure {
                        registry.mark_for_monitor(id)?;
                        relaunched = true;
                    }
                }
                let alert = Alert {
                    node_id: id,
                    hostname: registry.get(&id).map(|n| n.hostname.clone()),
                    state: update.state,
                    message: update.message.clone(),
                    relaunched,
                    at: Utc::now(),
                };
                error!(
                    task_id = %id,
                    hostname = ?alert.hostname,
                    relaunched,
                    "Task {} is in unexpected state {} with message '{}'",
                    id,
                    update.state,
                    update.message.as_deref().unwrap_or_default()
                );
                Ok(Some(alert))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(registry: &mut Registry, tracker: &mut Tracker, host: &str) -> NodeId {
        let offer = OfferId::from("o-1");
        let id = registry.upsert(host).id;
        registry.mark_for_monitor(id).unwrap();
        registry.mark_staged(id, &offer).unwrap();
        tracker.track(id, offer);
        id
    }

    fn update(id: NodeId, state: TaskState) -> StatusUpdate {
        StatusUpdate {
            task_id: id.to_string(),
            state,
            message: None,
        }
    }

    #[test]
    fn running_confirms_monitoring() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::default();
        let id = staged(&mut registry, &mut tracker, "h1");

        let alert = tracker
            .handle(&mut registry, &update(id, TaskState::Running))
            .unwrap();
        assert!(alert.is_none());
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Monitoring);
        assert!(registry.is_current(&id));
        assert_eq!(tracker.get(&id).unwrap().status, TaskState::Running);

        // repeated running updates are harmless
        tracker
            .handle(&mut registry, &update(id, TaskState::Running))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Monitoring);
    }

    #[test]
    fn failure_alerts_without_relaunch() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::new(false);
        let id = staged(&mut registry, &mut tracker, "h1");

        let alert = tracker
            .handle(
                &mut registry,
                &StatusUpdate {
                    task_id: id.to_string(),
                    state: TaskState::Failed,
                    message: Some("executor exited".to_string()),
                },
            )
            .unwrap()
            .expect("alert");

        assert_eq!(alert.node_id, id);
        assert_eq!(alert.hostname.as_deref(), Some("h1"));
        assert_eq!(alert.message.as_deref(), Some("executor exited"));
        assert!(!alert.relaunched);
        assert_eq!(registry.monitor_queue().count(), 0);
        assert!(!registry.is_staged(&id));
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Discovered);
        assert!(tracker.get(&id).is_none());
        registry.assert_single_placement();
    }

    #[test]
    fn failure_relaunches_when_enabled() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::new(true);
        let id = staged(&mut registry, &mut tracker, "h1");
        tracker
            .handle(&mut registry, &update(id, TaskState::Running))
            .unwrap();

        let alert = tracker
            .handle(&mut registry, &update(id, TaskState::Lost))
            .unwrap()
            .unwrap();
        assert!(alert.relaunched);
        assert_eq!(registry.monitor_queue().collect::<Vec<_>>(), vec![id]);
        assert!(!registry.is_current(&id));
        registry.assert_single_placement();
    }

    #[test]
    fn finished_leaves_node_alone() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::default();
        let id = staged(&mut registry, &mut tracker, "h1");
        tracker
            .handle(&mut registry, &update(id, TaskState::Running))
            .unwrap();

        let alert = tracker
            .handle(&mut registry, &update(id, TaskState::Finished))
            .unwrap();
        assert!(alert.is_none());
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Monitoring);
        assert!(tracker.is_empty());
    }

    #[test]
    fn unknown_and_invalid_updates_are_errors() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::default();

        let err = tracker
            .handle(
                &mut registry,
                &StatusUpdate {
                    task_id: "not-a-task".to_string(),
                    state: TaskState::Running,
                    message: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTask(_)));

        let id = staged(&mut registry, &mut tracker, "h1");
        let err = tracker
            .handle(&mut registry, &update(id, TaskState::Finished))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTaskTransition { .. }));
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Staged);
    }

    #[test]
    fn kill_of_unmonitored_node_does_not_revert() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::new(true);
        let id = staged(&mut registry, &mut tracker, "h1");
        registry.mark_for_unmonitor(id).unwrap();

        let alert = tracker
            .handle(&mut registry, &update(id, TaskState::Killed))
            .unwrap()
            .unwrap();
        assert!(!alert.relaunched);
        assert_eq!(registry.get(&id).unwrap().state, NodeState::Unmonitoring);
        assert_eq!(registry.monitor_queue().count(), 0);
    }
}
