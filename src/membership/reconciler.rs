use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::invariant_violated;
use crate::node::{Node, NodeId, NodeState, Registry};
use crate::task::Tracker;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub monitor: Vec<NodeId>,
    pub unmonitor: Vec<NodeId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.monitor.is_empty() && self.unmonitor.is_empty()
    }
}

/// Diffs a polled membership against the registry.
///
/// Hostnames seen for the first time are registered and queued for
/// monitoring; tracked hostnames missing from the poll are queued for
/// unmonitoring. Both sets are computed before the registry is touched.
pub fn reconcile(registry: &mut Registry, polled: &[String]) -> ReconcileReport {
    let polled_set: HashSet<&str> = polled.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let added: Vec<&str> = polled
        .iter()
        .map(String::as_str)
        .filter(|h| !registry.contains_host(h) && seen.insert(*h))
        .collect();

    let mut vanished: Vec<&Node> = registry
        .hostnames()
        .filter(|h| !polled_set.contains(h))
        .filter_map(|h| registry.find(h))
        .filter(|n| n.state != NodeState::Unmonitoring)
        .collect();
    vanished.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    let vanished: Vec<NodeId> = vanished.into_iter().map(|n| n.id).collect();

    let mut report = ReconcileReport::default();
    for hostname in added {
        let id = registry.upsert(hostname).id;
        match registry.mark_for_monitor(id) {
            Ok(()) => {
                info!(node_id = %id, hostname, "Discovered node");
                report.monitor.push(id);
            }
            Err(e) => invariant_violated(&e),
        }
    }

    if !vanished.is_empty() {
        info!("{} slaves to be unmonitored", vanished.len());
    }
    for id in vanished {
        match registry.mark_for_unmonitor(id) {
            Ok(()) => report.unmonitor.push(id),
            Err(e) => invariant_violated(&e),
        }
    }

    report
}

/// Retires everything in the unmonitor queue. Unmonitoring is bookkeeping
/// only: a task still running on a removed node is forgotten, not killed.
pub fn sweep_unmonitored(registry: &mut Registry, tracker: &mut Tracker) -> Vec<Node> {
    let queued: Vec<NodeId> = registry.unmonitor_queue().collect();
    let mut removed = Vec::with_capacity(queued.len());
    for id in queued {
        if let Some(task) = tracker.forget(&id) {
            warn!(
                task_id = %id,
                offer_id = %task.offer_id,
                status = %task.status,
                "Forgetting monitoring task of removed node"
            );
        }
        match registry.mark_removed(id) {
            Ok(node) => {
                info!(node_id = %id, hostname = %node.hostname, "Node removed");
                removed.push(node);
            }
            Err(e) => invariant_violated(&e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferId;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_poll_queues_everything() {
        let mut registry = Registry::new();
        let report = reconcile(&mut registry, &hosts(&["h1", "h2"]));

        assert_eq!(report.monitor.len(), 2);
        assert!(report.unmonitor.is_empty());
        let queued: Vec<String> = registry
            .monitor_queue()
            .map(|id| registry.get(&id).unwrap().hostname.clone())
            .collect();
        assert_eq!(queued, hosts(&["h1", "h2"]));
        for h in ["h1", "h2"] {
            assert_eq!(registry.find(h).unwrap().state, NodeState::Pending);
        }
        assert!(registry.snapshot().current.is_empty());
    }

    #[test]
    fn duplicate_hostnames_register_once() {
        let mut registry = Registry::new();
        reconcile(&mut registry, &hosts(&["h1", "h1", "h2", "h1"]));
        reconcile(&mut registry, &hosts(&["h2", "h2", "h1"]));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.monitor_queue().count(), 2);
        registry.assert_single_placement();
    }

    #[test]
    fn repeated_poll_is_idempotent() {
        let mut registry = Registry::new();
        let polled = hosts(&["h1", "h2", "h3"]);
        reconcile(&mut registry, &polled);
        let before = registry.snapshot();

        let report = reconcile(&mut registry, &polled);
        assert!(report.is_empty());
        let after = registry.snapshot();
        assert_eq!(before.monitor_queue, after.monitor_queue);
        assert_eq!(
            before.nodes.iter().map(|n| n.state).collect::<Vec<_>>(),
            after.nodes.iter().map(|n| n.state).collect::<Vec<_>>()
        );
    }

    #[test]
    fn vanished_monitored_node_is_unmonitored() {
        let mut registry = Registry::new();
        reconcile(&mut registry, &hosts(&["h1", "h3"]));
        let h3 = registry.find("h3").unwrap().id;
        registry.mark_staged(h3, &OfferId::from("o-1")).unwrap();
        registry.mark_monitoring(h3).unwrap();
        assert!(registry.is_current(&h3));

        let report = reconcile(&mut registry, &hosts(&["h1"]));
        assert_eq!(report.unmonitor, vec![h3]);
        assert!(!registry.is_current(&h3));
        assert_eq!(registry.unmonitor_queue().collect::<Vec<_>>(), vec![h3]);
        assert_eq!(registry.get(&h3).unwrap().state, NodeState::Unmonitoring);
        registry.assert_single_placement();

        // still absent: nothing new happens
        assert!(reconcile(&mut registry, &hosts(&["h1"])).is_empty());
    }

    #[test]
    fn monitor_and_unmonitor_sets_cover_the_diff() {
        let mut registry = Registry::new();
        reconcile(&mut registry, &hosts(&["a", "b", "c"]));
        let known: HashSet<String> = registry.hostnames().map(String::from).collect();

        let polled = hosts(&["b", "c", "d", "e"]);
        let report = reconcile(&mut registry, &polled);

        let monitor: HashSet<String> = registry
            .monitor_queue()
            .map(|id| registry.get(&id).unwrap().hostname.clone())
            .collect();
        let unmonitor: HashSet<String> = registry
            .unmonitor_queue()
            .map(|id| registry.get(&id).unwrap().hostname.clone())
            .collect();

        for h in polled.iter().filter(|h| !known.contains(*h)) {
            assert!(monitor.contains(h));
        }
        for h in known.iter().filter(|h| !polled.contains(h)) {
            assert!(unmonitor.contains(h));
        }
        assert!(monitor.is_disjoint(&unmonitor));
        assert_eq!(report.monitor.len(), 2);
        assert_eq!(report.unmonitor.len(), 1);
    }

    #[test]
    fn sweep_removes_and_forgets_tasks() {
        let mut registry = Registry::new();
        let mut tracker = Tracker::default();
        let offer = OfferId::from("o-1");
        reconcile(&mut registry, &hosts(&["h1", "h2"]));
        let h1 = registry.find("h1").unwrap().id;
        registry.mark_staged(h1, &offer).unwrap();
        tracker.track(h1, offer);

        reconcile(&mut registry, &hosts(&["h2"]));
        let removed = sweep_unmonitored(&mut registry, &mut tracker);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].hostname, "h1");
        assert_eq!(removed[0].state, NodeState::Removed);
        assert!(!registry.contains_host("h1"));
        assert!(tracker.get(&h1).is_none());
        assert_eq!(registry.unmonitor_queue().count(), 0);

        // back again under a new id
        let report = reconcile(&mut registry, &hosts(&["h1", "h2"]));
        assert_eq!(report.monitor.len(), 1);
        assert_ne!(report.monitor[0], h1);
    }
}
