use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::node::{Node, NodeId, NodeState};
use super::state_machine::is_valid_transition;
use crate::error::{Error, Result};
use crate::offer::OfferId;

/// Known membership and where every node sits in the monitoring lifecycle.
///
/// A node id lives in at most one of `monitor_queue`, `staging`, `current`
/// and `unmonitor_queue`. Nodes that were just discovered, or whose task
/// died, live in none of them.
#[derive(Debug, Default)]
pub struct Registry {
    nodes: HashMap<NodeId, Node>,
    // hostname -> node, one entry per hostname that is not yet removed
    targets: HashMap<String, NodeId>,
    monitor_queue: VecDeque<NodeId>,
    // launches accepted into an offer that have not reported running yet
    staging: HashMap<OfferId, Vec<NodeId>>,
    current: HashSet<NodeId>,
    unmonitor_queue: VecDeque<NodeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node tracked for `hostname`, registering a fresh
    /// `Discovered` node if the hostname is unknown.
    pub fn upsert(&mut self, hostname: &str) -> &Node {
        let id = match self.targets.get(hostname) {
            Some(id) => *id,
            None => {
                let node = Node::new(hostname);
                let id = node.id;
                self.targets.insert(hostname.to_string(), id);
                self.nodes.insert(id, node);
                id
            }
        };
        &self.nodes[&id]
    }

    pub fn mark_for_monitor(&mut self, id: NodeId) -> Result<()> {
        self.transition(id, NodeState::Pending)?;
        self.monitor_queue.push_back(id);
        Ok(())
    }

    /// Takes a pending node out of the monitor queue and records it as an
    /// in-flight launch on `offer`.
    pub fn mark_staged(&mut self, id: NodeId, offer: &OfferId) -> Result<()> {
        self.transition(id, NodeState::Staged)?;
        self.monitor_queue.retain(|n| *n != id);
        self.staging.entry(offer.clone()).or_default().push(id);
        Ok(())
    }

    pub fn mark_monitoring(&mut self, id: NodeId) -> Result<()> {
        self.transition(id, NodeState::Monitoring)?;
        self.remove_from_staging(id);
        self.current.insert(id);
        Ok(())
    }

    pub fn mark_for_unmonitor(&mut self, id: NodeId) -> Result<()> {
        self.transition(id, NodeState::Unmonitoring)?;
        self.detach(id);
        self.unmonitor_queue.push_back(id);
        Ok(())
    }

    /// Finishes unmonitoring. The node is dropped from `targets`, so the same
    /// hostname showing up again later is treated as a new node.
    pub fn mark_removed(&mut self, id: NodeId) -> Result<Node> {
        self.transition(id, NodeState::Removed)?;
        self.unmonitor_queue.retain(|n| *n != id);
        let node = self.nodes.remove(&id).ok_or(Error::UnknownNode(id))?;
        self.targets.remove(&node.hostname);
        Ok(node)
    }

    /// Drops the optimistic bookkeeping for a node whose task never came up
    /// or died. The node goes back to `Discovered` and sits in no queue.
    pub fn revert_launch(&mut self, id: NodeId) -> Result<()> {
        self.transition(id, NodeState::Discovered)?;
        self.detach(id);
        Ok(())
    }

    fn transition(&mut self, id: NodeId, to: NodeState) -> Result<NodeState> {
        let node = self.nodes.get_mut(&id).ok_or(Error::UnknownNode(id))?;
        let from = node.state;
        if !is_valid_transition(from, to) {
            return Err(Error::InvalidTransition { node: id, from, to });
        }
        node.state = to;
        Ok(from)
    }

    fn detach(&mut self, id: NodeId) {
        self.monitor_queue.retain(|n| *n != id);
        self.remove_from_staging(id);
        self.current.remove(&id);
    }

    fn remove_from_staging(&mut self, id: NodeId) {
        self.staging.retain(|_, ids| {
            ids.retain(|n| *n != id);
            !ids.is_empty()
        });
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find(&self, hostname: &str) -> Option<&Node> {
        self.targets.get(hostname).and_then(|id| self.nodes.get(id))
    }

    pub fn contains_host(&self, hostname: &str) -> bool {
        self.targets.contains_key(hostname)
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(|h| h.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Pending node ids in arrival order.
    pub fn monitor_queue(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.monitor_queue.iter().copied()
    }

    pub fn unmonitor_queue(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.unmonitor_queue.iter().copied()
    }

    pub fn staged_on(&self, offer: &OfferId) -> &[NodeId] {
        self.staging.get(offer).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_staged(&self, id: &NodeId) -> bool {
        self.staging.values().any(|ids| ids.contains(id))
    }

    pub fn is_current(&self, id: &NodeId) -> bool {
        self.current.contains(id)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        let mut current: Vec<NodeId> = self.current.iter().copied().collect();
        current.sort();
        let mut staging: Vec<StagedLaunch> = self
            .staging
            .iter()
            .map(|(offer_id, ids)| StagedLaunch {
                offer_id: offer_id.clone(),
                nodes: ids.clone(),
            })
            .collect();
        staging.sort_by(|a, b| a.offer_id.0.cmp(&b.offer_id.0));

        RegistrySnapshot {
            nodes,
            monitor_queue: self.monitor_queue.iter().copied().collect(),
            staging,
            current,
            unmonitor_queue: self.unmonitor_queue.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedLaunch {
    pub offer_id: OfferId,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub nodes: Vec<Node>,
    pub monitor_queue: Vec<NodeId>,
    pub staging: Vec<StagedLaunch>,
    pub current: Vec<NodeId>,
    pub unmonitor_queue: Vec<NodeId>,
}

#[cfg(test)]
impl Registry {
    /// Number of lifecycle collections a node id is listed in.
    pub(crate) fn placements(&self, id: NodeId) -> usize {
        self.monitor_queue().filter(|n| *n == id).count()
            + self.staging.values().flatten().filter(|n| **n == id).count()
            + usize::from(self.is_current(&id))
            + self.unmonitor_queue().filter(|n| *n == id).count()
    }

    pub(crate) fn assert_single_placement(&self) {
        for node in self.nodes.values() {
            let n = self.placements(node.id);
            if node.state == NodeState::Discovered {
                assert_eq!(n, 0, "{} is discovered but queued", node.hostname);
            } else {
                assert_eq!(n, 1, "{} is in {} collections", node.hostname, n);
            }
        }
    }
}
