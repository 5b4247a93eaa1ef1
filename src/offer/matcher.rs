use tracing::{debug, info, warn};

use super::offer::{Offer, OfferDecision, Resources};
use crate::error::{invariant_violated, Error};
use crate::node::{Node, NodeId, Registry};
use crate::task::{ExecutorInfo, TaskInfo, TaskPayload, TASK_CPUS, TASK_MEM};

/// Everything needed to turn a pending node into a task description.
#[derive(Debug, Clone)]
pub struct LaunchTemplate {
    pub executor: ExecutorInfo,
    pub agent_status_path: String,
    pub demand: Resources,
}

impl LaunchTemplate {
    pub fn new(executor: ExecutorInfo, agent_status_path: &str) -> Self {
        LaunchTemplate {
            executor,
            agent_status_path: agent_status_path.to_string(),
            demand: Resources::required(TASK_CPUS, TASK_MEM),
        }
    }

    pub fn task_for(&self, node: &Node, host_ref: &str) -> TaskInfo {
        TaskInfo {
            task_id: node.id,
            host_ref: host_ref.to_string(),
            name: format!("Monitor {}", node.hostname),
            executor: self.executor.clone(),
            resources: self.demand.to_wire(),
            data: TaskPayload {
                target_hostname: node.hostname.clone(),
                agent_status_path: self.agent_status_path.clone(),
            },
        }
    }
}

/// Greedy first-fit of pending nodes into one offer.
///
/// Nodes are taken in queue order until the offer cannot fit another task;
/// the pass stops there even if later nodes are waiting. Every accepted node
/// is moved to staging under the offer's id before any status confirms it.
/// An offer that fits nothing is declined and leaves the registry untouched.
pub fn match_offer(
    registry: &mut Registry,
    offer: &Offer,
    template: &LaunchTemplate,
) -> OfferDecision {
    let decline = OfferDecision::Decline {
        offer_id: offer.id.clone(),
    };
    let mut remaining = match offer.resources() {
        Ok(r) => r,
        Err(e) => {
            warn!(offer_id = %offer.id, error = %e, "Declining malformed offer");
            return decline;
        }
    };

    info!(
        "Received offer {} with cpus: {} and mem: {}",
        offer.id,
        remaining.cpus(),
        remaining.mem()
    );

    let pending: Vec<NodeId> = registry.monitor_queue().collect();
    let mut tasks = Vec::new();
    for id in pending {
        let Some(left) = remaining.checked_sub(&template.demand) else {
            break;
        };
        let Some(node) = registry.get(&id) else {
            invariant_violated(&Error::UnknownNode(id));
            continue;
        };
        let task = template.task_for(node, &offer.host_ref);
        if let Err(e) = registry.mark_staged(id, &offer.id) {
            invariant_violated(&e);
            continue;
        }

        info!("Launching task {} using offer {}", task.task_id, offer.id);
        tasks.push(task);
        remaining = left;
    }

    if tasks.is_empty() {
        debug!(offer_id = %offer.id, "Nothing to launch, declining offer");
        return decline;
    }
    OfferDecision::Accept {
        offer_id: offer.id.clone(),
        tasks,
    }
}
