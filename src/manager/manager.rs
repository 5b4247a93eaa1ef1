use std::collections::VecDeque;
use std::ops::Deref;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::membership::{reconcile, sweep_unmonitored, ReconcileReport};
use crate::node::{Registry, RegistrySnapshot};
use crate::offer::{match_offer, LaunchTemplate, Offer, OfferDecision};
use crate::task::{Alert, LaunchedTask, StatusUpdate, Tracker};

const EVENT_BUFFER: usize = 256;
const MAX_ALERTS: usize = 100;

/// Everything that can change scheduler state arrives as one of these.
#[derive(Debug)]
pub enum Event {
    Membership(Vec<String>),
    Offers(Vec<Offer>, oneshot::Sender<Vec<OfferDecision>>),
    Status(StatusUpdate),
    Snapshot(oneshot::Sender<Snapshot>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
    pub tasks: Vec<LaunchedTask>,
    pub alerts: Vec<Alert>,
}

impl Deref for Snapshot {
    type Target = RegistrySnapshot;

    fn deref(&self) -> &RegistrySnapshot {
        &self.registry
    }
}

/// The control loop. It is the only owner of the registry and handles one
/// event at a time, so membership polls, offers and status updates never
/// interleave.
#[derive(Debug)]
pub struct Manager {
    registry: Registry,
    tracker: Tracker,
    template: LaunchTemplate,
    alerts: VecDeque<Alert>,
    events: mpsc::Receiver<Event>,
}

impl Manager {
    pub fn new(template: LaunchTemplate, relaunch_on_failure: bool) -> (Self, ManagerHandle) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let manager = Manager {
            registry: Registry::new(),
            tracker: Tracker::new(relaunch_on_failure),
            template,
            alerts: VecDeque::new(),
            events: rx,
        };
        (manager, ManagerHandle { tx })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Reconciles a fresh membership poll, then retires whatever it queued
    /// for unmonitoring.
    pub fn handle_membership(&mut self, hosts: Vec<String>) -> ReconcileReport {
        let report = reconcile(&mut self.registry, &hosts);
        if !report.unmonitor.is_empty() {
            let removed = sweep_unmonitored(&mut self.registry, &mut self.tracker);
            debug!(removed = removed.len(), "Swept unmonitored nodes");
        }
        report
    }

    pub fn handle_offers(&mut self, offers: Vec<Offer>) -> Vec<OfferDecision> {
        offers
            .iter()
            .map(|offer| {
                let decision = match_offer(&mut self.registry, offer, &self.template);
                for task in decision.tasks() {
                    self.tracker.track(task.task_id, decision.offer_id().clone());
                }
                decision
            })
            .collect()
    }

    pub fn handle_status(&mut self, update: StatusUpdate) -> Option<Alert> {
        match self.tracker.handle(&mut self.registry, &update) {
            Ok(Some(alert)) => {
                if self.alerts.len() == MAX_ALERTS {
                    self.alerts.pop_front();
                }
                self.alerts.push_back(alert.clone());
                Some(alert)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(task_id = %update.task_id, error = %e, "Ignoring status update");
                None
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut tasks: Vec<LaunchedTask> = self.tracker.tasks().cloned().collect();
        tasks.sort_by_key(|t| t.launched_at);
        Snapshot {
            registry: self.registry.snapshot(),
            tasks,
            alerts: self.alerts.iter().cloned().collect(),
        }
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Membership(hosts) => {
                self.handle_membership(hosts);
            }
            Event::Offers(offers, reply) => {
                let decisions = self.handle_offers(offers);
                if reply.send(decisions).is_err() {
                    // the launches are already staged, the status path will sort them out
                    warn!("Offer decisions were not picked up");
                }
            }
            Event::Status(update) => {
                self.handle_status(update);
            }
            Event::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting control loop");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!(
            nodes = self.registry.len(),
            tasks = self.tracker.len(),
            "Control loop shutting down"
        );
    }
}

/// Cloneable sending side of the control loop.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<Event>,
}

impl ManagerHandle {
    async fn send(&self, event: Event) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn membership(&self, hosts: Vec<String>) -> Result<()> {
        self.send(Event::Membership(hosts)).await
    }

    pub async fn offers(&self, offers: Vec<Offer>) -> Result<Vec<OfferDecision>> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Offers(offers, tx)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub async fn status(&self, update: StatusUpdate) -> Result<()> {
        self.send(Event::Status(update)).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Snapshot(tx)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }
}
