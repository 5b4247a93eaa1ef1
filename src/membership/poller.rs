use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::manager::ManagerHandle;

/// The part of the resource manager's state document the scheduler reads.
#[derive(Debug, Deserialize)]
pub struct MasterState {
    #[serde(default)]
    pub slaves: Vec<SlaveDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct SlaveDescriptor {
    pub pid: String,
}

/// Extracts the host from a `<protocol>@<host>:<port>` address.
pub fn hostname_from_pid(pid: &str) -> Option<&str> {
    let (_, address) = pid.split_once('@')?;
    let host = match address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => address,
    };
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

pub struct MembershipPoller {
    client: reqwest::Client,
    url: String,
    retry_delay: Duration,
}

impl MembershipPoller {
    pub fn new(master: &str, retry_delay: Duration) -> Self {
        let base = if master.starts_with("http://") || master.starts_with("https://") {
            master.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", master.trim_end_matches('/'))
        };
        MembershipPoller {
            client: reqwest::Client::new(),
            url: format!("{}/state.json", base),
            retry_delay,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One attempt at reading the node list, in document order.
    pub async fn fetch(&self) -> Result<Vec<String>> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::fetch(&self.url, e))?;

        if !res.status().is_success() {
            return Err(Error::fetch(&self.url, res.status()));
        }

        let state = res
            .json::<MasterState>()
            .await
            .map_err(|e| Error::fetch(&self.url, e))?;

        let mut hosts = Vec::with_capacity(state.slaves.len());
        for slave in &state.slaves {
            match hostname_from_pid(&slave.pid) {
                Some(host) => hosts.push(host.to_string()),
                None => warn!(pid = %slave.pid, "Skipping slave with unparsable pid"),
            }
        }
        Ok(hosts)
    }

    /// Fetches until it succeeds, sleeping a fixed delay between attempts.
    pub async fn poll(&self) -> Vec<String> {
        loop {
            match self.fetch().await {
                Ok(hosts) => {
                    debug!(url = %self.url, count = hosts.len(), "Fetched node list");
                    return hosts;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_delay_ms = self.retry_delay.as_millis() as u64,
                        "Could not load {}: retrying",
                        self.url
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Polls right away and then once per `interval`, handing every result
    /// to the control loop.
    pub async fn run(
        self,
        handle: ManagerHandle,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(url = %self.url, interval_secs = interval.as_secs(), "Starting membership poller");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let hosts = tokio::select! {
                hosts = self.poll() => hosts,
                _ = shutdown.changed() => break,
            };
            if handle.membership(hosts).await.is_err() {
                warn!("Control loop is gone, stopping membership poller");
                break;
            }
        }
        info!("Membership poller shutting down");
    }
}
