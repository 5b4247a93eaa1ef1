use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::offer::LaunchTemplate;
use crate::task::ExecutorInfo;

#[derive(Debug, Clone)]
pub struct Config {
    /// host:port of the resource manager.
    pub master: String,
    pub bind_address: String,
    pub bind_port: u16,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    /// Re-queue a node when its monitoring task is lost, killed or fails.
    pub relaunch_on_failure: bool,
    pub executor_command: String,
    pub executor_uri: Option<String>,
    pub monitor_path: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            master: "127.0.0.1:5050".to_string(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 8903,
            poll_interval: Duration::from_secs(15),
            retry_delay: Duration::from_secs(1),
            relaunch_on_failure: false,
            executor_command: "./collect.py".to_string(),
            executor_uri: None,
            monitor_path: "/monitor/statistics.json".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let poll_interval = match parsed::<u64>(&lookup, "STELLAR_POLL_INTERVAL")? {
            Some(0) => return Err(Error::Config("STELLAR_POLL_INTERVAL must be > 0".into())),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        Ok(Config {
            master: lookup("STELLAR_MASTER").unwrap_or(defaults.master),
            bind_address: lookup("STELLAR_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            bind_port: parsed(&lookup, "STELLAR_BIND_PORT")?.unwrap_or(defaults.bind_port),
            poll_interval,
            retry_delay: parsed(&lookup, "STELLAR_RETRY_DELAY")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            relaunch_on_failure: parsed(&lookup, "STELLAR_RELAUNCH_ON_FAILURE")?
                .unwrap_or(defaults.relaunch_on_failure),
            executor_command: lookup("STELLAR_EXECUTOR_COMMAND")
                .unwrap_or(defaults.executor_command),
            executor_uri: lookup("STELLAR_EXECUTOR_URI").filter(|s| !s.is_empty()),
            monitor_path: lookup("STELLAR_MONITOR_PATH").unwrap_or(defaults.monitor_path),
            log_level: lookup("STELLAR_LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    pub fn launch_template(&self) -> LaunchTemplate {
        let uris = self.executor_uri.iter().cloned().collect();
        LaunchTemplate::new(
            ExecutorInfo::new(&self.executor_command, uris),
            &self.monitor_path,
        )
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.master, "127.0.0.1:5050");
        assert_eq!(c.poll_interval, Duration::from_secs(15));
        assert_eq!(c.retry_delay, Duration::from_secs(1));
        assert!(!c.relaunch_on_failure);
        assert!(c.executor_uri.is_none());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("STELLAR_MASTER", "master.local:5050"),
            ("STELLAR_BIND_PORT", "9000"),
            ("STELLAR_POLL_INTERVAL", "30"),
            ("STELLAR_RELAUNCH_ON_FAILURE", "true"),
            ("STELLAR_EXECUTOR_URI", "http://artifacts/collect.py"),
        ])
        .unwrap();
        assert_eq!(c.master, "master.local:5050");
        assert_eq!(c.bind_port, 9000);
        assert_eq!(c.poll_interval, Duration::from_secs(30));
        assert!(c.relaunch_on_failure);

        let template = c.launch_template();
        assert_eq!(template.executor.uris, vec!["http://artifacts/collect.py"]);
        assert_eq!(template.agent_status_path, "/monitor/statistics.json");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("STELLAR_BIND_PORT", "eighty")]),
            Err(Error::Config(_))
        ));
        assert!(config(&[("STELLAR_RELAUNCH_ON_FAILURE", "yes")]).is_err());
        assert!(config(&[("STELLAR_POLL_INTERVAL", "0")]).is_err());
    }
}
