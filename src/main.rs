use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stellar::config::Config;
use stellar::manager::{self, Manager};
use stellar::membership::MembershipPoller;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Scheduler terminated abnormally");
            eprintln!("stellar: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    info!(
        master = %config.master,
        poll_interval_secs = config.poll_interval.as_secs(),
        relaunch_on_failure = config.relaunch_on_failure,
        "Starting Stellar scheduler"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (manager, handle) = Manager::new(config.launch_template(), config.relaunch_on_failure);
    let control_loop = tokio::spawn(manager.run(shutdown_rx.clone()));

    let poller = MembershipPoller::new(&config.master, config.retry_delay);
    let poll_loop = tokio::spawn(poller.run(
        handle.clone(),
        config.poll_interval,
        shutdown_rx.clone(),
    ));

    let api = manager::api::setup(&config.bind_address, config.bind_port, handle);
    let mut server = tokio::spawn(api.start(shutdown_rx));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received interrupt, shutting down");
        }
        res = &mut server => {
            // the server only returns on its own when it failed
            res??;
            anyhow::bail!("API server stopped unexpectedly");
        }
    }

    let _ = shutdown_tx.send(true);
    server.await??;
    poll_loop.await?;
    control_loop.await?;
    info!("Scheduler stopped");
    Ok(())
}
