use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::watch;
use tracing::{error, info};

use super::manager::{ManagerHandle, Snapshot};
use crate::offer::{Offer, OfferDecision};
use crate::task::StatusUpdate;

type AppState = State<ManagerHandle>;

/// HTTP surface for the resource manager driver and for operators.
pub struct Api {
    address: String,
    port: u16,
    router: Router,
}

impl Api {
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let socket = format!("{}:{}", self.address, self.port);
        let listener = tokio::net::TcpListener::bind(&socket).await?;
        info!("Scheduler API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    }
}

pub fn setup(address: &str, port: u16, handle: ManagerHandle) -> Api {
    Api {
        address: address.to_string(),
        port,
        router: router(handle),
    }
}

pub fn router(handle: ManagerHandle) -> Router {
    Router::new()
        .route("/offers", post(resource_offers))
        .route("/status", post(status_update))
        .route("/nodes", get(get_nodes))
        .with_state(handle)
}

async fn resource_offers(
    State(handle): AppState,
    Json(offers): Json<Vec<Offer>>,
) -> Result<Json<Vec<OfferDecision>>, StatusCode> {
    handle.offers(offers).await.map(Json).map_err(|e| {
        error!(error = %e, "Could not match offers");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

async fn status_update(State(handle): AppState, Json(update): Json<StatusUpdate>) -> StatusCode {
    match handle.status(update).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            error!(error = %e, "Could not deliver status update");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn get_nodes(State(handle): AppState) -> Result<Json<Snapshot>, StatusCode> {
    handle
        .snapshot()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}
