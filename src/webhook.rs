//! Webhook endpoint.
//!
//! Telegram POSTs updates to `/{bot_token}`; every such request is answered
//! with 200, whatever happens to the update. Any other path gets the liveness text.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{any, post},
    Router,
};
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::{self, AppState};
use crate::config::DeliveryMode;

pub const RUNNING_TEXT: &str = "✅ Telegram bot is running";
pub const ACK_TEXT: &str = "ok";

/// Where a decoded update goes next.
#[derive(Clone)]
pub enum Submitter {
    /// Handle the update before answering the request.
    Inline,
    /// Hand the update to the worker task and answer immediately.
    Queue(mpsc::Sender<Update>),
}

#[derive(Clone)]
struct WebhookState {
    app: Arc<AppState>,
    submitter: Submitter,
}

/// Build the submitter for the configured delivery mode, spawning the queue
/// worker when needed.
pub fn submitter_for(app: &Arc<AppState>) -> (Submitter, Option<JoinHandle<()>>) {
    match app.config.bot.delivery {
        DeliveryMode::Inline => (Submitter::Inline, None),
        DeliveryMode::Queue => {
            let (submitter, worker) = spawn_worker(app.clone(), app.config.bot.queue_capacity);
            (submitter, Some(worker))
        }
    }
}

/// Single consumer draining the update queue in FIFO order.
pub fn spawn_worker(app: Arc<AppState>, capacity: usize) -> (Submitter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Update>(capacity);
    let worker = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            bot::handle_update(&app, update).await;
        }
        info!("Update queue closed, worker stopped");
    });
    (Submitter::Queue(tx), worker)
}

pub fn router(app: Arc<AppState>, submitter: Submitter) -> Router {
    Router::new()
        .route("/", any(running))
        .route("/{secret}", post(receive_update).fallback(running))
        .fallback(running)
        .with_state(WebhookState { app, submitter })
}

/// Liveness-only router for polling mode.
pub fn liveness_router() -> Router {
    Router::new().route("/", any(running)).fallback(running)
}

/// Wait for the queue worker to finish what was accepted. The queue closes
/// once the router holding its sender is dropped.
pub async fn drain(worker: Option<JoinHandle<()>>) {
    if let Some(worker) = worker {
        info!("Draining queued updates...");
        if let Err(e) = worker.await {
            error!("Update worker failed: {}", e);
        }
    }
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")
}

async fn running() -> &'static str {
    RUNNING_TEXT
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn receive_update(
    State(state): State<WebhookState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if !constant_time_eq(secret.as_bytes(), state.app.config.telegram.bot_token.as_bytes()) {
        return (StatusCode::OK, RUNNING_TEXT);
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Discarding undecodable webhook payload: {}", e);
            return (StatusCode::OK, ACK_TEXT);
        }
    };

    debug!("Received update {}", update.id.0);

    match &state.submitter {
        Submitter::Inline => {
            bot::handle_update(&state.app, update).await;
        }
        Submitter::Queue(tx) => match tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                error!("Update queue full, dropping update {}", update.id.0);
            }
            Err(TrySendError::Closed(update)) => {
                error!("Update worker gone, dropping update {}", update.id.0);
            }
        },
    }

    (StatusCode::OK, ACK_TEXT)
}
