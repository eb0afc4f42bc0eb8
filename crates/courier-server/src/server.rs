//! The connection server: WebSocket endpoint plus its two background loops
//! (heartbeat sweep and message emission).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use courier_shared::metrics::MetricsSink;
use courier_shared::protocol::WireEvent;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::db::{with_db, SharedDatabase};
use crate::emitter::{emit_once, next_delay};
use crate::hub::ConnectionHub;
use crate::shutdown::cancelled;

pub struct ConnectionServer {
    hub: ConnectionHub,
    db: SharedDatabase,
    heartbeat_interval: Duration,
    emit_interval: (Duration, Duration),
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionServer {
    pub fn new(db: SharedDatabase, metrics: Arc<dyn MetricsSink>, config: &ServerConfig) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            hub: ConnectionHub::new(metrics, shutdown_rx),
            db,
            heartbeat_interval: config.heartbeat_interval,
            emit_interval: (config.emit_interval_min, config.emit_interval_max),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Router serving the WebSocket upgrade at `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_upgrade))
            .with_state(self.hub.clone())
    }

    /// Spawn the heartbeat and emission loops. Does nothing once running or
    /// after shutdown.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || *self.shutdown.borrow() {
            return;
        }

        tasks.push(tokio::spawn(heartbeat_loop(
            self.hub.clone(),
            self.heartbeat_interval,
            self.shutdown.subscribe(),
        )));
        tasks.push(tokio::spawn(emission_loop(
            Arc::clone(&self.db),
            self.hub.clone(),
            self.emit_interval,
            self.shutdown.subscribe(),
        )));

        info!(
            heartbeat_ms = self.heartbeat_interval.as_millis() as u64,
            "connection server started"
        );
    }

    /// Close every open connection; the server keeps running and clients are
    /// free to reconnect.
    pub async fn simulate_disconnect(&self) -> usize {
        let closed = self.hub.close_all().await;
        info!(closed, "simulated disconnect");
        closed
    }

    /// Stop both loops and close every socket. Idempotent, and safe when
    /// [`start`](Self::start) was never called.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }

        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "background task failed");
            }
        }
        self.hub.close_all().await;

        info!("connection server stopped");
    }
}

async fn ws_upgrade(State(hub): State<ConnectionHub>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move { hub.serve(socket).await })
}

async fn heartbeat_loop(
    hub: ConnectionHub,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let dropped = hub.heartbeat_sweep().await;
                if dropped > 0 {
                    debug!(dropped, "heartbeat sweep terminated connections");
                }
            }
            _ = cancelled(&mut shutdown) => break,
        }
    }
    debug!("heartbeat loop stopped");
}

async fn emission_loop(
    db: SharedDatabase,
    hub: ConnectionHub,
    (min, max): (Duration, Duration),
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let delay = next_delay(&mut rand::thread_rng(), min, max);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancelled(&mut shutdown) => break,
        }

        let event = match with_db(&db, emit_once).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("no chats yet, skipping emission");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "emission failed");
                continue;
            }
        };

        let chat_id = event.chat_id.clone();
        match hub.broadcast(&WireEvent::NewMessage(event)).await {
            Ok(delivered) => debug!(%chat_id, delivered, "emitted message"),
            Err(e) => warn!(error = %e, "failed to broadcast message"),
        }
    }
    debug!("emission loop stopped");
}
