//! Process bootstrap: key, database, connection server, listeners.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use courier_shared::metrics::MetricsSink;
use courier_shared::MessageCipher;
use courier_store::database::{default_data_dir, key_path};
use courier_store::{Database, SeedConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use crate::db::{shared, with_db, SharedDatabase};
use crate::metrics::PrometheusMetrics;
use crate::server::ConnectionServer;

/// A started server. Dropping it leaves the listeners running; call
/// [`shutdown`](Self::shutdown) to stop.
pub struct RunningServer {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    db: SharedDatabase,
    server: Arc<ConnectionServer>,
    stop: watch::Sender<bool>,
    listeners: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn database(&self) -> &SharedDatabase {
        &self.db
    }

    pub fn connection_server(&self) -> &Arc<ConnectionServer> {
        &self.server
    }

    /// Stop the connection server, then both listeners.
    pub async fn shutdown(self) {
        self.server.shutdown().await;
        self.stop.send_replace(true);

        for handle in self.listeners {
            if let Err(e) = handle.await {
                error!(error = %e, "listener task failed");
            }
        }
        info!("server stopped");
    }
}

pub async fn launch(config: ServerConfig) -> anyhow::Result<RunningServer> {
    // -----------------------------------------------------------------------
    // 1. Key and database
    // -----------------------------------------------------------------------
    let data_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let cipher = MessageCipher::load_or_generate(&key_path(&data_dir))
        .context("loading message key")?;

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let sink: Arc<dyn MetricsSink> = metrics.clone();

    let db = shared(Database::new(&data_dir, cipher)?.with_metrics(Arc::clone(&sink)));

    if config.seed_on_start {
        let report = with_db(&db, |db| db.seed_database(&SeedConfig::default())).await?;
        info!(chats = report.chats, messages = report.messages, "database ready");
    }

    // -----------------------------------------------------------------------
    // 2. Listeners, bound before any background task starts
    // -----------------------------------------------------------------------
    let ws_listener = TcpListener::bind(config.ws_addr)
        .await
        .with_context(|| format!("binding WebSocket listener on {}", config.ws_addr))?;
    let http_listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", config.http_addr))?;
    let ws_addr = ws_listener.local_addr()?;
    let http_addr = http_listener.local_addr()?;

    // -----------------------------------------------------------------------
    // 3. Connection server
    // -----------------------------------------------------------------------
    let server = Arc::new(ConnectionServer::new(Arc::clone(&db), sink, &config));
    server.start().await;

    let (stop, stop_rx) = watch::channel(false);

    let app_state = AppState {
        db: Arc::clone(&db),
        server: Arc::clone(&server),
        metrics,
    };

    let listeners = vec![
        spawn_listener("ws", ws_listener, server.router(), stop_rx.clone()),
        spawn_listener("http", http_listener, api::build_router(app_state), stop_rx),
    ];

    info!(%http_addr, %ws_addr, "courier server listening");

    Ok(RunningServer {
        http_addr,
        ws_addr,
        db,
        server,
        stop,
        listeners,
    })
}

fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    router: axum::Router,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = api::serve(listener, router, stop).await {
            error!(listener = name, error = %e, "listener failed");
        }
    })
}
