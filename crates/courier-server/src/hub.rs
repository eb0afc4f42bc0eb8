//! Registry of open WebSocket connections.
//!
//! Each connection runs its own task owning the socket; the hub only keeps a
//! bounded outbound queue and an `alive` flag per connection. Fan-out never
//! blocks on a slow peer: a full queue drops the frame for that peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use courier_shared::metrics::MetricsSink;
use courier_shared::protocol::WireEvent;
use courier_shared::{ConnectionState, ProtocolError};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::shutdown::cancelled;

const OUTBOUND_CAPACITY: usize = 256;

pub type ConnectionId = u64;

#[derive(Debug)]
enum Outbound {
    Frame(Arc<str>),
    Ping,
    /// Close handshake, then drop.
    Close,
    /// Drop without a handshake.
    Terminate,
}

struct Peer {
    outbound: mpsc::Sender<Outbound>,
    alive: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    peers: RwLock<HashMap<ConnectionId, Peer>>,
    next_id: AtomicU64,
    metrics: Arc<dyn MetricsSink>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHub {
    pub fn new(metrics: Arc<dyn MetricsSink>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                peers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                metrics,
                shutdown,
            }),
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.peers.read().await.len()
    }

    /// Drive one upgraded socket until it closes, is terminated, or the
    /// server shuts down.
    pub async fn serve(&self, socket: WebSocket) {
        let mut shutdown = self.inner.shutdown.clone();
        if *shutdown.borrow() {
            debug!("rejecting connection during shutdown");
            return;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        self.register(
            id,
            Peer {
                outbound: tx,
                alive: Arc::clone(&alive),
            },
        )
        .await;

        let (mut sink, mut stream) = socket.split();

        // The greeting goes to this peer only.
        match WireEvent::ConnectionState(ConnectionState::Connected).encode() {
            Ok(greeting) => {
                if sink.send(Message::Text(greeting)).await.is_err() {
                    self.unregister(id).await;
                    return;
                }
            }
            Err(e) => warn!(error = %e, "failed to encode greeting"),
        }

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Pong(_))) => alive.store(true, Ordering::Release),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!(connection = id, "ignoring inbound frame");
                    }
                    Some(Err(e)) => {
                        debug!(connection = id, error = %e, "socket error");
                        break;
                    }
                },
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Frame(text)) => {
                        if sink.send(Message::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Ping) => {
                        // A failed ping surfaces as a read error or a missed pong.
                        let _ = sink.send(Message::Ping(Vec::new())).await;
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(Outbound::Terminate) => break,
                },
                _ = cancelled(&mut shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        self.unregister(id).await;
    }

    /// Queue `event` for every open connection. Returns how many accepted it.
    pub async fn broadcast(&self, event: &WireEvent) -> Result<usize, ProtocolError> {
        let frame: Arc<str> = event.encode()?.into();

        let peers = self.inner.peers.read().await;
        let mut delivered = 0;
        for (id, peer) in peers.iter() {
            match peer.outbound.try_send(Outbound::Frame(Arc::clone(&frame))) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(connection = id, "dropping frame for slow or closing connection"),
            }
        }

        self.inner.metrics.message_broadcast();
        Ok(delivered)
    }

    /// One liveness round: terminate every connection that did not answer
    /// the previous ping, then ping the rest. Returns how many were dropped.
    pub async fn heartbeat_sweep(&self) -> usize {
        let mut peers = self.inner.peers.write().await;

        let mut dead = Vec::new();
        for (id, peer) in peers.iter() {
            if peer.alive.swap(false, Ordering::AcqRel) {
                let _ = peer.outbound.try_send(Outbound::Ping);
            } else {
                let _ = peer.outbound.try_send(Outbound::Terminate);
                dead.push(*id);
            }
        }

        for id in &dead {
            peers.remove(id);
            warn!(connection = id, "missed heartbeat, terminating");
        }
        if !dead.is_empty() {
            self.inner.metrics.set_active_connections(peers.len());
        }
        dead.len()
    }

    /// Ask every open connection to close. The server keeps accepting new
    /// ones. Returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let peers = self.inner.peers.read().await;
        for peer in peers.values() {
            let _ = peer.outbound.try_send(Outbound::Close);
        }
        peers.len()
    }

    async fn register(&self, id: ConnectionId, peer: Peer) {
        let count = {
            let mut peers = self.inner.peers.write().await;
            peers.insert(id, peer);
            peers.len()
        };
        self.inner.metrics.set_active_connections(count);
        info!(connection = id, connections = count, "client connected");
    }

    async fn unregister(&self, id: ConnectionId) {
        let count = {
            let mut peers = self.inner.peers.write().await;
            peers.remove(&id);
            peers.len()
        };
        self.inner.metrics.set_active_connections(count);
        info!(connection = id, connections = count, "client disconnected");
    }
}
