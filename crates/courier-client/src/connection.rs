//! The connection task.
//!
//! [`ConnectionClient`] is a cheap handle; all socket work happens on one
//! spawned task that owns the [`ConnectionMachine`], so commands, frames,
//! and timers are processed strictly one at a time.

use std::sync::Arc;
use std::time::Duration;

use courier_shared::metrics::{MetricsSink, NoopMetrics};
use courier_shared::protocol::WireEvent;
use courier_shared::ConnectionState;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::state::{ConnectionMachine, ReconnectDecision};

/// Capacity of the consumer-facing event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    SimulateDisconnect,
}

/// Where the connection task currently is.
enum Link {
    Idle,
    Dialing,
    Backoff(Duration),
    Open(Box<Socket>),
    Stop,
}

/// Handle to a reconnecting WebSocket client.
///
/// Dropping the handle stops the connection task.
pub struct ConnectionClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionClient {
    /// Spawn the connection task. It stays offline until [`connect`] is
    /// called. The returned receiver must be drained by the caller.
    ///
    /// [`connect`]: ConnectionClient::connect
    pub fn spawn(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        Self::spawn_with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Like [`spawn`](ConnectionClient::spawn), reporting connection state
    /// and received messages to `metrics`.
    pub fn spawn_with_metrics(
        config: ClientConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Offline);

        let supervisor = Supervisor {
            machine: ConnectionMachine::new(&config),
            config,
            commands: cmd_rx,
            events: event_tx,
            state: state_tx,
            metrics,
        };
        let task = tokio::spawn(supervisor.run());

        (
            Self {
                commands: cmd_tx,
                state: state_rx,
                task,
            },
            event_rx,
        )
    }

    /// Start connecting. A no-op while a connection is open or being dialed.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect)
    }

    /// Close the connection and cancel pending reconnects and heartbeats.
    ///
    /// Resolves once the client is offline. No reconnect follows.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Disconnect(ack_tx))?;
        ack_rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Drop the socket without a close handshake, as a network failure
    /// would. The normal reconnect path follows.
    pub fn simulate_disconnect(&self) -> Result<(), ClientError> {
        self.send(Command::SimulateDisconnect)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to the latest state without consuming events.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the connection task and wait for it to exit.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "connection task panicked");
        }
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Stopped)
    }
}

struct Supervisor {
    config: ClientConfig,
    machine: ConnectionMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    metrics: Arc<dyn MetricsSink>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut link = Link::Idle;
        loop {
            link = match link {
                Link::Idle => self.idle().await,
                Link::Dialing => self.dial().await,
                Link::Backoff(delay) => self.backoff(delay).await,
                Link::Open(socket) => self.pump(*socket).await,
                Link::Stop => break,
            };
        }
        tracing::debug!("connection task stopped");
    }

    async fn idle(&mut self) -> Link {
        match self.commands.recv().await {
            Some(Command::Connect) => {
                self.machine.on_connect_requested();
                Link::Dialing
            }
            Some(Command::Disconnect(ack)) => self.disconnected(ack).await,
            Some(Command::SimulateDisconnect) => Link::Idle,
            None => Link::Stop,
        }
    }

    async fn dial(&mut self) -> Link {
        let url = self.config.url.clone();
        tracing::debug!(%url, attempt = self.machine.attempts(), "dialing");

        let dial = tokio::time::timeout(self.config.heartbeat_timeout, connect_async(url));
        tokio::pin!(dial);

        loop {
            tokio::select! {
                result = &mut dial => {
                    return match result {
                        Ok(Ok((socket, _response))) => {
                            self.opened().await;
                            Link::Open(Box::new(socket))
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, "connection attempt failed");
                            self.link_lost().await
                        }
                        Err(_) => {
                            tracing::warn!("connection attempt timed out");
                            self.link_lost().await
                        }
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Connect | Command::SimulateDisconnect) => {}
                    Some(Command::Disconnect(ack)) => return self.disconnected(ack).await,
                    None => return Link::Stop,
                },
            }
        }
    }

    async fn backoff(&mut self, delay: Duration) -> Link {
        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => {
                    self.machine.on_retry_due();
                    return Link::Dialing;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {
                        self.machine.on_connect_requested();
                        return Link::Dialing;
                    }
                    Some(Command::SimulateDisconnect) => {}
                    Some(Command::Disconnect(ack)) => return self.disconnected(ack).await,
                    None => return Link::Stop,
                },
            }
        }
    }

    async fn pump(&mut self, socket: Socket) -> Link {
        let (mut sink, mut stream) = socket.split();

        let period = self.config.heartbeat_interval;
        let timeout = self.config.heartbeat_timeout;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watchdog = sleep(timeout);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(text.as_str()).await,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        watchdog.as_mut().reset(Instant::now() + timeout);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "server closed the connection");
                        return self.link_lost().await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "connection error");
                        return self.link_lost().await;
                    }
                    None => return self.link_lost().await,
                },
                _ = ping.tick() => {
                    if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                        tracing::warn!(error = %e, "failed to send heartbeat");
                        return self.link_lost().await;
                    }
                }
                _ = &mut watchdog => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "heartbeat timed out");
                    return self.link_lost().await;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {}
                    Some(Command::SimulateDisconnect) => {
                        tracing::info!("simulating network drop");
                        return self.link_lost().await;
                    }
                    Some(Command::Disconnect(ack)) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return self.disconnected(ack).await;
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Link::Stop;
                    }
                },
            }
        }
    }

    /// Forward a server frame. Frames that fail to decode are dropped.
    async fn deliver(&mut self, text: &str) {
        match WireEvent::decode(text) {
            Ok(WireEvent::NewMessage(event)) => {
                self.metrics.message_received();
                let _ = self.events.send(ClientEvent::NewMessage(event)).await;
            }
            Ok(WireEvent::ConnectionState(state)) => {
                tracing::debug!(%state, "server reported connection state");
            }
            Ok(WireEvent::Ignored) => tracing::debug!("ignoring frame of unknown type"),
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }

    async fn opened(&mut self) {
        let state = self.machine.on_open();
        tracing::info!(url = %self.config.url, "connected");
        self.publish(state).await;
    }

    async fn link_lost(&mut self) -> Link {
        match self.machine.on_link_lost() {
            ReconnectDecision::RetryAfter(delay) => {
                tracing::info!(
                    attempt = self.machine.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.publish(ConnectionState::Reconnecting).await;
                Link::Backoff(delay)
            }
            ReconnectDecision::GiveUp => {
                tracing::warn!(attempts = self.machine.attempts(), "giving up, going offline");
                self.publish(ConnectionState::Offline).await;
                Link::Idle
            }
        }
    }

    async fn disconnected(&mut self, ack: oneshot::Sender<()>) -> Link {
        let state = self.machine.on_disconnect();
        self.publish(state).await;
        let _ = ack.send(());
        Link::Idle
    }

    async fn publish(&mut self, state: ConnectionState) {
        self.state.send_replace(state);
        self.metrics.set_connection_state(state);
        let _ = self.events.send(ClientEvent::StateChanged(state)).await;
    }
}

#[cfg(test)]
mod tests {
    use courier_shared::protocol::{MessagePayload, NewMessageEvent};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    use super::*;

    /// A bare WebSocket server. Each accepted socket receives `frames` and
    /// is then held open without ever being read again, so pings from the
    /// client go unanswered.
    async fn scripted_server(frames: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut socket) = accept_async(stream).await else {
                    continue;
                };
                for frame in &frames {
                    socket.send(Message::text(frame.clone())).await.unwrap();
                }
                held.push(socket);
            }
        });

        format!("ws://{addr}")
    }

    /// A loopback address nothing listens on.
    async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    fn fast_config(url: String, max_retries: u32, base_delay: Duration) -> ClientConfig {
        ClientConfig {
            url,
            heartbeat_interval: Duration::from_millis(200),
            heartbeat_timeout: Duration::from_secs(2),
            reconnect_base_delay: base_delay,
            reconnect_max_delay: base_delay * 4,
            max_retries,
        }
    }

    async fn next_state(events: &mut mpsc::Receiver<ClientEvent>) -> ConnectionState {
        loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if let ClientEvent::StateChanged(state) = event {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_exhausts_retries() {
        let config = fast_config(refused_url().await, 3, Duration::from_millis(10));
        let (client, mut events) = ConnectionClient::spawn(config);
        assert_eq!(client.state(), ConnectionState::Offline);

        client.connect().unwrap();

        let mut states = Vec::new();
        for _ in 0..4 {
            states.push(next_state(&mut events).await);
        }
        assert_eq!(
            states,
            vec![
                ConnectionState::Reconnecting,
                ConnectionState::Reconnecting,
                ConnectionState::Reconnecting,
                ConnectionState::Offline,
            ]
        );
        assert_eq!(client.state(), ConnectionState::Offline);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let config = fast_config(refused_url().await, 10, Duration::from_secs(60));
        let (client, mut events) = ConnectionClient::spawn(config);

        client.connect().unwrap();
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);

        client.disconnect().await.unwrap();
        assert_eq!(next_state(&mut events).await, ConnectionState::Offline);
        assert_eq!(client.state(), ConnectionState::Offline);

        // Nothing else arrives: the 60s retry was cancelled.
        assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_commands_fail_once_task_is_gone() {
        let (client, _events) = ConnectionClient::spawn(ClientConfig::default());
        client.task.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(client.connect(), Err(ClientError::Stopped)));
    }

    #[tokio::test]
    async fn test_missing_pong_triggers_reconnect() {
        let url = scripted_server(Vec::new()).await;
        let mut config = fast_config(url, 10, Duration::from_millis(50));
        config.heartbeat_timeout = Duration::from_millis(500);
        let (client, mut events) = ConnectionClient::spawn(config);

        client.connect().unwrap();
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        let started = Instant::now();
        assert_eq!(next_state(&mut events).await, ConnectionState::Reconnecting);
        assert!(started.elapsed() >= Duration::from_millis(400));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_break_the_connection() {
        let event = NewMessageEvent::new(
            MessagePayload {
                id: "m1".into(),
                chat_id: "c1".into(),
                ts: 1_700_000_000_000,
                sender: "Alice".into(),
                body: "still here".into(),
            },
            "Team",
        );
        let frames = vec![
            "not json".to_string(),
            r#"{"type":"typing"}"#.to_string(),
            WireEvent::NewMessage(event.clone()).encode().unwrap(),
        ];
        let config = fast_config(scripted_server(frames).await, 10, Duration::from_millis(50));
        let (client, mut events) = ConnectionClient::spawn(config);

        client.connect().unwrap();
        assert_eq!(next_state(&mut events).await, ConnectionState::Connected);

        let next = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        assert_eq!(next, ClientEvent::NewMessage(event));
        assert_eq!(client.state(), ConnectionState::Connected);

        client.shutdown().await;
    }
}
