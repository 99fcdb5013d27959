//! Relay Transport
//!
//! WebSocket connection to the relay with automatic reconnection.
//!
//! `TransportLifecycle` is the pure part: it turns connect/disconnect
//! notifications into reconnect decisions using capped exponential backoff.
//! `WsTransport` drives it over a real socket in a background task and talks
//! to the rest of the client through a `TransportHandle`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::core::backoff::{Backoff, BackoffConfig};
use crate::game::events::SessionInput;
use crate::game::state::{ConnectionStatus, LocalPlayer};
use crate::network::protocol::{ClientEvent, ServerEvent};

/// Buffered frames per direction.
const CHANNEL_CAPACITY: usize = 64;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server URL could not be built.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// Handshake identity could not be encoded.
    #[error("cannot encode user: {0}")]
    Identity(#[from] serde_json::Error),

    /// WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Connect attempt took too long.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Transport task has stopped.
    #[error("transport closed")]
    Closed,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait, then try again.
    RetryAfter(Duration),
    /// Stop retrying.
    GiveUp,
}

/// Connection state and reconnect policy.
#[derive(Debug, Clone)]
pub struct TransportLifecycle {
    backoff: Backoff,
    status: ConnectionStatus,
    last_game_id: Option<String>,
    closed_by_client: bool,
}

impl TransportLifecycle {
    /// New lifecycle in `Connecting`.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            backoff: Backoff::new(config),
            status: ConnectionStatus::Connecting,
            last_game_id: None,
            closed_by_client: false,
        }
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Failures since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// Game id to resume, if the server assigned one.
    pub fn last_game_id(&self) -> Option<&str> {
        self.last_game_id.as_deref()
    }

    /// Remember the server-side game id.
    pub fn set_game_id(&mut self, game_id: impl Into<String>) {
        self.last_game_id = Some(game_id.into());
    }

    /// Socket opened.
    pub fn on_connected(&mut self) {
        self.backoff.reset();
        self.status = ConnectionStatus::Connected;
    }

    /// Connect attempt failed.
    pub fn on_connect_error(&mut self, error: &str) -> ReconnectDecision {
        debug!(error, attempt = self.backoff.attempt(), "Connect attempt failed");
        self.schedule()
    }

    /// Open socket dropped.
    pub fn on_disconnected(&mut self, reason: &str) -> ReconnectDecision {
        if self.closed_by_client {
            debug!(reason, "Closed by client, not reconnecting");
            self.status = ConnectionStatus::Lost;
            return ReconnectDecision::GiveUp;
        }
        self.schedule()
    }

    /// Client-initiated close. No reconnect follows.
    pub fn close(&mut self) {
        self.closed_by_client = true;
    }

    /// Handshake URL. `user` carries the JSON identity `{userId, username}`;
    /// `lastGameId` is added once the server has assigned a game.
    pub fn connect_url(&self, base: &str, user: &LocalPlayer) -> Result<reqwest::Url, TransportError> {
        let user = serde_json::to_string(user)?;
        let mut params = vec![("user", user.as_str())];
        if let Some(game_id) = self.last_game_id.as_deref() {
            params.push(("lastGameId", game_id));
        }
        reqwest::Url::parse_with_params(base, &params).map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }

    fn schedule(&mut self) -> ReconnectDecision {
        match self.backoff.next_delay() {
            Some(delay) => {
                self.status = ConnectionStatus::Reconnecting {
                    attempt: self.backoff.attempt(),
                    delay_ms: delay.as_millis() as u64,
                };
                ReconnectDecision::RetryAfter(delay)
            }
            None => {
                self.status = ConnectionStatus::Lost;
                ReconnectDecision::GiveUp
            }
        }
    }
}

// =============================================================================
// EVENTS AND HANDLE
// =============================================================================

/// Events surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket open (first connect or reconnect).
    Connected,
    /// Decoded relay event.
    Message(ServerEvent),
    /// Socket dropped.
    Disconnected(String),
    /// Retry scheduled.
    Reconnecting {
        /// Attempt about to be made (1-based).
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
    /// Retries exhausted.
    ConnectionLost,
}

impl TransportEvent {
    /// Convert to a session input.
    pub fn into_input(self) -> SessionInput {
        match self {
            TransportEvent::Connected => SessionInput::Connected,
            TransportEvent::Message(event) => event.into_input(),
            TransportEvent::Disconnected(reason) => SessionInput::Disconnected(reason),
            TransportEvent::Reconnecting { attempt, delay } => SessionInput::Reconnecting { attempt, delay },
            TransportEvent::ConnectionLost => SessionInput::ConnectionLost,
        }
    }
}

/// What the session driver needs from a transport.
#[async_trait]
pub trait Transport: Send {
    /// Queue an event for the relay. Queued events survive a reconnect.
    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError>;

    /// Next transport event; `None` once the transport has stopped.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close without reconnecting.
    async fn close(&mut self);
}

/// Client side of a transport task.
#[derive(Debug)]
pub struct TransportHandle {
    outgoing: mpsc::Sender<ClientEvent>,
    incoming: mpsc::Receiver<TransportEvent>,
    shutdown: broadcast::Sender<()>,
}

/// Task side of a transport: where events are produced and outgoing frames consumed.
#[derive(Debug)]
pub struct TransportPeer {
    /// Events for the client.
    pub events: mpsc::Sender<TransportEvent>,
    /// Frames queued by the client.
    pub outgoing: mpsc::Receiver<ClientEvent>,
    /// Fires when the client closes.
    pub shutdown: broadcast::Receiver<()>,
}

impl TransportHandle {
    /// Connected handle/peer pair.
    pub fn channel() -> (TransportHandle, TransportPeer) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        (
            TransportHandle {
                outgoing: outgoing_tx,
                incoming: events_rx,
                shutdown: shutdown_tx,
            },
            TransportPeer {
                events: events_tx,
                outgoing: outgoing_rx,
                shutdown: shutdown_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for TransportHandle {
    async fn send(&mut self, event: ClientEvent) -> Result<(), TransportError> {
        self.outgoing.send(event).await.map_err(|_| TransportError::Closed)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        let _ = self.shutdown.send(());
    }
}

// =============================================================================
// WEBSOCKET TRANSPORT
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum PumpExit {
    /// Client closed or went away.
    Shutdown,
    /// Socket dropped.
    Dropped(String),
}

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsTransport {
    /// Relay URL without query parameters.
    pub server_url: String,
    /// Local identity, sent in the handshake.
    pub user: LocalPlayer,
    /// Reconnect policy.
    pub backoff: BackoffConfig,
    /// Timeout for one connect attempt.
    pub connect_timeout: Duration,
}

impl WsTransport {
    /// Start the transport task.
    pub fn spawn(self) -> TransportHandle {
        let (handle, peer) = TransportHandle::channel();
        tokio::spawn(self.run(peer));
        handle
    }

    #[instrument(skip_all, fields(server = %self.server_url))]
    async fn run(self, peer: TransportPeer) {
        let TransportPeer { events, mut outgoing, mut shutdown } = peer;
        let mut lifecycle = TransportLifecycle::new(self.backoff);

        loop {
            let connected = tokio::select! {
                result = self.connect(&lifecycle) => result,
                _ = shutdown.recv() => {
                    self.flush_on_close(&lifecycle, &mut outgoing).await;
                    return;
                }
            };

            let decision = match connected {
                Ok(ws) => {
                    lifecycle.on_connected();
                    info!("Connected to relay");
                    if events.send(TransportEvent::Connected).await.is_err() {
                        return;
                    }
                    match Self::pump(ws, &events, &mut outgoing, &mut shutdown, &mut lifecycle).await {
                        PumpExit::Shutdown => {
                            lifecycle.close();
                            info!("Transport closed");
                            return;
                        }
                        PumpExit::Dropped(reason) => {
                            warn!(%reason, "Relay connection dropped");
                            if events.send(TransportEvent::Disconnected(reason.clone())).await.is_err() {
                                return;
                            }
                            lifecycle.on_disconnected(&reason)
                        }
                    }
                }
                Err(TransportError::InvalidUrl(e)) => {
                    error!("Cannot build relay url: {}", e);
                    let _ = events.send(TransportEvent::ConnectionLost).await;
                    return;
                }
                Err(e) => lifecycle.on_connect_error(&e.to_string()),
            };

            match decision {
                ReconnectDecision::RetryAfter(delay) => {
                    let attempt = lifecycle.attempt();
                    info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
                    if events.send(TransportEvent::Reconnecting { attempt, delay }).await.is_err() {
                        return;
                    }
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.recv() => {
                            self.flush_on_close(&lifecycle, &mut outgoing).await;
                            return;
                        }
                    }
                }
                ReconnectDecision::GiveUp => {
                    warn!(attempts = lifecycle.attempt(), "Giving up on relay connection");
                    let _ = events.send(TransportEvent::ConnectionLost).await;
                    return;
                }
            }
        }
    }

    async fn connect(&self, lifecycle: &TransportLifecycle) -> Result<WsStream, TransportError> {
        let url = lifecycle.connect_url(&self.server_url, &self.user)?;
        debug!(%url, "Connecting");
        let (ws, _) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;
        Ok(ws)
    }

    async fn pump(
        ws: WsStream,
        events: &mpsc::Sender<TransportEvent>,
        outgoing: &mut mpsc::Receiver<ClientEvent>,
        shutdown: &mut broadcast::Receiver<()>,
        lifecycle: &mut TransportLifecycle,
    ) -> PumpExit {
        let (mut ws_sender, mut ws_receiver) = ws.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event = match ServerEvent::from_json(&text) {
                                Ok(e) => e,
                                Err(e) => {
                                    debug!("Dropping frame: {}", e);
                                    continue;
                                }
                            };
                            if let ServerEvent::GameAssigned(game_id) = &event {
                                lifecycle.set_game_id(game_id.clone());
                            }
                            if events.send(TransportEvent::Message(event)).await.is_err() {
                                return PumpExit::Shutdown;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by server".to_string());
                            return PumpExit::Dropped(reason);
                        }
                        Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                        None => return PumpExit::Dropped("stream ended".to_string()),
                        Some(Ok(_)) => {}
                    }
                }
                out = outgoing.recv() => {
                    let Some(event) = out else {
                        let _ = ws_sender.close().await;
                        return PumpExit::Shutdown;
                    };
                    if let Err(e) = Self::send_event(&mut ws_sender, &event).await {
                        return PumpExit::Dropped(e.to_string());
                    }
                }
                _ = shutdown.recv() => {
                    // Frames queued before the close still go out, ahead of the Close frame.
                    while let Ok(event) = outgoing.try_recv() {
                        if let Err(e) = Self::send_event(&mut ws_sender, &event).await {
                            warn!("Dropping {} on close: {}", event.name(), e);
                            return PumpExit::Shutdown;
                        }
                    }
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                }
            }
        }
    }

    /// Closed while disconnected: one last connect to deliver anything still queued.
    async fn flush_on_close(&self, lifecycle: &TransportLifecycle, outgoing: &mut mpsc::Receiver<ClientEvent>) {
        let mut queued = Vec::new();
        while let Ok(event) = outgoing.try_recv() {
            queued.push(event);
        }
        if queued.is_empty() {
            return;
        }

        let mut ws = match self.connect(lifecycle).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(dropped = queued.len(), "Cannot flush queued frames: {}", e);
                return;
            }
        };
        for event in &queued {
            if let Err(e) = Self::send_event(&mut ws, event).await {
                warn!("Dropping {} on close: {}", event.name(), e);
                return;
            }
        }
        let _ = ws.send(Message::Close(None)).await;
        debug!(flushed = queued.len(), "Queued frames delivered before close");
    }

    /// Serialize and write one frame. Unencodable events are logged and skipped.
    async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), tungstenite::Error>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let text = match event.to_json() {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to serialize {}: {}", event.name(), e);
                return Ok(());
            }
        };
        #[cfg(feature = "debug-tracing")]
        debug!(frame = %text, "Sending");
        sink.send(Message::Text(text)).await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::Color;
    use crate::network::protocol::PlayerLeftPayload;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn alice() -> LocalPlayer {
        LocalPlayer::new("u1", "alice")
    }

    fn player_left() -> ClientEvent {
        ClientEvent::PlayerLeft(PlayerLeftPayload {
            user_id: "u1".into(),
            username: "alice".into(),
            opponent_id: Some("u2".into()),
        })
    }

    /// Text frames from one connection until the peer closes.
    async fn read_text_frames(stream: TcpStream) -> Vec<String> {
        let mut ws = accept_async(stream).await.unwrap();
        let mut frames = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => frames.push(text),
                Message::Close(_) => break,
                _ => {}
            }
        }
        frames
    }

    fn quick_backoff(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts,
        }
    }

    #[test]
    fn test_lifecycle_backoff_sequence() {
        let mut lifecycle = TransportLifecycle::new(BackoffConfig::default());
        let mut delays = Vec::new();
        while let ReconnectDecision::RetryAfter(delay) = lifecycle.on_connect_error("refused") {
            delays.push(delay.as_secs());
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(lifecycle.status(), ConnectionStatus::Lost);
    }

    #[test]
    fn test_lifecycle_status_tracks_attempts() {
        let mut lifecycle = TransportLifecycle::new(BackoffConfig::default());
        assert_eq!(lifecycle.status(), ConnectionStatus::Connecting);
        lifecycle.on_connected();
        assert_eq!(lifecycle.status(), ConnectionStatus::Connected);

        assert_eq!(
            lifecycle.on_disconnected("transport close"),
            ReconnectDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(lifecycle.status(), ConnectionStatus::Reconnecting { attempt: 1, delay_ms: 1000 });
        lifecycle.on_connect_error("refused");
        assert_eq!(lifecycle.status(), ConnectionStatus::Reconnecting { attempt: 2, delay_ms: 2000 });

        // A successful connect starts the sequence over.
        lifecycle.on_connected();
        assert_eq!(lifecycle.attempt(), 0);
        assert_eq!(
            lifecycle.on_disconnected("ping timeout"),
            ReconnectDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_client_close_does_not_reconnect() {
        let mut lifecycle = TransportLifecycle::new(BackoffConfig::default());
        lifecycle.on_connected();
        lifecycle.close();
        assert_eq!(lifecycle.on_disconnected("io client disconnect"), ReconnectDecision::GiveUp);
    }

    #[test]
    fn test_connect_url_carries_identity_and_game_id() {
        let mut lifecycle = TransportLifecycle::new(BackoffConfig::default());
        let url = lifecycle.connect_url("ws://relay.test/ws", &alice()).unwrap();
        let user: Vec<_> = url.query_pairs().filter(|(k, _)| k == "user").map(|(_, v)| v.into_owned()).collect();
        assert_eq!(user, vec![r#"{"userId":"u1","username":"alice"}"#.to_string()]);
        let decoded: LocalPlayer = serde_json::from_str(&user[0]).unwrap();
        assert_eq!(decoded, alice());
        assert!(url.query_pairs().all(|(k, _)| k != "lastGameId"));

        lifecycle.set_game_id("g-9");
        let url = lifecycle.connect_url("ws://relay.test/ws", &alice()).unwrap();
        let pairs: Vec<_> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(pairs.last(), Some(&("lastGameId".to_string(), "g-9".to_string())));
        assert_eq!(lifecycle.last_game_id(), Some("g-9"));

        assert!(matches!(
            lifecycle.connect_url("not a url", &alice()),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_transport_event_into_input() {
        assert_eq!(TransportEvent::Connected.into_input(), SessionInput::Connected);
        assert_eq!(
            TransportEvent::Message(ServerEvent::Color(Color::White)).into_input(),
            SessionInput::ColorAssigned(Color::White)
        );
        assert_eq!(TransportEvent::ConnectionLost.into_input(), SessionInput::ConnectionLost);
    }

    #[tokio::test]
    async fn test_ws_transport_gives_up_when_unreachable() {
        // Reserve a port, then free it so connects are refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut handle = WsTransport {
            server_url: format!("ws://{addr}/ws"),
            user: alice(),
            backoff: quick_backoff(2),
            connect_timeout: Duration::from_secs(2),
        }
        .spawn();

        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                TransportEvent::Reconnecting { attempt: 1, delay: Duration::from_millis(1) },
                TransportEvent::Reconnecting { attempt: 2, delay: Duration::from_millis(2) },
                TransportEvent::ConnectionLost,
            ]
        );
    }

    #[tokio::test]
    async fn test_ws_transport_exchanges_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"event":"color","data":"white"}"#.to_string()))
                .await
                .unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        });

        let mut handle = WsTransport {
            server_url: format!("ws://{addr}/ws"),
            user: alice(),
            backoff: quick_backoff(1),
            connect_timeout: Duration::from_secs(2),
        }
        .spawn();

        assert_eq!(handle.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(
            handle.next_event().await,
            Some(TransportEvent::Message(ServerEvent::Color(Color::White)))
        );

        handle.send(ClientEvent::RequestGameState).await.unwrap();
        assert_eq!(server.await.unwrap(), r#"{"event":"requestGameState"}"#);

        handle.close().await;
    }

    #[tokio::test]
    async fn test_frames_queued_before_close_are_delivered() {
        for _ in 0..20 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                read_text_frames(stream).await
            });

            let mut handle = WsTransport {
                server_url: format!("ws://{addr}/ws"),
                user: alice(),
                backoff: quick_backoff(1),
                connect_timeout: Duration::from_secs(2),
            }
            .spawn();
            assert_eq!(handle.next_event().await, Some(TransportEvent::Connected));

            // Same order as a leave: queue, then close straight away.
            handle.send(ClientEvent::RequestGameState).await.unwrap();
            handle.send(player_left()).await.unwrap();
            handle.close().await;

            let frames = server.await.unwrap();
            assert_eq!(frames.len(), 2, "frames: {frames:?}");
            assert_eq!(frames[1], player_left().to_json().unwrap());
        }
    }

    #[tokio::test]
    async fn test_frame_queued_while_disconnected_goes_out_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // First connection is dropped right after the handshake.
            let (stream, _) = listener.accept().await.unwrap();
            drop(accept_async(stream).await.unwrap());
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        });

        let mut handle = WsTransport {
            server_url: format!("ws://{addr}/ws"),
            user: alice(),
            backoff: BackoffConfig {
                base_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(200),
                max_attempts: 3,
            },
            connect_timeout: Duration::from_secs(2),
        }
        .spawn();

        assert_eq!(handle.next_event().await, Some(TransportEvent::Connected));
        assert!(matches!(handle.next_event().await, Some(TransportEvent::Disconnected(_))));
        assert!(matches!(handle.next_event().await, Some(TransportEvent::Reconnecting { attempt: 1, .. })));

        handle.send(ClientEvent::RequestGameState).await.unwrap();
        assert_eq!(handle.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(server.await.unwrap(), r#"{"event":"requestGameState"}"#);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_close_during_reconnect_wait_flushes_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(accept_async(stream).await.unwrap());
            let (stream, _) = listener.accept().await.unwrap();
            read_text_frames(stream).await
        });

        let mut handle = WsTransport {
            server_url: format!("ws://{addr}/ws"),
            user: alice(),
            backoff: BackoffConfig {
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(30),
                max_attempts: 3,
            },
            connect_timeout: Duration::from_secs(2),
        }
        .spawn();

        assert_eq!(handle.next_event().await, Some(TransportEvent::Connected));
        assert!(matches!(handle.next_event().await, Some(TransportEvent::Disconnected(_))));
        assert!(matches!(handle.next_event().await, Some(TransportEvent::Reconnecting { attempt: 1, .. })));

        handle.send(player_left()).await.unwrap();
        handle.close().await;

        let frames = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(frames, vec![player_left().to_json().unwrap()]);
    }
}
