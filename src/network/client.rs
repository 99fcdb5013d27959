//! Session Driver
//!
//! Binds one `SessionMachine` to a transport and an outcome recorder.
//!
//! The driver is a single task: it selects over user commands and transport
//! events, feeds each into the machine, then executes the queued effects in
//! order. Each reducer step runs to completion before the next input is
//! looked at. The presentation layer only sees cloned snapshots published on
//! a broadcast channel.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::game::events::{Effect, SessionInput};
use crate::game::feedback::Feedback;
use crate::game::machine::{SessionError, SessionMachine};
use crate::game::rules::{RulesEngine, StandardRules};
use crate::game::state::{MoveRequest, SessionPhase, SessionSnapshot};
use crate::network::protocol::ClientEvent;
use crate::network::recorder::{OutcomeRecorder, RecordingCoordinator, RecordingOutcome};
use crate::network::transport::Transport;

/// Pending commands.
const COMMAND_CAPACITY: usize = 32;
/// Buffered updates per subscriber.
const UPDATE_CAPACITY: usize = 128;

/// Client errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The machine rejected the command.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Driver task has stopped.
    #[error("session driver stopped")]
    DriverStopped,
}

/// Player commands.
#[derive(Debug)]
pub enum Command {
    /// Move a piece.
    Move {
        /// The move.
        request: MoveRequest,
        /// Result of validation.
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Legal destinations for a local piece.
    Hints {
        /// Origin square.
        square: String,
        /// Destinations.
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Leave the game.
    Leave,
    /// Stop the driver.
    Shutdown,
}

/// Published to subscribers after every step.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Fresh snapshot.
    Snapshot(SessionSnapshot),
    /// Cue for a move that was just applied.
    Feedback(Feedback),
    /// A relay input was rejected.
    Rejected(SessionError),
}

/// What the driver leaves behind.
#[derive(Debug)]
pub struct DriverExit {
    /// Final snapshot.
    pub snapshot: SessionSnapshot,
    /// Background recording tasks still owned by the caller.
    pub recordings: Vec<JoinHandle<RecordingOutcome>>,
}

/// Cloneable handle for sending commands to a driver.
#[derive(Debug, Clone)]
pub struct SessionClient {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionClient {
    /// Submit a local move and wait for validation.
    pub async fn submit_move(&self, request: MoveRequest) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Move { request, reply })
            .await
            .map_err(|_| ClientError::DriverStopped)?;
        rx.await.map_err(|_| ClientError::DriverStopped)??;
        Ok(())
    }

    /// Legal destinations for a local piece.
    pub async fn hints(&self, square: &str) -> Result<Vec<String>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Hints { square: square.to_string(), reply })
            .await
            .map_err(|_| ClientError::DriverStopped)?;
        rx.await.map_err(|_| ClientError::DriverStopped)
    }

    /// Leave the game. The driver stops afterwards.
    pub async fn leave(&self) -> Result<(), ClientError> {
        self.commands.send(Command::Leave).await.map_err(|_| ClientError::DriverStopped)
    }

    /// Stop the driver without leaving.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Subscribe to updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }
}

/// Runs one session.
pub struct SessionDriver<T: Transport, R: OutcomeRecorder, E: RulesEngine = StandardRules> {
    machine: SessionMachine<E>,
    transport: T,
    recorder: RecordingCoordinator<R>,
    commands: mpsc::Receiver<Command>,
    updates: broadcast::Sender<SessionUpdate>,
    recordings: Vec<JoinHandle<RecordingOutcome>>,
}

impl<T: Transport, R: OutcomeRecorder, E: RulesEngine> SessionDriver<T, R, E> {
    /// Create a driver and its client handle.
    pub fn new(
        machine: SessionMachine<E>,
        transport: T,
        recorder: RecordingCoordinator<R>,
    ) -> (Self, SessionClient) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let client = SessionClient {
            commands: commands_tx,
            updates: updates.clone(),
        };
        let driver = Self {
            machine,
            transport,
            recorder,
            commands: commands_rx,
            updates,
            recordings: Vec::new(),
        };
        (driver, client)
    }

    /// Run until shutdown, leave, or every client handle is dropped.
    #[instrument(skip_all, fields(session = %self.machine.session().session_id()))]
    pub async fn run(mut self) -> DriverExit {
        let mut transport_open = true;
        self.publish_snapshot();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Move { request, reply }) => {
                            let result = self.machine.handle(SessionInput::LocalMove(request));
                            self.flush().await;
                            let _ = reply.send(result);
                        }
                        Some(Command::Hints { square, reply }) => {
                            let _ = reply.send(self.machine.legal_destinations(&square));
                        }
                        Some(Command::Leave) => {
                            let _ = self.machine.handle(SessionInput::LocalLeave);
                            self.flush().await;
                            break;
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                event = self.transport.next_event(), if transport_open => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.machine.handle(event.into_input()) {
                                debug!("Relay input rejected: {}", e);
                                let _ = self.updates.send(SessionUpdate::Rejected(e));
                            }
                            self.flush().await;
                        }
                        None => {
                            // Session stays usable offline; leaving still records.
                            info!("Transport stopped");
                            transport_open = false;
                        }
                    }
                }
            }
        }

        self.transport.close().await;
        let snapshot = self.machine.snapshot();
        if snapshot.phase != SessionPhase::Terminated {
            debug!(phase = ?snapshot.phase, "Driver stopped before the game ended");
        }
        DriverExit {
            snapshot,
            recordings: self.recordings,
        }
    }

    /// Execute queued effects in order, then publish a snapshot.
    async fn flush(&mut self) {
        for effect in self.machine.drain_effects() {
            match effect {
                Effect::Send(outbound) => {
                    let event = ClientEvent::from(outbound);
                    let name = event.name();
                    if let Err(e) = self.transport.send(event).await {
                        warn!("Dropping {}: {}", name, e);
                    }
                }
                Effect::RecordOutcome(report) => {
                    if let Some(handle) = self.recorder.submit(report).await {
                        self.recordings.push(handle);
                    }
                }
                Effect::Feedback(feedback) => {
                    let _ = self.updates.send(SessionUpdate::Feedback(feedback));
                }
            }
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let _ = self.updates.send(SessionUpdate::Snapshot(self.machine.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::OutcomeReport;
    use crate::game::state::{Color, ConnectionStatus, GameResult, LocalPlayer, OpponentIdentity};
    use crate::network::protocol::{MovePayload, ServerEvent};
    use crate::network::recorder::{RecorderError, RetryPolicy};
    use crate::network::transport::{TransportEvent, TransportHandle, TransportPeer};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemoryRecorder {
        reports: Arc<Mutex<Vec<OutcomeReport>>>,
    }

    #[async_trait]
    impl OutcomeRecorder for MemoryRecorder {
        async fn record(&self, report: &OutcomeReport) -> Result<(), RecorderError> {
            self.reports.lock().await.push(report.clone());
            Ok(())
        }
    }

    struct Harness {
        client: SessionClient,
        peer: TransportPeer,
        updates: broadcast::Receiver<SessionUpdate>,
        recorder: MemoryRecorder,
        driver: JoinHandle<DriverExit>,
    }

    fn start() -> Harness {
        let (handle, peer) = TransportHandle::channel();
        let recorder = MemoryRecorder::default();
        let machine = SessionMachine::standard(LocalPlayer::new("u1", "alice"));
        let coordinator = RecordingCoordinator::new(recorder.clone(), RetryPolicy::default());
        let (driver, client) = SessionDriver::new(machine, handle, coordinator);
        let updates = client.subscribe();
        let driver = tokio::spawn(driver.run());
        Harness { client, peer, updates, recorder, driver }
    }

    async fn relay(peer: &TransportPeer, event: ServerEvent) {
        peer.events.send(TransportEvent::Message(event)).await.unwrap();
    }

    async fn wait_for<F>(updates: &mut broadcast::Receiver<SessionUpdate>, pred: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        loop {
            match updates.recv().await {
                Ok(SessionUpdate::Snapshot(snapshot)) if pred(&snapshot) => return snapshot,
                Ok(_) => continue,
                Err(e) => panic!("update stream ended: {e}"),
            }
        }
    }

    async fn start_game(h: &mut Harness, color: Color) {
        h.peer.events.send(TransportEvent::Connected).await.unwrap();
        relay(&h.peer, ServerEvent::Color(color)).await;
        relay(
            &h.peer,
            ServerEvent::Opponent(OpponentIdentity { user_id: "u2".into(), username: "bob".into() }),
        )
        .await;
        wait_for(&mut h.updates, |s| s.phase == SessionPhase::Active).await;
        assert_eq!(h.peer.outgoing.recv().await, Some(ClientEvent::GetWaitingCount));
    }

    #[tokio::test]
    async fn test_moves_flow_through_driver() {
        let mut h = start();
        start_game(&mut h, Color::White).await;

        h.client.submit_move(MoveRequest::simple("e2", "e4")).await.unwrap();
        match h.peer.outgoing.recv().await {
            Some(ClientEvent::Move(payload)) => {
                assert_eq!((payload.from.as_str(), payload.to.as_str()), ("e2", "e4"));
                assert!(payload.correlation_id.is_some());
                assert!(payload.fen.is_some());
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        relay(
            &h.peer,
            ServerEvent::Move(MovePayload {
                from: "e7".into(),
                to: "e5".into(),
                obtained_promotion: None,
                fen: None,
                correlation_id: None,
            }),
        )
        .await;
        let snapshot = wait_for(&mut h.updates, |s| s.move_log.len() == 2).await;
        assert!(snapshot.is_local_turn);
        assert!(!snapshot.has_pending_move);

        assert_eq!(h.client.hints("g1").await.unwrap(), vec!["e2".to_string(), "f3".to_string(), "h3".to_string()]);

        h.client.shutdown().await;
        let exit = h.driver.await.unwrap();
        assert_eq!(exit.snapshot.phase, SessionPhase::Active);
        assert!(exit.recordings.is_empty());
    }

    #[tokio::test]
    async fn test_illegal_move_is_reported_to_caller() {
        let mut h = start();
        start_game(&mut h, Color::White).await;
        let err = h.client.submit_move(MoveRequest::simple("e2", "e5")).await.unwrap_err();
        assert_eq!(err, ClientError::Session(SessionError::IllegalMove("e2e5".into())));
        h.client.shutdown().await;
        h.driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_opponent_disconnect_records_win_once() {
        let mut h = start();
        start_game(&mut h, Color::Black).await;

        relay(&h.peer, ServerEvent::OpponentDisconnected(Some("bob".into()))).await;
        relay(&h.peer, ServerEvent::OpponentDisconnected(Some("bob".into()))).await;
        wait_for(&mut h.updates, |s| s.phase == SessionPhase::Terminated).await;

        h.client.shutdown().await;
        let exit = h.driver.await.unwrap();
        for recording in exit.recordings {
            recording.await.unwrap();
        }
        let reports = h.recorder.reports.lock().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].result, GameResult::Win);
        assert_eq!(reports[0].opponent_label, "bob");
    }

    #[tokio::test]
    async fn test_leave_sends_player_left_and_records_loss() {
        let mut h = start();
        start_game(&mut h, Color::White).await;

        h.client.leave().await.unwrap();
        let exit = h.driver.await.unwrap();
        assert_eq!(exit.snapshot.phase, SessionPhase::Terminated);
        for recording in exit.recordings {
            assert_eq!(recording.await.unwrap(), RecordingOutcome::Recorded { attempts: 1 });
        }

        match h.peer.outgoing.recv().await {
            Some(ClientEvent::PlayerLeft(payload)) => {
                assert_eq!(payload.user_id, "u1");
                assert_eq!(payload.opponent_id.as_deref(), Some("u2"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        assert_eq!(h.recorder.reports.lock().await[0].result, GameResult::Loss);
        assert!(h.client.submit_move(MoveRequest::simple("e2", "e4")).await.is_err());
    }

    #[tokio::test]
    async fn test_session_survives_lost_transport() {
        let mut h = start();
        start_game(&mut h, Color::White).await;

        h.peer.events.send(TransportEvent::Disconnected("transport close".into())).await.unwrap();
        h.peer.events.send(TransportEvent::ConnectionLost).await.unwrap();
        let snapshot = wait_for(&mut h.updates, |s| s.connection == ConnectionStatus::Lost).await;
        assert_eq!(snapshot.phase, SessionPhase::AwaitingReconnect);

        // Transport task goes away; the driver keeps serving commands.
        let Harness { client, peer, recorder, driver, .. } = h;
        drop(peer);
        assert!(matches!(
            client.submit_move(MoveRequest::simple("e2", "e4")).await,
            Err(ClientError::Session(SessionError::NotActive(SessionPhase::AwaitingReconnect)))
        ));

        client.leave().await.unwrap();
        let exit = driver.await.unwrap();
        for recording in exit.recordings {
            recording.await.unwrap();
        }
        assert_eq!(recorder.reports.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_requests_state() {
        let mut h = start();
        start_game(&mut h, Color::White).await;

        h.peer.events.send(TransportEvent::Disconnected("ping timeout".into())).await.unwrap();
        h.peer.events.send(TransportEvent::Connected).await.unwrap();
        assert_eq!(h.peer.outgoing.recv().await, Some(ClientEvent::RequestGameState));

        h.client.shutdown().await;
        h.driver.await.unwrap();
    }
}
