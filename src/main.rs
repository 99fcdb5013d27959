//! Chess Relay Client
//!
//! Command-line client for relay chess.
//! With `CHESS_SERVER_URL` set it joins matchmaking and reads moves from
//! stdin; otherwise it plays an offline demo.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chess_relay::{
    ClientConfig, SessionMachine, VERSION,
    core::hash::short_hex,
    game::{
        events::{Effect, Outbound, RemoteMove, SessionInput},
        local::LocalGame,
        state::{Color, MoveRequest, OpponentIdentity, Promotion, SessionSnapshot},
        MatchStats,
    },
    network::{
        HttpOutcomeRecorder, RecordingCoordinator, SessionDriver, SessionUpdate, WsTransport,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Chess Relay v{}", VERSION);

    let config = ClientConfig::from_env().context("invalid configuration")?;
    if std::env::var("CHESS_SERVER_URL").is_ok() {
        run_live(config).await
    } else {
        demo_local_game()?;
        demo_relay_session(&config)?;
        Ok(())
    }
}

/// Parse `e2e4` / `e7e8n` notation.
fn parse_move(text: &str) -> Option<MoveRequest> {
    let text = text.trim();
    if !(4..=5).contains(&text.len()) || !text.is_ascii() {
        return None;
    }
    let promotion = match text.chars().nth(4) {
        Some(c) => Some(Promotion::from_char(c)?),
        None => None,
    };
    Some(MoveRequest::new(&text[0..2], &text[2..4], promotion))
}

/// Join the relay and play from stdin.
async fn run_live(config: ClientConfig) -> Result<()> {
    info!("Connecting to {} as {}", config.server_url, config.username);

    let transport = WsTransport {
        server_url: config.server_url.clone(),
        user: config.local_player(),
        backoff: config.reconnect,
        connect_timeout: config.connect_timeout,
    }
    .spawn();
    let recorder = HttpOutcomeRecorder::new(config.profile_url.clone(), config.auth_token.as_deref())
        .context("invalid profile url")?;
    let coordinator = RecordingCoordinator::new(recorder, config.recording);
    let machine = SessionMachine::standard(config.local_player());

    let (driver, client) = SessionDriver::new(machine, transport, coordinator);
    let mut updates = client.subscribe();
    let driver = tokio::spawn(driver.run());

    tokio::spawn(async move {
        let mut last_status = String::new();
        while let Ok(update) = updates.recv().await {
            match update {
                SessionUpdate::Snapshot(snapshot) if snapshot.status_line != last_status => {
                    info!("{}", snapshot.status_line);
                    last_status = snapshot.status_line;
                }
                SessionUpdate::Rejected(e) => warn!("{}", e),
                _ => {}
            }
        }
    });

    info!("Commands: <move> (e.g. e2e4), hints <square>, leave, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] => continue,
            ["quit"] => {
                client.shutdown().await;
                break;
            }
            ["leave"] => {
                client.leave().await?;
                break;
            }
            ["hints", square] => info!("{}: {:?}", square, client.hints(square).await?),
            [mv] => match parse_move(mv) {
                Some(request) => {
                    if let Err(e) = client.submit_move(request).await {
                        warn!("{}", e);
                    }
                }
                None => warn!("Cannot parse move {:?}", mv),
            },
            _ => warn!("Unknown command {:?}", line),
        }
    }

    let exit = driver.await?;
    for recording in exit.recordings {
        info!("Recording finished: {:?}", recording.await?);
    }
    info!("Final status: {}", exit.snapshot.status_line);
    log_record(&exit.snapshot);
    Ok(())
}

/// Log this session's result as a win/loss/draw record.
fn log_record(snapshot: &SessionSnapshot) {
    let mut stats = MatchStats::default();
    if let Some(outcome) = snapshot.outcome {
        stats.record(outcome.result);
    }
    info!(
        "Record: {}W {}L {}D, win rate {}%, rating {}",
        stats.wins,
        stats.losses,
        stats.draws,
        stats.win_rate(),
        stats.rating()
    );
}

/// Hot-seat demo: scholar's mate.
fn demo_local_game() -> Result<()> {
    info!("=== Local Game Demo ===");
    let mut game = LocalGame::standard();
    for mv in ["e2e4", "e7e5", "f1c4", "b8c6", "d1h5", "g8f6", "h5f7"] {
        let request = parse_move(mv).context("bad demo move")?;
        let feedback = game.play(&request)?;
        info!(
            "{} -> {:?}{} [{}]",
            mv,
            feedback.cue,
            if feedback.check { " +" } else { "" },
            short_hex(&game.position().checksum())
        );
    }
    info!("{}", game.status_line());
    Ok(())
}

/// Relay demo: a session driven by scripted relay events.
fn demo_relay_session(config: &ClientConfig) -> Result<()> {
    info!("=== Relay Session Demo ===");
    let mut machine = SessionMachine::standard(config.local_player());

    let script = [
        SessionInput::Connected,
        SessionInput::Waiting(true),
        SessionInput::WaitingCount(1),
        SessionInput::ColorAssigned(Color::White),
        SessionInput::OpponentFound(OpponentIdentity {
            user_id: "demo-opponent".into(),
            username: "Opponent".into(),
        }),
        SessionInput::LocalMove(MoveRequest::simple("e2", "e4")),
        SessionInput::RemoteMove(RemoteMove {
            request: MoveRequest::simple("e7", "e5"),
            sync: None,
            correlation_id: None,
        }),
        SessionInput::Disconnected("demo drop".into()),
        SessionInput::Connected,
    ];

    for input in script {
        if let Err(e) = machine.handle(input) {
            warn!("Rejected: {}", e);
        }
        for effect in machine.drain_effects() {
            match effect {
                Effect::Send(Outbound::SubmitMove { request, position, .. }) => {
                    info!("-> move {} [{}]", request, short_hex(&position.checksum()));
                }
                Effect::Send(Outbound::RequestState) => {
                    info!("-> requestGameState");
                    let confirmed = machine.session().confirmed_position().clone();
                    machine.handle(SessionInput::StateSync(confirmed))?;
                }
                Effect::Send(other) => info!("-> {:?}", other),
                Effect::RecordOutcome(report) => info!("record {:?}", report),
                Effect::Feedback(feedback) => info!("cue {:?} {}{}", feedback.cue, feedback.from, feedback.to),
            }
        }
        info!("{}", machine.snapshot().status_line);
    }

    machine.handle(SessionInput::LocalLeave)?;
    for effect in machine.drain_effects() {
        info!("leave effect: {:?}", effect);
    }
    log_record(&machine.snapshot());
    Ok(())
}
