//! WebSocket voice channel.
//!
//! The `/ws` endpoint runs one conversation per connection. The handler:
//!
//! - **Opens a session** for the default business and announces its id.
//! - **Relays turns:** each utterance is relayed on a spawned task whose
//!   events (`chunk`, `sentence`, `end`) are forwarded as JSON text frames.
//! - **Handles barge-in:** an `interrupt` command or a new utterance while a
//!   turn is in flight cancels it, waits for its task to stop, commits the
//!   partial reply, and sends `interrupted`.
//!
//! Disconnecting cancels the in-flight turn and drops the session history.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parley_core::chat::relay::{SessionHandle, TurnEvent};
use parley_types::config::ResponseMode;
use parley_types::event::{
    ClientCommand, ClientFrame, STATUS_LISTENING, STATUS_THINKING, ServerMessage,
};

use crate::state::AppState;

/// Upgrade an HTTP request to a voice channel. Mounted at `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// A turn being relayed on its own task.
struct ActiveTurn {
    utterance: String,
    /// Raw text streamed so far.
    partial: String,
    cancel: CancellationToken,
    events: mpsc::Receiver<TurnEvent>,
    task: JoinHandle<()>,
}

impl ActiveTurn {
    /// Cancel the task and wait until it can no longer touch history.
    async fn stop(&mut self, session: &SessionHandle) {
        self.cancel.cancel();
        if let Err(err) = (&mut self.task).await {
            tracing::warn!(session_id = %session.id, error = %err, "Turn task failed");
        }
    }
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let session = match state.relay.open_session(None) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = %err, "Cannot open voice session");
            return;
        }
    };
    tracing::info!(session_id = %session.id, business = %session.business, "Voice session opened");

    let greeting = [
        ServerMessage::Session {
            session_id: session.id,
        },
        ServerMessage::status(STATUS_LISTENING),
    ];
    for message in greeting {
        if send(&mut ws_sender, &message).await.is_err() {
            return;
        }
    }

    let mut active: Option<ActiveTurn> = None;

    loop {
        tokio::select! {
            msg_result = ws_receiver.next() => {
                let text = match msg_result {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!("WebSocket receive error: {err}");
                        break;
                    }
                    // Binary and protocol frames are not part of the channel
                    Some(Ok(_)) => continue,
                };

                let replies = match ClientFrame::parse(text.as_str()) {
                    ClientFrame::Blank => Vec::new(),
                    ClientFrame::Command(ClientCommand::Ping) => vec![ServerMessage::Pong],
                    ClientFrame::Command(ClientCommand::Interrupt) => {
                        if interrupt(&state, &session, &mut active).await {
                            vec![
                                ServerMessage::Interrupted,
                                ServerMessage::status(STATUS_LISTENING),
                            ]
                        } else {
                            tracing::debug!(session_id = %session.id, "Interrupt with no turn in flight");
                            Vec::new()
                        }
                    }
                    ClientFrame::Utterance(utterance) => {
                        let mut replies = Vec::new();
                        if interrupt(&state, &session, &mut active).await {
                            replies.push(ServerMessage::Interrupted);
                        }
                        replies.push(ServerMessage::status(STATUS_THINKING));
                        active = Some(start_turn(&state, &session, utterance));
                        replies
                    }
                };

                let mut closed = false;
                for reply in &replies {
                    if send(&mut ws_sender, reply).await.is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    break;
                }
            }

            event = next_event(&mut active) => {
                let replies = match event {
                    Some(TurnEvent::Delta(text)) => {
                        if let Some(turn) = active.as_mut() {
                            turn.partial.push_str(&text);
                        }
                        match state.response_mode {
                            ResponseMode::Stream => vec![ServerMessage::Chunk { content: text }],
                            ResponseMode::Single => Vec::new(),
                        }
                    }
                    Some(TurnEvent::Sentence(content)) => match state.response_mode {
                        ResponseMode::Stream => vec![ServerMessage::Sentence { content }],
                        ResponseMode::Single => Vec::new(),
                    },
                    Some(TurnEvent::Completed(outcome)) => {
                        active = None;
                        vec![
                            ServerMessage::end(outcome.reply),
                            ServerMessage::status(STATUS_LISTENING),
                        ]
                    }
                    None => {
                        // Task ended without completing; only happens on cancel
                        active = None;
                        Vec::new()
                    }
                };

                let mut closed = false;
                for reply in &replies {
                    if send(&mut ws_sender, reply).await.is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    break;
                }
            }
        }
    }

    if let Some(mut turn) = active.take() {
        turn.stop(&session).await;
    }
    state.relay.end_session(&session.id).await;
    tracing::info!(session_id = %session.id, "Voice session closed");
}

/// Next event of the in-flight turn; never resolves when there is none.
async fn next_event(active: &mut Option<ActiveTurn>) -> Option<TurnEvent> {
    match active {
        Some(turn) => turn.events.recv().await,
        None => std::future::pending().await,
    }
}

/// Relay `utterance` on a new task, forwarding its events to the connection.
fn start_turn(state: &AppState, session: &SessionHandle, utterance: String) -> ActiveTurn {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let relay = state.relay.clone();
    let mode = state.response_mode;
    let session = session.clone();
    let text = utterance.clone();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let session_id = session.id;
        let drive = async move {
            match mode {
                ResponseMode::Stream => {
                    let mut events = relay.stream_turn(session, text);
                    while let Some(event) = events.next().await {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                ResponseMode::Single => {
                    let outcome = relay.run_turn(&session, &text).await;
                    let _ = tx.send(TurnEvent::Completed(outcome)).await;
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => tracing::debug!(%session_id, "Turn cancelled"),
            _ = drive => {}
        }
    });

    ActiveTurn {
        utterance,
        partial: String::new(),
        cancel,
        events: rx,
        task,
    }
}

/// Cancel the in-flight turn, if any, and commit what was said so far.
/// Returns true when a turn was cut short.
async fn interrupt(state: &AppState, session: &SessionHandle, active: &mut Option<ActiveTurn>) -> bool {
    let Some(mut turn) = active.take() else {
        return false;
    };
    turn.stop(session).await;

    // A completion already queued means history is saved; nothing to cut.
    let mut completed = false;
    while let Ok(event) = turn.events.try_recv() {
        match event {
            TurnEvent::Delta(text) => turn.partial.push_str(&text),
            TurnEvent::Completed(_) => completed = true,
            TurnEvent::Sentence(_) => {}
        }
    }
    if completed {
        return false;
    }

    state
        .relay
        .commit_interrupted(session, &turn.utterance, &turn.partial)
        .await;
    tracing::info!(session_id = %session.id, "Turn interrupted");
    true
}

async fn send(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!("Failed to serialize ServerMessage: {err}");
            Ok(())
        }
    }
}
