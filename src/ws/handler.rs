//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::replication::Outbound;
use crate::game::{ParticipantId, PlayerInput};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let participant_id = ParticipantId::new();
    info!(participant_id = %participant_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Register before anything is sent so no message for this participant is missed
    let (reliable_rx, effects_rx) = state.session.connect(participant_id);

    let welcome = ServerMsg::Welcome {
        participant_id,
        server_time: unix_millis(),
        tick_rate: state.config.tick_rate,
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant_id = %participant_id, error = %e, "Failed to send welcome");
        state.session.disconnect(participant_id);
        return;
    }

    run_session(
        participant_id,
        ws_sink,
        ws_stream,
        state.session.input_tx.clone(),
        reliable_rx,
        effects_rx,
    )
    .await;

    state.session.disconnect(participant_id);

    info!(participant_id = %participant_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    participant_id: ParticipantId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    mut reliable_rx: mpsc::Receiver<ServerMsg>,
    mut effects_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: reliable stream and effects multicast -> WebSocket.
    // Ends when the session drops this observer's reliable stream.
    let mut writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                received = reliable_rx.recv() => match received {
                    Some(msg) => msg,
                    None => {
                        debug!(participant_id = %participant_id, "Reliable stream closed");
                        break;
                    }
                },
                received = effects_rx.recv() => match received {
                    Ok(outbound) if outbound.audience.includes(participant_id) => outbound.msg,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(participant_id = %participant_id, dropped = n, "Dropped effects");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant_id = %participant_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session loop, until either side ends
    loop {
        let next = tokio::select! {
            _ = &mut writer_handle => {
                warn!(participant_id = %participant_id, "Outbound stream ended, closing connection");
                break;
            }
            next = ws_stream.next() => next,
        };
        let Some(result) = next else {
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(participant_id = %participant_id, "Rate limited message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if matches!(client_msg, ClientMsg::Fire { .. }) && !rate_limiter.check_fire() {
                            debug!(participant_id = %participant_id, "Dropping fire over rate limit");
                            continue;
                        }

                        let input = PlayerInput {
                            participant_id,
                            msg: client_msg,
                            received_at: unix_millis(),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(participant_id = %participant_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(participant_id = %participant_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the session loop
    let _ = input_tx
        .send(PlayerInput {
            participant_id,
            msg: ClientMsg::Leave,
            received_at: unix_millis(),
        })
        .await;

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
