//! Media-stream WebSocket handler
//!
//! One socket per call. Frames received before the carrier's `start`
//! message are discarded; `start` creates the session and the outbound
//! pump, `stop` or disconnect tears everything down.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::{parse_custom_parameters, InboundMessage, StartInfo};
use crate::state::AppState;
use crate::transport::WsMediaTransport;
use voicegate_agent::{CallSession, SessionConfig, SessionInput, SessionParams};

const OUTBOUND_QUEUE: usize = 64;

/// Upgrade handler for the media-stream endpoint
pub async fn media_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct ActiveCall {
    call_id: String,
    session: std::sync::Arc<CallSession>,
    input: mpsc::Sender<SessionInput>,
    pump: tokio::task::JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let mut sink = Some(sink);
    let mut active: Option<ActiveCall> = None;

    loop {
        let session_closed = active.as_ref().map(|c| c.session.closed());
        let message = tokio::select! {
            _ = async {
                match &session_closed {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                tracing::debug!("session ended, closing socket");
                break;
            }
            message = stream.next() => message,
        };

        let message = match message {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                tracing::warn!("websocket error: {e}");
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => {
                let inbound: InboundMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        // Protocol violation: log and ignore, do not tear down
                        tracing::debug!("ignoring malformed carrier message: {e}");
                        continue;
                    }
                };

                match inbound {
                    InboundMessage::Connected => {
                        tracing::debug!("carrier connected");
                    }
                    InboundMessage::Start { start } => {
                        if active.is_some() {
                            tracing::warn!("duplicate start event, ignoring");
                            continue;
                        }
                        let Some(sink) = sink.take() else { continue };
                        active = Some(start_call(&state, start, sink));
                    }
                    InboundMessage::Media { media, .. } => {
                        // Discarded until the stream has started
                        if let Some(call) = &active {
                            let _ = call
                                .input
                                .send(SessionInput::Media {
                                    payload: media.payload,
                                })
                                .await;
                        }
                    }
                    InboundMessage::Mark => {
                        if let Some(call) = &active {
                            let _ = call.input.send(SessionInput::Mark).await;
                        }
                    }
                    InboundMessage::Stop => {
                        tracing::info!("carrier stop event");
                        if let Some(call) = &active {
                            let _ = call.input.send(SessionInput::Stop).await;
                        }
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(call) = active {
        // Dropping the input channel tells the session the carrier is gone
        drop(call.input);
        state.sessions.remove(&call.call_id);
        call.pump.abort();
        tracing::info!(call_id = %call.call_id, "socket closed");
    }
}

fn start_call(
    state: &AppState,
    start: StartInfo,
    sink: SplitSink<WebSocket, Message>,
) -> ActiveCall {
    let (agent_id, call_id_param, overrides) = parse_custom_parameters(start.custom_parameters);
    let call_id = call_id_param
        .or(start.call_sid)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));

    let profile = state.agents.resolve(agent_id.as_deref());
    let config = SessionConfig::resolve(&state.settings, &profile, &overrides);

    let (transport, mut outbound) = WsMediaTransport::channel(start.stream_sid.clone(), OUTBOUND_QUEUE);

    let pump = tokio::spawn(async move {
        let mut sink = sink;
        while let Some(message) = outbound.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!("outbound serialisation failed: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                tracing::debug!("outbound socket closed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tracing::info!(%call_id, stream_sid = %start.stream_sid, "starting call session");

    let (session, input) = CallSession::new(SessionParams {
        call_id: call_id.clone(),
        stream_id: start.stream_sid,
        profile,
        overrides,
        config,
        transport,
        deps: state.deps.clone(),
    });
    state.sessions.insert(call_id.clone(), session.clone());

    ActiveCall {
        call_id,
        session,
        input,
        pump,
    }
}
