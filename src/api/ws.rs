// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use crate::{broadcast::OutboundMessage, model::Filter, state::AppState};

pub async fn logs_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub async fn stats_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlMessage {
    Subscribe {
        #[serde(default)]
        filters: Filter,
    },
    Unsubscribe,
    Ping,
    RequestStats,
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (id, mut rx) = state.broadcaster.subscribe(Filter::default());

    if send_message(&mut socket, &OutboundMessage::Connected).await.is_err() {
        state.broadcaster.unsubscribe(id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(message) => {
                        if send_message(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_control_message(&state, id, &text).await
                            && send_message(&mut socket, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.unsubscribe(id);
}

async fn send_message(
    socket: &mut WebSocket,
    message: &OutboundMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}

async fn handle_control_message(
    state: &AppState,
    id: crate::broadcast::SubscriptionId,
    text: &str,
) -> Option<OutboundMessage> {
    let control = serde_json::from_str::<ControlMessage>(text).ok()?;
    match control {
        ControlMessage::Subscribe { filters } => {
            state.broadcaster.update_filter(id, filters).await;
            None
        },
        ControlMessage::Unsubscribe => {
            state
                .broadcaster
                .update_filter(id, Filter {
                    // An impossible predicate silences delivery without
                    // tearing down the subscription/reconnect cycle.
                    correlation_id: Some(String::new()),
                    ..Default::default()
                })
                .await;
            None
        },
        ControlMessage::Ping => Some(OutboundMessage::Pong),
        ControlMessage::RequestStats => Some(OutboundMessage::StatsUpdate(state.broadcaster.stats())),
    }
}
