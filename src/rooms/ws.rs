use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{trace, warn};

use crate::{
    engine::{Engine, spawn_ticker},
    protocol::ClientEvent,
};

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(State(engine): State<Engine>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_socket(engine, stream))
}

/// One connection, start to finish: a session is opened on upgrade and
/// whatever happens to the socket, it is closed through the disconnect path.
async fn serve_socket(engine: Engine, stream: WebSocket) {
    let (session_id, mut rx) = engine.connect().await;
    let (mut sender, mut receiver) = stream.split();

    let mut writer_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(event = event.name(), "could not encode event: {err}");
                    continue;
                }
            };
            trace!(event = event.name(), "out");
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut ticker = None;
    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                match frame {
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                    frame => {
                        let event = match ClientEvent::decode(&frame.into_data()) {
                            Ok(event) => event,
                            Err(err) => {
                                engine.reject(session_id, err).await;
                                continue;
                            }
                        };
                        if matches!(event, ClientEvent::FetchRooms) && ticker.is_none() {
                            ticker = Some(spawn_ticker(engine.clone(), session_id));
                        }
                        engine.handle(session_id, event).await;
                    }
                }
            }
            _ = &mut writer_task => break,
        }
    }

    if let Some(ticker) = ticker {
        ticker.abort();
    }
    engine.disconnect(session_id).await;
    writer_task.abort();
}
