mod ws;

use axum::{Json, Router, debug_handler, extract::State, routing::get};

use crate::{
    AppResult, AppState,
    engine::{Engine, RoomSummary},
    stats::{Counter, LEADERBOARD_SIZE, Leaderboard},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/rooms", get(list_rooms))
        .route("/leaderboard", get(leaderboard))
}

#[debug_handler(state = AppState)]
async fn list_rooms(State(engine): State<Engine>) -> Json<Vec<RoomSummary>> {
    Json(engine.inspect(|state| state.registry().list_non_lobby_rooms()).await)
}

#[debug_handler(state = AppState)]
async fn leaderboard(State(engine): State<Engine>) -> AppResult<Json<Leaderboard>> {
    let stats = engine.stats();
    Ok(Json(Leaderboard {
        messages: stats.top(Counter::Messages, LEADERBOARD_SIZE).await?,
        rooms: stats.top(Counter::RoomJoins, LEADERBOARD_SIZE).await?,
    }))
}
