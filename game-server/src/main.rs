mod config;
mod directory;
mod persistence;
mod room;
mod ws_handler;

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::directory::{
    cleanup_dead_rooms, generate_room_code, init_room, lookup, AppState, InitRequest,
    RoomCodeResponse, RoomSummary,
};
use crate::persistence::SledPersistence;
use protocol::ErrorCode;

const CONFIG_PATH: &str = "RoomServer.toml";

#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    code: ErrorCode,
    message: String,
}

impl From<ErrorCode> for ErrorResponse {
    fn from(code: ErrorCode) -> Self {
        ErrorResponse { code, message: code.description().to_string() }
    }
}

fn error_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRoom => StatusCode::NOT_FOUND,
        ErrorCode::GameInProgress => StatusCode::CONFLICT,
        ErrorCode::RoomFull => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_REQUEST,
    }
}

#[tokio::main]
/// Sets up tracing, loads `RoomServer.toml`, opens the sled-backed room
/// store, spawns the idle-room watchdog, and serves the directory's HTTP
/// and WebSocket routes. Mirrors the shape of the teacher's `main.rs`
/// (tracing setup, a watchdog task, one axum router) reworked around the
/// per-room actor this server now runs instead of relaying bytes.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let server_config = config::load_config(CONFIG_PATH).await.unwrap_or_else(|message| {
        tracing::error!(message, "failed to load server config, using defaults");
        ServerConfig::default()
    });

    let persistence = match SledPersistence::open(&server_config.db_path) {
        Ok(backend) => Arc::new(backend),
        Err(error) => {
            tracing::error!(?error, "failed to open persistence backend");
            panic!("cannot start without a persistence backend: {error}");
        }
    };

    let bind_address = server_config.bind_address.clone();
    let static_dir = server_config.static_dir.clone();
    let app_state = Arc::new(AppState::new(server_config, persistence));

    let watchdog_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_dead_rooms(&watchdog_state).await;
        }
    });

    let app = Router::new()
        .route("/init", post(init_handler))
        .route("/room", post(create_room_handler))
        .route("/info", get(info_handler))
        .route("/room/{code}/ws", get(ws_upgrade_handler))
        .route("/reload", post(reload_handler))
        .with_state(app_state)
        .fallback_service(
            tower_http::services::ServeDir::new(static_dir)
                .not_found_service(tower_http::services::ServeFile::new("index.html")),
        );

    let listener = tokio::net::TcpListener::bind(&bind_address).await.unwrap();
    tracing::info!(bind_address, "listening");
    axum::serve(listener, app).await.unwrap();
}

/// `POST /init {roomCode}` -- 200 "OK" on first init, 409 otherwise.
async fn init_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InitRequest>,
) -> impl IntoResponse {
    match init_room(&state, request.room_code).await {
        Some(_) => (StatusCode::OK, "OK").into_response(),
        None => (StatusCode::CONFLICT, "Already initialized").into_response(),
    }
}

/// `POST /room` -- directory allocates and initializes a fresh room code.
async fn create_room_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let room_code = {
        let rooms = state.rooms.lock().await;
        generate_room_code(&rooms)
    };
    match init_room(&state, room_code.clone()).await {
        Some(_) => (StatusCode::OK, Json(RoomCodeResponse { room_code })).into_response(),
        None => {
            // Exceptionally rare: the generated code collided with a room
            // created between the check above and `init_room`'s own lock.
            (StatusCode::CONFLICT, "Already initialized").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoQuery {
    room_code: String,
}

/// `GET /info?roomCode=` -- `{roomCode, playerCount, status}`, 404 if absent.
async fn info_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InfoQuery>,
) -> impl IntoResponse {
    let Some(handle) = lookup(&state, &query.room_code).await else {
        return error_response(ErrorCode::InvalidRoom);
    };
    let Some(info) = handle.info().await else {
        return error_response(ErrorCode::InvalidRoom);
    };
    (
        StatusCode::OK,
        Json(RoomSummary {
            room_code: query.room_code,
            player_count: info.player_count,
            status: info.status,
        }),
    )
        .into_response()
}

/// `GET /room/{code}/ws` -- pre-checks existence/capacity/status before
/// completing the upgrade, per spec.md §4.5/§6.
async fn ws_upgrade_handler(
    Path(code): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(handle) = lookup(&state, &code).await else {
        return error_response(ErrorCode::InvalidRoom);
    };
    let Some(info) = handle.info().await else {
        return error_response(ErrorCode::InvalidRoom);
    };
    if info.status == game_core::GameStatus::Countdown {
        return error_response(ErrorCode::CountdownInProgress);
    }
    if !matches!(info.status, game_core::GameStatus::Waiting | game_core::GameStatus::GameOver) {
        return error_response(ErrorCode::GameInProgress);
    }
    if info.player_count >= game_core::layout::MAX_PLAYERS {
        return error_response(ErrorCode::RoomFull);
    }

    ws.on_upgrade(move |socket| ws_handler::run(socket, handle)).into_response()
}

fn error_response(code: ErrorCode) -> axum::response::Response {
    (error_status(code), Json(ErrorResponse::from(code))).into_response()
}

/// Re-reads `RoomServer.toml` without restarting, the same "hot reload"
/// shape as the teacher's `GameConfig.json` reload endpoint.
async fn reload_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match config::reload_config(CONFIG_PATH, &state.config).await {
        Ok(()) => (StatusCode::OK, "reloaded").into_response(),
        Err(message) => (StatusCode::INTERNAL_SERVER_ERROR, message).into_response(),
    }
}
