//! HTTP API endpoints.
//!
//! Every handler answers with JSON. Failures carry a stable `error` code and
//! a human readable `message`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::graph::GraphError;
use crate::protocol::*;
use crate::state::{AppState, ErrorKind, GameError, RoomError};
use crate::types::{ArticleSnapshot, Challenge, Difficulty, Title};

/// Listener and static file configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Optional directory served for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = match non_empty("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid BIND_ADDR {:?}: {}", raw, e);
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        Self {
            bind_addr,
            static_dir: non_empty("STATIC_DIR").map(PathBuf::from),
        }
    }
}

/// Errors surfaced by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{to} is not linked from {from}")]
    InvalidMove { from: Title, to: Title },
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::Room(e) => ApiError::Room(e),
            GameError::Graph(e) => ApiError::Graph(e),
            GameError::InvalidMove { from, to } => ApiError::InvalidMove { from, to },
        }
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Room(e) => e.code(),
            ApiError::InvalidMove { .. } => "INVALID_MOVE",
            ApiError::Graph(GraphError::NotFound(_)) => "ARTICLE_NOT_FOUND",
            ApiError::Graph(GraphError::Unavailable { .. } | GraphError::RandomUnavailable) => {
                "GRAPH_UNAVAILABLE"
            }
            ApiError::Graph(_) => "UPSTREAM_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidMove { .. } => StatusCode::BAD_REQUEST,
            ApiError::Room(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            },
            ApiError::Graph(GraphError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Graph(GraphError::Unavailable { .. } | GraphError::RandomUnavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Graph(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }

        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Parse an optional JSON body; anything unreadable means "no fields"
fn lenient<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

fn strict<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}

/// Routes for the API, with state attached
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/challenge", post(generate_challenge))
        .route("/api/article", get(get_article))
        .route("/api/room", post(create_room))
        .route("/api/room/{room_id}", get(get_room))
        .route("/api/room/{room_id}/join", post(join_room))
        .route("/api/room/{room_id}/ready", post(set_ready))
        .route("/api/room/{room_id}/move", post(submit_move))
        .route("/api/room/{room_id}/next", post(next_round))
        .with_state(state)
}

/// Full application: API routes, optional static bundle, CORS and tracing
pub fn app(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let mut app = router(state);
    if let Some(dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Generate a solo challenge.
///
/// POST /api/challenge
pub async fn generate_challenge(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Challenge> {
    let request: ChallengeRequest = lenient(&body);
    let difficulty = Difficulty::parse_or_default(request.difficulty.as_deref());

    let challenge = state.challenges.generate(difficulty, &[]).await?;
    Ok(Json(challenge))
}

/// GET /api/article?title=
pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> ApiResult<ArticleSnapshot> {
    let title = Title::new(&required(query.title, "title")?);
    Ok(Json(state.article(&title).await?))
}

/// Create a room with a fresh challenge.
///
/// POST /api/room
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<CreateRoomResponse> {
    let request: CreateRoomRequest = lenient(&body);
    let difficulty = Difficulty::parse_or_default(request.difficulty.as_deref());
    let name = request.name.unwrap_or_else(|| "Player 1".to_string());

    let created = state.create_room(difficulty, &name).await?;
    let invite_path = format!("/room/{}", created.room.id);
    let invite_url = match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(origin) => format!("{}{}", origin.trim_end_matches('/'), invite_path),
        None => invite_path.clone(),
    };

    Ok(Json(CreateRoomResponse {
        room: RoomView::new(&created.room, state.now(), None),
        room_id: created.room.id.clone(),
        player_id: created.player.id,
        invite_path,
        invite_url,
    }))
}

/// GET /api/room/{room_id}?playerId=
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<RoomQuery>,
) -> ApiResult<RoomView> {
    let room = state.rooms.get_room(&room_id).await?;
    Ok(Json(RoomView::new(&room, state.now(), query.player_id.as_deref())))
}

/// POST /api/room/{room_id}/join
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> ApiResult<JoinResponse> {
    let request: JoinRequest = lenient(&body);
    let name = request.name.unwrap_or_else(|| "Player 2".to_string());

    let (room, player) = state.rooms.join_room(&room_id, &name).await?;
    Ok(Json(JoinResponse {
        player_id: player.id,
        room: RoomView::new(&room, state.now(), None),
    }))
}

/// POST /api/room/{room_id}/ready
pub async fn set_ready(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> ApiResult<RoomResponse> {
    let request: ReadyRequest = strict(&body)?;
    let player_id = required(request.player_id, "playerId")?;

    let room = state
        .rooms
        .set_ready(&room_id, &player_id, request.ready.unwrap_or(false))
        .await?;
    Ok(Json(RoomResponse {
        room: RoomView::new(&room, state.now(), None),
    }))
}

/// Submit one move. The edge is checked against the graph before the room
/// sees it.
///
/// POST /api/room/{room_id}/move
pub async fn submit_move(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> ApiResult<MoveResponse> {
    let request: MoveRequest = strict(&body)?;
    let player_id = required(request.player_id, "playerId")?;
    let to_title = Title::new(&required(request.to_title, "toTitle")?);

    let room = state.submit_move(&room_id, &player_id, &to_title).await?;
    Ok(Json(MoveResponse {
        accepted: true,
        room: RoomView::new(&room, state.now(), None),
    }))
}

/// POST /api/room/{room_id}/next
pub async fn next_round(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    body: Bytes,
) -> ApiResult<RoomResponse> {
    let request: NextRoundRequest = lenient(&body);
    let player_id = required(request.player_id, "playerId")?;
    let difficulty = request
        .difficulty
        .as_deref()
        .map(|raw| Difficulty::parse_or_default(Some(raw)));

    let room = state.next_round(&room_id, &player_id, difficulty).await?;
    Ok(Json(RoomResponse {
        room: RoomView::new(&room, state.now(), None),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            ApiError::Room(RoomError::RoomNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Room(RoomError::RoomFull).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidMove {
                from: Title::new("A"),
                to: Title::new("Q")
            }
            .code(),
            "INVALID_MOVE"
        );
        assert_eq!(
            ApiError::Graph(GraphError::Unavailable {
                attempts: 5,
                last: "status 503".to_string()
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Graph(GraphError::Status(403)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Graph(GraphError::NotFound("X".to_string())).code(),
            "ARTICLE_NOT_FOUND"
        );
    }

    #[test]
    fn test_lenient_body_parsing() {
        let request: CreateRoomRequest = lenient(b"");
        assert!(request.difficulty.is_none());

        let request: CreateRoomRequest = lenient(b"not json");
        assert!(request.name.is_none());

        let request: CreateRoomRequest = lenient(br#"{"name": "Ann", "difficulty": "hard"}"#);
        assert_eq!(request.name.as_deref(), Some("Ann"));

        assert!(strict::<MoveRequest>(b"").is_err());
    }

    #[test]
    fn test_required_field() {
        assert_eq!(required(Some(" p1 ".to_string()), "playerId").unwrap(), "p1");
        assert!(required(Some("   ".to_string()), "playerId").is_err());
        assert!(required(None, "playerId").is_err());
    }

    #[test]
    #[serial]
    fn test_server_config_from_env() {
        std::env::set_var("BIND_ADDR", "127.0.0.1:8080");
        std::env::set_var("STATIC_DIR", "  ");
        let config = ServerConfig::from_env();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert!(config.static_dir.is_none());

        std::env::set_var("BIND_ADDR", "nonsense");
        assert_eq!(ServerConfig::from_env().bind_addr.port(), 3000);

        std::env::remove_var("BIND_ADDR");
        std::env::remove_var("STATIC_DIR");
    }
}
