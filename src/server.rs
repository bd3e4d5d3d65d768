//! HTTP surface of the background service.
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, Settings, SiteConfig};
use crate::content::resolver;
use crate::messages::{RuntimeMessage, RuntimeResponse, SettingsBroadcast};
use crate::state::SharedState;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        let status = match err {
            ConfigError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/message", post(message_handler))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/settings/ws", get(settings_ws))
        .route("/site-config", get(site_config))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn message_handler(
    State(state): State<SharedState>,
    Json(message): Json<RuntimeMessage>,
) -> Json<RuntimeResponse> {
    debug!(?message, "runtime message");
    Json(state.dispatch(message))
}

async fn get_settings(State(state): State<SharedState>) -> Json<Settings> {
    Json(state.settings.current())
}

async fn put_settings(
    State(state): State<SharedState>,
    Json(settings): Json<Settings>,
) -> Result<Json<RuntimeResponse>, ApiError> {
    state.settings.save(settings)?;
    info!("settings saved");
    Ok(Json(RuntimeResponse::ok()))
}

#[derive(Debug, Deserialize)]
struct SiteQuery {
    url: String,
}

async fn site_config(
    State(state): State<SharedState>,
    Query(query): Query<SiteQuery>,
) -> Json<Option<SiteConfig>> {
    let sites = state.settings.current().effective_sites();
    let resolution = resolver::resolve(&query.url, &sites);
    for skipped in &resolution.skipped {
        debug!(site = %skipped.site_id, error = %skipped.error, "invalid urlPattern skipped");
    }
    Json(resolution.matched.cloned())
}

async fn settings_ws(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let rx = state.settings.subscribe();
    ws.on_upgrade(move |socket| stream_settings(socket, rx))
}

async fn stream_settings(socket: WebSocket, mut rx: broadcast::Receiver<Settings>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(settings) => {
                    let frame = SettingsBroadcast::SettingsUpdated { settings };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "settings broadcast not serializable");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "settings subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("settings subscriber disconnected");
}

/// Keeps the history cap in step with the settings.
pub fn spawn_settings_follower(state: SharedState) -> tokio::task::JoinHandle<()> {
    let mut rx = state.settings.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(settings) => state.history().set_max_entries(settings.max_history_entries),
                Err(RecvError::Lagged(_)) => {
                    let settings = state.settings.current();
                    state.history().set_max_entries(settings.max_history_entries);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
