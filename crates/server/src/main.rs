use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use command_api::Dispatcher;
use futures::{SinkExt, StreamExt};
use shared::protocol::ResultEnvelope;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_workspace_root};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = prepare_workspace_root(&settings.workspace_root).map_err(|error| {
        error!(
            workspace_root = %settings.workspace_root,
            %error,
            "failed to prepare workspace root; verify the path is writable"
        );
        error
    })?;
    let workspace = settings.workspace_config(root);
    info!(
        root = %workspace.root.display(),
        include_directories = workspace.include_directories,
        confine_paths = workspace.confine_paths,
        "workspace ready"
    );

    let state = AppState {
        dispatcher: Dispatcher::new(&workspace),
    };
    let app = build_router(Arc::new(state), &settings.connect_route);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, route = %settings.connect_route, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, connect_route: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(connect_route, get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let span = info_span!("connection", id = %Uuid::new_v4());
    ws.on_upgrade(move |socket| ws_connection(state, socket).instrument(span))
}

/// Serves one connection: each text frame is answered with exactly one
/// text frame before the next frame is read.
async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    info!("file socket connection established");

    while let Some(frame) = receiver.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "file socket receive failed");
                break;
            }
        };
        let reply = match message {
            Message::Text(text) => {
                info!(message = %text, "received message");
                dispatch(&state.dispatcher, text).await
            }
            Message::Binary(_) => {
                ResultEnvelope::rejected("", "binary frames are not supported").encode()
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };
        debug!(response = %reply, "sending response");
        if sender.send(Message::Text(reply)).await.is_err() {
            break;
        }
    }

    info!("file socket connection closed");
}

/// Runs the dispatcher off the async workers; it holds locks across
/// blocking file I/O.
async fn dispatch(dispatcher: &Dispatcher, text: String) -> String {
    let dispatcher = dispatcher.clone();
    tokio::task::spawn_blocking(move || dispatcher.dispatch_text(&text))
        .await
        .unwrap_or_else(|error| {
            error!(%error, "dispatch task failed");
            ResultEnvelope::rejected("", "internal dispatch failure").encode()
        })
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
