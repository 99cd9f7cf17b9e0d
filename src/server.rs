use axum::{Router, routing::get, extract::{ws::WebSocketUpgrade, State, Query}, response::Response, http::HeaderMap};
use kameo::actor::{Actor, ActorRef};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use crate::actor::{
    CreateClient, GetCurrent, GetRecentHistory, GetStats, InstallSnapshot, Root, RootArgs,
    SaveState, Stats,
};
use crate::config::CanvasConfig;
use crate::hooks::{Hook, RequestInfo};
use crate::ingest::{ingest_png, ingest_rgba, IngestError};
use crate::palette::Palette;
use crate::state::{CanvasSnapshot, HistoryEntry};

/// Why an upload was not installed.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("server is no longer running")]
    Closed,
}

/// Canvas sync server.
///
/// # Flexible mounting
/// ```no_run
/// use placemap::{Server, CanvasConfig};
/// use axum::Router;
///
/// // Option 1: Default router with /api/ws
/// let app = Server::new(CanvasConfig::default()).into_router();
///
/// // Option 2: Custom path
/// let app = Server::new(CanvasConfig::default()).into_router_at("/sync/ws");
///
/// // Option 3: Compose with other routes
/// let server = Server::new(CanvasConfig::default());
/// let handle = server.handle();
/// let app = Router::new()
///     .merge(server.into_router())
///     .route("/api/stats", axum::routing::get(move || {
///         let h = handle.clone();
///         async move { axum::Json(h.stats().await) }
///     }));
/// ```
#[derive(Clone)]
pub struct Server {
    root: ActorRef<Root>,
    palette: Arc<Palette>,
    config: Arc<CanvasConfig>,
}

/// Handle for interacting with the server from HTTP handlers: the upload
/// path, the stats endpoint, and forced persistence.
#[derive(Clone)]
pub struct Handle {
    root: ActorRef<Root>,
    palette: Arc<Palette>,
    config: Arc<CanvasConfig>,
}

impl Handle {
    /// Ingests an uploaded PNG and, on success, atomically installs the
    /// resulting snapshot and broadcasts it to every connection. Returns
    /// the fresh map id.
    ///
    /// Decoding and scanning run on a blocking thread so a large upload
    /// never stalls message dispatch for connected clients.
    pub async fn install_map(
        &self,
        bytes: Vec<u8>,
        reason: &str,
        uploader: Option<&str>,
    ) -> Result<String, InstallError> {
        let config = Arc::clone(&self.config);
        let palette = Arc::clone(&self.palette);
        let snapshot = tokio::task::spawn_blocking(move || ingest_png(&bytes, &config, &palette))
            .await
            .map_err(|_| InstallError::Closed)??;
        self.install(snapshot, reason, uploader).await
    }

    /// Same as [`Handle::install_map`] over an already-decoded RGBA buffer.
    pub async fn install_rgba(
        &self,
        raw: Vec<u8>,
        reason: &str,
        uploader: Option<&str>,
    ) -> Result<String, InstallError> {
        let config = Arc::clone(&self.config);
        let palette = Arc::clone(&self.palette);
        let snapshot = tokio::task::spawn_blocking(move || ingest_rgba(&raw, &config, &palette))
            .await
            .map_err(|_| InstallError::Closed)??;
        self.install(snapshot, reason, uploader).await
    }

    async fn install(
        &self,
        snapshot: CanvasSnapshot,
        reason: &str,
        uploader: Option<&str>,
    ) -> Result<String, InstallError> {
        let map_id = snapshot.map_id.clone();
        self.root
            .ask(InstallSnapshot {
                snapshot,
                reason: reason.to_string(),
                uploader: uploader.map(str::to_string),
            })
            .send()
            .await
            .map_err(|_| InstallError::Closed)?;
        Ok(map_id)
    }

    /// Aggregate counters for a stats endpoint. `None` once the server has
    /// shut down.
    pub async fn stats(&self) -> Option<Stats> {
        self.root.ask(GetStats).send().await.ok()
    }

    /// The canonical map id.
    pub async fn current_map(&self) -> Option<String> {
        self.root
            .ask(GetCurrent)
            .send()
            .await
            .ok()
            .map(|handle| handle.0.map_id.clone())
    }

    /// The most recent installations, newest first, at most five.
    pub async fn recent_history(&self) -> Vec<HistoryEntry> {
        self.root
            .ask(GetRecentHistory)
            .send()
            .await
            .map(|history| history.0)
            .unwrap_or_default()
    }

    /// Number of live connections. Zero once the server has shut down.
    pub async fn connection_count(&self) -> usize {
        self.stats().await.map_or(0, |stats| stats.connection_count)
    }

    /// Offer the current state to every persistence hook right now.
    pub async fn persist_now(&self) {
        let _ = self.root.ask(SaveState).send().await;
    }
}

impl Server {
    pub fn new(config: CanvasConfig) -> Self {
        Self::with_hooks(config, vec![])
    }

    pub fn with_hooks(config: CanvasConfig, hooks: Vec<Box<dyn Hook>>) -> Self {
        let config = Arc::new(config);
        let root = Root::spawn(RootArgs {
            config: (*config).clone(),
            hooks: Arc::new(hooks),
        });
        Self {
            root,
            palette: Arc::new(Palette::default()),
            config,
        }
    }

    /// Replaces the default palette. Call before serving.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Arc::new(palette);
        self
    }

    /// Get a handle for use in other HTTP handlers
    pub fn handle(&self) -> Handle {
        Handle {
            root: self.root.clone(),
            palette: Arc::clone(&self.palette),
            config: Arc::clone(&self.config),
        }
    }

    /// Get router with WebSocket endpoint at `/api/ws`
    pub fn into_router(self) -> Router {
        self.into_router_at("/api/ws")
    }

    /// Get router with WebSocket endpoint at a custom path
    pub fn into_router_at(self, path: &str) -> Router {
        Router::new()
            .route(path, get(ws_handler))
            .with_state(self.root)
    }

    /// Start the server on the given address with the default `/api/ws` path
    pub async fn serve(self, addr: &str) -> io::Result<()> {
        let app = self.into_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(root): State<ActorRef<Root>>,
    headers: HeaderMap,
    Query(query_params): Query<HashMap<String, String>>,
) -> Response {
    let headers_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
        .collect();
    let request_info = RequestInfo::new(headers_map, query_params);

    ws.on_upgrade(move |socket| async move {
        let _ = root.ask(CreateClient { socket, request_info }).send().await;
    })
}
