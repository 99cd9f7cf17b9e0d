//! # Placemap
//!
//! Embeddable collaborative-canvas sync server primitive.
//!
//! Clients connect over a WebSocket, read the canonical canvas snapshot
//! (`getmap` / `getorders`), and submit rate-limited pixel-placement
//! intents (`placepixel`). An administrative upload path ingests a PNG,
//! validates and palette-quantizes it, atomically installs the resulting
//! snapshot, and broadcasts `map` and `orders` frames to every connection.
//!
//! ## Quick Start
//!
//! ```no_run
//! use placemap::{Server, CanvasConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::new(CanvasConfig::default())
//!         .serve("0.0.0.0:3987")
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## With Persistence Hook
//!
//! ```no_run
//! use placemap::{Server, CanvasConfig, Hook, HookResult, HookError, OnSaveStatePayload};
//! use async_trait::async_trait;
//!
//! struct DataFile;
//!
//! #[async_trait]
//! impl Hook for DataFile {
//!     async fn on_load_state(&self) -> Result<Option<Vec<u8>>, HookError> {
//!         Ok(tokio::fs::read("data.json").await.ok())
//!     }
//!
//!     async fn on_save_state(&self, p: OnSaveStatePayload<'_>) -> HookResult {
//!         tokio::fs::write("data.json", p.state).await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::with_hooks(CanvasConfig::default(), vec![Box::new(DataFile)])
//!         .serve("0.0.0.0:3987")
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Composing with Axum
//!
//! The upload transport, admin authentication, and static map serving stay
//! outside the core; compose them around the [`Handle`]:
//!
//! ```no_run
//! use placemap::{Server, CanvasConfig};
//! use axum::{Router, routing::get};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(CanvasConfig::default());
//!     let handle = server.handle();
//!
//!     let app = Router::new()
//!         .merge(server.into_router())
//!         .route("/api/stats", get(move || {
//!             let h = handle.clone();
//!             async move { axum::Json(h.stats().await) }
//!         }));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3987").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod actor;
mod config;
mod hooks;
mod ingest;
mod palette;
mod protocol;
mod registry;
mod server;
mod state;

// Public API
pub use actor::Stats;
pub use config::CanvasConfig;
pub use hooks::{
    Hook, HookError, HookResult, OnConnectPayload, OnDisconnectPayload, OnMapInstalledPayload,
    OnSaveStatePayload, RequestInfo,
};
pub use ingest::{ingest_png, ingest_rgba, IngestError, QuantizeMode};
pub use palette::{Palette, PaletteEntry};
pub use protocol::{parse_frame, ClientMessage, FrameError, ServerFrame};
pub use registry::{is_valid_brand, ConnectionId, Registry};
pub use server::{Handle, InstallError, Server};
pub use state::{CanvasSnapshot, CanvasState, HistoryEntry, HistoryMeta, PersistedState, PixelOp};

pub use async_trait::async_trait;
pub use axum;
