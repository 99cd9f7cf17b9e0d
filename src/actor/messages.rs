use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocket;
use chrono::{DateTime, Utc};
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;

use crate::hooks::RequestInfo;
use crate::registry::ConnectionId;
use crate::state::{CanvasSnapshot, HistoryEntry};

/// A freshly upgraded WebSocket to adopt.
pub struct CreateClient {
    pub socket: WebSocket,
    pub request_info: RequestInfo,
}

/// One serialized outbound frame for a client's sink.
pub struct SendFrame(pub String);

/// Read the canonical snapshot.
pub struct GetCurrent;

/// Set a connection's brand label (silently ignored when invalid).
pub struct SetBrand {
    pub id: ConnectionId,
    pub brand: String,
}

/// A placement intent. Replies whether it was accepted; the client is never
/// told either way.
pub struct PlacePixel {
    pub id: ConnectionId,
    pub x: i64,
    pub y: i64,
    pub color: i64,
}

/// Atomically install a new canonical snapshot and fan it out.
pub struct InstallSnapshot {
    pub snapshot: CanvasSnapshot,
    pub reason: String,
    pub uploader: Option<String>,
}

pub struct GetStats;

pub struct GetRecentHistory;

/// Newtype wrapper around the recent-history view that implements kameo's
/// `Reply` trait.
pub struct RecentHistory(pub Vec<HistoryEntry>);

impl Reply for RecentHistory {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> { Ok(self) }
    fn into_any_err(self) -> Option<Box<dyn ReplyError>> { None }
    fn into_value(self) -> Self::Value { self }
}

/// Offer the serialized state to every hook (periodic tick, post-install,
/// or an explicit save request).
pub struct SaveState;

/// Recompute the cached brand-usage histogram.
pub struct HistogramTick;

/// Newtype wrapper around the canonical snapshot `Arc` that implements
/// kameo's `Reply` trait.
pub struct SnapshotHandle(pub Arc<CanvasSnapshot>);

impl Reply for SnapshotHandle {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> { Ok(self) }
    fn into_any_err(self) -> Option<Box<dyn ReplyError>> { None }
    fn into_value(self) -> Self::Value { self }
}

/// Read-only aggregate view for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub connection_count: usize,
    pub current_map: String,
    pub order_count: usize,
    pub total_pixels_placed: u64,
    pub map_history: Vec<HistoryEntry>,
    pub brand_usage: HashMap<String, usize>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
}

impl Reply for Stats {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> { Ok(self) }
    fn into_any_err(self) -> Option<Box<dyn ReplyError>> { None }
    fn into_value(self) -> Self::Value { self }
}

impl Reply for ConnectionId {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> { Ok(self) }
    fn into_any_err(self) -> Option<Box<dyn ReplyError>> { None }
    fn into_value(self) -> Self::Value { self }
}
