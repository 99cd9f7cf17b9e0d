use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How many history entries the recent view exposes.
const RECENT_HISTORY_LEN: usize = 5;

/// History timestamps serialize at millisecond precision; keep the
/// in-memory value identical to its persisted form.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    now - Duration::nanoseconds((now.timestamp_subsec_nanos() % 1_000_000) as i64)
}

/// One intended pixel value, produced by ingestion in row-major scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelOp {
    pub x: u32,
    pub y: u32,
    pub color: u8,
}

/// One canonical, atomically-installed version of the canvas.
///
/// Snapshots are immutable once built; the canonical one is held behind an
/// `Arc` so readers can never observe a new `map_id` paired with old orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub map_id: String,
    pub orders: Vec<PixelOp>,
}

impl CanvasSnapshot {
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Append-only record of a snapshot installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub map_id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
}

/// Metadata recorded alongside a swap.
#[derive(Debug, Clone)]
pub struct HistoryMeta {
    pub reason: String,
    pub uploader: Option<String>,
}

/// Serialized form of the whole canvas state, for the persistence
/// collaborator. Round-trips to an operationally identical `CanvasState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub map_id: String,
    pub orders: Vec<PixelOp>,
    pub history: Vec<HistoryEntry>,
    pub total_pixels_placed: u64,
}

/// The canonical mutable canvas state: current snapshot, append-only
/// history, and the monotone placement counter.
///
/// Mutation is funneled through the root actor, so `swap` calls never
/// interleave; readers get cheap `Arc` clones of the last published
/// snapshot.
#[derive(Debug)]
pub struct CanvasState {
    current: Arc<CanvasSnapshot>,
    history: Vec<HistoryEntry>,
    total_pixels_placed: u64,
}

impl CanvasState {
    /// Genesis state: an empty canvas with a single history entry.
    pub fn blank() -> Self {
        let snapshot = CanvasSnapshot {
            map_id: "blank.png".to_string(),
            orders: Vec::new(),
        };
        Self {
            history: vec![HistoryEntry {
                map_id: snapshot.map_id.clone(),
                reason: "genesis".to_string(),
                uploader: None,
                date: now_millis(),
            }],
            current: Arc::new(snapshot),
            total_pixels_placed: 0,
        }
    }

    pub fn from_persisted(persisted: PersistedState) -> Self {
        Self {
            current: Arc::new(CanvasSnapshot {
                map_id: persisted.map_id,
                orders: persisted.orders,
            }),
            history: persisted.history,
            total_pixels_placed: persisted.total_pixels_placed,
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            map_id: self.current.map_id.clone(),
            orders: self.current.orders.clone(),
            history: self.history.clone(),
            total_pixels_placed: self.total_pixels_placed,
        }
    }

    /// The canonical snapshot, always fully formed.
    pub fn current(&self) -> Arc<CanvasSnapshot> {
        Arc::clone(&self.current)
    }

    /// Replaces the canonical snapshot and appends the matching history
    /// entry in one step.
    pub fn swap(&mut self, snapshot: CanvasSnapshot, meta: HistoryMeta) -> HistoryEntry {
        let entry = HistoryEntry {
            map_id: snapshot.map_id.clone(),
            reason: meta.reason,
            uploader: meta.uploader,
            date: now_millis(),
        };
        self.history.push(entry.clone());
        self.current = Arc::new(snapshot);
        entry
    }

    /// The most recent installations by timestamp, newest first, capped at
    /// five. Loaded histories are not guaranteed chronological, so this
    /// sorts rather than trusting insertion order; same-millisecond entries
    /// fall back to latest-inserted-first.
    pub fn recent_history(&self) -> Vec<HistoryEntry> {
        let mut indexed: Vec<(usize, &HistoryEntry)> =
            self.history.iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1.date.cmp(&a.1.date).then(b.0.cmp(&a.0)));
        indexed
            .into_iter()
            .take(RECENT_HISTORY_LEN)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// The full append-only installation log, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn increment_placed(&mut self) -> u64 {
        self.total_pixels_placed += 1;
        self.total_pixels_placed
    }

    pub fn total_placed(&self) -> u64 {
        self.total_pixels_placed
    }
}
