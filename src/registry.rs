use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Opaque per-connection identifier. Unique for the process lifetime;
/// never reused across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// In-memory state of one live connection. Exists only between register
/// and unregister.
#[derive(Debug, Default)]
pub struct ConnectionRecord {
    brand: Option<String>,
    last_accepted: Option<Instant>,
}

impl ConnectionRecord {
    /// Admission control for a placement: accepts iff there is no prior
    /// accepted placement or the cooldown has fully elapsed. On accept the
    /// timestamp only ever moves forward.
    pub fn try_accept(&mut self, now: Instant, cooldown: Duration) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) <= cooldown => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }

    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }
}

/// A label is 1-32 ASCII letters and digits, nothing else.
pub fn is_valid_brand(brand: &str) -> bool {
    !brand.is_empty()
        && brand.len() <= 32
        && brand.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Tracks every live connection, its brand label, and its last accepted
/// placement. Holds no persistent identity across reconnects.
#[derive(Debug)]
pub struct Registry {
    next_id: u64,
    cooldown: Duration,
    connections: HashMap<ConnectionId, ConnectionRecord>,
}

impl Registry {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            next_id: 0,
            cooldown,
            connections: HashMap::new(),
        }
    }

    pub fn register(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(id, ConnectionRecord::default());
        id
    }

    pub fn unregister(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Sets the connection's label. Invalid labels are silently ignored;
    /// this is never a protocol error.
    pub fn set_brand(&mut self, id: ConnectionId, brand: &str) {
        if !is_valid_brand(brand) {
            return;
        }
        if let Some(record) = self.connections.get_mut(&id) {
            record.brand = Some(brand.to_string());
        }
    }

    pub fn brand(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).and_then(ConnectionRecord::brand)
    }

    /// The sole admission-control mechanism for placements. A rejected
    /// caller gets no backpressure signal beyond the `false`.
    pub fn try_accept_placement(&mut self, id: ConnectionId, now: Instant) -> bool {
        match self.connections.get_mut(&id) {
            Some(record) => record.try_accept(now, self.cooldown),
            None => false,
        }
    }

    /// Connection count per brand label, over labeled connections only.
    pub fn brand_histogram(&self) -> HashMap<String, usize> {
        let mut usage: HashMap<String, usize> = HashMap::new();
        for record in self.connections.values() {
            if let Some(brand) = record.brand() {
                *usage.entry(brand.to_string()).or_insert(0) += 1;
            }
        }
        usage
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
