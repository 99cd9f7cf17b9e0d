use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;

use crate::registry::ConnectionId;

pub type HookResult = Result<(), Box<dyn Error + Send + Sync>>;
pub type HookError = Box<dyn Error + Send + Sync>;

/// HTTP request info captured at WebSocket upgrade.
#[derive(Clone, Default)]
pub struct RequestInfo {
    pub headers: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl RequestInfo {
    pub fn new(headers: HashMap<String, String>, query_params: HashMap<String, String>) -> Self {
        Self { headers, query_params }
    }

    /// Best-guess client address, honoring the usual proxy headers.
    pub fn client_ip(&self) -> Option<&str> {
        ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"]
            .iter()
            .find_map(|h| self.headers.get(*h))
            .map(String::as_str)
    }

    pub fn user_agent(&self) -> &str {
        self.headers
            .get("user-agent")
            .map(String::as_str)
            .unwrap_or("missing user-agent")
    }
}

// ============================================================================
// Payloads
// ============================================================================

pub struct OnConnectPayload<'a> {
    pub connection_id: ConnectionId,
    pub request: &'a RequestInfo,
}

pub struct OnDisconnectPayload {
    pub connection_id: ConnectionId,
}

/// Serialized `PersistedState` offered for durable storage.
pub struct OnSaveStatePayload<'a> {
    pub state: &'a [u8],
}

pub struct OnMapInstalledPayload<'a> {
    pub map_id: &'a str,
    pub reason: &'a str,
    pub uploader: Option<&'a str>,
    pub order_count: usize,
}

// ============================================================================
// Hook Trait
// ============================================================================

#[async_trait]
pub trait Hook: Send + Sync {
    /// Called when a client connects. An error rejects the connection.
    async fn on_connect(&self, _payload: OnConnectPayload<'_>) -> HookResult {
        Ok(())
    }

    /// Called after a client disconnects.
    async fn on_disconnect(&self, _payload: OnDisconnectPayload) -> HookResult {
        Ok(())
    }

    /// Called once at startup. Return `Some(bytes)` for persisted state;
    /// the first hook that does wins.
    async fn on_load_state(&self) -> Result<Option<Vec<u8>>, HookError> {
        Ok(None)
    }

    /// Called with the full serialized state: periodically, after every
    /// snapshot installation, and on explicit save requests.
    async fn on_save_state(&self, _payload: OnSaveStatePayload<'_>) -> HookResult {
        Ok(())
    }

    /// Called after a new snapshot has been installed and broadcast.
    async fn on_map_installed(&self, _payload: OnMapInstalledPayload<'_>) -> HookResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_info_prefers_proxy_headers_in_order() {
        let mut headers = HashMap::new();
        headers.insert("x-real-ip".to_string(), "10.0.0.2".to_string());
        headers.insert("cf-connecting-ip".to_string(), "10.0.0.1".to_string());
        let info = RequestInfo::new(headers, HashMap::new());
        assert_eq!(info.client_ip(), Some("10.0.0.1"));
        assert_eq!(info.user_agent(), "missing user-agent");
    }
}
