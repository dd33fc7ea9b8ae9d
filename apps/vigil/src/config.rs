use std::env;
#[cfg(test)]
use std::sync::Mutex;

/// Vigil application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// The monitor server address (defaults to "127.0.0.1:8000")
    pub server: String,
    /// Explicit WebSocket URL override (defaults to one derived from `server`)
    pub ws_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let server = env::var("VIGIL_SERVER").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        let server = if server.starts_with("localhost:") {
            server.replacen("localhost", "127.0.0.1", 1)
        } else {
            server
        };
        let ws_url = env::var("VIGIL_WS_URL").ok();
        Self { server, ws_url }
    }

    /// Base URL for the REST API
    pub fn api_base_url(&self) -> String {
        if self.server.starts_with("http://") || self.server.starts_with("https://") {
            self.server.clone()
        } else {
            format!("http://{}", self.server)
        }
    }

    /// URL for the live-update WebSocket endpoint
    pub fn live_ws_url(&self) -> String {
        if let Some(ref url) = self.ws_url {
            return url.clone();
        }
        let host = self
            .server
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let scheme = if self.server.starts_with("https://") {
            "wss"
        } else {
            "ws"
        };
        format!("{}://{}/ws/live", scheme, host)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8000".to_string(),
            ws_url: None,
        }
    }
}
