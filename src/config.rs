/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server listen port.
    pub port: u16,
    /// Server bind host.
    pub host: String,
    /// Keepalive ping period in seconds; 0 disables pings.
    pub ws_keepalive_secs: u64,
    /// Max concurrently running event handlers per connection.
    pub ws_event_semaphore: usize,
    /// Allowed websocket origins (comma-separated); empty = same-origin.
    pub ws_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        AppConfig {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8082),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            ws_keepalive_secs: std::env::var("CHESS_WS_KEEPALIVE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            ws_event_semaphore: std::env::var("CHESS_WS_EVENT_SEMAPHORE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            ws_origins: std::env::var("CHESS_WS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 8082,
            host: "0.0.0.0".to_string(),
            ws_keepalive_secs: 30,
            ws_event_semaphore: 5,
            ws_origins: Vec::new(),
        }
    }
}
