//! Client configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PINSYNC_BASE_URL | https://api.scorbit.io | Cloud base URL |
//! | PINSYNC_DEV_TOKEN | unset | Static session token, skips signing |
//! | PINSYNC_CLIENT_TYPE | pinsync | Client type announced on install |
//! | PINSYNC_REQUEST_TIMEOUT_MS | 8000 | REST latency bound |
//! | PINSYNC_WS_BACKOFF_MS | 5000 | Delay before a WebSocket reconnect |
//! | PINSYNC_WS_REQUEST_TIMEOUT_MS | 10000 | Correlated WebSocket request timeout |
//! | PINSYNC_HEARTBEAT_INTERVAL_SECS | 10 | Heartbeat period |
//! | PINSYNC_DEEPLINK_BASE | https://scorbit.link/qrcode | Pair/claim link prefix |

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.scorbit.io";
pub const DEFAULT_CLIENT_TYPE: &str = "pinsync";
pub const DEFAULT_DEEPLINK_BASE: &str = "https://scorbit.link/qrcode";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_WS_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WS_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Smallest period accepted for repeating timers
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Raise a zero period to `MIN_INTERVAL`; `tokio::time::interval` panics on zero
pub(crate) fn nonzero_interval(setting: &'static str, interval: Duration) -> Duration {
    if interval.is_zero() {
        tracing::warn!(setting, min_ms = MIN_INTERVAL.as_millis() as u64, "Zero interval raised to minimum");
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Whole seconds from an env value; zero and garbage count as unset
fn positive_secs(raw: Option<String>) -> Option<Duration> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Client configuration for connecting to the cloud
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (e.g., "https://api.scorbit.io")
    pub base_url: String,

    /// Static token that bypasses signed authentication
    pub developer_token: Option<String>,

    /// Client type sent with the installed announcement
    pub client_type: String,

    pub request_timeout: Duration,

    pub ws_backoff: Duration,

    /// Sender poll period while the outbound queue is empty
    pub queue_poll_interval: Duration,

    pub ws_request_timeout: Duration,

    pub ws_ping_interval: Duration,

    pub heartbeat_interval: Duration,

    pub deeplink_base: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            developer_token: None,
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ws_backoff: DEFAULT_WS_BACKOFF,
            queue_poll_interval: DEFAULT_QUEUE_POLL_INTERVAL,
            ws_request_timeout: DEFAULT_WS_REQUEST_TIMEOUT,
            ws_ping_interval: DEFAULT_WS_PING_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            deeplink_base: DEFAULT_DEEPLINK_BASE.to_string(),
        }
    }

    /// Load from `PINSYNC_*` variables, falling back to defaults
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let millis = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let mut config = Self::new(
            std::env::var("PINSYNC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
        );
        config.developer_token = std::env::var("PINSYNC_DEV_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        if let Ok(client_type) = std::env::var("PINSYNC_CLIENT_TYPE") {
            config.client_type = client_type;
        }
        config.request_timeout = millis("PINSYNC_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT);
        config.ws_backoff = millis("PINSYNC_WS_BACKOFF_MS", DEFAULT_WS_BACKOFF);
        config.ws_request_timeout =
            millis("PINSYNC_WS_REQUEST_TIMEOUT_MS", DEFAULT_WS_REQUEST_TIMEOUT);
        config.heartbeat_interval =
            positive_secs(std::env::var("PINSYNC_HEARTBEAT_INTERVAL_SECS").ok())
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        if let Ok(base) = std::env::var("PINSYNC_DEEPLINK_BASE") {
            config.deeplink_base = base;
        }
        config
    }

    pub fn with_developer_token(mut self, token: impl Into<String>) -> Self {
        self.developer_token = Some(token.into());
        self
    }

    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ws_backoff(mut self, backoff: Duration) -> Self {
        self.ws_backoff = backoff;
        self
    }

    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = nonzero_interval("queue_poll_interval", interval);
        self
    }

    pub fn with_ws_request_timeout(mut self, timeout: Duration) -> Self {
        self.ws_request_timeout = timeout;
        self
    }

    pub fn with_ws_ping_interval(mut self, interval: Duration) -> Self {
        self.ws_ping_interval = nonzero_interval("ws_ping_interval", interval);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = nonzero_interval("heartbeat_interval", interval);
        self
    }

    pub fn with_deeplink_base(mut self, base: impl Into<String>) -> Self {
        self.deeplink_base = base.into();
        self
    }

    /// `ws://` / `wss://` form of the base URL
    pub fn ws_base_url(&self) -> String {
        self.base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
