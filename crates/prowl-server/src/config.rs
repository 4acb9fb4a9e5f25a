use std::path::Path;

use serde::Deserialize;

/// Config file read from the working directory.
pub const CONFIG_FILE: &str = "prowl.toml";

/// Top-level server configuration, loaded from `prowl.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthFileConfig,
    pub capture: CaptureConfig,
    pub deadline: DeadlineConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            auth: AuthFileConfig::default(),
            capture: CaptureConfig::default(),
            deadline: DeadlineConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    /// When set, every `/api/v1` request must carry this bearer token.
    pub bearer_token: Option<String>,
}

/// Proximity capture tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub poll_interval_ms: u64,
    pub capture_distance_m: f64,
    pub hold_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            capture_distance_m: 2.5,
            hold_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    pub check_interval_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
        }
    }
}

/// Infrastructure limits (subscriber caps, buffer sizes, timeouts).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_stored_events: usize,
    pub broadcast_capacity: usize,
    pub max_sse_subscribers: usize,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_stored_events: 500,
            broadcast_capacity: 1024,
            max_sse_subscribers: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "prowl_server=info,tower_http=info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }
        if self
            .auth
            .bearer_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            problems.push("auth.bearer_token must not be blank".to_string());
        }

        if self.capture.poll_interval_ms == 0 {
            problems.push("capture.poll_interval_ms must be > 0".to_string());
        }
        if !(self.capture.capture_distance_m.is_finite() && self.capture.capture_distance_m > 0.0) {
            problems.push("capture.capture_distance_m must be a positive number".to_string());
        }
        if self.deadline.check_interval_ms == 0 {
            problems.push("deadline.check_interval_ms must be > 0".to_string());
        }

        if self.limits.max_stored_events == 0 {
            problems.push("limits.max_stored_events must be > 0".to_string());
        }
        if self.limits.broadcast_capacity == 0 {
            problems.push("limits.broadcast_capacity must be > 0".to_string());
        }
        if self.limits.max_sse_subscribers == 0 {
            problems.push("limits.max_sse_subscribers must be > 0".to_string());
        }
        if self.limits.request_timeout_secs == 0 {
            problems.push("limits.request_timeout_secs must be > 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// Load config from `prowl.toml` if it exists, then apply env var overrides.
    ///
    /// A missing file means defaults. A file that cannot be read or parsed is
    /// an error, so a typo never silently drops auth or capture settings.
    pub fn load() -> Result<Self, String> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<ServerConfig>(&content)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServerConfig::default(),
            Err(e) => return Err(format!("Failed to read {}: {e}", path.display())),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `PROWL_*` overrides read through `lookup`. Unparseable numbers
    /// are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("PROWL_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Some(token) = lookup("PROWL_API_TOKEN")
            && !token.is_empty()
        {
            self.auth.bearer_token = Some(token);
        }
        if let Some(val) = lookup("PROWL_POLL_INTERVAL_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.capture.poll_interval_ms = n;
        }
        if let Some(val) = lookup("PROWL_CAPTURE_DISTANCE_M")
            && let Ok(n) = val.parse::<f64>()
        {
            self.capture.capture_distance_m = n;
        }
        if let Some(val) = lookup("PROWL_CAPTURE_HOLD_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.capture.hold_ms = n;
        }
    }
}
