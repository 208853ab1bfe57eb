use serde::Deserialize;

use fieldpong_core::config::MatchConfig;

/// Top-level server configuration, loaded from `fieldpong.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    /// Tuning applied to every match this server hosts.
    pub matches: MatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            matches: MatchConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    /// Inbound frames per second per connection. Must cover one move per tick.
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    pub max_stored_results: usize,
    /// Upper bound for `limit` on the results endpoint.
    pub max_results_page: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            ws_rate_limit_per_sec: 120.0,
            player_message_buffer: 256,
            max_stored_results: 500,
            max_results_page: 100,
        }
    }
}

impl ServerConfig {
    /// Report the first problem that would stop the server from running.
    pub fn check(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr '{}' is not a valid socket address",
                self.listen_addr
            ));
        }
        if self.limits.max_ws_connections == 0 {
            return Err("limits.max_ws_connections must be > 0".to_string());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err("limits.ws_rate_limit_per_sec must be > 0".to_string());
        }
        if self.limits.player_message_buffer == 0 {
            return Err("limits.player_message_buffer must be > 0".to_string());
        }
        if self.limits.max_stored_results == 0 {
            return Err("limits.max_stored_results must be > 0".to_string());
        }
        if self.limits.max_results_page == 0 {
            return Err("limits.max_results_page must be > 0".to_string());
        }
        self.matches.validate().map_err(|e| format!("matches: {e}"))
    }

    /// Validate configuration, exiting the process on a fatal problem.
    pub fn validate(&self) {
        if let Err(e) = self.check() {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }

        let ticks_per_sec = 1000.0 / self.matches.tick_interval_ms as f64;
        if self.limits.ws_rate_limit_per_sec < ticks_per_sec {
            tracing::warn!(
                rate = self.limits.ws_rate_limit_per_sec,
                ticks_per_sec,
                "ws_rate_limit_per_sec is below the tick rate; paddle moves will be dropped"
            );
        }
        if self.matches.seed.is_some() {
            tracing::warn!("matches.seed is set; every match will serve identically");
        }
    }

    /// Load config from `fieldpong.toml` if it exists, then the standalone
    /// match file, then env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("fieldpong.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from fieldpong.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse fieldpong.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No fieldpong.toml found, using defaults");
                ServerConfig::default()
            },
        };

        // A standalone match file replaces the [matches] section.
        if let Some(matches) = MatchConfig::load() {
            config.matches = matches;
        }

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("FIELDPONG_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }

        // Limits overrides
        if let Ok(val) = std::env::var("FIELDPONG_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("FIELDPONG_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            self.limits.ws_rate_limit_per_sec = n;
        }
        if let Ok(val) = std::env::var("FIELDPONG_MAX_STORED_RESULTS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_stored_results = n;
        }

        // Match overrides
        if let Ok(val) = std::env::var("FIELDPONG_WIN_SCORE")
            && let Ok(n) = val.parse::<u32>()
        {
            self.matches.win_score = n;
        }
        if let Ok(val) = std::env::var("FIELDPONG_PAUSE_GRACE_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.matches.pause_grace_ms = n;
        }
        if let Ok(val) = std::env::var("FIELDPONG_TICK_INTERVAL_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.matches.tick_interval_ms = n;
        }
        if let Ok(val) = std::env::var("FIELDPONG_IMMEDIATE_START")
            && let Ok(b) = val.parse::<bool>()
        {
            self.matches.immediate_start = b;
        }
    }
}
