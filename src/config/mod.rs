//! Process-wide configuration with environment-variable overrides
//!
//! All configuration is environment-driven by default, with an optional
//! TOML file (pointed to by `SPECTRA_CONFIG`) providing a base that
//! env vars then override, matching the override-then-validate shape used
//! throughout this codebase.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Complete process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectraConfig {
    pub server: ServerConfig,
    pub speculation: SpeculationConfig,
    pub target: TargetConfig,
    pub logging: LoggingConfig,
}

impl Default for SpectraConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            speculation: SpeculationConfig::default(),
            target: TargetConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SpectraConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {}", e))?;

        toml::from_str(&contents).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Load from file (if `SPECTRA_CONFIG` is set) or defaults, then apply env overrides
    pub fn load() -> Self {
        let mut config = if let Ok(path) = std::env::var("SPECTRA_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    info!("loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    warn!("failed to load config: {}, using defaults", e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides on top of the current values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("ENABLE_RATE_LIMIT") {
            self.server.rate_limit_enabled = v == "true";
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_MAX") {
            if let Ok(n) = v.parse() {
                self.server.rate_limit_max_requests = n;
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_WINDOW") {
            if let Ok(n) = v.parse() {
                self.server.rate_limit_window_secs = n;
            }
        }

        if let Ok(k) = std::env::var("SPECULATION_K") {
            if let Ok(n) = k.parse() {
                self.speculation.default_k = n;
            }
        }
        if let Ok(t) = std::env::var("TEMPERATURE") {
            if let Ok(n) = t.parse() {
                self.speculation.default_temperature = n;
            }
        }
        if let Ok(m) = std::env::var("MAX_TOKENS") {
            if let Ok(n) = m.parse() {
                self.speculation.default_max_tokens = n;
            }
        }
        if let Ok(eos) = std::env::var("EOS_TOKENS") {
            self.speculation.eos_tokens = eos.split(',').map(|s| s.to_string()).collect();
        }
        if let Ok(d) = std::env::var("DRAFT_MODEL") {
            self.speculation.draft_model = d;
        }
        if let Ok(ms) = std::env::var("DRAFT_PACING_MS") {
            if let Ok(n) = ms.parse() {
                self.speculation.draft_pacing_ms = n;
            }
        }
        if let Ok(ms) = std::env::var("VERIFY_PACING_MS") {
            if let Ok(n) = ms.parse() {
                self.speculation.verify_pacing_ms = n;
            }
        }

        if let Ok(key) = std::env::var("CEREBRAS_API_KEY") {
            self.target.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("CEREBRAS_TARGET_MODEL") {
            self.target.model = model;
        }
        if let Ok(url) = std::env::var("CEREBRAS_BASE_URL") {
            self.target.base_url = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Validate configuration, collecting every error found rather than failing fast
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server port cannot be 0".to_string());
        }
        if !(1..=16).contains(&self.speculation.default_k) {
            errors.push("speculation.default_k must be in [1, 16]".to_string());
        }
        if !(0.0..=2.0).contains(&self.speculation.default_temperature) {
            errors.push("speculation.default_temperature must be in [0, 2]".to_string());
        }
        if !(1..=4096).contains(&self.speculation.default_max_tokens) {
            errors.push("speculation.default_max_tokens must be in [1, 4096]".to_string());
        }
        if self.target.api_key.is_none() {
            errors.push("CEREBRAS_API_KEY is required".to_string());
        }
        if self.target.model.is_empty() {
            errors.push("CEREBRAS_TARGET_MODEL is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Serialize to TOML (used by the `--print-config` style diagnostics)
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {}", e))
    }
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            rate_limit_enabled: false,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
        }
    }
}

/// Speculative-decoding round defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeculationConfig {
    pub draft_model: String,
    pub default_k: usize,
    pub default_temperature: f32,
    pub default_max_tokens: usize,
    pub eos_tokens: Vec<String>,
    pub draft_pacing_ms: u64,
    pub verify_pacing_ms: u64,
    pub metrics_window: usize,
}

impl Default for SpeculationConfig {
    fn default() -> Self {
        Self {
            draft_model: "reference-ngram".to_string(),
            default_k: 8,
            default_temperature: 0.7,
            default_max_tokens: 512,
            eos_tokens: vec![
                "<|eot_id|>".to_string(),
                "<|end_of_text|>".to_string(),
                "</s>".to_string(),
            ],
            draft_pacing_ms: 50,
            verify_pacing_ms: 80,
            metrics_window: 50,
        }
    }
}

/// Target model HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: String::new(),
            base_url: "https://api.cerebras.ai/v1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "spectra_engine=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

/// Generate an example TOML configuration (used by the `print-config` diagnostic)
pub fn generate_example_config() -> String {
    SpectraConfig::default()
        .to_toml()
        .unwrap_or_else(|_| "# failed to generate".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_without_api_key() {
        let config = SpectraConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        let mut config = SpectraConfig::default();
        config.target.api_key = Some("key".to_string());
        config.target.model = "llama-3.3-70b".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_k() {
        let mut config = SpectraConfig::default();
        config.target.api_key = Some("key".to_string());
        config.target.model = "m".to_string();
        config.speculation.default_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = SpectraConfig::default();
        let toml = config.to_toml().unwrap();
        assert!(!toml.is_empty());
        let parsed: SpectraConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.speculation.default_k, config.speculation.default_k);
    }
}
