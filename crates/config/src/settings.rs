//! Main settings module
//!
//! Layered configuration: `config/default.toml`, an optional
//! environment-named file, then `CALLBRIDGE_*` environment variables with a
//! `__` section separator. Every section has serde defaults so a bare
//! deployment starts with nothing but the binary.

use config::{Config, Environment, File};
use serde::Deserialize;

use callbridge_persistence::{BillingConfig, ScyllaConfig};
use callbridge_pipeline::PipelineConfig;
use callbridge_providers::{ChatConfig, SynthesisConfig, TranscriptionConfig};

use crate::constants::registry;
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    /// Stricter validation
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    pub environment: RuntimeEnvironment,

    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,

    /// Per-call pipeline tuning
    pub pipeline: PipelineConfig,

    /// STT/LLM/TTS provider endpoints and credentials
    pub providers: ProvidersConfig,

    /// Call record persistence (ScyllaDB)
    pub persistence: PersistenceConfig,

    /// Billing deduction RPC
    pub billing: BillingSettings,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Media-stream WebSocket path
    pub ws_path: String,

    /// Hard upper bound on concurrent calls
    pub max_sessions: usize,

    /// Interval between registry staleness sweeps (seconds)
    pub sweep_interval_secs: u64,

    /// Sessions older than this are evicted regardless of activity (seconds)
    pub stale_after_secs: u64,

    /// Enable CORS on the HTTP surface
    pub cors_enabled: bool,

    /// CORS allowed origins; empty means permissive in development
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_path: "/media".to_string(),
            max_sessions: registry::MAX_SESSIONS,
            sweep_interval_secs: registry::SWEEP_INTERVAL_SECS,
            stale_after_secs: registry::STALE_AFTER_SECS,
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Provider client configuration, one section per hop
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub stt: TranscriptionConfig,
    pub chat: ChatConfig,
    pub tts: SynthesisConfig,
}

/// Persistence configuration. Disabled by default so the server runs
/// without a database, falling back to in-memory stores.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub scylla: ScyllaConfig,
}

/// Billing RPC configuration. Disabled by default; deductions become
/// no-ops and calls finalize as completed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub enabled: bool,
    pub service: BillingConfig,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter when CALLBRIDGE_LOG/RUST_LOG are unset
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,

    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, strictness scaled by the runtime environment
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_pipeline()?;
        self.validate_providers()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "Must allow at least 1 session".to_string(),
            });
        }

        if !server.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "server.ws_path".to_string(),
                message: format!("Must start with '/', got '{}'", server.ws_path),
            });
        }

        if server.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.sweep_interval_secs".to_string(),
                message: "Sweep interval must be at least 1 second".to_string(),
            });
        }

        if server.stale_after_secs < server.sweep_interval_secs {
            return Err(ConfigError::InvalidValue {
                field: "server.stale_after_secs".to_string(),
                message: format!(
                    "Staleness timeout ({}) cannot be shorter than the sweep interval ({})",
                    server.stale_after_secs, server.sweep_interval_secs
                ),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured; \
                 the HTTP surface will accept any origin"
            );
        }

        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        let endpointer = &self.pipeline.endpointer;

        if endpointer.window_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.endpointer.window_size".to_string(),
                message: "Window must hold at least 1 frame".to_string(),
            });
        }

        if !(0.0..1.0).contains(&endpointer.threshold_percentile) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.endpointer.threshold_percentile".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    endpointer.threshold_percentile
                ),
            });
        }

        if endpointer.debounce_ms < 100 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.endpointer.debounce_ms".to_string(),
                message: "Debounce too short (minimum 100ms)".to_string(),
            });
        }

        if endpointer.debounce_ms > 10_000 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.endpointer.debounce_ms".to_string(),
                message: "Debounce too long (maximum 10000ms)".to_string(),
            });
        }

        if self.pipeline.barge_in.consecutive_frames == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.barge_in.consecutive_frames".to_string(),
                message: "Must require at least 1 frame".to_string(),
            });
        }

        let noise = &self.pipeline.noise.suppressor;
        if !(0.0..=1.0).contains(&noise.reduction_factor) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.noise.suppressor.reduction_factor".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", noise.reduction_factor),
            });
        }

        let rates = &self.pipeline.rates;
        for (field, value) in [
            ("pipeline.rates.stt_per_minute", rates.stt_per_minute),
            ("pipeline.rates.llm_prompt_per_1k_tokens", rates.llm_prompt_per_1k_tokens),
            (
                "pipeline.rates.llm_completion_per_1k_tokens",
                rates.llm_completion_per_1k_tokens,
            ),
            ("pipeline.rates.tts_per_1k_chars", rates.tts_per_1k_chars),
            ("pipeline.rates.telephony_per_minute", rates.telephony_per_minute),
            ("pipeline.rates.price_per_minute", rates.price_per_minute),
        ] {
            if value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Rates cannot be negative, got {}", value),
                });
            }
        }

        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        let providers = &self.providers;

        for (field, url) in [
            ("providers.stt.url", &providers.stt.url),
            ("providers.chat.url", &providers.chat.url),
            ("providers.tts.url", &providers.tts.url),
        ] {
            if url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Endpoint URL is required".to_string(),
                });
            }
        }

        if providers.chat.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.chat.max_tokens".to_string(),
                message: "Must allow at least 1 token".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&providers.chat.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "providers.chat.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", providers.chat.temperature),
            });
        }

        if providers.tts.sample_rate % 8000 != 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.tts.sample_rate".to_string(),
                message: format!(
                    "Must be a multiple of the 8000Hz telephony rate, got {}",
                    providers.tts.sample_rate
                ),
            });
        }

        // Credentials are only enforced where a mistake costs money
        if self.environment.is_strict() {
            if self.billing.enabled && self.billing.service.api_key.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "billing.service.api_key".to_string(),
                    message: "API key must be set when billing is enabled in production"
                        .to_string(),
                });
            }
        } else if providers.chat.api_key.is_empty() {
            tracing::warn!("providers.chat.api_key not configured (required for production)");
        }

        Ok(())
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CALLBRIDGE_ prefix, `__` separator)
/// 2. config/{env}.toml (if env specified)
/// 3. config/default.toml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALLBRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.ws_path, "/media");
        assert!(!settings.persistence.enabled);
        assert!(!settings.billing.enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        settings.server.max_sessions = 0;
        assert!(settings.validate_server().is_err());
        settings.server.max_sessions = 100;

        settings.server.ws_path = "media".to_string();
        assert!(settings.validate_server().is_err());
        settings.server.ws_path = "/media".to_string();

        settings.server.stale_after_secs = 10;
        settings.server.sweep_interval_secs = 60;
        assert!(settings.validate_server().is_err());
        settings.server.stale_after_secs = 3600;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_pipeline_validation() {
        let mut settings = Settings::default();

        settings.pipeline.endpointer.debounce_ms = 50;
        assert!(settings.validate_pipeline().is_err());
        settings.pipeline.endpointer.debounce_ms = 700;

        settings.pipeline.endpointer.threshold_percentile = 1.5;
        assert!(settings.validate_pipeline().is_err());
        settings.pipeline.endpointer.threshold_percentile = 0.30;

        settings.pipeline.rates.price_per_minute = -0.1;
        assert!(settings.validate_pipeline().is_err());
        settings.pipeline.rates.price_per_minute = 0.10;

        assert!(settings.validate_pipeline().is_ok());
    }

    #[test]
    fn test_provider_validation() {
        let mut settings = Settings::default();

        settings.providers.tts.sample_rate = 22_050;
        assert!(settings.validate_providers().is_err());
        settings.providers.tts.sample_rate = 24_000;

        settings.providers.chat.temperature = 3.0;
        assert!(settings.validate_providers().is_err());
        settings.providers.chat.temperature = 0.7;

        assert!(settings.validate_providers().is_ok());
    }

    #[test]
    fn test_billing_key_required_in_production() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.billing.enabled = true;
        assert!(settings.validate().is_err());

        settings.billing.service.api_key = "key".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join("config");
        std::fs::create_dir(&config_dir).unwrap();
        let mut file = std::fs::File::create(config_dir.join("default.toml")).unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "port = 9000").unwrap();
        writeln!(file, "[pipeline.endpointer]").unwrap();
        writeln!(file, "debounce_ms = 500").unwrap();

        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let settings = load_settings(None).unwrap();
        std::env::set_current_dir(prev).unwrap();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.pipeline.endpointer.debounce_ms, 500);
        // Untouched sections keep their defaults
        assert_eq!(settings.server.max_sessions, 100);
    }
}
