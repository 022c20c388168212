use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const ENV_PREFIX: &str = "EMTRADER";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("failed to write settings file: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings of the console itself (not of the gateway it talks to).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub gateway_url: String,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub log_level: String,
    pub max_notifications: usize,
    pub recent_deals_limit: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:5888".to_string(),
            request_timeout_secs: 10,
            refresh_interval_secs: 30,
            log_level: "info".to_string(),
            max_notifications: 200,
            recent_deals_limit: 50,
        }
    }
}

impl ClientSettings {
    /// Layers: defaults, then the TOML file at `path` (optional), then
    /// `EMTRADER_*` environment variables (a `.env` file is honoured).
    pub fn load(path: &str) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let source = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: ClientSettings = source.try_deserialize()?;
        settings.validate().map_err(SettingsError::Invalid)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.gateway_url.starts_with("http://") || self.gateway_url.starts_with("https://")) {
            errors.push("gateway_url must start with http:// or https://".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be > 0".to_string());
        }
        if self.refresh_interval_secs == 0 {
            errors.push("refresh_interval_secs must be > 0".to_string());
        }
        if self.max_notifications == 0 {
            errors.push("max_notifications must be > 0".to_string());
        }
        if !matches!(
            self.log_level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            errors.push(format!("unknown log_level '{}'", self.log_level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the default settings to `path` unless a file already exists there.
    pub fn write_default(path: &str) -> Result<bool, SettingsError> {
        if std::path::Path::new(path).exists() {
            return Ok(false);
        }
        std::fs::write(path, Self::default().to_toml()?)?;
        info!("Wrote default settings to {}", path);
        Ok(true)
    }
}
