use anyhow::{Context, Result};
use fabric::registry::RegistrySettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub server: ServerConfig,
    pub registry: RegistryFileConfig,
    /// Defaults applied when the registry file does not exist yet; once the
    /// file is on disk its own settings block is authoritative.
    pub settings: RegistrySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
            enable_cors: true,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryFileConfig {
    pub file_path: String,
    /// Probe the local daemon on first start and seed a default host.
    pub seed_local: bool,
}

impl Default for RegistryFileConfig {
    fn default() -> Self {
        Self {
            file_path: "data/hosts.json".to_string(),
            seed_local: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,collector=debug,fabric=info".to_string(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            registry: RegistryFileConfig::default(),
            settings: RegistrySettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from collector.toml and environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Compile-time defaults are the foundation: a key missing from
        // every file and the environment keeps its default.
        let defaults = config::Config::try_from(&CollectorConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        // Layer config files (overrides defaults)
        let config_paths = vec![
            "/etc/dockpulse/collector",
            "config/collector",
            "crates/collector/config/collector",
        ];
        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Environment variables override everything. Double underscore for
        // nested keys: COLLECTOR_SERVER__BIND_ADDRESS
        builder = builder.add_source(
            config::Environment::with_prefix("COLLECTOR")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .context("Invalid bind_address")?;
        if self.registry.file_path.is_empty() {
            anyhow::bail!("registry.file_path must not be empty");
        }
        if self.settings.poll_interval_seconds == 0 {
            anyhow::bail!("settings.poll_interval_seconds must be > 0");
        }
        if self.settings.retention_hours == 0 {
            anyhow::bail!("settings.retention_hours must be > 0");
        }
        if self.settings.trim_interval_minutes == 0 {
            anyhow::bail!("settings.trim_interval_minutes must be > 0");
        }
        Ok(())
    }
}
