use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Control plane connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL of the control plane (HTTPS only)
    pub base_url: String,
}

/// Identity of the managed device
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Opaque device identifier assigned at registration.
    /// The monitor loop is a no-op until this is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable device name shown in the parent dashboard
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Monitoring loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    /// How often to run an enforcement cycle (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Random jitter added to each interval (seconds, 0 = fixed cadence)
    #[serde(default)]
    pub poll_jitter: u64,

    /// Per-request timeout for control plane calls (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by RUST_LOG or --verbose
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_jitter: 0,
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from file
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        // The config identifies the device to the control plane; keep it private
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on: {}", path.display()))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.server.base_url).context("Invalid server URL")?;

        if url.scheme() != "https" {
            anyhow::bail!("Server URL must use HTTPS (got: {})", url.scheme());
        }

        if self.agent.poll_interval < 5 {
            anyhow::bail!(
                "Poll interval must be at least 5 seconds (got: {})",
                self.agent.poll_interval
            );
        }

        if self.agent.request_timeout == 0 {
            anyhow::bail!("Request timeout must be non-zero");
        }

        Ok(())
    }
}

/// Get the platform-specific agent config file path
pub fn get_agent_config_path() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/etc/knets-agent/agent.conf"))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(PathBuf::from(
            "/Library/Application Support/knets-agent/agent.conf",
        ))
    }

    #[cfg(target_os = "windows")]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push("knets-agent");
        path.push("agent.conf");
        Ok(path)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        anyhow::bail!("Unsupported operating system");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> AgentConfig {
        AgentConfig {
            server: ServerConfig {
                base_url: "https://knets.example.com".to_string(),
            },
            device: DeviceConfig {
                id: Some("device-123".to_string()),
                name: Some("Kid's phone".to_string()),
            },
            agent: AgentSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn config_rejects_http_server_url() {
        let mut config = make_config();
        config.server.base_url = "http://knets.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_accepts_https_server_url() {
        assert!(make_config().validate().is_ok());
    }

    #[test]
    fn config_rejects_short_poll_interval() {
        let mut config = make_config();
        config.agent.poll_interval = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_request_timeout() {
        let mut config = make_config();
        config.agent.request_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_settings_default_values() {
        let settings = AgentSettings::default();
        assert_eq!(settings.poll_interval, 30);
        assert_eq!(settings.poll_jitter, 0);
        assert_eq!(settings.request_timeout, 15);
    }

    #[test]
    fn config_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.conf");

        let config = make_config();
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.server.base_url, config.server.base_url);
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.agent.poll_interval, config.agent.poll_interval);
    }

    #[test]
    fn config_load_applies_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.conf");
        std::fs::write(
            &path,
            "[server]\nbase_url = \"https://knets.example.com\"\n",
        )
        .unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert!(loaded.device.id.is_none());
        assert_eq!(loaded.agent.poll_interval, 30);
        assert_eq!(loaded.logging.level, "info");
    }
}
