// Configuration File Support
//
// Configuration for the VaultKeeper command gateway. Supports TOML format
// with environment variable overrides. Files are loaded from the XDG config
// directory: ~/.config/vaultkeeper/config.toml
//
// The gateway consumes these knobs, it does not own them: the allow-list,
// timeout and concurrency cap are injected so the decision logic stays
// testable against arbitrary policies.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Name of the sanctioned external CLI tool.
    pub tool: String,

    /// Allow-list of case-insensitive command prefixes. Only commands
    /// covered by one of these entries are ever executed.
    pub allow_list: Vec<String>,

    /// Per-command timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of concurrently admitted commands.
    pub max_concurrent: usize,

    /// Force the no-execution gateway variant, as used in sandboxed
    /// environments where spawning processes is categorically disallowed.
    pub sandboxed: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tool: "az".to_string(),
            allow_list: default_allow_list(),
            timeout_secs: 300,
            max_concurrent: 5,
            sandboxed: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// The command families the VaultKeeper client issues: session/identity
/// commands plus CRUD verbs for vaults, secrets, keys, certificates and
/// access policies. Broader entries (e.g. "az keyvault") are deliberately
/// absent; each verb is listed so removing one entry removes one capability.
pub fn default_allow_list() -> Vec<String> {
    [
        "az login",
        "az logout",
        "az account show",
        "az account list",
        "az account set",
        "az group list",
        "az group show",
        "az keyvault list",
        "az keyvault show",
        "az keyvault create",
        "az keyvault update",
        "az keyvault delete",
        "az keyvault recover",
        "az keyvault purge",
        "az keyvault secret list",
        "az keyvault secret show",
        "az keyvault secret set",
        "az keyvault secret delete",
        "az keyvault secret recover",
        "az keyvault key list",
        "az keyvault key show",
        "az keyvault key create",
        "az keyvault key delete",
        "az keyvault certificate list",
        "az keyvault certificate show",
        "az keyvault certificate create",
        "az keyvault certificate delete",
        "az keyvault set-policy",
        "az keyvault delete-policy",
        "az version",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl GatewayConfig {
    /// Load configuration from the default XDG config directory.
    ///
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path, apply environment variable
    /// overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: GatewayConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path: `~/.config/vaultkeeper/config.toml`.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vaultkeeper")
            .join("config.toml")
    }

    /// Apply environment variable overrides.
    ///
    /// Environment variables take precedence over config file values:
    /// - VAULTKEEPER_TOOL
    /// - VAULTKEEPER_TIMEOUT_SECS
    /// - VAULTKEEPER_MAX_CONCURRENT
    /// - VAULTKEEPER_SANDBOXED
    /// - VAULTKEEPER_LOG_LEVEL
    /// - VAULTKEEPER_LOG_FORMAT
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(tool) = std::env::var("VAULTKEEPER_TOOL") {
            if !tool.trim().is_empty() {
                self.tool = tool;
            }
        }
        if let Ok(timeout) = std::env::var("VAULTKEEPER_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                if (1..=3600).contains(&timeout) {
                    self.timeout_secs = timeout;
                }
            }
        }
        if let Ok(cap) = std::env::var("VAULTKEEPER_MAX_CONCURRENT") {
            if let Ok(cap) = cap.parse::<usize>() {
                if (1..=64).contains(&cap) {
                    self.max_concurrent = cap;
                }
            }
        }
        if let Ok(sandboxed) = std::env::var("VAULTKEEPER_SANDBOXED") {
            self.sandboxed = sandboxed.parse().unwrap_or(self.sandboxed);
        }
        if let Ok(level) = std::env::var("VAULTKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("VAULTKEEPER_LOG_FORMAT") {
            self.logging.format = format;
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tool.trim().is_empty() {
            anyhow::bail!("Tool name must not be empty");
        }
        if self.tool.split_whitespace().count() != 1 {
            anyhow::bail!("Tool name must be a single token: {}", self.tool);
        }

        if self.allow_list.is_empty() {
            anyhow::bail!("Allow-list must not be empty");
        }
        for entry in &self.allow_list {
            let mut tokens = entry.split_whitespace();
            if tokens.next().map(str::to_lowercase) != Some(self.tool.to_lowercase()) {
                anyhow::bail!(
                    "Allow-list entry '{}' does not start with the tool name '{}'",
                    entry,
                    self.tool
                );
            }
        }

        if self.timeout_secs == 0 || self.timeout_secs > 3600 {
            anyhow::bail!(
                "Timeout must be between 1 and 3600 seconds, got {}",
                self.timeout_secs
            );
        }
        if self.max_concurrent == 0 || self.max_concurrent > 64 {
            anyhow::bail!(
                "Max concurrent commands must be between 1 and 64, got {}",
                self.max_concurrent
            );
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                other
            ),
        }
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            other => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                other
            ),
        }

        Ok(())
    }

    /// Per-command timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Convert log level string to tracing::Level.
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Tests that touch VAULTKEEPER_* variables share the process
    // environment; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        guard
    }

    fn clear_env() {
        for var in [
            "VAULTKEEPER_TOOL",
            "VAULTKEEPER_TIMEOUT_SECS",
            "VAULTKEEPER_MAX_CONCURRENT",
            "VAULTKEEPER_SANDBOXED",
            "VAULTKEEPER_LOG_LEVEL",
            "VAULTKEEPER_LOG_FORMAT",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.tool, "az");
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.max_concurrent, 5);
        assert!(!config.sandboxed);
        assert_eq!(config.logging.level, "info");
        assert!(config.allow_list.len() >= 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_allow_list_covers_core_families() {
        let allow = default_allow_list();
        for entry in [
            "az login",
            "az keyvault secret set",
            "az keyvault certificate list",
            "az keyvault set-policy",
        ] {
            assert!(allow.iter().any(|e| e == entry), "missing: {entry}");
        }
    }

    #[test]
    fn test_validation_rejects_empty_tool() {
        let mut config = GatewayConfig::default();
        config.tool = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_multi_token_tool() {
        let mut config = GatewayConfig::default();
        config.tool = "az cli".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_allow_list() {
        let mut config = GatewayConfig::default();
        config.allow_list.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_foreign_allow_list_entry() {
        let mut config = GatewayConfig::default();
        config.allow_list.push("kubectl get pods".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_timeout_bounds() {
        let mut config = GatewayConfig::default();
        config.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.timeout_secs = 3601;
        assert!(config.validate().is_err());
        config.timeout_secs = 3600;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_concurrency_bounds() {
        let mut config = GatewayConfig::default();
        config.max_concurrent = 0;
        assert!(config.validate().is_err());
        config.max_concurrent = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = GatewayConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file_gives_defaults() {
        let _guard = env_guard();
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().with_extension("nonexistent");
        let config = GatewayConfig::load_from_path(&path).unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = env_guard();
        let temp = NamedTempFile::new().unwrap();
        let toml_content = r#"
tool = "az"
allow_list = ["az keyvault list", "az account show"]
timeout_secs = 60
max_concurrent = 2

[logging]
level = "debug"
format = "json"
"#;
        fs::write(temp.path(), toml_content).unwrap();

        let config = GatewayConfig::load_from_path(temp.path()).unwrap();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.allow_list.len(), 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let _guard = env_guard();
        let temp = NamedTempFile::new().unwrap();
        fs::write(temp.path(), "timeout_secs = 120\n").unwrap();

        let config = GatewayConfig::load_from_path(temp.path()).unwrap();
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.tool, "az");
        assert_eq!(config.max_concurrent, 5);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let temp = NamedTempFile::new().unwrap();
        fs::write(temp.path(), "[logging\nlevel = \"debug\"\n").unwrap();
        assert!(GatewayConfig::load_from_path(temp.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = env_guard();
        std::env::set_var("VAULTKEEPER_TIMEOUT_SECS", "30");
        std::env::set_var("VAULTKEEPER_MAX_CONCURRENT", "3");
        std::env::set_var("VAULTKEEPER_SANDBOXED", "true");
        std::env::set_var("VAULTKEEPER_LOG_LEVEL", "debug");

        let config = GatewayConfig::default().apply_env_overrides();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_concurrent, 3);
        assert!(config.sandboxed);
        assert_eq!(config.logging.level, "debug");

        clear_env();
    }

    #[test]
    fn test_env_overrides_ignore_invalid_values() {
        let _guard = env_guard();
        std::env::set_var("VAULTKEEPER_TIMEOUT_SECS", "0");
        std::env::set_var("VAULTKEEPER_MAX_CONCURRENT", "9999");

        let config = GatewayConfig::default().apply_env_overrides();
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.max_concurrent, 5);

        clear_env();
    }

    #[test]
    fn test_config_path() {
        assert!(GatewayConfig::config_path().ends_with("vaultkeeper/config.toml"));
    }

    #[test]
    fn test_timeout_conversion() {
        let config = GatewayConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = GatewayConfig::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
    }
}
