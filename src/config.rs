use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::detection::RuleSet;

/// Signature identifiers blocked when no configuration says otherwise
pub const DEFAULT_CRITICAL_SIDS: &[i64] = &[1000001, 1000002, 1000003];

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Configuration for the active defense daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alert source configuration
    pub input: InputConfig,
    /// Enforcement rule set
    pub detection: DetectionConfig,
    /// Firewall and mirror file configuration
    pub enforcement: EnforcementConfig,
    /// Audit store configuration
    pub persistence: PersistenceConfig,
}

/// Alert source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Path to the detection engine's EVE JSON log
    pub alert_log: PathBuf,
    /// How long to wait at end of file before polling again
    pub poll_interval_ms: u64,
    /// Reopen the log when it is truncated or replaced by rotation
    pub follow_rotation: bool,
}

/// Enforcement rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Signature identifiers whose alerts block the source address; all positive
    pub critical_sids: Vec<i64>,
}

/// Firewall and mirror file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// Firewall executable
    pub firewall_command: String,
    /// Run the firewall executable through sudo
    pub use_sudo: bool,
    /// Chain that receives the drop rules
    pub chain: String,
    /// Advisory record of blocked addresses, one per line
    pub mirror_file: PathBuf,
    /// Never block loopback, private, link-local or unique-local sources.
    ///
    /// Off by default so that test traffic from a lab network is enforced.
    pub protect_private_ranges: bool,
}

/// Audit store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// SQLite database holding the incident table
    pub database_path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            alert_log: PathBuf::from("/var/log/suricata/eve.json"),
            poll_interval_ms: 100,
            follow_rotation: true,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            critical_sids: DEFAULT_CRITICAL_SIDS.to_vec(),
        }
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        EnforcementConfig {
            firewall_command: "iptables".to_string(),
            use_sudo: true,
            chain: "INPUT".to_string(),
            mirror_file: PathBuf::from("blocked_ips.txt"),
            protect_private_ranges: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            database_path: PathBuf::from("defense_log.db"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: InputConfig::default(),
            detection: DetectionConfig::default(),
            enforcement: EnforcementConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `VIGIL_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("VIGIL_ALERT_LOG") {
            self.input.alert_log = PathBuf::from(path);
        }
        if let Some(path) = lookup("VIGIL_DATABASE") {
            self.persistence.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("VIGIL_MIRROR_FILE") {
            self.enforcement.mirror_file = PathBuf::from(path);
        }
        if let Some(list) = lookup("VIGIL_CRITICAL_SIDS") {
            self.detection.critical_sids = parse_sid_list(&list)?;
        }
        if let Some(flag) = lookup("VIGIL_PROTECT_PRIVATE") {
            self.enforcement.protect_private_ranges = parse_bool("VIGIL_PROTECT_PRIVATE", &flag)?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "input.poll_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(sid) = self.detection.critical_sids.iter().find(|sid| **sid <= 0) {
            return Err(ConfigError::InvalidValue {
                key: "detection.critical_sids".to_string(),
                reason: format!("{} is not a valid signature id", sid),
            });
        }
        if self.enforcement.firewall_command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "enforcement.firewall_command".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.enforcement.chain.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "enforcement.chain".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.input.poll_interval_ms)
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet::new(self.detection.critical_sids.iter().copied())
    }
}

fn parse_sid_list(list: &str) -> Result<Vec<i64>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                key: "VIGIL_CRITICAL_SIDS".to_string(),
                reason: format!("'{}': {}", s, e),
            })
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}
