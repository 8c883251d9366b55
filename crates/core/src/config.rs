//! Monitor configuration types.
//!
//! The on-disk format is the JSON `servers.json` document shared with the
//! external configuration API, hence the camelCase field names.

use crate::value::split_list;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn default_balances_path() -> String {
    "/balance".to_string()
}

fn default_completed_path() -> String {
    "/completed".to_string()
}

fn default_completed_all_path() -> String {
    "/completedall".to_string()
}

fn default_diff_path() -> String {
    "/diffdata".to_string()
}

fn default_status_path() -> String {
    "/".to_string()
}

/// One upstream bot server. Each server owns an isolated store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub base_url: String,
    #[serde(default = "default_balances_path")]
    pub balances_path: String,
    #[serde(default = "default_completed_path")]
    pub completed_path: String,
    #[serde(default = "default_completed_all_path")]
    pub completed_all_path: String,
    #[serde(default = "default_diff_path")]
    pub diff_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_key: Option<String>,
    /// Block explorer site, used to pick the chain's native coin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl ServerConfig {
    /// Create a server with default endpoint paths.
    pub fn new(id: impl Into<String>, label: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            base_url: base_url.into(),
            balances_path: default_balances_path(),
            completed_path: default_completed_path(),
            completed_all_path: default_completed_all_path(),
            diff_path: default_diff_path(),
            status_path: default_status_path(),
            contract_address: None,
            explorer_api_base: None,
            explorer_api_key: None,
            explorer_site: None,
            chain_id: None,
        }
    }

    /// Label for messages, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Join the base URL with an endpoint path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Declarative configuration for one rule key.
///
/// Thresholds are read in the order `thresholdAbsolute`,
/// `thresholdPercent`, `threshold` by the evaluators that use them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_absolute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_percent: Option<f64>,
    #[serde(default, alias = "cooldown", skip_serializing_if = "Option::is_none")]
    pub cooldown_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

impl NotificationRule {
    pub fn with_cooldown(minutes: f64) -> Self {
        Self {
            cooldown_minutes: Some(minutes),
            ..Default::default()
        }
    }

    /// First configured threshold, preferring the absolute form.
    pub fn any_threshold(&self) -> Option<f64> {
        self.threshold_absolute
            .or(self.threshold_percent)
            .or(self.threshold)
    }
}

/// Rule key to rule configuration.
pub type NotificationRules = HashMap<String, NotificationRule>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

impl TelegramSettings {
    pub fn is_available(&self) -> bool {
        self.enabled && !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

/// Incoming-webhook messaging settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

impl SlackSettings {
    pub fn is_available(&self) -> bool {
        self.enabled && !self.webhook_url.trim().is_empty()
    }
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Implicit TLS instead of STARTTLS.
    #[serde(default)]
    pub secure: bool,
    #[serde(default, alias = "username")]
    pub user: String,
    #[serde(default, alias = "password")]
    pub pass: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, alias = "recipients")]
    pub to: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            secure: false,
            user: String::new(),
            pass: String::new(),
            from: String::new(),
            to: String::new(),
        }
    }
}

impl EmailSettings {
    pub fn recipients(&self) -> Vec<String> {
        split_list(&self.to)
    }

    pub fn is_available(&self) -> bool {
        self.enabled
            && !self.smtp_host.trim().is_empty()
            && !self.from.trim().is_empty()
            && !self.recipients().is_empty()
    }
}

/// Delivery channel settings shared by every server's notifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub slack: SlackSettings,
    #[serde(default)]
    pub email: EmailSettings,
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_id: Option<String>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub notification_rules: NotificationRules,
    #[serde(default)]
    pub notifications: ChannelSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let rules = [
            ("profit-trade", 60.0),
            ("high-profit-trade", 60.0),
            ("lowGas", 60.0),
            ("pollFailed", 60.0),
            ("lowCexVolume", 5.0),
            ("hourlyDigest", 60.0),
            ("dailyDigest", 1440.0),
        ]
        .into_iter()
        .map(|(key, cooldown)| (key.to_string(), NotificationRule::with_cooldown(cooldown)))
        .collect::<NotificationRules>();

        let mut config = Self {
            active_id: Some("bnb".to_string()),
            servers: vec![
                ServerConfig::new("bnb", "BNB", "http://195.201.178.120:3001"),
                ServerConfig::new("arbitrum", "ARBITRUM", "http://168.119.69.230:3001"),
                ServerConfig::new("base", "BASE", "http://95.216.27.101:3001"),
            ],
            notification_rules: rules,
            notifications: ChannelSettings::default(),
        };
        if let Some(rule) = config.notification_rules.get_mut("high-profit-trade") {
            rule.threshold = Some(100.0);
        }
        if let Some(rule) = config.notification_rules.get_mut("lowCexVolume") {
            rule.threshold = Some(10.0);
        }
        config
    }
}

impl MonitorConfig {
    /// Load the config file, writing the defaults first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        if !path.exists() {
            let config = Self::default();
            let json = serde_json::to_string_pretty(&config).map_err(|source| ConfigError::Parse {
                path: display.clone(),
                source,
            })?;
            std::fs::write(path, json).map_err(|source| ConfigError::Io {
                path: display,
                source,
            })?;
            return Ok(config);
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn rule(&self, key: &str) -> Option<&NotificationRule> {
        self.notification_rules.get(key)
    }
}
