//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Sleep session policy (reminder delay, stale-session window)
//! - Where the daily-flag day ends
//! - Reminder notification text
//!
//! Configuration is stored at `<data dir>/config.toml`.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::clock::DayBoundary;
use crate::error::{ConfigError, CoreError};
use crate::session::SessionPolicy;

/// Sleep session policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_reminder_delay_hours")]
    pub reminder_delay_hours: u32,
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u32,
}

/// Daily flag configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlagsConfig {
    #[serde(default)]
    pub day_boundary: DayBoundary,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reminder_title")]
    pub reminder_title: String,
    #[serde(default = "default_reminder_body")]
    pub reminder_body: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub flags: FlagsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_reminder_delay_hours() -> u32 {
    8
}
fn default_stale_after_hours() -> u32 {
    24
}
fn default_true() -> bool {
    true
}
fn default_reminder_title() -> String {
    "Good morning".into()
}
fn default_reminder_body() -> String {
    "Don't forget to log how you slept.".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reminder_delay_hours: default_reminder_delay_hours(),
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_title: default_reminder_title(),
            reminder_body: default_reminder_body(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                continue;
            }

            let obj = current
                .as_object_mut()
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            let existing = obj
                .get(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                ),
                serde_json::Value::Number(_) => {
                    let n = value
                        .parse::<u64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                    serde_json::Value::Number(n.into())
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path,
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the field.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.apply(key, value)?;
        self.save()
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            reminder_delay: Duration::hours(i64::from(self.session.reminder_delay_hours)),
            stale_after: Duration::hours(i64::from(self.session.stale_after_hours)),
            reminder_title: self.notifications.reminder_title.clone(),
            reminder_body: self.notifications.reminder_body.clone(),
            reminders_enabled: self.notifications.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.session.reminder_delay_hours, 8);
        assert_eq!(parsed.session.stale_after_hours, 24);
        assert_eq!(parsed.flags.day_boundary, DayBoundary::Local);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[flags]\nday_boundary = \"utc\"\n[session]\nreminder_delay_hours = 7\n",
        )
        .unwrap();
        assert_eq!(parsed.flags.day_boundary, DayBoundary::Utc);
        assert_eq!(parsed.session.reminder_delay_hours, 7);
        assert_eq!(parsed.session.stale_after_hours, 24);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("session.reminder_delay_hours").as_deref(), Some("8"));
        assert_eq!(cfg.get("flags.day_boundary").as_deref(), Some("local"));
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert!(cfg.get("session.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("session.stale_after_hours", "36").unwrap();
        cfg.apply("notifications.enabled", "false").unwrap();
        cfg.apply("flags.day_boundary", "+09:00").unwrap();
        assert_eq!(cfg.session.stale_after_hours, 36);
        assert!(!cfg.notifications.enabled);
        assert_eq!(cfg.flags.day_boundary, DayBoundary::parse("+09:00").unwrap());
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("session.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn apply_rejects_invalid_values() {
        let mut cfg = Config::default();
        assert!(cfg.apply("notifications.enabled", "maybe").is_err());
        assert!(cfg.apply("session.reminder_delay_hours", "-3").is_err());
        assert!(cfg.apply("flags.day_boundary", "sometime").is_err());
        assert_eq!(cfg.flags.day_boundary, DayBoundary::Local);
    }

    #[test]
    fn session_policy_reflects_config() {
        let mut cfg = Config::default();
        cfg.session.reminder_delay_hours = 7;
        let policy = cfg.session_policy();
        assert_eq!(policy.reminder_delay, Duration::hours(7));
        assert_eq!(policy.stale_after, Duration::hours(24));
        assert!(policy.reminders_enabled);
    }
}
