//! Configuration for the capture loop.
//!
//! Loaded from JSON. Durations are written as strings such as `"250ms"`,
//! `"2s"` or `"1m"`; filters use the bitflags text form, e.g.
//! `"KEY_DOWN | KEY_UP"`.

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InterceptionError, Result};
use crate::flags::{KeyFilter, MouseFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_keyboard_filter")]
    pub keyboard_filter: KeyFilter,

    #[serde(default)]
    pub mouse_filter: MouseFilter,

    #[serde(default = "default_wait_timeout", with = "duration_format")]
    pub wait_timeout: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<i32>,

    #[serde(default = "default_exit_scan_code")]
    pub exit_scan_code: u16,

    #[serde(default = "default_true")]
    pub forward: bool,

    #[serde(default)]
    pub verbose: bool,
}

fn default_keyboard_filter() -> KeyFilter {
    KeyFilter::KEY_DOWN | KeyFilter::KEY_UP
}

fn default_wait_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_exit_scan_code() -> u16 {
    0x01
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyboard_filter: default_keyboard_filter(),
            mouse_filter: MouseFilter::NONE,
            wait_timeout: default_wait_timeout(),
            precedence: None,
            exit_scan_code: default_exit_scan_code(),
            forward: true,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| InterceptionError::config_load(path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| InterceptionError::config_load(path, e.to_string()))
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| InterceptionError::config_save(path, e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyboard_filter.is_empty() && self.mouse_filter.is_empty() {
            return Err(InterceptionError::config_validation(
                "at least one of keyboard_filter or mouse_filter must be set",
            ));
        }

        if self.exit_scan_code == 0 {
            return Err(InterceptionError::config_validation(
                "exit_scan_code cannot be zero",
            ));
        }

        if self.wait_timeout_millis().is_none() {
            return Err(InterceptionError::config_validation(format!(
                "wait_timeout of {}ms is too large",
                self.wait_timeout.as_millis()
            )));
        }

        Ok(())
    }

    /// `wait_timeout` in the form the registry takes.
    pub fn wait_timeout_millis(&self) -> Option<i32> {
        i32::try_from(self.wait_timeout.as_millis()).ok()
    }
}

/// Parses `"500ms"`, `"2s"`, `"1m"` or a bare millisecond count.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(InterceptionError::invalid_duration(value, "empty duration"));
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(InterceptionError::invalid_duration(
            value,
            "expected a non-negative number",
        ));
    }
    let amount: u64 = number
        .parse()
        .map_err(|_| InterceptionError::invalid_duration(value, "number out of range"))?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| InterceptionError::invalid_duration(value, "number out of range")),
        other => Err(InterceptionError::invalid_duration(
            value,
            format!("unknown unit '{other}'"),
        )),
    }
}

mod duration_format {
    use super::parse_duration;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1000").unwrap(), Duration::from_millis(1000));
        assert_eq!(parse_duration("5S").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);

        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("100x").is_err());
        assert!(parse_duration("-5ms").is_err());
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.keyboard_filter,
            KeyFilter::KEY_DOWN | KeyFilter::KEY_UP
        );
        assert!(config.mouse_filter.is_empty());
        assert_eq!(config.wait_timeout, Duration::from_millis(250));
        assert_eq!(config.exit_scan_code, 0x01);
        assert!(config.forward);
        assert!(!config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_filters_from_text() {
        let json = r#"
        {
            "keyboard_filter": "KEY_UP",
            "mouse_filter": "LEFT_BUTTON_DOWN | MOVE",
            "wait_timeout": "1s",
            "precedence": 5
        }
        "#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.keyboard_filter, KeyFilter::KEY_UP);
        assert_eq!(
            config.mouse_filter,
            MouseFilter::LEFT_BUTTON_DOWN | MouseFilter::MOVE
        );
        assert_eq!(config.wait_timeout_millis(), Some(1000));
        assert_eq!(config.precedence, Some(5));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config {
            keyboard_filter: KeyFilter::NONE,
            mouse_filter: MouseFilter::NONE,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.mouse_filter = MouseFilter::ALL;
        assert!(config.validate().is_ok());

        config.exit_scan_code = 0;
        assert!(config.validate().is_err());

        config.exit_scan_code = 0x01;
        config.wait_timeout = Duration::from_secs(u64::MAX / 1000);
        assert!(config.validate().is_err());
    }
}
