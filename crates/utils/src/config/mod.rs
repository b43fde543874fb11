/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::{fmt::Display, str::FromStr};

use ahash::AHashMap;

/// Environment-seeded key/value configuration. Parse failures are collected
/// rather than returned so that startup can report every problem at once.
#[derive(Debug, Default, Clone)]
pub struct Config {
    pub keys: AHashMap<String, String>,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<ConfigError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: String,
    pub message: String,
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();
        for (key, value) in std::env::vars() {
            if !value.is_empty() {
                config.keys.insert(key, value);
            }
        }
        config
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.keys.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(|value| value.as_str())
    }

    pub fn value_require(&mut self, key: &str) -> Option<String> {
        match self.keys.get(key) {
            Some(value) => Some(value.clone()),
            None => {
                self.new_build_error(key, "Missing required setting");
                None
            }
        }
    }

    pub fn property<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let value = self.keys.get(key)?;
        match value.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                let value = value.clone();
                self.new_parse_error(key, format!("Invalid value {value:?}"));
                None
            }
        }
    }

    pub fn property_or<T: FromStr>(&mut self, key: &str, default: T) -> T {
        self.property(key).unwrap_or(default)
    }

    pub fn new_build_error(&mut self, key: impl Into<String>, message: impl Display) {
        self.errors.push(ConfigError {
            key: key.into(),
            message: message.to_string(),
        });
    }

    pub fn new_parse_error(&mut self, key: impl Into<String>, message: impl Display) {
        self.errors.push(ConfigError {
            key: key.into(),
            message: message.to_string(),
        });
    }

    pub fn new_build_warning(&mut self, key: impl Into<String>, message: impl Display) {
        self.warnings.push(ConfigError {
            key: key.into(),
            message: message.to_string(),
        });
    }

    pub fn log_errors(&self) {
        for error in &self.errors {
            trc::event!(
                Config(BuildError),
                Key = error.key.clone(),
                Details = error.message.clone()
            );
        }
        for warning in &self.warnings {
            trc::event!(
                Config(ParseError),
                Key = warning.key.clone(),
                Details = warning.message.clone()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_properties() {
        let mut config = Config::default();
        config.set("API_PORT", "4301");
        config.set("BAD_PORT", "not-a-number");

        assert_eq!(config.property::<u16>("API_PORT"), Some(4301));
        assert_eq!(config.property::<u16>("MISSING"), None);
        assert!(config.errors.is_empty());

        assert_eq!(config.property::<u16>("BAD_PORT"), None);
        assert_eq!(config.errors.len(), 1);
        assert_eq!(config.errors[0].key, "BAD_PORT");
    }

    #[test]
    fn required_values() {
        let mut config = Config::default();
        assert_eq!(config.value_require("DATABASE_URL"), None);
        assert_eq!(config.errors.len(), 1);
    }
}
