/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::{Display, Formatter};

use crate::{Event, EventType, Key, Level, Value};

impl Display for Event<EventType> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.message())?;
        for (key, value) in &self.keys {
            write!(f, " ({key:?}: {value})")?;
        }
        Ok(())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Static(value) => f.write_str(value),
            Value::String(value) => f.write_str(value),
            Value::UInt(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Duration(value) => write!(f, "{value}ms"),
            Value::None => f.write_str("-"),
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Level::Disable => "DISABLE",
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        })
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" | "off" => Ok(Level::Disable),
            "error" => Ok(Level::Error),
            "warn" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(format!("Invalid log level {s:?}")),
        }
    }
}

impl Event<EventType> {
    pub fn to_json(&self) -> serde_json::Value {
        let mut details = serde_json::Map::with_capacity(self.keys.len() + 1);
        details.insert(
            "event".to_string(),
            serde_json::Value::String(format!("{:?}", self.inner)),
        );
        for (key, value) in &self.keys {
            details.insert(format!("{key:?}"), value.to_json());
        }
        serde_json::Value::Object(details)
    }

    pub fn description(&self) -> String {
        match self.value_as_str(Key::Details) {
            Some(details) => details.to_string(),
            None => self.inner.message().to_string(),
        }
    }
}

impl Value {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Static(value) => serde_json::Value::String(value.to_string()),
            Value::String(value) => serde_json::Value::String(value.clone()),
            Value::UInt(value) => serde_json::Value::from(*value),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Bool(value) => serde_json::Value::from(*value),
            Value::Duration(value) => serde_json::Value::from(*value),
            Value::None => serde_json::Value::Null,
        }
    }
}
