/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod collector;
pub mod fmt;
pub mod macros;

use std::{fmt::Display, time::Duration};

pub type Result<T> = std::result::Result<T, Error>;
pub type Error = Box<Event<EventType>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<T> {
    pub inner: T,
    pub keys: Vec<(Key, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Store(StoreEvent),
    Router(RouterEvent),
    Intake(IntakeEvent),
    Manage(ManageEvent),
    Auth(AuthEvent),
    Resource(ResourceEvent),
    Config(ConfigEvent),
    Server(ServerEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    SqlQueryError,
    PoolError,
    ConstraintViolation,
    SerializationFailure,
    NotFound,
    UnexpectedRows,
    DataCorruption,
    IngestError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEvent {
    RouteAdded,
    RouteRemoved,
    MapReadError,
    MapWriteError,
    CompileError,
    ReloadError,
    ReloadSuccess,
    AuditError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntakeEvent {
    MessageReceived,
    MessageDelivered,
    UnknownVaultbox,
    NoCertificates,
    InvalidCertificate,
    EncryptError,
    MaildirError,
    MetadataError,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManageEvent {
    MissingParameter,
    InvalidParameter,
    NotFound,
    AlreadyExists,
    AliasLimitReached,
    AliasConflict,
    AliasPresent,
    DomainCatchAll,
    CatchAllConflict,
    DomainNotOwned,
    Inconsistency,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    Success,
    Failed,
    MissingToken,
    InvalidToken,
    TokenExpired,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceEvent {
    NotFound,
    BadParameters,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigEvent {
    BuildError,
    ParseError,
    MissingSetting,
    InvalidSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    Startup,
    Shutdown,
    ListenerStart,
    ListenerError,
    ThreadError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    CausedBy,
    Reason,
    Details,
    Code,
    Path,
    OwnerId,
    VaultboxId,
    Domain,
    Alias,
    Username,
    RemoteIp,
    Size,
    Total,
    Elapsed,
    Key,
    Value,
    Constraint,
    Url,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Static(&'static str),
    String(String),
    UInt(u64),
    Int(i64),
    Bool(bool),
    Duration(u64),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Disable = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl EventType {
    pub fn level(&self) -> Level {
        match self {
            EventType::Store(event) => match event {
                StoreEvent::SqlQueryError
                | StoreEvent::PoolError
                | StoreEvent::DataCorruption => Level::Error,
                StoreEvent::SerializationFailure | StoreEvent::IngestError => Level::Warn,
                StoreEvent::ConstraintViolation
                | StoreEvent::NotFound
                | StoreEvent::UnexpectedRows => Level::Debug,
            },
            EventType::Router(event) => match event {
                RouterEvent::MapReadError
                | RouterEvent::MapWriteError
                | RouterEvent::CompileError
                | RouterEvent::AuditError => Level::Error,
                RouterEvent::ReloadError => Level::Warn,
                RouterEvent::RouteAdded
                | RouterEvent::RouteRemoved
                | RouterEvent::ReloadSuccess => Level::Info,
            },
            EventType::Intake(event) => match event {
                IntakeEvent::EncryptError
                | IntakeEvent::MaildirError
                | IntakeEvent::MetadataError => Level::Error,
                IntakeEvent::NoCertificates
                | IntakeEvent::InvalidCertificate
                | IntakeEvent::UnknownVaultbox
                | IntakeEvent::Timeout => Level::Warn,
                IntakeEvent::MessageReceived | IntakeEvent::MessageDelivered => Level::Info,
            },
            EventType::Manage(event) => match event {
                ManageEvent::Inconsistency | ManageEvent::Error => Level::Error,
                _ => Level::Debug,
            },
            EventType::Auth(event) => match event {
                AuthEvent::Success => Level::Info,
                AuthEvent::Failed | AuthEvent::Forbidden => Level::Debug,
                AuthEvent::MissingToken | AuthEvent::InvalidToken | AuthEvent::TokenExpired => {
                    Level::Debug
                }
            },
            EventType::Resource(event) => match event {
                ResourceEvent::Error => Level::Error,
                ResourceEvent::NotFound | ResourceEvent::BadParameters => Level::Debug,
            },
            EventType::Config(_) => Level::Error,
            EventType::Server(event) => match event {
                ServerEvent::ListenerError | ServerEvent::ThreadError => Level::Error,
                ServerEvent::Startup | ServerEvent::Shutdown | ServerEvent::ListenerStart => {
                    Level::Info
                }
            },
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            EventType::Store(event) => match event {
                StoreEvent::SqlQueryError => "SQL query failed",
                StoreEvent::PoolError => "Connection pool error",
                StoreEvent::ConstraintViolation => "Constraint violation",
                StoreEvent::SerializationFailure => "Transaction serialization failure",
                StoreEvent::NotFound => "Record not found",
                StoreEvent::UnexpectedRows => "Unexpected row count",
                StoreEvent::DataCorruption => "Data corruption detected",
                StoreEvent::IngestError => "Message metadata write failed",
            },
            EventType::Router(event) => match event {
                RouterEvent::RouteAdded => "Route added",
                RouterEvent::RouteRemoved => "Route removed",
                RouterEvent::MapReadError => "Transport map read failed",
                RouterEvent::MapWriteError => "Transport map write failed",
                RouterEvent::CompileError => "Transport map compile failed",
                RouterEvent::ReloadError => "MTA reload failed",
                RouterEvent::ReloadSuccess => "MTA reloaded",
                RouterEvent::AuditError => "Route audit write failed",
            },
            EventType::Intake(event) => match event {
                IntakeEvent::MessageReceived => "Message received",
                IntakeEvent::MessageDelivered => "Message delivered",
                IntakeEvent::UnknownVaultbox => "Unknown vaultbox",
                IntakeEvent::NoCertificates => "Vaultbox has no certificates",
                IntakeEvent::InvalidCertificate => "Invalid certificate",
                IntakeEvent::EncryptError => "Encryption failed",
                IntakeEvent::MaildirError => "Maildir delivery failed",
                IntakeEvent::MetadataError => "Metadata record failed",
                IntakeEvent::Timeout => "Intake deadline exceeded",
            },
            EventType::Manage(event) => match event {
                ManageEvent::MissingParameter => "Missing parameter",
                ManageEvent::InvalidParameter => "Invalid parameter",
                ManageEvent::NotFound => "Not found",
                ManageEvent::AlreadyExists => "Already exists",
                ManageEvent::AliasLimitReached => "Alias limit reached",
                ManageEvent::AliasConflict => "Alias conflicts with an existing address",
                ManageEvent::AliasPresent => "Aliases present on vaultbox",
                ManageEvent::DomainCatchAll => "Domain is in catch-all mode",
                ManageEvent::CatchAllConflict => "Catch-all conflict",
                ManageEvent::DomainNotOwned => "Domain not verified for user",
                ManageEvent::Inconsistency => "Partial state recorded",
                ManageEvent::Error => "Management operation failed",
            },
            EventType::Auth(event) => match event {
                AuthEvent::Success => "Authentication successful",
                AuthEvent::Failed => "Invalid credentials",
                AuthEvent::MissingToken => "Missing bearer token",
                AuthEvent::InvalidToken => "Invalid bearer token",
                AuthEvent::TokenExpired => "Bearer token expired",
                AuthEvent::Forbidden => "Insufficient permissions",
            },
            EventType::Resource(event) => match event {
                ResourceEvent::NotFound => "Resource not found",
                ResourceEvent::BadParameters => "Invalid resource parameters",
                ResourceEvent::Error => "Resource error",
            },
            EventType::Config(event) => match event {
                ConfigEvent::BuildError => "Configuration build error",
                ConfigEvent::ParseError => "Configuration parse error",
                ConfigEvent::MissingSetting => "Missing setting",
                ConfigEvent::InvalidSetting => "Invalid setting",
            },
            EventType::Server(event) => match event {
                ServerEvent::Startup => "Server starting",
                ServerEvent::Shutdown => "Server shutting down",
                ServerEvent::ListenerStart => "Listener started",
                ServerEvent::ListenerError => "Listener error",
                ServerEvent::ThreadError => "Worker thread error",
            },
        }
    }

    pub fn into_err(self) -> Error {
        Box::new(Event::new(self))
    }

    pub fn ctx(self, key: Key, value: impl Into<Value>) -> Error {
        self.into_err().ctx(key, value)
    }

    pub fn reason(self, reason: impl Display) -> Error {
        self.into_err().reason(reason)
    }

    pub fn details(self, details: impl Into<Value>) -> Error {
        self.into_err().details(details)
    }

    pub fn caused_by(self, location: &'static str) -> Error {
        self.into_err().caused_by(location)
    }

    pub fn code(self, code: &'static str) -> Error {
        self.into_err().code(code)
    }
}

impl<T> Event<T> {
    pub fn new(inner: T) -> Self {
        Event {
            inner,
            keys: Vec::with_capacity(4),
        }
    }

    pub fn value(&self, key: Key) -> Option<&Value> {
        self.keys
            .iter()
            .find_map(|(k, v)| if *k == key { Some(v) } else { None })
    }

    pub fn value_as_str(&self, key: Key) -> Option<&str> {
        self.value(key).and_then(|v| v.as_str())
    }
}

impl Event<EventType> {
    pub fn matches(&self, inner: EventType) -> bool {
        self.inner == inner
    }
}

pub trait EventBuilder: Sized {
    fn ctx(self, key: Key, value: impl Into<Value>) -> Self;
    fn ctx_opt(self, key: Key, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.ctx(key, value),
            None => self,
        }
    }
    fn reason(self, reason: impl Display) -> Self {
        self.ctx(Key::Reason, reason.to_string())
    }
    fn details(self, details: impl Into<Value>) -> Self {
        self.ctx(Key::Details, details)
    }
    fn caused_by(self, location: &'static str) -> Self {
        self.ctx(Key::CausedBy, location)
    }
    fn code(self, code: &'static str) -> Self {
        self.ctx(Key::Code, code)
    }
}

impl EventBuilder for Error {
    fn ctx(mut self, key: Key, value: impl Into<Value>) -> Self {
        self.keys.push((key, value.into()));
        self
    }
}

pub trait AddContext<T>: Sized {
    fn caused_by(self, location: &'static str) -> Result<T>;
    fn add_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(Error) -> Error;
}

impl<T> AddContext<T> for Result<T> {
    fn caused_by(self, location: &'static str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(EventBuilder::caused_by(err, location)),
        }
    }

    fn add_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(Error) -> Error,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(f(err)),
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Static(value) => Some(value),
            Value::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(value) => Some(*value),
            Value::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::Static(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value as u64)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::UInt(value as u64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::UInt(value as u64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Value::Duration(value.as_millis() as u64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::None,
        }
    }
}

impl std::error::Error for Event<EventType> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_accumulates() {
        let err = EventType::Manage(ManageEvent::AliasLimitReached)
            .ctx(Key::VaultboxId, 42u64)
            .details("too many aliases")
            .caused_by("here");
        assert!(err.matches(EventType::Manage(ManageEvent::AliasLimitReached)));
        assert_eq!(err.value_as_str(Key::Details), Some("too many aliases"));
        assert_eq!(err.value(Key::VaultboxId), Some(&Value::UInt(42)));
        assert_eq!(err.value_as_str(Key::CausedBy), Some("here"));
    }

    #[test]
    fn result_context() {
        fn inner() -> Result<()> {
            Err(EventType::Store(StoreEvent::NotFound).into_err())
        }
        let err = inner().caused_by("outer").unwrap_err();
        assert_eq!(err.value_as_str(Key::CausedBy), Some("outer"));
    }
}
