//! Error types for the strategy engine.
//!
//! Every error here is localized at some boundary of the event loop:
//! - `ConfigError` stops one strategy for one event
//! - `FieldError` is a skip signal, never surfaced as a failure
//! - `DispatchError` stops one command
//! - `StoreError` / `BusError` are fatal only at startup

use thiserror::Error;

/// A strategy's configuration is missing a required field or holds a bad value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing strategy config field `{0}`")]
    Missing(&'static str),

    #[error("invalid strategy config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Absence or shape mismatch of a field in a schema-less document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field `{0}` is missing")]
    Missing(String),

    #[error("field `{key}` is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Failures reading from the strategy configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open strategy store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("strategy query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("strategy {id} has malformed {column}: {reason}")]
    Malformed {
        id: String,
        column: &'static str,
        reason: String,
    },
}

/// Failures talking to the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("event bus unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure executing a single command against an execution service.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no execution endpoint configured for platform `{0}`")]
    UnknownPlatform(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("order rejected (status {status}): {body}")]
    Rejected {
        status: u16,
        body: serde_json::Value,
    },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Fatal engine lifecycle errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error("failed to load strategies: {0}")]
    Catalog(#[from] StoreError),
}
