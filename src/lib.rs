//! # Strategy Engine
//!
//! Event-driven core that reacts to fills on prediction-market accounts and
//! places hedge orders on paired accounts through per-platform execution
//! services.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `error`: Error taxonomy, one type per failure boundary
//! - `model`: Events, commands, strategies and schema-less documents
//! - `bus`: Redis Streams subscription and publishing
//! - `catalog`: SQLite-backed strategy catalog with versioned snapshots
//! - `strategy`: Evaluator registry and the delta-neutral hedge strategy
//! - `execution`: HTTP dispatch of commands to execution services
//! - `engine`: Lifecycle and per-event strategy evaluation

pub mod bus;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod model;
pub mod strategy;

pub use config::Config;
pub use engine::{Engine, EngineOptions, EngineState};
