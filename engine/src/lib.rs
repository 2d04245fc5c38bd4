//! Moderated-action routing engine.
//!
//! A free-text request is rate limited, classified by an external model,
//! checked against the actor's permissions and the target's rank,
//! optionally held for confirmation, executed through a moderation
//! provider and recorded in the audit log.

pub mod audit;
pub mod config;
pub mod confirmation;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod router;

pub use config::{EngineConfig, ModelConfig};
pub use error::ModerationError;
pub use pipeline::{Engine, EngineStatus, Outcome, Preview};
