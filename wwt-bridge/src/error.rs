//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::load_cache::LoadError;
use crate::notify::NotifyError;

/// Any failure surfaced by the facade or the message relay.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A notification wait ended without the event (superseded or closed).
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// A collection load failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The engine rejected a command.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A client message could not be understood.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl BridgeError {
    /// Returns true if a newer request of the same category preempted this one.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Notify(e) if e.is_superseded())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
