//! Notification channel errors.

use thiserror::Error;

use super::Generation;

/// Ways a [`Waiter`](super::Waiter) can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// A newer request of the same category overtook this one.
    #[error("request {generation} superseded by request {current}")]
    Superseded {
        /// Generation the waiter was registered at.
        generation: Generation,
        /// Channel generation when the waiter was rejected.
        current: Generation,
    },

    /// The channel was dropped before the event fired.
    #[error("notification channel closed before the event fired")]
    Closed,
}

impl NotifyError {
    /// Returns true if this is the supersession marker.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}
