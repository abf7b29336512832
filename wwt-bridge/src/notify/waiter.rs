//! Waiter futures handed out by a notification channel.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::NotifyError;

/// Monotonic request counter value for one notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Create a generation from a raw counter value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value.
    pub const fn value(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type Outcome<T> = Result<T, NotifyError>;

/// One outstanding caller waiting on a terminal event.
///
/// Resolves to `Ok(payload)` when the event fires for this waiter's
/// generation, or to [`NotifyError::Superseded`] when a newer request of the
/// same category was issued first. Polling again after that yields
/// [`NotifyError::Closed`].
#[must_use = "a waiter does nothing unless awaited"]
pub struct Waiter<T> {
    generation: Generation,
    state: WaiterState<T>,
}

enum WaiterState<T> {
    Settled(Option<Outcome<T>>),
    Pending(oneshot::Receiver<Outcome<T>>),
}

impl<T> Waiter<T> {
    pub(crate) fn resolved(generation: Generation, value: T) -> Self {
        Self {
            generation,
            state: WaiterState::Settled(Some(Ok(value))),
        }
    }

    pub(crate) fn rejected(generation: Generation, error: NotifyError) -> Self {
        Self {
            generation,
            state: WaiterState::Settled(Some(Err(error))),
        }
    }

    pub(crate) fn pending(generation: Generation, rx: oneshot::Receiver<Outcome<T>>) -> Self {
        Self {
            generation,
            state: WaiterState::Pending(rx),
        }
    }

    /// Generation this waiter was issued for.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns true if the outcome was known when the waiter was created
    /// (instant requests, latched events, stale registrations).
    pub fn is_immediate(&self) -> bool {
        matches!(self.state, WaiterState::Settled(_))
    }
}

// No field is ever pinned; the receiver is polled through `Pin::new`.
impl<T> Unpin for Waiter<T> {}

impl<T> Future for Waiter<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let outcome = match &mut this.state {
            WaiterState::Settled(outcome) => outcome.take().unwrap_or(Err(NotifyError::Closed)),
            WaiterState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => outcome,
                Poll::Ready(Err(_)) => Err(NotifyError::Closed),
                Poll::Pending => return Poll::Pending,
            },
        };
        // Never poll the receiver again once it has yielded.
        this.state = WaiterState::Settled(None);
        Poll::Ready(outcome)
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("generation", &self.generation)
            .field("immediate", &self.is_immediate())
            .finish()
    }
}
