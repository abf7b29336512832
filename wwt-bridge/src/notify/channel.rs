//! The supersedable notification channel.
//!
//! One channel exists per notification category. All state lives behind a
//! single mutex so that "advance generation, reject stale waiters, register
//! the new waiter" is one indivisible step even on a multi-threaded runtime.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::waiter::Outcome;
use super::{Generation, NotifyError, Waiter};

/// Counts from one terminal event firing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireOutcome {
    /// Waiters resolved with the event payload.
    pub resolved: usize,
    /// Waiters rejected because their generation was stale.
    pub superseded: usize,
}

impl FireOutcome {
    /// Total number of waiters settled by the firing.
    pub fn total(&self) -> usize {
        self.resolved + self.superseded
    }
}

struct Registered<T> {
    generation: Generation,
    tx: oneshot::Sender<Outcome<T>>,
}

struct ChannelInner<T> {
    generation: Generation,
    waiters: Vec<Registered<T>>,
    latched: Option<T>,
}

impl<T: Clone> ChannelInner<T> {
    fn advance(&mut self, channel: &'static str) -> Generation {
        self.generation = self.generation.next();
        let current = self.generation;

        let superseded = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            // Receiver may already be gone; nobody left to tell.
            let _ = waiter.tx.send(Err(NotifyError::Superseded {
                generation: waiter.generation,
                current,
            }));
        }

        if superseded > 0 {
            debug!(
                channel,
                generation = current.value(),
                superseded,
                "Superseded pending waiters"
            );
        }

        current
    }

    fn register(&mut self, channel: &'static str, generation: Generation) -> Waiter<T> {
        self.waiters.retain(|w| !w.tx.is_closed());

        let (tx, rx) = oneshot::channel();
        self.waiters.push(Registered { generation, tx });

        trace!(
            channel,
            generation = generation.value(),
            pending = self.waiters.len(),
            "Registered waiter"
        );

        Waiter::pending(generation, rx)
    }

    fn settle(&mut self, payload: &T) -> FireOutcome {
        let current = self.generation;
        let mut outcome = FireOutcome::default();

        for waiter in self.waiters.drain(..) {
            if waiter.generation < current {
                let _ = waiter.tx.send(Err(NotifyError::Superseded {
                    generation: waiter.generation,
                    current,
                }));
                outcome.superseded += 1;
            } else {
                let _ = waiter.tx.send(Ok(payload.clone()));
                outcome.resolved += 1;
            }
        }

        outcome
    }
}

/// Waiter registry for one category of engine terminal event.
///
/// Issuing a new request through [`begin_request`](Self::begin_request)
/// cancels every request still pending in the same category: those waiters
/// resolve to [`NotifyError::Superseded`] instead of hanging or being
/// resolved with data that belongs to the newer request.
///
/// # Thread Safety
///
/// The channel is `Send + Sync`. The generation bump, the rejection of stale
/// waiters and the registration of the new waiter share one lock
/// acquisition, as does the resolution pass in [`fire`](Self::fire).
pub struct NotificationChannel<T> {
    name: &'static str,
    inner: Mutex<ChannelInner<T>>,
}

impl<T: Clone> NotificationChannel<T> {
    /// Create an empty channel at generation zero.
    ///
    /// `name` only appears in log output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(ChannelInner {
                generation: Generation::default(),
                waiters: Vec::new(),
                latched: None,
            }),
        }
    }

    /// Channel name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current generation (number of requests issued so far).
    pub fn generation(&self) -> Generation {
        self.inner.lock().generation
    }

    /// Number of registered waiters.
    pub fn pending(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Returns true once [`latch`](Self::latch) has been called.
    pub fn is_latched(&self) -> bool {
        self.inner.lock().latched.is_some()
    }

    /// Issue a new request that supersedes every pending one.
    ///
    /// With `instant` set the returned waiter is already resolved with
    /// `T::default()` and nothing is registered; the engine will not fire a
    /// terminal event for an instant transition.
    pub fn begin_request(&self, instant: bool) -> Waiter<T>
    where
        T: Default,
    {
        self.begin_request_with(instant.then(T::default))
    }

    /// Issue a new request, resolving immediately with `immediate` if given.
    pub fn begin_request_with(&self, immediate: Option<T>) -> Waiter<T> {
        let mut inner = self.inner.lock();
        let generation = inner.advance(self.name);

        match immediate {
            Some(value) => Waiter::resolved(generation, value),
            None => inner.register(self.name, generation),
        }
    }

    /// First half of [`begin_request`](Self::begin_request): bump the
    /// generation and reject pending waiters.
    ///
    /// Pair with [`wait_for`](Self::wait_for) when work has to happen between
    /// the two steps.
    pub fn advance(&self) -> Generation {
        self.inner.lock().advance(self.name)
    }

    /// Register a waiter for `generation`.
    ///
    /// If the channel has already moved past `generation` the waiter is
    /// rejected on the spot instead of being registered.
    pub fn wait_for(&self, generation: Generation) -> Waiter<T> {
        let mut inner = self.inner.lock();

        if inner.generation > generation {
            debug!(
                channel = self.name,
                generation = generation.value(),
                current = inner.generation.value(),
                "Stale registration rejected"
            );
            return Waiter::rejected(
                generation,
                NotifyError::Superseded {
                    generation,
                    current: inner.generation,
                },
            );
        }

        inner.register(self.name, generation)
    }

    /// Wait for the next firing without superseding anyone.
    ///
    /// Resolves immediately with `immediate`, or with the latched payload if
    /// the channel has been latched.
    pub fn join(&self, immediate: Option<T>) -> Waiter<T> {
        let mut inner = self.inner.lock();
        let generation = inner.generation;

        match immediate.or_else(|| inner.latched.clone()) {
            Some(value) => Waiter::resolved(generation, value),
            None => inner.register(self.name, generation),
        }
    }

    /// Deliver one terminal event to the current waiters.
    pub fn fire(&self, payload: T) -> FireOutcome {
        let mut inner = self.inner.lock();
        let outcome = inner.settle(&payload);
        self.log_fire(inner.generation, outcome);
        outcome
    }

    /// Deliver a one-time event and remember it for later joiners.
    pub fn latch(&self, payload: T) -> FireOutcome {
        let mut inner = self.inner.lock();
        let outcome = inner.settle(&payload);
        inner.latched = Some(payload);
        self.log_fire(inner.generation, outcome);
        outcome
    }

    fn log_fire(&self, generation: Generation, outcome: FireOutcome) {
        debug!(
            channel = self.name,
            generation = generation.value(),
            resolved = outcome.resolved,
            superseded = outcome.superseded,
            "Terminal event fired"
        );
    }
}

impl<T> fmt::Debug for NotificationChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NotificationChannel")
            .field("name", &self.name)
            .field("generation", &inner.generation)
            .field("pending", &inner.waiters.len())
            .field("latched", &inner.latched.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn channel() -> NotificationChannel<()> {
        NotificationChannel::new("test")
    }

    #[test]
    fn test_new_channel_is_empty() {
        let ch = channel();
        assert_eq!(ch.generation(), Generation::new(0));
        assert_eq!(ch.pending(), 0);
        assert!(!ch.is_latched());
        assert_eq!(ch.name(), "test");
    }

    #[test]
    fn test_second_request_supersedes_first() {
        let ch = channel();

        let w1 = ch.begin_request(false);
        assert_eq!(w1.generation(), Generation::new(1));
        assert_eq!(ch.pending(), 1);

        let w2 = ch.begin_request(false);
        assert_eq!(w2.generation(), Generation::new(2));
        assert_eq!(ch.pending(), 1);

        let err = w1.now_or_never().unwrap().unwrap_err();
        assert_eq!(
            err,
            NotifyError::Superseded {
                generation: Generation::new(1),
                current: Generation::new(2),
            }
        );

        let outcome = ch.fire(());
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.superseded, 0);
        assert_eq!(ch.pending(), 0);
        assert_eq!(w2.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_fire_without_waiters_is_noop() {
        let ch = channel();
        assert_eq!(ch.fire(()), FireOutcome::default());
    }

    #[test]
    fn test_instant_request_resolves_without_registering() {
        let ch = channel();
        let waiter = ch.begin_request(true);

        assert!(waiter.is_immediate());
        assert_eq!(ch.pending(), 0);
        assert_eq!(waiter.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_instant_request_still_supersedes_pending() {
        let ch = channel();
        let animated = ch.begin_request(false);
        let instant = ch.begin_request(true);

        assert_eq!(ch.pending(), 0);
        assert!(animated.now_or_never().unwrap().unwrap_err().is_superseded());
        assert_eq!(instant.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_stale_wait_for_rejects_immediately() {
        let ch = channel();
        let stale = ch.advance();
        let _newer = ch.begin_request(false);

        let waiter = ch.wait_for(stale);
        assert!(waiter.is_immediate());
        assert_eq!(ch.pending(), 1);
        assert!(waiter.now_or_never().unwrap().unwrap_err().is_superseded());
    }

    #[test]
    fn test_advance_then_wait_for_current_registers() {
        let ch = channel();
        let generation = ch.advance();
        let waiter = ch.wait_for(generation);

        assert_eq!(ch.pending(), 1);
        ch.fire(());
        assert_eq!(waiter.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_payload_is_cloned_to_waiter() {
        let ch: NotificationChannel<String> = NotificationChannel::new("tour");
        let waiter = ch.begin_request_with(None);
        ch.fire("tour.wtt".to_string());
        assert_eq!(waiter.now_or_never(), Some(Ok("tour.wtt".to_string())));
    }

    #[test]
    fn test_joiners_all_resolve_on_fire() {
        let ch = channel();
        let a = ch.join(None);
        let b = ch.join(None);
        assert_eq!(ch.pending(), 2);

        let outcome = ch.fire(());
        assert_eq!(outcome.resolved, 2);
        assert_eq!(a.now_or_never(), Some(Ok(())));
        assert_eq!(b.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_latch_resolves_later_joiners() {
        let ch = channel();
        let before = ch.join(None);
        ch.latch(());

        assert!(ch.is_latched());
        assert_eq!(before.now_or_never(), Some(Ok(())));

        let after = ch.join(None);
        assert!(after.is_immediate());
        assert_eq!(ch.pending(), 0);
        assert_eq!(after.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_dropped_waiters_are_pruned_on_register() {
        let ch = channel();
        drop(ch.join(None));
        drop(ch.join(None));
        let _kept = ch.join(None);
        assert_eq!(ch.pending(), 1);
    }

    #[test]
    fn test_dropping_channel_closes_waiters() {
        let ch = channel();
        let waiter = ch.begin_request(false);
        drop(ch);
        assert_eq!(waiter.now_or_never(), Some(Err(NotifyError::Closed)));
    }

    #[test]
    fn test_channel_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NotificationChannel<()>>();
    }

    #[tokio::test]
    async fn test_waiter_resolves_across_tasks() {
        let ch = std::sync::Arc::new(channel());
        let waiter = ch.begin_request(false);

        let firing = std::sync::Arc::clone(&ch);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            firing.fire(());
        });

        assert_eq!(waiter.await, Ok(()));
    }
}
