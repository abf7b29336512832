//! Mirror of engine state for observers.
//!
//! [`StateStore`] publishes a [`ViewState`] through a `tokio::sync::watch`
//! channel. Subscribers see the latest value and are woken only when a
//! refresh actually changed something.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::{Engine, EngineState, TourInfo};

/// Everything observers can see about the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// True once the engine has fired its ready event.
    pub ready: bool,
    #[serde(flatten)]
    pub engine: EngineState,
    /// Most recently loaded tour.
    pub tour: Option<TourInfo>,
}

/// Watch-backed state mirror. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<ViewState>>,
}

impl StateStore {
    /// Create a store holding the default view state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ViewState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Latest published state.
    pub fn current(&self) -> ViewState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }

    /// Pull a snapshot from the engine and publish it if it changed.
    ///
    /// Returns true when subscribers were notified.
    pub fn refresh(&self, engine: &dyn Engine) -> bool {
        let snapshot = engine.snapshot();
        self.tx.send_if_modified(|state| {
            if state.engine == snapshot {
                return false;
            }
            state.engine = snapshot;
            true
        })
    }

    /// Record that the engine is ready. Never reset.
    pub fn mark_ready(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.ready {
                return false;
            }
            state.ready = true;
            true
        })
    }

    /// Record a newly loaded tour.
    pub fn set_tour(&self, tour: TourInfo) {
        self.tx.send_modify(|state| state.tour = Some(tour));
    }

    /// Poll the engine once per `interval` until `shutdown` is cancelled.
    pub fn spawn_refresh_loop(
        &self,
        engine: Arc<dyn Engine>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = interval.as_millis() as u64, "State refresh loop started");

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        break;
                    }

                    _ = ticker.tick() => {
                        if store.refresh(engine.as_ref()) {
                            debug!("Engine state changed");
                        }
                    }
                }
            }

            info!("State refresh loop stopped");
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GotoRaDecZoom, SimulatedEngine};

    #[test]
    fn test_refresh_publishes_only_changes() {
        let store = StateStore::new();
        let engine = SimulatedEngine::new();
        let mut rx = store.subscribe();

        assert!(!store.refresh(&engine));
        assert!(!rx.has_changed().unwrap());

        engine.set_clock_rate(10.0);
        assert!(store.refresh(&engine));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().engine.clock_rate, 10.0);
    }

    #[test]
    fn test_ready_is_sticky() {
        let store = StateStore::new();
        assert!(store.mark_ready());
        assert!(!store.mark_ready());
        assert!(store.current().ready);
    }

    #[test]
    fn test_view_state_serializes_flat() {
        let state = ViewState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["ready"], false);
        assert_eq!(json["zoomDeg"], 360.0);
        assert!(json["tour"].is_null());
    }

    #[tokio::test]
    async fn test_refresh_loop_tracks_engine_until_cancelled() {
        let store = StateStore::new();
        let engine = Arc::new(SimulatedEngine::new());
        let shutdown = CancellationToken::new();
        let mut rx = store.subscribe();

        let handle = store.spawn_refresh_loop(
            engine.clone(),
            Duration::from_millis(16),
            shutdown.clone(),
        );

        engine.goto_ra_dec_zoom(&GotoRaDecZoom::from_degrees(0.0, 0.0, 2.0, true));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().engine.zoom_deg, 12.0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
