//! Async facade over the engine's callback API.
//!
//! [`WwtFacade`] wires the engine's three terminal-event hooks into one
//! [`NotificationChannel`] each and exposes every engine command either as
//! a method returning a future that completes when the engine reports the
//! matching event, or as a plain synchronous passthrough. Commands take
//! effect when the method is called, not when the future is first polled,
//! so call order alone decides which request supersedes which.
//!
//! | Operation               | Completes on         | Superseded by            |
//! |-------------------------|----------------------|--------------------------|
//! | `wait_for_ready`        | ready (latched)      | never                    |
//! | `goto_ra_dec_zoom`      | arrived              | any newer camera move    |
//! | `goto_target`           | arrived              | any newer camera move    |
//! | `load_tour`             | tour ready           | any newer tour load      |
//! | `load_image_collection` | collection callback  | never (deduplicated)     |

mod params;

pub use params::{LoadImageCollection, LoadTour};

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::{Engine, EngineSetting, Folder, GotoRaDecZoom, GotoTarget, TourInfo};
use crate::error::Result;
use crate::load_cache::LoadCache;
use crate::notify::{NotificationChannel, Waiter};
use crate::store::{StateStore, ViewState};

/// Async bindings for one engine instance.
///
/// All methods take `&self`; share the facade behind an `Arc` to drive it
/// from several tasks. A newer camera move or tour load makes the older
/// call return an error for which
/// [`BridgeError::is_superseded`](crate::BridgeError::is_superseded) is true.
pub struct WwtFacade {
    engine: Arc<dyn Engine>,
    readiness: Arc<NotificationChannel<()>>,
    arrival: Arc<NotificationChannel<()>>,
    tour_ready: Arc<NotificationChannel<Arc<TourInfo>>>,
    collections: LoadCache<Folder>,
    store: StateStore,
}

impl WwtFacade {
    /// Attach to `engine`, registering one handler per engine hook.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let readiness = Arc::new(NotificationChannel::new("ready"));
        let arrival = Arc::new(NotificationChannel::new("arrival"));
        let tour_ready = Arc::new(NotificationChannel::new("tour_ready"));
        let store = StateStore::new();

        {
            let readiness = Arc::clone(&readiness);
            let store = store.clone();
            engine.add_ready(Box::new(move || {
                store.mark_ready();
                readiness.latch(());
            }));
        }

        {
            let arrival = Arc::clone(&arrival);
            engine.add_arrived(Box::new(move || {
                arrival.fire(());
            }));
        }

        {
            let tour_ready = Arc::clone(&tour_ready);
            let store = store.clone();
            engine.add_tour_ready(Box::new(move |tour: TourInfo| {
                store.set_tour(tour.clone());
                tour_ready.fire(Arc::new(tour));
            }));
        }

        store.refresh(engine.as_ref());
        info!("Facade attached to engine");

        Self {
            engine,
            readiness,
            arrival,
            tour_ready,
            collections: LoadCache::new("collections"),
            store,
        }
    }

    /// Wait until the engine has fired its one-time ready event.
    ///
    /// Returns immediately once the engine is ready.
    pub fn wait_for_ready(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let ready = self.readiness.join(None);
        async move {
            ready.await?;
            Ok(())
        }
    }

    /// Move the camera and wait for it to arrive.
    ///
    /// The move is issued, and any pending move superseded, before this
    /// returns; the future only waits for arrival. Instant moves complete
    /// immediately but still supersede pending moves.
    pub fn goto_ra_dec_zoom(
        &self,
        target: GotoRaDecZoom,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let arrived = self.arrival.begin_request(target.instant);
        debug!(
            generation = arrived.generation().value(),
            ra_rad = target.ra_rad,
            dec_rad = target.dec_rad,
            zoom_deg = target.zoom_deg,
            instant = target.instant,
            "Camera move"
        );
        self.engine.goto_ra_dec_zoom(&target);
        self.refresh();

        self.settle(arrived)
    }

    /// Move the camera to a place and wait for it to arrive.
    pub fn goto_target(
        &self,
        target: GotoTarget,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let arrived = self.arrival.begin_request(target.instant);
        debug!(
            generation = arrived.generation().value(),
            place = %target.place.name,
            "Camera move to target"
        );
        self.engine.goto_target(&target);
        self.refresh();

        self.settle(arrived)
    }

    /// Load a tour and wait until it is ready.
    ///
    /// The load is issued before this returns.
    pub fn load_tour(
        &self,
        params: LoadTour,
    ) -> impl Future<Output = Result<Arc<TourInfo>>> + Send + 'static {
        let ready = self.tour_ready.begin_request_with(None);
        debug!(
            generation = ready.generation().value(),
            url = %params.url,
            play = params.play,
            "Loading tour"
        );
        self.engine.load_tour(&params.url, params.play);

        self.settle(ready)
    }

    /// Load an image collection, issuing at most one engine load per URL.
    pub fn load_image_collection(
        &self,
        params: LoadImageCollection,
    ) -> impl Future<Output = Result<Arc<Folder>>> + Send + 'static {
        let engine = &self.engine;
        let waiter = self.collections.request(&params.url, |completion| {
            engine.load_image_collection(
                &params.url,
                params.load_child_folders,
                Box::new(move |result| completion.complete(result)),
            );
        });

        async move { Ok(waiter.await?) }
    }

    /// Await `waiter`, then pull the engine state it left behind.
    fn settle<T>(&self, waiter: Waiter<T>) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let store = self.store.clone();
        async move {
            let value = waiter.await?;
            store.refresh(engine.as_ref());
            Ok(value)
        }
    }

    /// Toggle play/pause of the loaded tour.
    pub fn toggle_tour_play_pause(&self) {
        self.engine.toggle_tour_play_pause();
        self.refresh();
    }

    /// Stop tour playback.
    pub fn stop_tour(&self) {
        self.engine.stop_tour();
        self.refresh();
    }

    /// Seek the loaded tour to `offset_secs`.
    pub fn seek_tour(&self, offset_secs: f64) {
        self.engine.seek_tour(offset_secs);
        self.refresh();
    }

    /// Apply a rendering setting.
    pub fn apply_setting(&self, setting: &EngineSetting) -> Result<()> {
        self.engine.apply_setting(setting)?;
        self.refresh();
        Ok(())
    }

    /// Select the background imageset by name.
    pub fn set_background_imageset(&self, name: &str) -> Result<()> {
        self.engine.set_background_imageset(name)?;
        self.refresh();
        Ok(())
    }

    /// Select the foreground imageset by name.
    pub fn set_foreground_imageset(&self, name: &str) -> Result<()> {
        self.engine.set_foreground_imageset(name)?;
        self.refresh();
        Ok(())
    }

    /// Set the foreground opacity, clamped to `0.0..=1.0`.
    pub fn set_foreground_opacity(&self, opacity: f64) {
        let opacity = if opacity.is_nan() {
            0.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
        self.engine.set_foreground_opacity(opacity);
        self.refresh();
    }

    pub fn set_time(&self, time: DateTime<Utc>) {
        self.engine.set_time(time);
        self.refresh();
    }

    pub fn set_clock_rate(&self, rate: f64) {
        self.engine.set_clock_rate(rate);
        self.refresh();
    }

    pub fn set_clock_sync(&self, synced: bool) {
        self.engine.set_clock_sync(synced);
        self.refresh();
    }

    /// Returns true once the engine has fired its ready event.
    pub fn is_ready(&self) -> bool {
        self.readiness.is_latched()
    }

    /// Latest mirrored view state.
    pub fn state(&self) -> ViewState {
        self.store.current()
    }

    /// Subscribe to view state changes.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.store.subscribe()
    }

    /// Pull engine state into the store now.
    pub fn refresh(&self) -> bool {
        self.store.refresh(self.engine.as_ref())
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn readiness(&self) -> &NotificationChannel<()> {
        &self.readiness
    }

    pub fn arrival(&self) -> &NotificationChannel<()> {
        &self.arrival
    }

    pub fn tour_ready(&self) -> &NotificationChannel<Arc<TourInfo>> {
        &self.tour_ready
    }

    pub fn collections(&self) -> &LoadCache<Folder> {
        &self.collections
    }
}

impl std::fmt::Debug for WwtFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WwtFacade")
            .field("ready", &self.is_ready())
            .field("arrival", &self.arrival)
            .field("tour_ready", &self.tour_ready)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SimulatedCatalog, SimulatedEngine};
    use futures::FutureExt;

    fn facade() -> (Arc<SimulatedEngine>, WwtFacade) {
        let tour = TourInfo::from_stop_durations("tour.wtt", &[2.0, 3.0]);
        let engine = Arc::new(SimulatedEngine::with_catalog(
            SimulatedCatalog::default().with_tour(tour),
        ));
        let facade = WwtFacade::new(engine.clone());
        (engine, facade)
    }

    #[tokio::test]
    async fn test_ready_before_and_after_event() {
        let (engine, facade) = facade();
        assert!(!facade.is_ready());

        let early = facade.wait_for_ready();
        tokio::pin!(early);
        assert!(futures::poll!(early.as_mut()).is_pending());

        engine.fire_ready();
        early.await.unwrap();

        assert!(facade.is_ready());
        assert!(facade.state().ready);
        assert!(facade.wait_for_ready().now_or_never().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_newer_move_supersedes_older() {
        let (engine, facade) = facade();

        let first = facade.goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(10.0, 0.0, 1.0, false));
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        let second = facade.goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(20.0, 0.0, 1.0, false));
        tokio::pin!(second);
        assert!(futures::poll!(second.as_mut()).is_pending());

        assert!(first.await.unwrap_err().is_superseded());

        engine.fire_arrived();
        second.await.unwrap();
        assert!((facade.state().engine.ra_rad - 20f64.to_radians()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_call_order_decides_supersession_not_poll_order() {
        let (engine, facade) = facade();

        let older = facade.goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(10.0, 0.0, 1.0, false));
        let newer = facade.goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(20.0, 0.0, 1.0, false));
        assert_eq!(facade.arrival().generation().value(), 2);
        tokio::pin!(older);
        tokio::pin!(newer);

        assert!(futures::poll!(newer.as_mut()).is_pending());
        assert!(older.await.unwrap_err().is_superseded());

        engine.fire_arrived();
        newer.await.unwrap();
        assert!((facade.state().engine.ra_rad - 20f64.to_radians()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_tour_load_is_issued_before_first_poll() {
        let (engine, facade) = facade();

        let load = facade.load_tour(LoadTour::new("tour.wtt"));
        assert_eq!(facade.tour_ready().pending(), 1);
        assert!(engine.fire_tour_ready());

        let tour = load.await.unwrap();
        assert_eq!(tour.url, "tour.wtt");
    }

    #[tokio::test]
    async fn test_instant_move_completes_without_event() {
        let (_engine, facade) = facade();
        facade
            .goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(5.0, 5.0, 2.0, true))
            .await
            .unwrap();
        assert_eq!(facade.state().engine.zoom_deg, 12.0);
        assert_eq!(facade.arrival().pending(), 0);
    }

    #[tokio::test]
    async fn test_load_tour_returns_timing() {
        let (engine, facade) = facade();

        let load = facade.load_tour(LoadTour::new("tour.wtt").playing());
        tokio::pin!(load);
        assert!(futures::poll!(load.as_mut()).is_pending());

        engine.fire_tour_ready();
        let tour = load.await.unwrap();
        assert_eq!(tour.run_time_secs, 5.0);
        assert_eq!(facade.state().tour.as_ref().map(|t| t.stop_count()), Some(2));
        assert!(facade.state().engine.is_tour_playing);
    }

    #[test]
    fn test_opacity_is_clamped() {
        let (_engine, facade) = facade();
        facade.set_foreground_opacity(1.7);
        assert_eq!(facade.state().engine.foreground_opacity, 1.0);
        facade.set_foreground_opacity(-0.2);
        assert_eq!(facade.state().engine.foreground_opacity, 0.0);
    }

    #[test]
    fn test_unknown_imageset_is_an_engine_error() {
        let (_engine, facade) = facade();
        let err = facade.set_background_imageset("Nope").unwrap_err();
        assert!(matches!(err, crate::BridgeError::Engine(_)));
        assert!(!err.is_superseded());
    }
}
