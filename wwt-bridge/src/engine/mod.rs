//! Boundary to the external WorldWide Telescope rendering engine.
//!
//! The engine itself (tile rendering, HiPS streaming, tour playback) is not
//! part of this crate. It is reached through the object-safe [`Engine`]
//! trait, which mirrors the engine's imperative, callback-based API:
//!
//! - **Hooks** (`add_ready`, `add_arrived`, `add_tour_ready`) are registered
//!   once and fire whenever the engine reaches the corresponding terminal
//!   state.
//! - **Commands** start work and return immediately; completion is reported
//!   through a hook or a one-shot callback.
//! - **Snapshot** exposes the current view and clock for the state mirror.
//!
//! [`SimulatedEngine`] is an in-process implementation used by the CLI
//! replay command and the test suites.

mod error;
mod simulated;
mod types;

pub use error::EngineError;
pub use simulated::{EngineCommand, SimulatedCatalog, SimulatedEngine, COMMAND_LOG_CAPACITY};
pub use types::{
    EngineSetting, EngineState, Folder, GotoRaDecZoom, GotoTarget, ImageSetInfo, Place, TourInfo,
    DEFAULT_ZOOM_DEG, MAX_SOLAR_SYSTEM_SCALE, ZOOM_PER_FOV,
};

/// Handler for engine events without a payload (ready, arrived).
pub type EventHandler = Box<dyn Fn() + Send + Sync>;

/// Handler for the tour-ready event.
pub type TourReadyHandler = Box<dyn Fn(TourInfo) + Send + Sync>;

/// One-shot completion callback for an image collection load.
pub type CollectionCallback = Box<dyn FnOnce(Result<Folder, EngineError>) + Send>;

/// Imperative interface of the rendering engine.
///
/// Implementations must be `Send + Sync`; hooks may be invoked from any
/// thread, and must not be invoked while the implementation holds a lock
/// that its own commands take.
pub trait Engine: Send + Sync {
    /// Register a handler for the one-time "engine ready" event.
    fn add_ready(&self, handler: EventHandler);

    /// Register a handler fired whenever a camera move finishes.
    fn add_arrived(&self, handler: EventHandler);

    /// Register a handler fired whenever a tour finishes loading.
    fn add_tour_ready(&self, handler: TourReadyHandler);

    /// Move the camera to the given coordinates.
    ///
    /// Instant moves do not fire the arrived hook.
    fn goto_ra_dec_zoom(&self, target: &GotoRaDecZoom);

    /// Move the camera to a named place.
    fn goto_target(&self, target: &GotoTarget);

    /// Load a tour, optionally starting playback once loaded.
    fn load_tour(&self, url: &str, play: bool);

    /// Toggle play/pause of the loaded tour.
    fn toggle_tour_play_pause(&self);

    /// Stop tour playback.
    fn stop_tour(&self);

    /// Seek the loaded tour to an offset in seconds.
    fn seek_tour(&self, offset_secs: f64);

    /// Load a WTML image collection and invoke `on_complete` when done.
    ///
    /// `on_complete` may be invoked synchronously.
    fn load_image_collection(
        &self,
        url: &str,
        load_child_folders: bool,
        on_complete: CollectionCallback,
    );

    /// Apply a rendering setting.
    fn apply_setting(&self, setting: &EngineSetting) -> Result<(), EngineError>;

    /// Set the background imageset by name.
    fn set_background_imageset(&self, name: &str) -> Result<(), EngineError>;

    /// Set the foreground imageset by name.
    fn set_foreground_imageset(&self, name: &str) -> Result<(), EngineError>;

    /// Set the foreground opacity (0.0 to 1.0).
    fn set_foreground_opacity(&self, opacity: f64);

    /// Set the engine clock.
    fn set_time(&self, time: chrono::DateTime<chrono::Utc>);

    /// Set the engine clock rate relative to real time.
    fn set_clock_rate(&self, rate: f64);

    /// Lock or unlock the engine clock from the system clock.
    fn set_clock_sync(&self, synced: bool);

    /// Current view, clock and tour state.
    fn snapshot(&self) -> EngineState;
}
