//! In-process engine used by the CLI replay command and by tests.
//!
//! `SimulatedEngine` keeps the engine's observable state in memory and holds
//! asynchronous work (camera moves, tour loads, collection loads) pending
//! until the driver completes it, either one event at a time
//! (`fire_arrived`, `complete_collection`, ...) or all at once with
//! [`SimulatedEngine::step`], which stands in for one rendered frame.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    CollectionCallback, Engine, EngineError, EngineSetting, EngineState, EventHandler, Folder,
    GotoRaDecZoom, GotoTarget, TourInfo, TourReadyHandler,
};

/// Number of commands [`SimulatedEngine::commands`] remembers.
pub const COMMAND_LOG_CAPACITY: usize = 256;

/// Collections, tours and imagesets the simulated engine knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedCatalog {
    /// Collections by URL.
    #[serde(default)]
    pub collections: HashMap<String, Folder>,
    /// Tours by URL.
    #[serde(default)]
    pub tours: HashMap<String, TourInfo>,
    /// Imagesets available before any collection is loaded.
    #[serde(default)]
    pub imagesets: Vec<String>,
}

impl SimulatedCatalog {
    /// Add a collection.
    pub fn with_collection(mut self, folder: Folder) -> Self {
        self.collections.insert(folder.url.clone(), folder);
        self
    }

    /// Add a tour.
    pub fn with_tour(mut self, tour: TourInfo) -> Self {
        self.tours.insert(tour.url.clone(), tour);
        self
    }

    /// Add a built-in imageset.
    pub fn with_imageset(mut self, name: impl Into<String>) -> Self {
        self.imagesets.push(name.into());
        self
    }
}

/// A command received by the simulated engine, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Goto(GotoRaDecZoom),
    LoadTour { url: String, play: bool },
    ToggleTour,
    StopTour,
    SeekTour(f64),
    LoadCollection { url: String, load_child_folders: bool },
    ApplySetting(EngineSetting),
    SetBackground(String),
    SetForeground(String),
    SetForegroundOpacity(f64),
    SetTime(DateTime<Utc>),
    SetClockRate(f64),
    SetClockSync(bool),
}

type SharedHandler = Arc<dyn Fn() + Send + Sync>;
type SharedTourHandler = Arc<dyn Fn(TourInfo) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    ready: Vec<SharedHandler>,
    arrived: Vec<SharedHandler>,
    tour_ready: Vec<SharedTourHandler>,
}

struct PendingTour {
    url: String,
    play: bool,
}

#[derive(Default)]
struct SimState {
    view: EngineState,
    catalog: SimulatedCatalog,
    known_imagesets: HashSet<String>,
    settings: HashMap<&'static str, EngineSetting>,
    pending_move: Option<GotoRaDecZoom>,
    pending_tour: Option<PendingTour>,
    pending_collections: Vec<(String, CollectionCallback)>,
    loaded_tour: Option<TourInfo>,
    collection_loads: HashMap<String, usize>,
    commands: VecDeque<EngineCommand>,
    immediate_collections: bool,
    ready: bool,
}

impl SimState {
    fn record(&mut self, command: EngineCommand) {
        if self.commands.len() == COMMAND_LOG_CAPACITY {
            self.commands.pop_front();
        }
        self.commands.push_back(command);
    }

    fn apply_move(&mut self, target: &GotoRaDecZoom) {
        self.view.ra_rad = target.ra_rad;
        self.view.dec_rad = target.dec_rad;
        self.view.zoom_deg = target.zoom_deg;
        if let Some(roll) = target.roll_rad {
            self.view.roll_rad = roll;
        }
    }

    fn start_move(&mut self, target: GotoRaDecZoom) {
        self.record(EngineCommand::Goto(target));
        if target.instant {
            self.apply_move(&target);
            self.pending_move = None;
        } else {
            self.pending_move = Some(target);
        }
    }

    fn collection_result(&mut self, url: &str) -> Result<Folder, EngineError> {
        match self.catalog.collections.get(url) {
            Some(folder) => {
                let folder = folder.clone();
                self.known_imagesets
                    .extend(folder.imagesets.iter().map(|i| i.name.clone()));
                Ok(folder)
            }
            None => Err(EngineError::CollectionLoad {
                url: url.to_string(),
                reason: "not found".to_string(),
            }),
        }
    }
}

/// Engine stand-in with scriptable event timing.
///
/// Hooks are always invoked after the internal lock is released, so a hook
/// may call back into the engine.
pub struct SimulatedEngine {
    state: Mutex<SimState>,
    hooks: Mutex<Hooks>,
}

impl SimulatedEngine {
    /// Create an engine with an empty catalogue.
    pub fn new() -> Self {
        Self::with_catalog(SimulatedCatalog::default())
    }

    /// Create an engine serving the given catalogue.
    pub fn with_catalog(catalog: SimulatedCatalog) -> Self {
        let known_imagesets = catalog.imagesets.iter().cloned().collect();
        Self {
            state: Mutex::new(SimState {
                catalog,
                known_imagesets,
                ..SimState::default()
            }),
            hooks: Mutex::new(Hooks::default()),
        }
    }

    /// Complete collection loads synchronously inside `load_image_collection`.
    pub fn set_immediate_collections(&self, immediate: bool) {
        self.state.lock().immediate_collections = immediate;
    }

    /// Fire the one-time ready event. Later calls do nothing.
    pub fn fire_ready(&self) {
        {
            let mut state = self.state.lock();
            if state.ready {
                return;
            }
            state.ready = true;
        }
        debug!("Simulated engine ready");
        let handlers = self.hooks.lock().ready.clone();
        for handler in handlers {
            handler();
        }
    }

    /// Finish the pending camera move (if any) and fire the arrived hook.
    pub fn fire_arrived(&self) {
        {
            let mut state = self.state.lock();
            if let Some(target) = state.pending_move.take() {
                state.apply_move(&target);
            }
        }
        let handlers = self.hooks.lock().arrived.clone();
        for handler in handlers {
            handler();
        }
    }

    /// Finish the pending tour load and fire the tour-ready hook.
    ///
    /// Returns false when no tour load was pending. Tours missing from the
    /// catalogue load as empty tours.
    pub fn fire_tour_ready(&self) -> bool {
        let tour = {
            let mut state = self.state.lock();
            let Some(pending) = state.pending_tour.take() else {
                return false;
            };
            let tour = state
                .catalog
                .tours
                .get(&pending.url)
                .cloned()
                .unwrap_or_else(|| TourInfo::from_stop_durations(pending.url.clone(), &[]));
            state.loaded_tour = Some(tour.clone());
            state.view.tour_timecode = 0.0;
            state.view.is_tour_playing = pending.play;
            tour
        };

        let handlers = self.hooks.lock().tour_ready.clone();
        for handler in handlers {
            handler(tour.clone());
        }
        true
    }

    /// Complete every pending load of `url` from the catalogue.
    ///
    /// Returns the number of callbacks invoked.
    pub fn complete_collection(&self, url: &str) -> usize {
        let (callbacks, result) = {
            let mut state = self.state.lock();
            let callbacks = take_pending(&mut state.pending_collections, url);
            if callbacks.is_empty() {
                return 0;
            }
            let result = state.collection_result(url);
            (callbacks, result)
        };

        let count = callbacks.len();
        for callback in callbacks {
            callback(result.clone());
        }
        count
    }

    /// Fail every pending load of `url`.
    pub fn fail_collection(&self, url: &str, reason: &str) -> usize {
        let callbacks = take_pending(&mut self.state.lock().pending_collections, url);
        let count = callbacks.len();
        for callback in callbacks {
            callback(Err(EngineError::CollectionLoad {
                url: url.to_string(),
                reason: reason.to_string(),
            }));
        }
        count
    }

    /// Complete all pending work, as one rendered frame would.
    pub fn step(&self) {
        let (has_move, has_tour, urls) = {
            let state = self.state.lock();
            let mut seen = HashSet::new();
            let urls: Vec<String> = state
                .pending_collections
                .iter()
                .filter(|(url, _)| seen.insert(url.as_str()))
                .map(|(url, _)| url.clone())
                .collect();
            (
                state.pending_move.is_some(),
                state.pending_tour.is_some(),
                urls,
            )
        };

        trace!(has_move, has_tour, collections = urls.len(), "Simulated frame");

        for url in urls {
            self.complete_collection(&url);
        }
        if has_tour {
            self.fire_tour_ready();
        }
        if has_move {
            self.fire_arrived();
        }
    }

    /// Whether a camera move is waiting for `fire_arrived`.
    pub fn has_pending_move(&self) -> bool {
        self.state.lock().pending_move.is_some()
    }

    /// Number of collection loads waiting for completion.
    pub fn pending_collections(&self) -> usize {
        self.state.lock().pending_collections.len()
    }

    /// How many times `url` was passed to `load_image_collection`.
    pub fn collection_loads(&self, url: &str) -> usize {
        self.state
            .lock()
            .collection_loads
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// The most recent commands received, oldest first.
    ///
    /// Only the last [`COMMAND_LOG_CAPACITY`] commands are kept.
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.state.lock().commands.iter().cloned().collect()
    }

    /// Currently applied value of a setting.
    pub fn setting(&self, name: &str) -> Option<EngineSetting> {
        self.state.lock().settings.get(name).cloned()
    }

    /// The most recently loaded tour.
    pub fn loaded_tour(&self) -> Option<TourInfo> {
        self.state.lock().loaded_tour.clone()
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedEngine")
            .field("ready", &state.ready)
            .field("view", &state.view)
            .field("pending_move", &state.pending_move)
            .field("pending_collections", &state.pending_collections.len())
            .finish_non_exhaustive()
    }
}

fn take_pending(
    pending: &mut Vec<(String, CollectionCallback)>,
    url: &str,
) -> Vec<CollectionCallback> {
    let mut taken = Vec::new();
    let mut kept = Vec::with_capacity(pending.len());
    for (pending_url, callback) in pending.drain(..) {
        if pending_url == url {
            taken.push(callback);
        } else {
            kept.push((pending_url, callback));
        }
    }
    *pending = kept;
    taken
}

impl Engine for SimulatedEngine {
    fn add_ready(&self, handler: EventHandler) {
        let handler: SharedHandler = Arc::from(handler);
        let already_ready = self.state.lock().ready;
        self.hooks.lock().ready.push(Arc::clone(&handler));
        if already_ready {
            handler();
        }
    }

    fn add_arrived(&self, handler: EventHandler) {
        self.hooks.lock().arrived.push(Arc::from(handler));
    }

    fn add_tour_ready(&self, handler: TourReadyHandler) {
        self.hooks.lock().tour_ready.push(Arc::from(handler));
    }

    fn goto_ra_dec_zoom(&self, target: &GotoRaDecZoom) {
        self.state.lock().start_move(*target);
    }

    fn goto_target(&self, target: &GotoTarget) {
        let mut state = self.state.lock();
        let resolved = target.resolve(state.view.zoom_deg);
        state.start_move(resolved);
    }

    fn load_tour(&self, url: &str, play: bool) {
        let mut state = self.state.lock();
        state.record(EngineCommand::LoadTour {
            url: url.to_string(),
            play,
        });
        state.view.is_tour_playing = false;
        state.pending_tour = Some(PendingTour {
            url: url.to_string(),
            play,
        });
    }

    fn toggle_tour_play_pause(&self) {
        let mut state = self.state.lock();
        state.record(EngineCommand::ToggleTour);
        if state.loaded_tour.is_some() {
            state.view.is_tour_playing = !state.view.is_tour_playing;
        }
    }

    fn stop_tour(&self) {
        let mut state = self.state.lock();
        state.record(EngineCommand::StopTour);
        state.view.is_tour_playing = false;
        state.view.tour_timecode = 0.0;
    }

    fn seek_tour(&self, offset_secs: f64) {
        let mut state = self.state.lock();
        state.record(EngineCommand::SeekTour(offset_secs));
        let run_time = state
            .loaded_tour
            .as_ref()
            .map(|t| t.run_time_secs)
            .unwrap_or(0.0);
        state.view.tour_timecode = offset_secs.clamp(0.0, run_time);
    }

    fn load_image_collection(
        &self,
        url: &str,
        load_child_folders: bool,
        on_complete: CollectionCallback,
    ) {
        let result = {
            let mut state = self.state.lock();
            state.record(EngineCommand::LoadCollection {
                url: url.to_string(),
                load_child_folders,
            });
            *state.collection_loads.entry(url.to_string()).or_insert(0) += 1;

            if !state.immediate_collections {
                state
                    .pending_collections
                    .push((url.to_string(), on_complete));
                return;
            }
            state.collection_result(url)
        };

        on_complete(result);
    }

    fn apply_setting(&self, setting: &EngineSetting) -> Result<(), EngineError> {
        setting.validate()?;
        let mut state = self.state.lock();
        state.record(EngineCommand::ApplySetting(setting.clone()));
        state.settings.insert(setting.name(), setting.clone());
        Ok(())
    }

    fn set_background_imageset(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.known_imagesets.contains(name) {
            return Err(EngineError::UnknownImageset(name.to_string()));
        }
        state.record(EngineCommand::SetBackground(name.to_string()));
        state.view.background_imageset = Some(name.to_string());
        Ok(())
    }

    fn set_foreground_imageset(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.known_imagesets.contains(name) {
            return Err(EngineError::UnknownImageset(name.to_string()));
        }
        state.record(EngineCommand::SetForeground(name.to_string()));
        state.view.foreground_imageset = Some(name.to_string());
        Ok(())
    }

    fn set_foreground_opacity(&self, opacity: f64) {
        let mut state = self.state.lock();
        state.record(EngineCommand::SetForegroundOpacity(opacity));
        state.view.foreground_opacity = opacity;
    }

    fn set_time(&self, time: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.record(EngineCommand::SetTime(time));
        state.view.current_time = time;
    }

    fn set_clock_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.record(EngineCommand::SetClockRate(rate));
        state.view.clock_rate = rate;
    }

    fn set_clock_sync(&self, synced: bool) {
        let mut state = self.state.lock();
        state.record(EngineCommand::SetClockSync(synced));
        state.view.clock_synced = synced;
    }

    fn snapshot(&self) -> EngineState {
        self.state.lock().view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn surveys() -> Folder {
        Folder {
            name: "Surveys".to_string(),
            url: "surveys.wtml".to_string(),
            imagesets: vec![crate::engine::ImageSetInfo {
                name: "DSS".to_string(),
                url: "dss/{1}".to_string(),
                thumbnail_url: None,
            }],
            children: vec![],
        }
    }

    #[test]
    fn test_animated_move_waits_for_arrival() {
        let engine = SimulatedEngine::new();
        let arrivals = Arc::new(AtomicUsize::new(0));
        engine.add_arrived(counting_handler(&arrivals));

        engine.goto_ra_dec_zoom(&GotoRaDecZoom::from_degrees(10.0, 20.0, 1.0, false));
        assert!(engine.has_pending_move());
        assert_eq!(engine.snapshot().ra_rad, 0.0);

        engine.fire_arrived();
        assert!(!engine.has_pending_move());
        assert!((engine.snapshot().ra_rad - 10f64.to_radians()).abs() < 1e-12);
        assert_eq!(arrivals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instant_move_applies_immediately() {
        let engine = SimulatedEngine::new();
        engine.goto_ra_dec_zoom(&GotoRaDecZoom::from_degrees(10.0, 20.0, 1.0, true));
        assert!(!engine.has_pending_move());
        assert_eq!(engine.snapshot().zoom_deg, 6.0);
    }

    #[test]
    fn test_ready_fires_once_and_for_late_handlers() {
        let engine = SimulatedEngine::new();
        let early = Arc::new(AtomicUsize::new(0));
        engine.add_ready(counting_handler(&early));

        engine.fire_ready();
        engine.fire_ready();
        assert_eq!(early.load(Ordering::SeqCst), 1);

        let late = Arc::new(AtomicUsize::new(0));
        engine.add_ready(counting_handler(&late));
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collection_load_is_pending_until_completed() {
        let engine = SimulatedEngine::with_catalog(SimulatedCatalog::default().with_collection(surveys()));
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);

        engine.load_image_collection(
            "surveys.wtml",
            false,
            Box::new(move |r| *slot.lock() = Some(r)),
        );
        assert_eq!(engine.pending_collections(), 1);
        assert!(result.lock().is_none());

        assert_eq!(engine.complete_collection("surveys.wtml"), 1);
        let folder = result.lock().take().unwrap().unwrap();
        assert_eq!(folder.name, "Surveys");
        assert_eq!(engine.collection_loads("surveys.wtml"), 1);

        // Imagesets from the loaded collection become selectable.
        assert!(engine.set_background_imageset("DSS").is_ok());
    }

    #[test]
    fn test_unknown_collection_fails() {
        let engine = SimulatedEngine::new();
        engine.set_immediate_collections(true);
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);

        engine.load_image_collection("missing.wtml", false, Box::new(move |r| *slot.lock() = Some(r)));

        let err = result.lock().take().unwrap().unwrap_err();
        assert!(matches!(err, EngineError::CollectionLoad { .. }));
    }

    #[test]
    fn test_tour_ready_reports_catalog_timing() {
        let tour = TourInfo::from_stop_durations("tour.wtt", &[3.0, 4.0]);
        let engine = SimulatedEngine::with_catalog(SimulatedCatalog::default().with_tour(tour));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.add_tour_ready(Box::new(move |t| sink.lock().push(t)));

        assert!(!engine.fire_tour_ready());
        engine.load_tour("tour.wtt", true);
        assert!(engine.fire_tour_ready());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].run_time_secs, 7.0);
        assert!(engine.snapshot().is_tour_playing);
    }

    #[test]
    fn test_seek_clamps_to_tour_length() {
        let tour = TourInfo::from_stop_durations("tour.wtt", &[5.0]);
        let engine = SimulatedEngine::with_catalog(SimulatedCatalog::default().with_tour(tour));
        engine.load_tour("tour.wtt", false);
        engine.fire_tour_ready();

        engine.seek_tour(9.0);
        assert_eq!(engine.snapshot().tour_timecode, 5.0);
        engine.stop_tour();
        assert_eq!(engine.snapshot().tour_timecode, 0.0);
    }

    #[test]
    fn test_step_completes_everything() {
        let engine = SimulatedEngine::with_catalog(SimulatedCatalog::default().with_collection(surveys()));
        let arrivals = Arc::new(AtomicUsize::new(0));
        engine.add_arrived(counting_handler(&arrivals));

        engine.goto_ra_dec_zoom(&GotoRaDecZoom::from_degrees(1.0, 2.0, 3.0, false));
        engine.load_tour("tour.wtt", false);
        engine.load_image_collection("surveys.wtml", true, Box::new(|_| {}));

        engine.step();
        assert!(!engine.has_pending_move());
        assert_eq!(engine.pending_collections(), 0);
        assert_eq!(engine.loaded_tour().unwrap().url, "tour.wtt");
        assert_eq!(arrivals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_step_completes_interleaved_duplicate_loads() {
        let engine = SimulatedEngine::with_catalog(
            SimulatedCatalog::default()
                .with_collection(surveys())
                .with_collection(Folder {
                    name: "Other".to_string(),
                    url: "other.wtml".to_string(),
                    ..Folder::default()
                }),
        );
        let completed = Arc::new(AtomicUsize::new(0));
        for url in ["surveys.wtml", "other.wtml", "surveys.wtml"] {
            let completed = Arc::clone(&completed);
            engine.load_image_collection(
                url,
                false,
                Box::new(move |r| {
                    assert!(r.is_ok());
                    completed.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        engine.step();
        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(engine.pending_collections(), 0);
        assert_eq!(engine.collection_loads("surveys.wtml"), 2);
    }

    #[test]
    fn test_command_log_keeps_most_recent() {
        let engine = SimulatedEngine::new();
        for i in 0..COMMAND_LOG_CAPACITY + 10 {
            engine.set_clock_rate(i as f64);
        }

        let commands = engine.commands();
        assert_eq!(commands.len(), COMMAND_LOG_CAPACITY);
        assert_eq!(commands[0], EngineCommand::SetClockRate(10.0));
        assert_eq!(
            commands.last(),
            Some(&EngineCommand::SetClockRate((COMMAND_LOG_CAPACITY + 9) as f64))
        );
    }

    #[test]
    fn test_setting_validation_and_record() {
        let engine = SimulatedEngine::new();
        engine.apply_setting(&EngineSetting::ShowGrid(true)).unwrap();
        assert_eq!(engine.setting("showGrid"), Some(EngineSetting::ShowGrid(true)));
        assert!(engine
            .apply_setting(&EngineSetting::SolarSystemScale(1000.0))
            .is_err());
        assert_eq!(engine.commands().len(), 1);
    }

    #[test]
    fn test_unknown_imageset_rejected() {
        let engine = SimulatedEngine::with_catalog(SimulatedCatalog::default().with_imageset("DSS"));
        assert!(engine.set_foreground_imageset("DSS").is_ok());
        assert_eq!(
            engine.set_foreground_imageset("Nope"),
            Err(EngineError::UnknownImageset("Nope".to_string()))
        );
    }
}
