//! Data types exchanged with the rendering engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EngineError;

/// Ratio between the engine's zoom value and the vertical field of view.
pub const ZOOM_PER_FOV: f64 = 6.0;

/// Zoom level the engine starts at (whole sky).
pub const DEFAULT_ZOOM_DEG: f64 = 360.0;

/// Snapshot of engine state mirrored into the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    /// Right ascension of the view centre, radians.
    pub ra_rad: f64,
    /// Declination of the view centre, radians.
    pub dec_rad: f64,
    /// Engine zoom, degrees (six times the vertical field of view).
    pub zoom_deg: f64,
    /// Camera roll, radians.
    pub roll_rad: f64,
    /// Engine clock.
    pub current_time: DateTime<Utc>,
    /// Engine clock rate relative to real time.
    pub clock_rate: f64,
    /// Whether the engine clock follows the system clock.
    pub clock_synced: bool,
    /// Whether a tour is playing.
    pub is_tour_playing: bool,
    /// Playback position within the loaded tour, seconds.
    pub tour_timecode: f64,
    /// Current background imageset name.
    pub background_imageset: Option<String>,
    /// Current foreground imageset name.
    pub foreground_imageset: Option<String>,
    /// Foreground opacity, 0.0 to 1.0.
    pub foreground_opacity: f64,
}

impl EngineState {
    /// Vertical field of view in degrees.
    pub fn fov_deg(&self) -> f64 {
        self.zoom_deg / ZOOM_PER_FOV
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            ra_rad: 0.0,
            dec_rad: 0.0,
            zoom_deg: DEFAULT_ZOOM_DEG,
            roll_rad: 0.0,
            current_time: DateTime::<Utc>::UNIX_EPOCH,
            clock_rate: 1.0,
            clock_synced: true,
            is_tour_playing: false,
            tour_timecode: 0.0,
            background_imageset: None,
            foreground_imageset: None,
            foreground_opacity: 0.5,
        }
    }
}

/// Camera move to explicit sky coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoRaDecZoom {
    pub ra_rad: f64,
    pub dec_rad: f64,
    pub zoom_deg: f64,
    /// Jump without animation; no arrival event follows.
    pub instant: bool,
    pub roll_rad: Option<f64>,
}

impl GotoRaDecZoom {
    /// Build a move from degrees and a field of view, as notebook clients
    /// express it.
    pub fn from_degrees(ra_deg: f64, dec_deg: f64, fov_deg: f64, instant: bool) -> Self {
        Self {
            ra_rad: ra_deg.to_radians(),
            dec_rad: dec_deg.to_radians(),
            zoom_deg: fov_deg * ZOOM_PER_FOV,
            instant,
            roll_rad: None,
        }
    }

    /// Set the camera roll in degrees.
    pub fn with_roll_deg(mut self, roll_deg: f64) -> Self {
        self.roll_rad = Some(roll_deg.to_radians());
        self
    }
}

/// A named sky position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub ra_rad: f64,
    pub dec_rad: f64,
    /// Preferred zoom; the current zoom is kept when absent.
    pub zoom_deg: Option<f64>,
}

/// Camera move to a [`Place`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoTarget {
    pub place: Place,
    /// Keep the current zoom even if the place has one.
    #[serde(default)]
    pub no_zoom: bool,
    #[serde(default)]
    pub instant: bool,
    /// Keep following the target after arrival.
    #[serde(default)]
    pub track_object: bool,
}

impl GotoTarget {
    /// Resolve the move to explicit coordinates given the current zoom.
    pub fn resolve(&self, current_zoom_deg: f64) -> GotoRaDecZoom {
        let zoom_deg = match (self.no_zoom, self.place.zoom_deg) {
            (false, Some(zoom)) => zoom,
            _ => current_zoom_deg,
        };
        GotoRaDecZoom {
            ra_rad: self.place.ra_rad,
            dec_rad: self.place.dec_rad,
            zoom_deg,
            instant: self.instant,
            roll_rad: None,
        }
    }
}

/// Timing information for a loaded tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourInfo {
    pub url: String,
    /// Total run time, seconds.
    pub run_time_secs: f64,
    /// Start offset of each stop, seconds.
    pub stop_start_times: Vec<f64>,
}

impl TourInfo {
    /// Build tour timing from per-stop durations.
    pub fn from_stop_durations(url: impl Into<String>, durations_secs: &[f64]) -> Self {
        let mut stop_start_times = Vec::with_capacity(durations_secs.len());
        let mut elapsed = 0.0;
        for duration in durations_secs {
            stop_start_times.push(elapsed);
            elapsed += duration.max(0.0);
        }
        Self {
            url: url.into(),
            run_time_secs: elapsed,
            stop_start_times,
        }
    }

    /// Number of stops in the tour.
    pub fn stop_count(&self) -> usize {
        self.stop_start_times.len()
    }

    /// Index of the stop playing at `offset_secs`, if any.
    pub fn stop_at(&self, offset_secs: f64) -> Option<usize> {
        if offset_secs < 0.0 || offset_secs > self.run_time_secs {
            return None;
        }
        self.stop_start_times
            .iter()
            .rposition(|start| *start <= offset_secs)
    }
}

/// One imageset listed in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetInfo {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A loaded WTML collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub imagesets: Vec<ImageSetInfo>,
    /// URLs of child collections referenced by this one.
    #[serde(default)]
    pub children: Vec<String>,
}

impl Folder {
    /// Look up an imageset by name.
    pub fn find_imageset(&self, name: &str) -> Option<&ImageSetInfo> {
        self.imagesets.iter().find(|i| i.name == name)
    }
}

/// Largest accepted solar system scale factor.
pub const MAX_SOLAR_SYSTEM_SCALE: f64 = 100.0;

/// Rendering settings understood by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "camelCase")]
pub enum EngineSetting {
    ShowGrid(bool),
    ShowConstellationFigures(bool),
    // The engine's own spelling.
    #[serde(rename = "showConstellationBoundries")]
    ShowConstellationBoundaries(bool),
    ShowEcliptic(bool),
    ShowCrosshairs(bool),
    ShowSolarSystem(bool),
    LocalHorizonMode(bool),
    SolarSystemScale(f64),
}

impl EngineSetting {
    /// Setting name as the engine spells it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ShowGrid(_) => "showGrid",
            Self::ShowConstellationFigures(_) => "showConstellationFigures",
            Self::ShowConstellationBoundaries(_) => "showConstellationBoundries",
            Self::ShowEcliptic(_) => "showEcliptic",
            Self::ShowCrosshairs(_) => "showCrosshairs",
            Self::ShowSolarSystem(_) => "showSolarSystem",
            Self::LocalHorizonMode(_) => "localHorizonMode",
            Self::SolarSystemScale(_) => "solarSystemScale",
        }
    }

    /// Reject values the engine cannot apply.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::SolarSystemScale(scale)
                if !scale.is_finite() || !(1.0..=MAX_SOLAR_SYSTEM_SCALE).contains(scale) =>
            {
                Err(EngineError::InvalidSetting {
                    setting: self.name(),
                    reason: format!("must be between 1 and {}", MAX_SOLAR_SYSTEM_SCALE),
                })
            }
            _ => Ok(()),
        }
    }
}
