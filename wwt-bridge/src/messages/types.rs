//! Wire types for the JSON message relay.

use serde::{Deserialize, Serialize};

use crate::store::ViewState;

/// A command sent by a client, tagged by `event`.
///
/// Angles are in degrees. Unknown fields, including the envelope's
/// `threadId`, are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    CenterOnCoordinates {
        ra: f64,
        dec: f64,
        fov: f64,
        #[serde(default)]
        instant: bool,
        #[serde(default)]
        roll: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    GotoTarget {
        name: String,
        ra: f64,
        dec: f64,
        /// Field of view at the target; the current zoom is kept if absent.
        #[serde(default)]
        fov: Option<f64>,
        #[serde(default)]
        no_zoom: bool,
        #[serde(default)]
        instant: bool,
        #[serde(default)]
        track_object: bool,
    },
    LoadTour {
        url: String,
        #[serde(default)]
        play: bool,
    },
    ToggleTour,
    StopTour,
    SeekTour {
        offset: f64,
    },
    #[serde(rename_all = "camelCase")]
    LoadImageCollection {
        url: String,
        #[serde(default)]
        load_child_folders: bool,
    },
    SetBackgroundByName {
        name: String,
    },
    SetForegroundByName {
        name: String,
    },
    SetForegroundOpacity {
        value: f64,
    },
    SettingSet {
        setting: String,
        value: serde_json::Value,
    },
    SetDatetime {
        /// ISO 8601 timestamp; UTC is assumed when no offset is given.
        isot: String,
    },
    SetClockRate {
        rate: f64,
    },
    SetClockSync {
        synced: bool,
    },
    WaitForReady,
}

impl ClientMessage {
    /// Event name as it appears on the wire.
    pub fn event(&self) -> &'static str {
        match self {
            Self::CenterOnCoordinates { .. } => "center_on_coordinates",
            Self::GotoTarget { .. } => "goto_target",
            Self::LoadTour { .. } => "load_tour",
            Self::ToggleTour => "toggle_tour",
            Self::StopTour => "stop_tour",
            Self::SeekTour { .. } => "seek_tour",
            Self::LoadImageCollection { .. } => "load_image_collection",
            Self::SetBackgroundByName { .. } => "set_background_by_name",
            Self::SetForegroundByName { .. } => "set_foreground_by_name",
            Self::SetForegroundOpacity { .. } => "set_foreground_opacity",
            Self::SettingSet { .. } => "setting_set",
            Self::SetDatetime { .. } => "set_datetime",
            Self::SetClockRate { .. } => "set_clock_rate",
            Self::SetClockSync { .. } => "set_clock_sync",
            Self::WaitForReady => "wait_for_ready",
        }
    }
}

/// Outcome of one client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    /// A newer request of the same kind took over.
    Superseded,
    Error,
}

/// Reply to one client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Echo of the request's `threadId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Reply {
    pub fn ok(thread_id: Option<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            thread_id,
            status: ReplyStatus::Ok,
            message: None,
            payload,
        }
    }

    pub fn superseded(thread_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id,
            status: ReplyStatus::Superseded,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn error(thread_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id,
            status: ReplyStatus::Error,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

/// Pushed to clients whenever the mirrored view state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewStateMessage {
    pub state: ViewState,
}

/// Anything the relay sends to the client, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "wwt_reply")]
    Reply(Reply),
    #[serde(rename = "wwt_view_state")]
    ViewState(ViewStateMessage),
}
