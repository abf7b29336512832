//! Dispatches client messages to the facade.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClientMessage, Outbound, Reply, ViewStateMessage};
use crate::engine::{EngineSetting, GotoRaDecZoom, GotoTarget, Place};
use crate::error::{BridgeError, Result};
use crate::facade::{LoadImageCollection, LoadTour, WwtFacade};

/// Outcome of a started message, awaited off the relay loop.
type Pending = Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>;

type Started = (Option<String>, &'static str, Pending);

/// JSON front end for a [`WwtFacade`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MessageRelay {
    facade: Arc<WwtFacade>,
}

impl MessageRelay {
    pub fn new(facade: Arc<WwtFacade>) -> Self {
        Self { facade }
    }

    pub fn facade(&self) -> &Arc<WwtFacade> {
        &self.facade
    }

    /// Handle one raw JSON message and produce its reply.
    ///
    /// The message takes effect before this returns: engine commands are
    /// issued and older requests superseded in call order. The returned
    /// future completes when the requested operation does, so a camera move
    /// replies only after arrival (or supersession).
    pub fn handle(&self, raw: &str) -> impl Future<Output = Reply> + Send + 'static {
        let started = self.start(raw);
        async move {
            let (thread_id, event, pending) = match started {
                Ok(started) => started,
                Err(reply) => return reply,
            };

            match pending.await {
                Ok(payload) => Reply::ok(thread_id, payload),
                Err(e) if e.is_superseded() => {
                    debug!(thread_id = ?thread_id, event, "Request superseded");
                    Reply::superseded(thread_id, e.to_string())
                }
                Err(e) => {
                    warn!(thread_id = ?thread_id, event, error = %e, "Request failed");
                    Reply::error(thread_id, e.to_string())
                }
            }
        }
    }

    fn start(&self, raw: &str) -> std::result::Result<Started, Reply> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Discarding unparseable message");
                return Err(Reply::error(None, format!("Invalid JSON: {}", e)));
            }
        };

        let thread_id = value
            .get("threadId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let message: ClientMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                warn!(thread_id = ?thread_id, error = %e, "Discarding malformed message");
                return Err(Reply::error(thread_id, format!("Invalid message: {}", e)));
            }
        };

        let event = message.event();
        debug!(thread_id = ?thread_id, event, "Handling message");

        Ok((thread_id, event, self.dispatch(message)))
    }

    fn dispatch(&self, message: ClientMessage) -> Pending {
        let facade = &self.facade;

        match message {
            ClientMessage::CenterOnCoordinates {
                ra,
                dec,
                fov,
                instant,
                roll,
            } => {
                let mut target = GotoRaDecZoom::from_degrees(ra, dec, fov, instant);
                if let Some(roll) = roll {
                    target = target.with_roll_deg(roll);
                }
                let arrived = facade.goto_ra_dec_zoom(target);
                Box::pin(async move {
                    arrived.await?;
                    Ok(None)
                })
            }
            ClientMessage::GotoTarget {
                name,
                ra,
                dec,
                fov,
                no_zoom,
                instant,
                track_object,
            } => {
                let target = GotoTarget {
                    place: Place {
                        name,
                        ra_rad: ra.to_radians(),
                        dec_rad: dec.to_radians(),
                        zoom_deg: fov.map(|fov| fov * crate::engine::ZOOM_PER_FOV),
                    },
                    no_zoom,
                    instant,
                    track_object,
                };
                let arrived = facade.goto_target(target);
                Box::pin(async move {
                    arrived.await?;
                    Ok(None)
                })
            }
            ClientMessage::LoadTour { url, play } => {
                let ready = facade.load_tour(LoadTour { url, play });
                Box::pin(async move {
                    let tour = ready.await?;
                    Ok(Some(to_payload(tour.as_ref())?))
                })
            }
            ClientMessage::ToggleTour => {
                facade.toggle_tour_play_pause();
                done(Ok(None))
            }
            ClientMessage::StopTour => {
                facade.stop_tour();
                done(Ok(None))
            }
            ClientMessage::SeekTour { offset } => {
                facade.seek_tour(offset);
                done(Ok(None))
            }
            ClientMessage::LoadImageCollection {
                url,
                load_child_folders,
            } => {
                let loaded = facade.load_image_collection(LoadImageCollection {
                    url,
                    load_child_folders,
                });
                Box::pin(async move {
                    let folder = loaded.await?;
                    Ok(Some(to_payload(folder.as_ref())?))
                })
            }
            ClientMessage::SetBackgroundByName { name } => {
                done(facade.set_background_imageset(&name).map(|_| None))
            }
            ClientMessage::SetForegroundByName { name } => {
                done(facade.set_foreground_imageset(&name).map(|_| None))
            }
            ClientMessage::SetForegroundOpacity { value } => {
                facade.set_foreground_opacity(value);
                done(Ok(None))
            }
            ClientMessage::SettingSet { setting, value } => {
                let applied = serde_json::from_value::<EngineSetting>(serde_json::json!({
                    "setting": setting,
                    "value": value,
                }))
                .map_err(|e| BridgeError::InvalidMessage(format!("setting {}: {}", setting, e)))
                .and_then(|parsed| facade.apply_setting(&parsed))
                .map(|_| None);
                done(applied)
            }
            ClientMessage::SetDatetime { isot } => {
                done(parse_isot(&isot).map(|time| {
                    facade.set_time(time);
                    None
                }))
            }
            ClientMessage::SetClockRate { rate } => {
                facade.set_clock_rate(rate);
                done(Ok(None))
            }
            ClientMessage::SetClockSync { synced } => {
                facade.set_clock_sync(synced);
                done(Ok(None))
            }
            ClientMessage::WaitForReady => {
                let ready = facade.wait_for_ready();
                Box::pin(async move {
                    ready.await?;
                    Ok(None)
                })
            }
        }
    }

    /// Run the relay until `inbound` closes or `shutdown` is cancelled.
    ///
    /// Messages are started in arrival order on the relay loop itself; only
    /// the wait for each reply runs on its own task, so a newer camera move
    /// or tour load supersedes one that is still waiting. View state changes
    /// are forwarded as [`Outbound::ViewState`]. After `inbound` closes the
    /// relay waits for outstanding messages before returning.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<Outbound>,
        shutdown: CancellationToken,
    ) {
        let mut view = self.facade.subscribe();
        let mut tasks = JoinSet::new();
        let mut view_open = true;
        let mut received = 0u64;

        info!("Message relay started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Message relay shutting down");
                    tasks.abort_all();
                    return;
                }

                raw = inbound.recv() => {
                    let Some(raw) = raw else { break };
                    received += 1;
                    let reply = self.handle(&raw);
                    let outbound = outbound.clone();
                    tasks.spawn(async move {
                        let reply = reply.await;
                        // Client gone; nothing to deliver to.
                        let _ = outbound.send(Outbound::Reply(reply)).await;
                    });
                }

                changed = view.changed(), if view_open => {
                    if changed.is_err() {
                        view_open = false;
                        continue;
                    }
                    let state = view.borrow_and_update().clone();
                    if outbound.send(Outbound::ViewState(ViewStateMessage { state })).await.is_err() {
                        debug!("Outbound channel closed");
                        tasks.abort_all();
                        return;
                    }
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        debug!(received, outstanding = tasks.len(), "Inbound closed, draining");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tasks.abort_all();
                    break;
                }

                next = tasks.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }

        info!(received, "Message relay stopped");
    }
}

fn done(result: Result<Option<Value>>) -> Pending {
    Box::pin(std::future::ready(result))
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BridgeError::InvalidMessage(e.to_string()))
}

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is present.
fn parse_isot(isot: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(isot) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(isot, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| BridgeError::InvalidMessage(format!("isot {:?}: {}", isot, e)))
}
