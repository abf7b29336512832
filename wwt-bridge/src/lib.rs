//! WWT Bridge - async bindings for the WorldWide Telescope engine
//!
//! The rendering engine exposes an imperative API whose completion is
//! reported through a handful of global callbacks. This library turns that
//! API into futures and a watchable state mirror, and relays JSON messages
//! from notebook-style clients onto it.
//!
//! # Modules
//!
//! - [`notify`]: supersedable notification channels (one per terminal event)
//! - [`load_cache`]: URL-keyed deduplication of collection loads
//! - [`engine`]: the engine boundary and an in-process simulated engine
//! - [`facade`]: async wrapper methods over the engine
//! - [`store`]: watch-based mirror of engine state
//! - [`messages`]: JSON relay for kernel-side clients
//! - [`config`], [`logging`]: ambient setup
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wwt_bridge::engine::{GotoRaDecZoom, SimulatedEngine};
//! use wwt_bridge::WwtFacade;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = Arc::new(SimulatedEngine::new());
//! let facade = WwtFacade::new(engine.clone());
//!
//! engine.fire_ready();
//! facade.wait_for_ready().await.unwrap();
//!
//! facade
//!     .goto_ra_dec_zoom(GotoRaDecZoom::from_degrees(83.6, 22.0, 1.0, true))
//!     .await
//!     .unwrap();
//! assert_eq!(facade.state().engine.zoom_deg, 6.0);
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod load_cache;
pub mod logging;
pub mod messages;
pub mod notify;
pub mod store;

pub use error::{BridgeError, Result};
pub use facade::WwtFacade;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
