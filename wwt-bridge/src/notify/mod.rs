//! Supersedable notifications for engine terminal events.
//!
//! The engine fires exactly one terminal event per subsystem (ready, camera
//! arrived, tour ready) no matter how many requests are outstanding. A
//! [`NotificationChannel`] turns that single callback into per-request
//! futures while guaranteeing that only the newest request is honoured.
//!
//! # Lifecycle
//!
//! ```text
//! begin_request ──► generation += 1 ──► reject all pending (Superseded)
//!                                    └─► register Waiter(generation)
//!
//! fire(payload) ──► for each waiter:
//!                     generation < current ──► Superseded
//!                     otherwise            ──► Ok(payload)
//!                   waiter list cleared
//! ```
//!
//! # Example
//!
//! ```
//! use futures::FutureExt;
//! use wwt_bridge::notify::NotificationChannel;
//!
//! let arrival: NotificationChannel<()> = NotificationChannel::new("arrival");
//!
//! let first = arrival.begin_request(false);
//! let second = arrival.begin_request(false);
//! arrival.fire(());
//!
//! assert!(first.now_or_never().unwrap().unwrap_err().is_superseded());
//! assert!(second.now_or_never().unwrap().is_ok());
//! ```

mod channel;
mod error;
mod waiter;

pub use channel::{FireOutcome, NotificationChannel};
pub use error::NotifyError;
pub use waiter::{Generation, Waiter};
