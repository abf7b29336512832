//! JSON message relay between a notebook-style client and the facade.
//!
//! ```text
//! client ──JSON──► MessageRelay::run ──spawn──► handle ──► WwtFacade
//!    ▲                    │                        │
//!    │                    └── view state changes   │
//!    └──────── Outbound (wwt_reply / wwt_view_state)
//! ```
//!
//! Each inbound message carries an `event` tag and an optional `threadId`
//! that is echoed on the reply. Replies report `ok`, `superseded` (a newer
//! request of the same kind took over) or `error`.

mod relay;
mod types;

pub use relay::MessageRelay;
pub use types::{ClientMessage, Outbound, Reply, ReplyStatus, ViewStateMessage};
