//! In-process pub/sub broker plus the backfill-then-tail contract used by
//! the `/events` websocket endpoint.

mod notifier;
mod tail;

pub use notifier::{Notifier, SubscriberId};
pub use tail::{EventTail, TailEvent};
