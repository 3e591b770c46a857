//! Session module - request/reply correlation over the transport
//!
//! One outstanding request at a time: send, then match inbound frames
//! against a [`ReplyMatcher`] under an idle watchdog, resending fast on
//! a wrong-but-well-formed reply and on watchdog expiry.

mod engine;
mod matcher;

pub use engine::*;
pub use matcher::*;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Shared cooperative cancellation flag, polled before every send and
/// every retry decision.
pub type AbortFlag = Arc<AtomicBool>;

/// Create an unset abort flag.
pub fn abort_flag() -> AbortFlag {
    Arc::new(AtomicBool::new(false))
}
