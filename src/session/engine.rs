//! Session engine
//!
//! State machine per request:
//! `Idle -> AwaitingReply -> {Resolved | Retrying -> AwaitingReply | Failed}`.
//!
//! The watchdog measures idleness, not elapsed time: any inbound frame
//! resets it. A well-formed frame from the same device family that does
//! not match the awaited reply triggers a fast resend after a short
//! fixed delay - devices occasionally answer a stale request first.

use std::pin::pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::transport::{Transport, TransportError};
use crate::wire::Frame;

use super::{AbortFlag, ReplyMatcher};

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No matching reply after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Request aborted")]
    Aborted,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Inbound frame stream closed")]
    StreamClosed,
}

/// Session timing and retry knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle watchdog; resets on any inbound frame.
    pub idle_timeout: Duration,
    /// Delay before a resend, both after a wrong message and after a
    /// watchdog expiry.
    pub resend_delay: Duration,
    /// Default attempt budget; `None` retries until aborted.
    pub attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
            resend_delay: Duration::from_millis(150),
            attempts: Some(3),
        }
    }
}

/// Per-request options.
#[derive(Clone)]
pub struct RequestOptions {
    /// Overrides the engine's attempt budget when set.
    pub attempts: Option<Option<u32>>,
    pub abort: AbortFlag,
}

impl RequestOptions {
    pub fn new(abort: AbortFlag) -> Self {
        Self {
            attempts: None,
            abort,
        }
    }

    /// Retry until the abort flag fires (bulk transfers favour
    /// robustness over a hard cap).
    pub fn until_aborted(abort: AbortFlag) -> Self {
        Self {
            attempts: Some(None),
            abort,
        }
    }
}

enum Activity {
    Matched(Frame),
    WrongMessage,
    TimedOut,
}

/// The request/reply correlator. Holds the dump-family frame stream;
/// exclusive access (`&mut`) is what enforces single-flight.
pub struct SessionEngine {
    transport: Arc<dyn Transport>,
    frames: mpsc::Receiver<Frame>,
    config: SessionConfig,
}

impl SessionEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        frames: mpsc::Receiver<Frame>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            frames,
            config,
        }
    }

    /// Send `bytes` and await a frame matching `matcher`, retrying per
    /// the configured budget.
    pub async fn request(
        &mut self,
        bytes: &[u8],
        matcher: &ReplyMatcher,
        opts: &RequestOptions,
    ) -> Result<Frame, SessionError> {
        let budget = opts.attempts.unwrap_or(self.config.attempts);
        let mut attempt = 0u32;

        loop {
            if opts.abort.load(Ordering::SeqCst) {
                return Err(SessionError::Aborted);
            }
            attempt += 1;
            self.transport.send(bytes)?;
            tracing::debug!(attempt, "Request sent, awaiting reply");

            match self.await_reply(matcher).await? {
                Activity::Matched(frame) => return Ok(frame),
                Activity::WrongMessage => {
                    tracing::debug!(attempt, "Wrong message while awaiting reply, fast resend");
                }
                Activity::TimedOut => {
                    tracing::debug!(attempt, "Idle watchdog expired, resend");
                }
            }

            if let Some(max) = budget {
                if attempt >= max {
                    tracing::warn!(attempts = attempt, "Request failed, budget exhausted");
                    return Err(SessionError::Timeout { attempts: attempt });
                }
            }

            // Fast resend delay; the abort flag is polled again at the
            // top of the loop before the actual resend.
            sleep(self.config.resend_delay).await;
        }
    }

    /// One `AwaitingReply` phase: runs until the reply matches, a
    /// same-family wrong message arrives, or the watchdog fires.
    async fn await_reply(&mut self, matcher: &ReplyMatcher) -> Result<Activity, SessionError> {
        let mut watchdog = pin!(sleep(self.config.idle_timeout));

        loop {
            tokio::select! {
                frame = self.frames.recv() => {
                    let frame = frame.ok_or(SessionError::StreamClosed)?;
                    // Any activity counts against idleness.
                    watchdog.as_mut().reset(Instant::now() + self.config.idle_timeout);

                    if matcher.matches(&frame) {
                        return Ok(Activity::Matched(frame));
                    }
                    if matcher.same_family(&frame) {
                        tracing::debug!(kind = frame.kind(), "Unexpected device frame");
                        return Ok(Activity::WrongMessage);
                    }
                    tracing::trace!(kind = frame.kind(), "Ignoring foreign frame");
                }
                _ = watchdog.as_mut() => {
                    return Ok(Activity::TimedOut);
                }
            }
        }
    }
}
