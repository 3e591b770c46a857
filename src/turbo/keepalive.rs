use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::transport::Transport;
use crate::wire::ACTIVE_SENSE;

/// Refcounted Active Sensing heartbeat.
///
/// The timer runs only while at least one [`KeepaliveGuard`] is alive
/// AND the link is engaged at an elevated speed. Guards taken at 1x
/// cost nothing; dropping back to 1x stops the beat even if guards
/// remain.
pub struct Keepalive {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    interval: Duration,
    refs: Mutex<usize>,
    engaged: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Keepalive {
    pub fn new(transport: Arc<dyn Transport>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                interval,
                refs: Mutex::new(0),
                engaged: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Takes a reference on the heartbeat. The beat starts when the
    /// first guard appears on an engaged link and stops when the last
    /// one is dropped.
    pub fn acquire(&self) -> KeepaliveGuard {
        {
            let mut refs = self.inner.refs.lock().unwrap();
            *refs += 1;
        }
        self.inner.update();
        KeepaliveGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Marks the link as elevated (or not). Only an engaged link beats.
    pub(crate) fn set_engaged(&self, engaged: bool) {
        self.inner.engaged.store(engaged, Ordering::SeqCst);
        self.inner.update();
    }

    /// Whether the heartbeat task is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.task.lock().unwrap().is_some()
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        if let Some(task) = self.inner.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Inner {
    fn update(self: &Arc<Self>) {
        let refs = *self.refs.lock().unwrap();
        let should_run = refs > 0 && self.engaged.load(Ordering::SeqCst);

        let mut task = self.task.lock().unwrap();
        match (should_run, task.is_some()) {
            (true, false) => {
                tracing::debug!(interval = ?self.interval, "Starting link heartbeat");
                let transport = Arc::clone(&self.transport);
                let interval = self.interval;
                *task = Some(tokio::spawn(async move {
                    let mut tick = tokio::time::interval(interval);
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        tick.tick().await;
                        if let Err(e) = transport.send(&[ACTIVE_SENSE]) {
                            tracing::warn!("Heartbeat send failed: {e}");
                            break;
                        }
                    }
                }));
            }
            (false, true) => {
                tracing::debug!("Stopping link heartbeat");
                if let Some(task) = task.take() {
                    task.abort();
                }
            }
            _ => {}
        }
    }
}

/// RAII reference on the heartbeat, see [`Keepalive::acquire`].
pub struct KeepaliveGuard {
    inner: Arc<Inner>,
}

impl Drop for KeepaliveGuard {
    fn drop(&mut self) {
        {
            let mut refs = self.inner.refs.lock().unwrap();
            *refs = refs.saturating_sub(1);
        }
        self.inner.update();
    }
}
