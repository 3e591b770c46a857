//! Device module - the top-level handle to one connected machine
//!
//! Owns the frame router, the session engine, the speed negotiator and
//! the slot library, and exposes the operations an editor calls:
//! fetching and pushing single slots, bulk transfers over slot ranges
//! and link speed changes. Interactive requests and bulk jobs share
//! the engine through a mutex, so a bulk job naturally blocks slot
//! requests until it finishes or is cancelled.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::bulk::{BulkDirection, BulkError, BulkEvent, BulkJob, BulkSequencer};
use crate::codec::{self, CodecError};
use crate::config::Config;
use crate::library::SlotLibrary;
use crate::records::{DumpRecord, DumpType, SlotOutOfRange};
use crate::session::{abort_flag, AbortFlag, ReplyMatcher, RequestOptions, SessionEngine, SessionError};
use crate::transport::{spawn_router, Transport, TransportError};
use crate::turbo::{TurboError, TurboLink, TurboStatus};

/// Device errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Slot(#[from] SlotOutOfRange),

    #[error("Request failed: {0}")]
    Session(#[from] SessionError),

    #[error("Reply undecodable: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Speed change failed: {0}")]
    Turbo(#[from] TurboError),

    #[error("No {dump_type:?} record in the library for slot {slot}")]
    MissingRecord { dump_type: DumpType, slot: u8 },

    #[error("A bulk transfer is already running")]
    BulkBusy,
}

/// Handle to one connected device.
pub struct Device {
    transport: Arc<dyn Transport>,
    engine: Arc<Mutex<SessionEngine>>,
    turbo: Arc<Mutex<TurboLink>>,
    library: Arc<dyn SlotLibrary>,
    config: Config,
    bulk_busy: Arc<AtomicBool>,
    router: JoinHandle<()>,
}

impl Device {
    /// Wire a device up over a transport. `chunks` is the raw inbound
    /// byte stream the transport adapter feeds.
    pub fn new(
        transport: Arc<dyn Transport>,
        chunks: mpsc::Receiver<Vec<u8>>,
        library: Arc<dyn SlotLibrary>,
        config: Config,
    ) -> Self {
        let handles = spawn_router(chunks);
        let engine = SessionEngine::new(
            Arc::clone(&transport),
            handles.dump_rx,
            config.session.to_session_config(),
        );
        let turbo = TurboLink::new(
            Arc::clone(&transport),
            handles.turbo_rx,
            config.turbo.to_turbo_config(),
        );

        Self {
            transport,
            engine: Arc::new(Mutex::new(engine)),
            turbo: Arc::new(Mutex::new(turbo)),
            library,
            config,
            bulk_busy: Arc::new(AtomicBool::new(false)),
            router: handles.task,
        }
    }

    pub fn library(&self) -> &Arc<dyn SlotLibrary> {
        &self.library
    }

    /// Fetch one slot from the device, commit it to the library and
    /// return it.
    pub async fn request_slot(
        &self,
        dump_type: DumpType,
        slot: u8,
    ) -> Result<DumpRecord, DeviceError> {
        let slot = dump_type.check_slot(slot)?;
        let request = codec::encode_request(dump_type, slot);
        let matcher = ReplyMatcher::dump(dump_type, slot);
        let opts = RequestOptions::new(abort_flag());

        let reply = {
            let mut engine = self.engine.lock().await;
            engine.request(&request, &matcher, &opts).await?
        };

        if self.config.codec.verify_checksums {
            codec::verify_checksum(&reply)?;
        }
        let record = codec::decode_record(dump_type, &reply)?;
        self.library.commit(dump_type, slot, Some(record.clone()));
        Ok(record)
    }

    /// Push the library's record for one slot to the device.
    pub async fn send_slot(&self, dump_type: DumpType, slot: u8) -> Result<(), DeviceError> {
        let slot = dump_type.check_slot(slot)?;
        let record = self
            .library
            .fetch(dump_type, slot)
            .ok_or(DeviceError::MissingRecord { dump_type, slot })?;

        self.transport.send(&codec::encode_record(&record))?;
        Ok(())
    }

    /// Start a bulk transfer over a slot range. At most one bulk job
    /// runs at a time; the elevated-speed heartbeat is held for the
    /// duration of the job.
    pub fn start_bulk(
        &self,
        dump_type: DumpType,
        range: RangeInclusive<u8>,
        direction: BulkDirection,
    ) -> Result<BulkHandle, DeviceError> {
        if self
            .bulk_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeviceError::BulkBusy);
        }

        let job = BulkJob::new(dump_type, range, direction);
        let (event_tx, events) = mpsc::channel(64);
        let abort = abort_flag();

        let engine = Arc::clone(&self.engine);
        let turbo = Arc::clone(&self.turbo);
        let transport = Arc::clone(&self.transport);
        let library = Arc::clone(&self.library);
        let config = self.config.bulk_config();
        let busy = Arc::clone(&self.bulk_busy);
        let flag = abort.clone();

        let task = tokio::spawn(async move {
            let _beat = {
                let link = turbo.lock().await;
                link.keepalive().acquire()
            };
            let mut engine = engine.lock().await;
            let mut sequencer = BulkSequencer::new(&mut engine, transport, library, config);
            let result = sequencer.run(&job, &event_tx, &flag).await;
            busy.store(false, Ordering::SeqCst);
            result
        });

        Ok(BulkHandle {
            abort,
            events,
            task,
        })
    }

    /// Negotiate the link speed towards `factor`. Returns the factor
    /// actually in effect.
    pub async fn set_turbo_speed(&self, factor: f32) -> Result<f32, DeviceError> {
        let mut turbo = self.turbo.lock().await;
        Ok(turbo.set_speed(factor).await?)
    }

    pub async fn turbo_status(&self) -> TurboStatus {
        self.turbo.lock().await.status()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.router.abort();
    }
}

/// Handle to a running bulk job.
pub struct BulkHandle {
    abort: AbortFlag,
    /// Progress events, one per slot plus a terminal event.
    pub events: mpsc::Receiver<BulkEvent>,
    task: JoinHandle<Result<u32, BulkError>>,
}

impl BulkHandle {
    /// Request cooperative cancellation. The job stops at the next
    /// slot boundary or retry decision.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Wait for the job to finish and return the transferred count.
    pub async fn wait(self) -> Result<u32, BulkError> {
        match self.task.await {
            Ok(result) => result,
            // The job task is never aborted externally, only cancelled
            // through the flag, so a join error is a panic.
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}
