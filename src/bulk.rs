//! Bulk sequencer - walks a slot range one transfer at a time
//!
//! Strictly sequential: the next slot's request starts only after the
//! previous one resolved and its record was committed. Cancellation is
//! cooperative and leaves already-committed slots in place. A failed
//! slot halts the job and surfaces; resuming is the caller's decision
//! (re-issue with the remaining range).

use std::ops::RangeInclusive;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::{self, CodecError};
use crate::library::SlotLibrary;
use crate::records::DumpType;
use crate::session::{AbortFlag, ReplyMatcher, RequestOptions, SessionEngine, SessionError};
use crate::transport::{Transport, TransportError};

/// Bulk errors. `slot` is always the slot that was being worked when
/// the job stopped; earlier slots stay committed.
#[derive(Error, Debug)]
pub enum BulkError {
    #[error("Transfer of slot {slot} failed: {source}")]
    Session {
        slot: u8,
        #[source]
        source: SessionError,
    },

    #[error("Reply for slot {slot} undecodable: {source}")]
    Codec {
        slot: u8,
        #[source]
        source: CodecError,
    },

    #[error("No record in the library for slot {slot}")]
    MissingRecord { slot: u8 },

    #[error("Send of slot {slot} failed: {source}")]
    Transport {
        slot: u8,
        #[source]
        source: TransportError,
    },

    #[error("Cancelled at slot {slot}")]
    Cancelled { slot: u8 },
}

/// Transfer direction of a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkDirection {
    /// Request dumps from the device and commit them.
    Receive,
    /// Push library records to the device.
    Send,
}

/// Progress events emitted while a job runs.
#[derive(Debug, Clone)]
pub enum BulkEvent {
    SlotDone { dump_type: DumpType, slot: u8 },
    Finished { transferred: u32 },
    Failed { slot: u8, message: String },
    Cancelled { at_slot: u8 },
}

/// One bulk job: a record type, an inclusive slot range and a cursor.
#[derive(Debug, Clone)]
pub struct BulkJob {
    pub dump_type: DumpType,
    pub range: RangeInclusive<u8>,
    pub direction: BulkDirection,
}

impl BulkJob {
    /// Clamp the range into the type's slot space. An inverted range
    /// becomes empty rather than an error.
    pub fn new(dump_type: DumpType, range: RangeInclusive<u8>, direction: BulkDirection) -> Self {
        let start = dump_type.clamp_slot(*range.start());
        let end = dump_type.clamp_slot(*range.end());
        Self {
            dump_type,
            range: start..=end,
            direction,
        }
    }
}

/// Pacing for send-direction jobs (the device acks dumps implicitly;
/// back-to-back frames overrun it).
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub send_pacing: Duration,
    /// Checksum verification on received dumps, per device config.
    pub verify_checksums: bool,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            send_pacing: Duration::from_millis(20),
            verify_checksums: false,
        }
    }
}

/// Drives one job to completion over the session engine.
pub struct BulkSequencer<'a> {
    engine: &'a mut SessionEngine,
    transport: Arc<dyn Transport>,
    library: Arc<dyn SlotLibrary>,
    config: BulkConfig,
}

impl<'a> BulkSequencer<'a> {
    pub fn new(
        engine: &'a mut SessionEngine,
        transport: Arc<dyn Transport>,
        library: Arc<dyn SlotLibrary>,
        config: BulkConfig,
    ) -> Self {
        Self {
            engine,
            transport,
            library,
            config,
        }
    }

    /// Run the job. Returns the number of transferred slots; on error
    /// the cursor position is embedded in the error and committed
    /// slots are not rolled back.
    pub async fn run(
        &mut self,
        job: &BulkJob,
        events: &mpsc::Sender<BulkEvent>,
        abort: &AbortFlag,
    ) -> Result<u32, BulkError> {
        let mut transferred = 0u32;

        for slot in job.range.clone() {
            if abort.load(Ordering::SeqCst) {
                let _ = events.send(BulkEvent::Cancelled { at_slot: slot }).await;
                return Err(BulkError::Cancelled { slot });
            }

            let result = match job.direction {
                BulkDirection::Receive => self.receive_slot(job.dump_type, slot, abort).await,
                BulkDirection::Send => self.send_slot(job.dump_type, slot).await,
            };

            if let Err(e) = result {
                tracing::warn!(slot, "Bulk transfer halted: {}", e);
                let _ = events
                    .send(BulkEvent::Failed {
                        slot,
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }

            transferred += 1;
            let _ = events
                .send(BulkEvent::SlotDone {
                    dump_type: job.dump_type,
                    slot,
                })
                .await;
        }

        tracing::info!(
            ?job.dump_type,
            transferred,
            "Bulk transfer finished"
        );
        let _ = events.send(BulkEvent::Finished { transferred }).await;
        Ok(transferred)
    }

    async fn receive_slot(
        &mut self,
        dump_type: DumpType,
        slot: u8,
        abort: &AbortFlag,
    ) -> Result<(), BulkError> {
        let request = codec::encode_request(dump_type, slot);
        let matcher = ReplyMatcher::dump(dump_type, slot);
        let opts = RequestOptions::until_aborted(abort.clone());

        let reply = self
            .engine
            .request(&request, &matcher, &opts)
            .await
            .map_err(|source| match source {
                SessionError::Aborted => BulkError::Cancelled { slot },
                source => BulkError::Session { slot, source },
            })?;

        if self.config.verify_checksums {
            codec::verify_checksum(&reply).map_err(|source| BulkError::Codec { slot, source })?;
        }
        let record = codec::decode_record(dump_type, &reply)
            .map_err(|source| BulkError::Codec { slot, source })?;

        // Commit before advancing the cursor.
        self.library.commit(dump_type, slot, Some(record));
        Ok(())
    }

    async fn send_slot(&mut self, dump_type: DumpType, slot: u8) -> Result<(), BulkError> {
        let record = self
            .library
            .fetch(dump_type, slot)
            .ok_or(BulkError::MissingRecord { slot })?;

        let bytes = codec::encode_record(&record);
        self.transport
            .send(&bytes)
            .map_err(|source| BulkError::Transport { slot, source })?;

        tokio::time::sleep(self.config.send_pacing).await;
        Ok(())
    }
}
