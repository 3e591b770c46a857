//! Transport module - the boundary to physical byte delivery
//!
//! The core never opens a MIDI port itself. An adapter implements
//! [`Transport::send`] and feeds inbound bytes, in order but with no
//! one-frame-per-chunk guarantee, into the channel handed to
//! [`spawn_router`]. The router reassembles frames and fans them out to
//! the dump and turbo consumers.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::wire::{Deframer, Frame};

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Send failed: {0}")]
    Failed(String),
}

/// The narrow interface to physical I/O. Implementations wrap a MIDI
/// output port or equivalent.
pub trait Transport: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }
}

/// Receivers produced by the router: reassembled frames split by
/// protocol family.
pub struct RouterHandles {
    /// Machinedrum dump/request frames, plus anything unrecognized
    /// (the session engine decides what counts as a wrong message).
    pub dump_rx: mpsc::Receiver<Frame>,
    /// TurboMIDI frames.
    pub turbo_rx: mpsc::Receiver<Frame>,
    /// The router task, for shutdown on drop of the device.
    pub task: JoinHandle<()>,
}

/// Spawn the frame router over a raw inbound chunk stream.
pub fn spawn_router(mut chunks: mpsc::Receiver<Vec<u8>>) -> RouterHandles {
    let (dump_tx, dump_rx) = mpsc::channel(64);
    let (turbo_tx, turbo_rx) = mpsc::channel(64);

    let task = tokio::spawn(async move {
        let mut deframer = Deframer::new();

        while let Some(chunk) = chunks.recv().await {
            deframer.push(&chunk);
            loop {
                match deframer.next_frame() {
                    Ok(Some(frame)) => {
                        let tx = if frame.is_turbo() { &turbo_tx } else { &dump_tx };
                        if tx.send(frame).await.is_err() {
                            tracing::debug!("Frame consumer gone, router stopping");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Inbound stream error: {}", e);
                        break;
                    }
                }
            }
        }
        tracing::debug!("Transport chunk stream closed, router stopping");
    });

    RouterHandles {
        dump_rx,
        turbo_rx,
        task,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_request;
    use crate::records::DumpType;
    use crate::wire::{turbo_kind, FrameBuilder, TURBO_PREFIX};

    #[tokio::test]
    async fn test_router_splits_families() {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let mut handles = spawn_router(chunk_rx);

        let dump = encode_request(DumpType::Kit, 0);
        let turbo = FrameBuilder::new(TURBO_PREFIX, turbo_kind::SPEED_QUERY).finish();

        let mut stream = dump.clone();
        stream.extend(&turbo);
        chunk_tx.send(stream).await.unwrap();

        let f = handles.dump_rx.recv().await.unwrap();
        assert!(f.is_md());
        let f = handles.turbo_rx.recv().await.unwrap();
        assert!(f.is_turbo());
    }

    #[tokio::test]
    async fn test_router_reassembles_across_chunks() {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let mut handles = spawn_router(chunk_rx);

        let dump = encode_request(DumpType::Global, 1);
        for byte in &dump {
            chunk_tx.send(vec![*byte]).await.unwrap();
        }

        let f = handles.dump_rx.recv().await.unwrap();
        assert_eq!(f.raw(), &dump[..]);
    }

    #[tokio::test]
    async fn test_router_stops_when_chunks_close() {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let handles = spawn_router(chunk_rx);
        drop(chunk_tx);
        handles.task.await.unwrap();
    }
}
