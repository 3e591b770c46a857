//! Frame building and reassembly
//!
//! `FrameBuilder` lays out outbound SysEx frames, clamping every data
//! byte to 7 bits and computing the checksum/length trailer for dumps.
//! `Deframer` reassembles inbound frames from an arbitrary chunk stream:
//! the transport guarantees byte order but not one-frame-per-chunk, so
//! frames are recovered by scanning for the end marker.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use super::{join_u14, split_u14, MD_PREFIX, SYSEX_END, SYSEX_START, TURBO_PREFIX};
use crate::packing;

/// Upper bound on a reassembled frame. Nothing the device emits comes
/// close; past this the stream is garbage and the buffer is dropped.
const MAX_FRAME_SIZE: usize = 8192;

/// Wire-level errors
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Frame exceeds {max} bytes without an end marker")]
    Oversize { max: usize },

    #[error("Frame too short: {0} bytes")]
    Runt(usize),
}

/// One complete inbound SysEx frame, start/end markers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap a complete frame. Fails if the markers or the minimum
    /// prefix+kind length are missing.
    pub fn parse(bytes: Vec<u8>) -> Result<Self, WireError> {
        if bytes.len() < 8 {
            return Err(WireError::Runt(bytes.len()));
        }
        if bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
            return Err(WireError::Runt(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Full frame bytes including the markers.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    /// Total frame length including the markers.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Five-byte vendor/product prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.bytes[1..6]
    }

    /// Message kind discriminator.
    pub fn kind(&self) -> u8 {
        self.bytes[6]
    }

    /// Payload between the kind byte and the end marker.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[7..self.bytes.len() - 1]
    }

    /// True for frames carrying the Machinedrum dump/request prefix.
    pub fn is_md(&self) -> bool {
        self.prefix() == MD_PREFIX
    }

    /// True for frames carrying the TurboMIDI prefix.
    pub fn is_turbo(&self) -> bool {
        self.prefix() == TURBO_PREFIX
    }

    /// Declared 14-bit length field of a dump payload (the last four
    /// payload bytes are `chkHi chkLo lenHi lenLo`).
    pub fn declared_len(&self) -> Option<u16> {
        let p = self.payload();
        if p.len() < 4 {
            return None;
        }
        Some(join_u14(p[p.len() - 2], p[p.len() - 1]))
    }
}

/// Builds one outbound frame.
pub struct FrameBuilder {
    buf: BytesMut,
    /// Index just past the slot byte; start of the checksum span.
    checksum_from: Option<usize>,
}

impl FrameBuilder {
    pub fn new(prefix: [u8; 5], kind: u8) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(SYSEX_START);
        buf.put_slice(&prefix);
        buf.put_u8(kind);
        Self {
            buf,
            checksum_from: None,
        }
    }

    /// Write one data byte, clamped to 7 bits.
    pub fn put_u7(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value.min(0x7F));
        self
    }

    /// Write one data byte, masked to 7 bits (for already-encoded
    /// values where clamping would corrupt).
    pub fn put_masked(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value & 0x7F);
        self
    }

    /// Write a 14-bit value as two 7-bit bytes, high first.
    pub fn put_u14(&mut self, value: u16) -> &mut Self {
        self.buf.put_slice(&split_u14(value));
        self
    }

    /// Write a slice of 7-bit-safe bytes, each masked.
    pub fn put_slice(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.buf.put_u8(b & 0x7F);
        }
        self
    }

    /// 7-bit pack a raw block and write it, padded or truncated to the
    /// field's fixed encoded length.
    pub fn put_packed(&mut self, raw: &[u8], encoded_len: usize) -> &mut Self {
        let mut packed = packing::pack(raw);
        packed.resize(encoded_len, 0);
        self.buf.put_slice(&packed);
        self
    }

    /// Mark the checksum span. Call immediately after writing the slot
    /// byte; everything from here to `finish_dump` is summed.
    pub fn mark_checksum(&mut self) -> &mut Self {
        self.checksum_from = Some(self.buf.len());
        self
    }

    /// Append checksum, length field and end marker for a dump frame.
    ///
    /// The checksum is the 14-bit sum of the bytes after the slot byte;
    /// the length counts from the slot byte through the checksum low
    /// byte, inclusive.
    pub fn finish_dump(mut self) -> Vec<u8> {
        let from = self.checksum_from.unwrap_or(self.buf.len());
        let sum: u16 = self.buf[from..]
            .iter()
            .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)) & 0x3FFF);
        self.buf.put_slice(&split_u14(sum));

        let length = (self.buf.len() - (from - 1)) as u16 & 0x3FFF;
        self.buf.put_slice(&split_u14(length));
        self.buf.put_u8(SYSEX_END);
        self.buf.to_vec()
    }

    /// Append the end marker only (requests and turbo messages carry no
    /// trailer).
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.put_u8(SYSEX_END);
        self.buf.to_vec()
    }
}

/// Reassembles frames from transport chunks.
///
/// Garbage before a start marker is discarded; realtime status bytes
/// interleaved inside a frame (clock, active sense) are stripped, as
/// devices emit them mid-transfer.
pub struct Deframer {
    buf: BytesMut,
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Feed one transport chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Attempt to extract the next complete frame.
    /// Returns Ok(None) if more data is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, WireError> {
        loop {
            // Drop everything before the next start marker.
            match self.buf.iter().position(|&b| b == SYSEX_START) {
                Some(0) => {}
                Some(start) => {
                    let _ = self.buf.split_to(start);
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }

            let end = match self.buf.iter().position(|&b| b == SYSEX_END) {
                Some(end) => end,
                None => {
                    if self.buf.len() > MAX_FRAME_SIZE {
                        self.buf.clear();
                        return Err(WireError::Oversize {
                            max: MAX_FRAME_SIZE,
                        });
                    }
                    return Ok(None);
                }
            };

            // A start marker before the end marker means the earlier
            // frame was aborted mid-transmission; restart at the last
            // one rather than merging the fragments.
            if let Some(restart) = self.buf[1..end].iter().rposition(|&b| b == SYSEX_START) {
                tracing::debug!(dropped = restart + 1, "Discarding aborted partial frame");
                let _ = self.buf.split_to(restart + 1);
                continue;
            }

            let raw = self.buf.split_to(end + 1);

            // Strip interleaved realtime bytes; keep only the markers
            // and 7-bit data.
            let mut bytes = Vec::with_capacity(raw.len());
            bytes.push(SYSEX_START);
            for &b in &raw[1..raw.len() - 1] {
                if b < 0x80 {
                    bytes.push(b);
                }
            }
            bytes.push(SYSEX_END);

            match Frame::parse(bytes) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    tracing::debug!("Discarding runt frame: {}", e);
                    // Keep scanning from the next start marker.
                }
            }
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}
