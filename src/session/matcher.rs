//! Reply matchers
//!
//! A matcher describes the reply a session is waiting for: message
//! kind, optionally a slot byte under a mask, a length constraint, and
//! an optional custom validator.

use std::fmt;
use std::sync::Arc;

use crate::codec;
use crate::records::DumpType;
use crate::wire::{Frame, MD_PREFIX, TURBO_PREFIX};

/// Length constraint on a matching reply.
#[derive(Debug, Clone)]
pub enum LengthRule {
    /// Total frame length must be one of these values.
    Exact(Vec<usize>),
    /// Total frame length must be at least this.
    Min(usize),
    Any,
}

impl LengthRule {
    fn accepts(&self, len: usize) -> bool {
        match self {
            LengthRule::Exact(set) => set.contains(&len),
            LengthRule::Min(min) => len >= *min,
            LengthRule::Any => true,
        }
    }
}

/// Expected slot byte (payload position 2 of a dump) under a mask.
#[derive(Debug, Clone, Copy)]
pub struct SlotMatch {
    pub value: u8,
    pub mask: u8,
}

type Validator = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// The reply signature of one outstanding request.
#[derive(Clone)]
pub struct ReplyMatcher {
    prefix: [u8; 5],
    kind: u8,
    slot: Option<SlotMatch>,
    length: LengthRule,
    validator: Option<Validator>,
}

impl ReplyMatcher {
    /// Matcher for a dump reply of `dump_type` from `slot`.
    pub fn dump(dump_type: DumpType, slot: u8) -> Self {
        let length = match dump_type {
            DumpType::Global => LengthRule::Exact(vec![codec::GLOBAL_MESSAGE_LEN]),
            DumpType::Kit => LengthRule::Exact(vec![codec::KIT_MESSAGE_LEN]),
            DumpType::Pattern => LengthRule::Exact(vec![codec::PATTERN_MESSAGE_LEN]),
            DumpType::Song => LengthRule::Min(codec::SONG_MIN_MESSAGE_LEN),
        };
        Self {
            prefix: MD_PREFIX,
            kind: dump_type.dump_kind(),
            slot: Some(SlotMatch {
                value: slot & dump_type.slot_mask(),
                mask: dump_type.slot_mask(),
            }),
            length,
            validator: None,
        }
    }

    /// Matcher for a turbo reply of the given kind.
    pub fn turbo(kind: u8, min_len: usize) -> Self {
        Self {
            prefix: TURBO_PREFIX,
            kind,
            slot: None,
            length: LengthRule::Min(min_len),
            validator: None,
        }
    }

    /// Attach a custom validator; it runs after all structural checks.
    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Does this frame resolve the request?
    pub fn matches(&self, frame: &Frame) -> bool {
        if frame.prefix() != self.prefix || frame.kind() != self.kind {
            return false;
        }
        if !self.length.accepts(frame.len()) {
            return false;
        }
        if let Some(slot) = self.slot {
            match frame.payload().get(2) {
                Some(&raw) if raw & slot.mask == slot.value => {}
                _ => return false,
            }
        }
        if let Some(validator) = &self.validator {
            if !validator(frame) {
                return false;
            }
        }
        true
    }

    /// Is this frame at least from the device family we are talking
    /// to? Such frames trigger the fast resend instead of being
    /// silently ignored.
    pub fn same_family(&self, frame: &Frame) -> bool {
        frame.prefix() == self.prefix
    }
}

impl fmt::Debug for ReplyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyMatcher")
            .field("kind", &format_args!("0x{:02X}", self.kind))
            .field("slot", &self.slot)
            .field("length", &self.length)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}
