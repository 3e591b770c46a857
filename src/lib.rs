//! SysEx data-transport core for the Elektron Machinedrum.
//!
//! The crate is the plumbing an editor builds on: binary codecs for
//! the four dump families (global settings, kits, patterns, songs), a
//! request/reply session engine with an idle watchdog and fast resend,
//! a bulk sequencer for whole slot ranges and a TurboMIDI speed
//! negotiator with a refcounted link heartbeat.
//!
//! Physical MIDI I/O stays outside: an adapter implements
//! [`transport::Transport`] for sending and feeds raw inbound bytes
//! into the channel a [`device::Device`] reads. Everything above that
//! boundary is in here.

pub mod bulk;
pub mod codec;
pub mod config;
pub mod device;
pub mod library;
pub mod packing;
pub mod records;
pub mod session;
pub mod transport;
pub mod turbo;
pub mod wire;

pub use bulk::{BulkDirection, BulkError, BulkEvent, BulkJob};
pub use config::Config;
pub use device::{BulkHandle, Device, DeviceError};
pub use library::{MemoryLibrary, SlotLibrary};
pub use records::{DumpRecord, DumpType};
pub use transport::{spawn_router, Transport, TransportError};
pub use turbo::TurboStatus;
