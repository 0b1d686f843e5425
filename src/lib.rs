//! Core library for the `mtx`/`mrx` audio-over-IP sender and receiver.
//!
//! The binaries in `src/bin/` are thin CLI wrappers around the building
//! blocks exposed here: wire framing, the jitter buffer, the clock grid,
//! the time-sync protocol, and the two realtime scheduling loops.

pub mod capture;
pub mod clock_grid;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod jitter_buffer;
pub mod net;
pub mod playback;
pub mod privilege;
pub mod rtp;
pub mod sdp;
pub mod time_sync;
pub mod wire;

pub use config::{Config, ReceiverConfig, SenderConfig};
pub use error::MtrxError;
