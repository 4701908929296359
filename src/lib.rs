//! rtpjitter - RTP de-jitter buffer
//!
//! Reorders RTP audio packets by sequence number, holds output until a
//! nominal playout depth is reached, and reports interarrival jitter.

pub mod config;
pub mod error;
pub mod rtp;
pub mod sim;

pub use config::JitterConfig;
pub use error::JitterError;
pub use rtp::{JitterBuffer, JitterStats, PacketEnvelope, PopOutcome, PushOutcome};
