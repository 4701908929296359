pub mod estimator;
pub mod header;
pub mod jitter;
pub mod packet;
pub mod redundancy;
pub mod seq;
pub mod stats;

pub use header::RtpHeader;
pub use jitter::{JitterBuffer, PopOutcome, PushOutcome};
pub use packet::PacketEnvelope;
pub use stats::JitterStats;

/// Narrowband telephony sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Nominal playout delay: nine 20ms packets, capped at 360ms
pub const DEFAULT_DEPTH_MS: u32 = 180;

/// Static and dynamic payload types the buffer knows about (RFC 3551)
pub mod payload_type {
    pub const PCMU: u8 = 0;
    pub const GSM: u8 = 3;
    pub const PCMA: u8 = 8;
    pub const L16: u8 = 11;
    pub const G729A: u8 = 18;
    pub const SPEEX: u8 = 97;
    /// RFC 2198 redundant audio, as negotiated by our peers
    pub const DYNAMIC_RED: u8 = 121;
}

/// Convert a duration in milliseconds to RTP timestamp units
#[inline]
pub fn ms_to_timestamp_units(duration_ms: u32, sample_rate: u32) -> u32 {
    ((duration_ms as u64) * sample_rate as u64 / 1000) as u32
}
