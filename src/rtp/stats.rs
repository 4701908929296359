use serde::Serialize;

/// Statistics about jitter buffer operation
///
/// Counters only ever grow within one buffer lifetime (`init` starts a new
/// one); `reset` keeps them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JitterStats {
    /// Packets accepted into the buffer
    pub packets_received: u64,
    /// Packets handed to the consumer (redundant stand-ins included)
    pub packets_delivered: u64,
    /// Arrivals that were behind the newest buffered packet
    pub out_of_order: u64,
    /// Packets evicted to make room
    pub overflows: u64,
    /// Pops that found nothing queued
    pub empty_pops: u64,
    /// Pops that found a sequence gap
    pub dropped: u64,
    /// Empty, duplicate or too-late arrivals
    pub bad_packets: u64,
    /// Interarrival jitter, timestamp units
    pub jitter: f64,
    pub max_jitter: f64,
    pub jitter_ms: f64,
    pub max_jitter_ms: f64,
    /// Packets queued at snapshot time
    pub current_depth: usize,
    pub current_depth_ms: u32,
}
