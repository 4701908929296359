/// RTP Jitter Buffer
/// Handles packet reordering, loss detection and playout delay for one RTP stream
///
/// The producer (network receive) pushes envelopes as they arrive; the consumer
/// (playout) pops once per packet interval. Output is held back until either the
/// nominal depth has elapsed since the first arrival or that much audio is
/// queued, after which packets come out in sequence order. A missing packet is
/// reported as `Dropped` so the consumer can conceal it.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::estimator::JitterEstimator;
use super::packet::PacketEnvelope;
use super::seq::{is_next, seq_cmp, seq_distance, seq_gt, seq_le, seq_lt};
use super::stats::JitterStats;
use super::{DEFAULT_DEPTH_MS, DEFAULT_SAMPLE_RATE};
use crate::config::JitterConfig;
use crate::error::JitterError;

/// Result of a successful push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest packets to stay under the cap
    Overflow { evicted: usize },
}

/// Result of a pop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopOutcome {
    Delivered(PacketEnvelope),
    /// Still filling up to the nominal depth; nothing consumed
    Buffering,
    /// The expected packet is missing; conceal it and pop again next interval
    Dropped,
    /// Nothing queued; the buffer has gone back to buffering
    Empty,
}

impl PopOutcome {
    pub fn into_packet(self) -> Option<PacketEnvelope> {
        match self {
            Self::Delivered(packet) => Some(packet),
            _ => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Where an accepted arrival goes
enum Placement {
    Tail,
    Head,
    Sorted,
}

/// What the head of the queue allows on pop
enum Verdict {
    Deliver,
    RedundantHold,
    Gap,
}

#[derive(Debug)]
struct BufferingState {
    is_buffering: bool,
    started_at: Option<Instant>,
}

impl BufferingState {
    fn new() -> Self {
        Self {
            is_buffering: true,
            started_at: None,
        }
    }

    /// Go back to buffering; the next arrival starts the clock
    fn enter(&mut self) {
        if !self.is_buffering {
            debug!("Jitter buffer drained, re-entering buffering");
        }
        self.is_buffering = true;
        self.started_at = None;
    }

    fn note_arrival(&mut self, now: Instant) {
        if self.is_buffering && self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Returns true while output must still be held back
    fn hold(&mut self, now: Instant, nominal_ms: u32, depth_ms: u32) -> bool {
        if !self.is_buffering {
            return false;
        }
        let started_at = *self.started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started_at);
        if elapsed >= Duration::from_millis(nominal_ms as u64) || depth_ms >= nominal_ms {
            debug!(
                "Buffering complete after {:?} with {}ms queued (nominal {}ms)",
                elapsed, depth_ms, nominal_ms
            );
            self.is_buffering = false;
            self.started_at = None;
            return false;
        }
        true
    }
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<PacketEnvelope>,
    depth_ms: u32,
    nominal_depth_ms: u32,
    max_depth_ms: u32,
    sample_rate: u32,
    first_buffered_seq: u16,
    last_buffered_seq: u16,
    last_popped_seq: u16,
    /// Newest sequence number already played or concealed; anything at or
    /// before it is too late
    last_played: Option<u16>,
    buffering: BufferingState,
    estimator: JitterEstimator,
    stats: JitterStats,
}

impl Inner {
    fn new(nominal_ms: u32, max_ms: u32, sample_rate: u32) -> Self {
        let sample_rate = checked_sample_rate(sample_rate);
        let mut inner = Self {
            queue: VecDeque::new(),
            depth_ms: 0,
            nominal_depth_ms: 0,
            max_depth_ms: 0,
            sample_rate,
            first_buffered_seq: 0,
            last_buffered_seq: 0,
            last_popped_seq: 0,
            last_played: None,
            buffering: BufferingState::new(),
            estimator: JitterEstimator::new(sample_rate),
            stats: JitterStats::default(),
        };
        inner.set_depth(nominal_ms, max_ms);
        inner
    }

    fn set_depth(&mut self, nominal_ms: u32, max_ms: u32) {
        self.nominal_depth_ms = nominal_ms;
        self.max_depth_ms = if max_ms >= nominal_ms {
            max_ms
        } else {
            nominal_ms.saturating_mul(2)
        };
        debug!(
            "Jitter buffer depth set: nominal={}ms max={}ms",
            self.nominal_depth_ms, self.max_depth_ms
        );
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.depth_ms = 0;
        self.first_buffered_seq = 0;
        self.last_buffered_seq = 0;
        self.last_popped_seq = 0;
        self.last_played = None;
        self.buffering = BufferingState::new();
        self.estimator.restart();
    }

    fn reject(&mut self, err: JitterError) -> Result<PushOutcome, JitterError> {
        self.stats.bad_packets += 1;
        debug!("Rejected packet: {}", err);
        Err(err)
    }

    fn push(&mut self, packet: PacketEnvelope, now: Instant) -> Result<PushOutcome, JitterError> {
        let seq = packet.sequence();
        if packet.is_empty() {
            return self.reject(JitterError::EmptyPayload { seq });
        }

        if packet.sample_rate() != self.sample_rate {
            debug!(
                "Packet seq={} is clocked at {}Hz, jitter is estimated at {}Hz",
                seq,
                packet.sample_rate(),
                self.sample_rate
            );
        }
        self.estimator.update(packet.timestamp(), now);

        let placement = if self.queue.is_empty() {
            // Drained: whatever arrives re-anchors the stream. Only forget the
            // played history when the stream has restarted behind it.
            if self.already_played(seq) {
                debug!(
                    "Stream restarted at seq={} after drain (last played {:?})",
                    seq, self.last_played
                );
                self.last_played = None;
            }
            Placement::Tail
        } else {
            match seq_cmp(seq, self.last_buffered_seq) {
                Ordering::Greater => Placement::Tail,
                Ordering::Equal => return self.reject(JitterError::Duplicate { seq }),
                Ordering::Less => {
                    if self.queue.iter().any(|p| p.sequence() == seq) {
                        return self.reject(JitterError::Duplicate { seq });
                    }
                    self.stats.out_of_order += 1;
                    let before_head = self.first_buffered_seq.wrapping_sub(1);
                    if self.already_played(seq) || seq_lt(seq, before_head) {
                        return self.reject(self.too_late(seq));
                    }
                    trace!(
                        "Out-of-order packet: seq={} (newest buffered {})",
                        seq,
                        self.last_buffered_seq
                    );
                    if seq == before_head {
                        Placement::Head
                    } else {
                        Placement::Sorted
                    }
                }
            }
        };

        // Judged before eviction can move the head
        let no_gap_open = self.last_popped_seq == self.first_buffered_seq;
        let evicted = self.make_room(packet.payload_ms() as u32);
        self.depth_ms += packet.payload_ms() as u32;

        match placement {
            Placement::Tail => {
                self.queue.push_back(packet);
                self.last_buffered_seq = seq;
            }
            Placement::Head => {
                if no_gap_open {
                    self.last_popped_seq = seq;
                }
                self.queue.push_front(packet);
                self.first_buffered_seq = seq;
            }
            Placement::Sorted => {
                let idx = self
                    .queue
                    .iter()
                    .position(|p| seq_gt(p.sequence(), seq))
                    .unwrap_or(self.queue.len());
                self.queue.insert(idx, packet);
            }
        }

        if self.queue.len() == 1 {
            // Fresh start: expect exactly this packet next
            self.first_buffered_seq = seq;
            self.last_buffered_seq = seq;
            self.last_popped_seq = seq;
        } else {
            // Eviction may have left a sorted arrival at the front
            self.sync_head();
        }

        self.stats.packets_received += 1;
        self.buffering.note_arrival(now);
        trace!(
            "Buffered packet: seq={}, depth={} ({}ms)",
            seq,
            self.queue.len(),
            self.depth_ms
        );

        if evicted > 0 {
            Ok(PushOutcome::Overflow { evicted })
        } else {
            Ok(PushOutcome::Accepted)
        }
    }

    fn already_played(&self, seq: u16) -> bool {
        self.last_played.is_some_and(|played| seq_le(seq, played))
    }

    fn too_late(&self, seq: u16) -> JitterError {
        JitterError::TooLate {
            seq,
            head: self.first_buffered_seq,
            last_popped: self.last_popped_seq,
        }
    }

    /// Evict from the head until `incoming_ms` fits under the cap
    fn make_room(&mut self, incoming_ms: u32) -> usize {
        let mut evicted = 0;
        while self.depth_ms + incoming_ms > self.max_depth_ms {
            let Some(old) = self.queue.pop_front() else {
                break;
            };
            self.depth_ms = self.depth_ms.saturating_sub(old.payload_ms() as u32);
            self.stats.overflows += 1;
            evicted += 1;
            warn!(
                "Buffer overflow, dropped packet: seq={} (cap {}ms)",
                old.sequence(),
                self.max_depth_ms
            );
        }
        if evicted > 0 {
            self.sync_head();
        }
        evicted
    }

    fn sync_head(&mut self) {
        self.first_buffered_seq = match self.queue.front() {
            Some(head) => head.sequence(),
            None => self.last_popped_seq,
        };
    }

    fn pop(&mut self, now: Instant) -> PopOutcome {
        let Some(head) = self.queue.front() else {
            self.buffering.enter();
            self.stats.empty_pops += 1;
            trace!("Pop on empty buffer");
            return PopOutcome::Empty;
        };
        let head_seq = head.sequence();
        let redundant = head.is_redundant_type();

        if self.buffering.hold(now, self.nominal_depth_ms, self.depth_ms) {
            return PopOutcome::Buffering;
        }

        let expected = self.last_popped_seq;
        let verdict = if head_seq == expected || is_next(expected, head_seq) {
            Verdict::Deliver
        } else if redundant && expected.wrapping_add(2) == head_seq {
            Verdict::RedundantHold
        } else {
            Verdict::Gap
        };

        match verdict {
            Verdict::Deliver => self
                .queue
                .pop_front()
                .map(|packet| {
                    self.depth_ms = self.depth_ms.saturating_sub(packet.payload_ms() as u32);
                    self.last_popped_seq = head_seq;
                    self.last_played = Some(head_seq);
                    self.sync_head();
                    self.stats.packets_delivered += 1;
                    trace!("Delivered packet: seq={}", head_seq);
                    PopOutcome::Delivered(packet)
                })
                .unwrap_or(PopOutcome::Empty),
            Verdict::RedundantHold => {
                // The head stays queued and is delivered again as the primary
                // frame on the next pop (last_popped == head)
                let stand_in = self.queue.front().map(PacketEnvelope::as_redundant_stand_in);
                self.last_popped_seq = head_seq;
                self.last_played = Some(head_seq.wrapping_sub(1));
                self.stats.packets_delivered += 1;
                debug!(
                    "Missing seq={}, using redundant data from seq={}",
                    expected.wrapping_add(1),
                    head_seq
                );
                stand_in.map_or(PopOutcome::Empty, PopOutcome::Delivered)
            }
            Verdict::Gap => {
                self.last_popped_seq = expected.wrapping_add(1);
                self.last_played = Some(self.last_popped_seq);
                self.stats.dropped += 1;
                debug!(
                    "Packet lost: seq={} (head is {}, {} still missing)",
                    self.last_popped_seq,
                    head_seq,
                    seq_distance(self.last_popped_seq, head_seq).saturating_sub(1)
                );
                PopOutcome::Dropped
            }
        }
    }

    fn eot_detected(&mut self) {
        self.first_buffered_seq = 0;
        self.last_buffered_seq = 0;
        self.last_popped_seq = 0;
        self.last_played = None;
        // Whatever is still queued belongs to the old talkspurt; seat the
        // cursors on it so it drains instead of reading as a gap
        if let (Some(head), Some(tail)) = (self.queue.front(), self.queue.back()) {
            self.first_buffered_seq = head.sequence();
            self.last_popped_seq = head.sequence();
            self.last_buffered_seq = tail.sequence();
        }
        debug!("End of talkspurt, sequence tracking reset");
    }

    fn snapshot(&self) -> JitterStats {
        JitterStats {
            jitter: self.estimator.jitter(),
            max_jitter: self.estimator.max_jitter(),
            jitter_ms: self.estimator.jitter_ms(),
            max_jitter_ms: self.estimator.max_jitter_ms(),
            current_depth: self.queue.len(),
            current_depth_ms: self.depth_ms,
            ..self.stats.clone()
        }
    }
}

fn checked_sample_rate(sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        warn!(
            "Sample rate of 0 is invalid, using {}Hz",
            DEFAULT_SAMPLE_RATE
        );
        DEFAULT_SAMPLE_RATE
    } else {
        sample_rate
    }
}

/// Thread-safe jitter buffer for a single RTP stream.
///
/// Every method takes `&self` and holds one internal lock only for in-memory
/// work, so a receive thread and a playout thread can share it through an
/// `Arc` without either blocking on the other's I/O.
#[derive(Debug)]
pub struct JitterBuffer {
    inner: Mutex<Inner>,
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_MS, DEFAULT_SAMPLE_RATE)
    }
}

impl JitterBuffer {
    /// Create a buffer holding back `depth_ms` of audio, capped at twice that
    pub fn new(depth_ms: u32, sample_rate: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::new(depth_ms, 0, sample_rate)),
        }
    }

    pub fn from_config(config: &JitterConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new(
                config.depth_ms,
                config.max_depth_ms,
                config.sample_rate,
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // All state is plain data; a panic elsewhere cannot leave it torn
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start over with a new depth and sample rate, clearing all statistics
    pub fn init(&self, depth_ms: u32, sample_rate: u32) {
        *self.lock() = Inner::new(depth_ms, 0, sample_rate);
    }

    pub fn push(&self, packet: PacketEnvelope) -> Result<PushOutcome, JitterError> {
        self.push_at(packet, Instant::now())
    }

    /// Push with an explicit arrival time (replay and tests)
    pub fn push_at(&self, packet: PacketEnvelope, now: Instant) -> Result<PushOutcome, JitterError> {
        self.lock().push(packet, now)
    }

    pub fn pop(&self) -> PopOutcome {
        self.pop_at(Instant::now())
    }

    /// Pop with an explicit playout time (replay and tests)
    pub fn pop_at(&self, now: Instant) -> PopOutcome {
        self.lock().pop(now)
    }

    /// Drop everything queued and start buffering again.
    ///
    /// Depth settings, sample rate and cumulative statistics survive.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Set the nominal playout delay. `max_ms` below `nominal_ms` (including
    /// 0) caps the buffer at twice the nominal delay.
    pub fn set_depth(&self, nominal_ms: u32, max_ms: u32) {
        self.lock().set_depth(nominal_ms, max_ms);
    }

    /// Number of packets queued
    pub fn depth(&self) -> usize {
        self.lock().queue.len()
    }

    /// Milliseconds of audio queued
    pub fn depth_ms(&self) -> u32 {
        self.lock().depth_ms
    }

    pub fn nominal_depth(&self) -> u32 {
        self.lock().nominal_depth_ms
    }

    pub fn max_depth(&self) -> u32 {
        self.lock().max_depth_ms
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn buffering(&self) -> bool {
        self.lock().buffering.is_buffering
    }

    /// Signal a talkspurt boundary so the next packets are not judged
    /// against the previous talkspurt's sequence numbers
    pub fn eot_detected(&self) {
        self.lock().eot_detected();
    }

    pub fn overflow_count(&self) -> u64 {
        self.lock().stats.overflows
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.lock().stats.out_of_order
    }

    pub fn empty_count(&self) -> u64 {
        self.lock().stats.empty_pops
    }

    pub fn dropped_count(&self) -> u64 {
        self.lock().stats.dropped
    }

    /// Interarrival jitter in timestamp units
    pub fn jitter(&self) -> f64 {
        self.lock().estimator.jitter()
    }

    pub fn max_jitter(&self) -> f64 {
        self.lock().estimator.max_jitter()
    }

    pub fn stats(&self) -> JitterStats {
        self.lock().snapshot()
    }
}
