/// Impaired-network playout simulation
///
/// A sender emits G.711 packets at a fixed cadence through a lossy path with
/// random delay (which also reorders them); a player pops the shared jitter
/// buffer at the same cadence. Used by the `rtpjitter` binary to try out
/// depth settings, and by the integration tests.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rtp::header::{RtpHeader, RTP_HEADER_LENGTH};
use crate::rtp::{ms_to_timestamp_units, payload_type, JitterBuffer, JitterStats, PacketEnvelope, PopOutcome};

/// G.711 silence (u-law)
const ULAW_SILENCE: u8 = 0xFF;

#[derive(Debug, Clone)]
pub struct NetworkProfile {
    /// Probability that a packet never arrives
    pub loss: f64,
    /// Upper bound on extra one-way delay; actual delay is uniform in 0..=max
    pub max_delay_ms: u64,
    pub packet_ms: u32,
    pub sample_rate: u32,
    pub seed: u64,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            loss: 0.02,
            max_delay_ms: 60,
            packet_ms: 20,
            sample_rate: 8000,
            seed: 1,
        }
    }
}

impl NetworkProfile {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.loss) {
            bail!("loss must be between 0 and 1, got {}", self.loss);
        }
        if self.packet_ms == 0 {
            bail!("packet duration must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub packets_sent: u64,
    pub lost_in_network: u64,
    pub played: u64,
    pub played_redundant: u64,
    pub concealed: u64,
    pub buffering_polls: u64,
    pub empty_polls: u64,
    pub buffer: JitterStats,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    lost: AtomicU64,
}

/// Build one G.711 RTP packet as it would come off the wire
pub fn wire_packet(sequence: u16, timestamp: u32, ssrc: u32, payload_len: usize) -> Vec<u8> {
    let header = RtpHeader {
        marker: false,
        payload_type: payload_type::PCMU,
        sequence,
        timestamp,
        ssrc,
        payload_offset: RTP_HEADER_LENGTH,
        payload_end: RTP_HEADER_LENGTH + payload_len,
    };
    let mut packet = Vec::with_capacity(RTP_HEADER_LENGTH + payload_len);
    header.write_fixed(&mut packet);
    packet.resize(RTP_HEADER_LENGTH + payload_len, ULAW_SILENCE);
    packet
}

/// Run sender and player against `buffer` until `duration` elapses or
/// `cancel` fires.
pub async fn run(
    buffer: Arc<JitterBuffer>,
    profile: NetworkProfile,
    duration: Duration,
    cancel: CancellationToken,
) -> Result<SimReport> {
    profile.validate()?;

    let counters = Arc::new(Counters::default());
    let stop = cancel.child_token();
    let tick = Duration::from_millis(profile.packet_ms as u64);

    let sender = tokio::spawn(send_loop(
        Arc::clone(&buffer),
        profile.clone(),
        Arc::clone(&counters),
        stop.clone(),
    ));

    let player = {
        let buffer = Arc::clone(&buffer);
        let stop = stop.clone();
        tokio::spawn(async move { play_loop(buffer, tick, stop).await })
    };

    tokio::select! {
        _ = sleep(duration) => debug!("Simulation time elapsed"),
        _ = cancel.cancelled() => info!("Simulation cancelled"),
    }
    stop.cancel();

    sender.await?;
    let playout = player.await?;

    Ok(SimReport {
        packets_sent: counters.sent.load(Ordering::Relaxed),
        lost_in_network: counters.lost.load(Ordering::Relaxed),
        played: playout.played,
        played_redundant: playout.played_redundant,
        concealed: playout.concealed,
        buffering_polls: playout.buffering,
        empty_polls: playout.empty,
        buffer: buffer.stats(),
    })
}

async fn send_loop(
    buffer: Arc<JitterBuffer>,
    profile: NetworkProfile,
    counters: Arc<Counters>,
    stop: CancellationToken,
) {
    let mut rng = StdRng::seed_from_u64(profile.seed);
    let mut ticker = interval(Duration::from_millis(profile.packet_ms as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let ts_step = ms_to_timestamp_units(profile.packet_ms, profile.sample_rate);
    let payload_len = ts_step as usize; // 8-bit samples
    let ssrc: u32 = rng.gen();
    let mut sequence: u16 = rng.gen();
    let mut timestamp: u32 = rng.gen();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.cancelled() => break,
        }

        let packet = wire_packet(sequence, timestamp, ssrc, payload_len);
        counters.sent.fetch_add(1, Ordering::Relaxed);
        sequence = sequence.wrapping_add(1);
        timestamp = timestamp.wrapping_add(ts_step);

        if rng.gen_bool(profile.loss) {
            counters.lost.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let delay = Duration::from_millis(rng.gen_range(0..=profile.max_delay_ms));
        let buffer = Arc::clone(&buffer);
        let stop = stop.clone();
        let packet_ms = profile.packet_ms as u16;
        let sample_rate = profile.sample_rate;
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop.cancelled() => return,
            }
            match PacketEnvelope::parse(packet, sample_rate, Some(packet_ms)) {
                Ok(envelope) => {
                    if let Err(e) = buffer.push(envelope) {
                        debug!("Packet refused: {}", e);
                    }
                }
                Err(e) => warn!("Malformed RTP packet: {}", e),
            }
        });
    }
}

#[derive(Debug, Default)]
struct Playout {
    played: u64,
    played_redundant: u64,
    concealed: u64,
    buffering: u64,
    empty: u64,
}

async fn play_loop(buffer: Arc<JitterBuffer>, tick: Duration, stop: CancellationToken) -> Playout {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut playout = Playout::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.cancelled() => break,
        }

        match buffer.pop() {
            PopOutcome::Delivered(packet) => {
                if packet.use_redundant_payload() {
                    playout.played_redundant += 1;
                } else {
                    playout.played += 1;
                }
            }
            PopOutcome::Dropped => playout.concealed += 1,
            PopOutcome::Buffering => playout.buffering += 1,
            PopOutcome::Empty => playout.empty += 1,
        }
    }

    playout
}
