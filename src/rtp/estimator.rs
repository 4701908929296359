/// Interarrival jitter estimator (RFC 3550 §6.4.1)
///
/// Arrival instants are measured on the local monotonic clock and converted
/// to RTP timestamp units, so transit times and jitter come out in timestamp
/// units. The caller supplies the arrival `Instant`, which keeps the filter
/// deterministic for a replayed trace.

use std::time::Instant;

/// RFC 3550 smoothing gain
const JITTER_GAIN: f64 = 1.0 / 16.0;

#[derive(Debug, Clone)]
pub struct JitterEstimator {
    ts_per_ms: f64,
    jitter: f64,
    max_jitter: f64,
    prev_transit: f64,
    prev_arrival: f64,
    prev_rx: Option<Instant>,
    prev_timestamp: u32,
    /// RTP timestamp unwrapped past the 32-bit boundary
    ext_timestamp: f64,
}

impl JitterEstimator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            ts_per_ms: sample_rate as f64 / 1000.0,
            jitter: 0.0,
            max_jitter: 0.0,
            prev_transit: 0.0,
            prev_arrival: 0.0,
            prev_rx: None,
            prev_timestamp: 0,
            ext_timestamp: 0.0,
        }
    }

    /// Fold one arrival into the estimate
    pub fn update(&mut self, timestamp: u32, now: Instant) {
        let Some(prev_rx) = self.prev_rx else {
            self.ext_timestamp = timestamp as f64;
            self.prev_timestamp = timestamp;
            self.prev_arrival = self.ext_timestamp;
            self.prev_transit = 0.0;
            self.prev_rx = Some(now);
            return;
        };

        // Signed delta so reordered packets step backwards instead of wrapping
        let ts_delta = timestamp.wrapping_sub(self.prev_timestamp) as i32;
        self.ext_timestamp += ts_delta as f64;
        self.prev_timestamp = timestamp;

        let elapsed_ms = now.saturating_duration_since(prev_rx).as_secs_f64() * 1000.0;
        let arrival = self.prev_arrival + elapsed_ms * self.ts_per_ms;
        // Seeded so the first packet has zero transit
        let transit = arrival - self.ext_timestamp;
        let d = (transit - self.prev_transit).abs();

        self.jitter += JITTER_GAIN * (d - self.jitter);
        if self.jitter > self.max_jitter {
            self.max_jitter = self.jitter;
        }

        self.prev_transit = transit;
        self.prev_arrival = arrival;
        self.prev_rx = Some(now);
    }

    /// Forget the previous arrival but keep the running estimate
    pub fn restart(&mut self) {
        self.prev_rx = None;
        self.prev_transit = 0.0;
        self.prev_arrival = 0.0;
    }

    /// Current jitter in timestamp units
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn max_jitter(&self) -> f64 {
        self.max_jitter
    }

    pub fn jitter_ms(&self) -> f64 {
        self.to_ms(self.jitter)
    }

    pub fn max_jitter_ms(&self) -> f64 {
        self.to_ms(self.max_jitter)
    }

    fn to_ms(&self, units: f64) -> f64 {
        if self.ts_per_ms > 0.0 {
            units / self.ts_per_ms
        } else {
            0.0
        }
    }
}
