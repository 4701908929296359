use anyhow::{bail, Context, Result};
use std::env;

use crate::rtp::{DEFAULT_DEPTH_MS, DEFAULT_SAMPLE_RATE};

/// Longest playout delay we accept; beyond this conversation becomes awkward
const MAX_REASONABLE_DEPTH_MS: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitterConfig {
    /// Nominal playout delay before output starts
    pub depth_ms: u32,
    /// Hard cap on buffered audio; 0 (or anything below depth_ms) means 2x depth
    pub max_depth_ms: u32,
    /// RTP clock rate of the stream, used for jitter units
    pub sample_rate: u32,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            depth_ms: DEFAULT_DEPTH_MS,
            max_depth_ms: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl JitterConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(JitterConfig {
            depth_ms: get("JITTER_DEPTH_MS")
                .unwrap_or_else(|| DEFAULT_DEPTH_MS.to_string())
                .parse()
                .context("JITTER_DEPTH_MS must be a whole number of milliseconds")?,
            max_depth_ms: get("JITTER_MAX_DEPTH_MS")
                .unwrap_or_else(|| "0".to_string())
                .parse()
                .context("JITTER_MAX_DEPTH_MS must be a whole number of milliseconds")?,
            sample_rate: get("JITTER_SAMPLE_RATE")
                .unwrap_or_else(|| DEFAULT_SAMPLE_RATE.to_string())
                .parse()
                .context("JITTER_SAMPLE_RATE must be a whole number of Hz")?,
        })
    }

    /// Cap the buffer will actually use
    pub fn effective_max_depth_ms(&self) -> u32 {
        if self.max_depth_ms >= self.depth_ms {
            self.max_depth_ms
        } else {
            self.depth_ms.saturating_mul(2)
        }
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.depth_ms == 0 {
            errors.push("JITTER_DEPTH_MS must be greater than 0.".to_string());
        } else if self.depth_ms > MAX_REASONABLE_DEPTH_MS {
            errors.push(format!(
                "JITTER_DEPTH_MS={} seems too long (max recommended: {}).",
                self.depth_ms, MAX_REASONABLE_DEPTH_MS
            ));
        }

        if self.max_depth_ms != 0 && self.max_depth_ms < self.depth_ms {
            errors.push(format!(
                "JITTER_MAX_DEPTH_MS={} is below JITTER_DEPTH_MS={}; it would be replaced by {}.",
                self.max_depth_ms,
                self.depth_ms,
                self.effective_max_depth_ms()
            ));
        }

        if !Self::is_valid_sample_rate(self.sample_rate) {
            errors.push(format!(
                "JITTER_SAMPLE_RATE={} is not a supported RTP clock rate.",
                self.sample_rate
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    /// Audio clock rates seen in practice
    fn is_valid_sample_rate(rate: u32) -> bool {
        matches!(rate, 8000 | 11025 | 16000 | 22050 | 32000 | 44100 | 48000 | 90000)
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn effective_cap_never_below_depth() {
        let depth: u32 = kani::any();
        let max: u32 = kani::any();
        kani::assume(depth <= u32::MAX / 2);
        let config = JitterConfig { depth_ms: depth, max_depth_ms: max, sample_rate: 8000 };
        kani::assert(config.effective_max_depth_ms() >= depth, "cap must cover depth");
    }
}
