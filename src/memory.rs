//! Memory-pressure classification and chunked-render configuration.
//!
//! The chunked render path adapts its batch size and inter-chunk pause to the live
//! used-memory fraction. The probe is a trait so tests inject fixed readings instead of
//! touching process-wide state.

use std::time::Duration;

/// Lower bound on frames rendered per chunk.
pub const MIN_CHUNK_FRAMES: usize = 25;
/// Upper bound on frames rendered per chunk.
pub const MAX_CHUNK_FRAMES: usize = 200;

/// Classification of the current used-memory fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum MemoryPressure {
    /// Below 60% used.
    Healthy,
    /// 60–75% used.
    Warning,
    /// 75–90% used.
    Critical,
    /// 90% and above.
    Emergency,
}

impl MemoryPressure {
    /// Classify a used-memory fraction in `[0, 1]`.
    pub fn classify(used_fraction: f64) -> Self {
        if used_fraction < 0.60 {
            Self::Healthy
        } else if used_fraction < 0.75 {
            Self::Warning
        } else if used_fraction < 0.90 {
            Self::Critical
        } else {
            Self::Emergency
        }
    }
}

/// Chunked-render configuration derived from a pressure classification.
///
/// Recomputed per generation request; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Frames rendered per batch, within `MIN_CHUNK_FRAMES..=MAX_CHUNK_FRAMES`.
    pub chunk_size: usize,
    /// Cooperative pause between chunks, giving the allocator a reclamation window.
    pub inter_chunk_pause: Duration,
}

impl MemoryConfig {
    /// Derive the chunk configuration for a pressure level.
    pub fn for_pressure(pressure: MemoryPressure) -> Self {
        let (chunk_size, pause_ms) = match pressure {
            MemoryPressure::Healthy => (MAX_CHUNK_FRAMES, 0),
            MemoryPressure::Warning => (100, 50),
            MemoryPressure::Critical => (50, 150),
            MemoryPressure::Emergency => (MIN_CHUNK_FRAMES, 400),
        };
        Self {
            chunk_size,
            inter_chunk_pause: Duration::from_millis(pause_ms),
        }
    }
}

/// Source of used-memory readings.
pub trait MemoryProbe {
    /// Current used-memory fraction in `[0, 1]`.
    fn used_fraction(&mut self) -> f64;
}

/// Probe backed by [`sysinfo`] system memory counters.
pub struct SystemMemoryProbe {
    sys: sysinfo::System,
}

impl SystemMemoryProbe {
    /// Create a probe over the host's memory counters.
    pub fn new() -> Self {
        Self {
            sys: sysinfo::System::new(),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn used_fraction(&mut self) -> f64 {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.sys.used_memory() as f64 / total as f64
    }
}

/// Probe returning a fixed fraction. Intended for tests and dry runs.
#[derive(Clone, Copy, Debug)]
pub struct FixedMemoryProbe(pub f64);

impl MemoryProbe for FixedMemoryProbe {
    fn used_fraction(&mut self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(MemoryPressure::classify(0.0), MemoryPressure::Healthy);
        assert_eq!(MemoryPressure::classify(0.59), MemoryPressure::Healthy);
        assert_eq!(MemoryPressure::classify(0.60), MemoryPressure::Warning);
        assert_eq!(MemoryPressure::classify(0.74), MemoryPressure::Warning);
        assert_eq!(MemoryPressure::classify(0.75), MemoryPressure::Critical);
        assert_eq!(MemoryPressure::classify(0.89), MemoryPressure::Critical);
        assert_eq!(MemoryPressure::classify(0.90), MemoryPressure::Emergency);
        assert_eq!(MemoryPressure::classify(1.0), MemoryPressure::Emergency);
    }

    #[test]
    fn chunk_sizes_stay_within_bounds() {
        for p in [
            MemoryPressure::Healthy,
            MemoryPressure::Warning,
            MemoryPressure::Critical,
            MemoryPressure::Emergency,
        ] {
            let cfg = MemoryConfig::for_pressure(p);
            assert!(cfg.chunk_size >= MIN_CHUNK_FRAMES);
            assert!(cfg.chunk_size <= MAX_CHUNK_FRAMES);
        }
    }

    #[test]
    fn degraded_pressure_pauses_longer_and_batches_smaller() {
        let healthy = MemoryConfig::for_pressure(MemoryPressure::Healthy);
        let emergency = MemoryConfig::for_pressure(MemoryPressure::Emergency);
        assert!(emergency.chunk_size < healthy.chunk_size);
        assert!(emergency.inter_chunk_pause > healthy.inter_chunk_pause);
    }

    #[test]
    fn fixed_probe_reports_its_value() {
        let mut p = FixedMemoryProbe(0.42);
        assert_eq!(p.used_fraction(), 0.42);
    }
}
