//! Install statistics types.

use std::time::{Duration, Instant};

/// Summary of one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStats {
    /// Name of the populated cache.
    pub cache_name: String,
    /// Number of assets stored.
    pub assets_cached: usize,
    /// Total body bytes stored.
    pub total_bytes: u64,
    /// Time from install start until all entries were stored.
    pub elapsed: Duration,
}

impl InstallStats {
    /// Returns the average fetch throughput in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Builder for accumulating install statistics as assets arrive.
pub struct InstallStatsBuilder {
    start_time: Instant,
    cache_name: String,
    assets_cached: usize,
    total_bytes: u64,
}

impl InstallStatsBuilder {
    /// Starts timing an install into `cache_name`.
    #[must_use]
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            cache_name: cache_name.into(),
            assets_cached: 0,
            total_bytes: 0,
        }
    }

    /// Records one stored asset.
    pub const fn add_asset(&mut self, bytes: u64) {
        self.assets_cached += 1;
        self.total_bytes += bytes;
    }

    /// Finishes timing and returns the stats.
    #[must_use]
    pub fn build(self) -> InstallStats {
        InstallStats {
            cache_name: self.cache_name,
            assets_cached: self.assets_cached,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates() {
        let mut builder = InstallStatsBuilder::new("mkr1010-cache");
        builder.add_asset(100);
        builder.add_asset(50);
        let stats = builder.build();
        assert_eq!(stats.cache_name, "mkr1010-cache");
        assert_eq!(stats.assets_cached, 2);
        assert_eq!(stats.total_bytes, 150);
    }

    #[test]
    fn average_speed_zero_elapsed() {
        let stats = InstallStats {
            cache_name: String::new(),
            assets_cached: 1,
            total_bytes: 1000,
            elapsed: Duration::ZERO,
        };
        assert_eq!(stats.average_speed(), 0);
    }

    #[test]
    fn average_speed_computed() {
        let stats = InstallStats {
            cache_name: String::new(),
            assets_cached: 1,
            total_bytes: 1000,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(stats.average_speed(), 500);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn average_speed_never_panics(bytes in 0u64..u64::MAX, millis in 0u64..1_000_000) {
                let stats = InstallStats {
                    cache_name: String::new(),
                    assets_cached: 0,
                    total_bytes: bytes,
                    elapsed: Duration::from_millis(millis),
                };
                let _ = stats.average_speed();
            }
        }
    }
}
