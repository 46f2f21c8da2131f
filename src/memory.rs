//! Process memory sampling used to adapt batch sizing.
//!
//! On Linux the resident set size comes from `/proc/self/statm`; other
//! platforms report zero, which disables adaptation rather than failing.

use std::sync::Arc;

use tracing::debug;

/// Seam for memory sampling so tests can script observed growth.
pub trait MemorySampler: Send + Sync {
    /// Current resident set size in bytes, or 0 when unavailable.
    fn rss_bytes(&self) -> u64;
}

/// Samples the real process RSS.
#[derive(Debug, Default)]
pub struct ProcessMemorySampler;

impl MemorySampler for ProcessMemorySampler {
    #[cfg(target_os = "linux")]
    fn rss_bytes(&self) -> u64 {
        let statm = match std::fs::read_to_string("/proc/self/statm") {
            Ok(s) => s,
            Err(_) => return 0,
        };
        // Second field is resident pages.
        let pages: u64 = statm
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        pages * page_size()
    }

    #[cfg(not(target_os = "linux"))]
    fn rss_bytes(&self) -> u64 {
        0
    }
}

#[cfg(all(unix, target_os = "linux"))]
fn page_size() -> u64 {
    // SAFETY: sysconf with a valid name has no failure modes beyond -1.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// Monitors memory usage around units of work.
#[derive(Clone)]
pub struct MemoryMonitor {
    sampler: Arc<dyn MemorySampler>,
}

/// One before/after measurement pair.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub before_bytes: u64,
    pub after_bytes: u64,
}

impl MemorySample {
    /// Observed growth, saturating at zero when memory shrank.
    pub fn growth_bytes(&self) -> u64 {
        self.after_bytes.saturating_sub(self.before_bytes)
    }
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self {
            sampler: Arc::new(ProcessMemorySampler),
        }
    }

    /// Build a monitor over a custom sampler (used by tests).
    pub fn with_sampler(sampler: Arc<dyn MemorySampler>) -> Self {
        Self { sampler }
    }

    /// Take a point-in-time reading to pair with a later one.
    pub fn snapshot(&self) -> u64 {
        self.sampler.rss_bytes()
    }

    /// Close out a measurement started with `snapshot`.
    pub fn measure_since(&self, before_bytes: u64) -> MemorySample {
        let after_bytes = self.sampler.rss_bytes();
        let sample = MemorySample {
            before_bytes,
            after_bytes,
        };
        debug!(
            "memory sample: {} -> {} bytes (growth {})",
            before_bytes,
            after_bytes,
            sample.growth_bytes()
        );
        sample
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}
