//! Resource usage of the daemon process, reported by the console.

use std::process;

use sysinfo::{Pid, System};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Levels above which the console logs a warning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub cpu_percent: f32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            cpu_percent: 80.0,
        }
    }
}

/// One reading of the daemon's memory and CPU usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub rss_bytes: u64,
    /// Relative to one core, so it can exceed 100 on multi-core hosts.
    pub cpu_percent: f32,
}

impl ResourceSample {
    pub fn rss_mb(&self) -> u64 {
        self.rss_bytes / BYTES_PER_MB
    }

    pub fn memory_over(&self, limits: &ResourceLimits) -> bool {
        self.rss_mb() > limits.memory_mb
    }

    pub fn cpu_over(&self, limits: &ResourceLimits) -> bool {
        self.cpu_percent > limits.cpu_percent
    }
}

/// Samples the current process through `sysinfo`.
///
/// CPU usage is a delta between refreshes; the first sample reads 0.
pub struct ResourceSampler {
    system: System,
    pid: Pid,
    limits: ResourceLimits,
}

impl ResourceSampler {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(process::id()),
            limits,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn sample(&mut self) -> ResourceSample {
        // CPU deltas need the global refresh, not just the process entry
        self.system.refresh_all();

        match self.system.process(self.pid) {
            Some(proc_) => ResourceSample {
                rss_bytes: proc_.memory(),
                cpu_percent: proc_.cpu_usage(),
            },
            None => ResourceSample::default(),
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}
