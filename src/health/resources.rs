use crate::error::VigilError;
use serde::Serialize;
use std::sync::Mutex;
use sysinfo::System;
use tracing::debug;

/// Host-wide CPU and memory utilisation, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

impl ResourceSample {
    pub fn new(cpu_percent: f32, memory_percent: f32) -> Self {
        Self {
            cpu_percent,
            memory_percent,
        }
    }

    /// "No pressure" reading used when sampling is not possible
    pub fn neutral() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Whether either level is above its threshold
    pub fn exceeds(&self, cpu_threshold: f32, memory_threshold: f32) -> bool {
        self.cpu_percent > cpu_threshold || self.memory_percent > memory_threshold
    }
}

/// Source of host resource readings
pub trait ResourceSampler: Send + Sync {
    /// Never fails; an unavailable reading is reported as neutral
    fn sample(&self) -> ResourceSample;
}

/// `ResourceSampler` backed by sysinfo
pub struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta; prime it so the first sample is meaningful
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }

    fn unavailable(reason: &str) -> ResourceSample {
        debug!("{}", VigilError::ResourceSampleUnavailable(reason.to_string()));
        ResourceSample::neutral()
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&self) -> ResourceSample {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Self::unavailable("platform not supported by sysinfo");
        }

        let Ok(mut system) = self.system.lock() else {
            return Self::unavailable("sampler lock poisoned");
        };

        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Self::unavailable("total memory reported as zero");
        }

        let cpu_percent = system.global_cpu_usage();
        let memory_percent = (system.used_memory() as f64 / total as f64 * 100.0) as f32;

        ResourceSample::new(
            if cpu_percent.is_finite() { cpu_percent } else { 0.0 },
            memory_percent,
        )
    }
}
