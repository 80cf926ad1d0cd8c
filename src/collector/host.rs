//! Host resource sampling for post payloads
//!
//! Snapshots carry the process's committed memory and CPU usage alongside
//! the telemetry counters. Sampling is best-effort: when the process cannot
//! be inspected the CPU reading goes negative and memory falls back to zero.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// One best-effort reading of host resources
#[derive(Debug, Clone, Copy)]
pub struct HostSample {
    /// Committed memory in bytes, 0 when unavailable
    pub memory_committed: u64,
    /// CPU percent; negative when no reading is available
    pub cpu_percent: f64,
}

/// Samples committed memory and CPU usage for the current process
///
/// CPU is reported as a percentage of one core divided across all cores,
/// unless normalization is disabled for dashboards that expect the literal
/// per-core reading.
#[derive(Debug)]
pub struct HostMonitor {
    system: System,
    pid: Option<Pid>,
    cores: usize,
    normalize_cpu: bool,
}

impl HostMonitor {
    #[must_use]
    pub fn new(normalize_cpu: bool) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
        );
        let pid = sysinfo::get_current_pid().ok();
        if let Some(pid) = pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        }
        let cores = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);

        Self {
            system,
            pid,
            cores,
            normalize_cpu,
        }
    }

    /// Refresh and read current host resources
    ///
    /// The first call may report zero CPU; sysinfo needs two samples.
    #[must_use]
    pub fn sample(&mut self) -> HostSample {
        let Some(pid) = self.pid else {
            return HostSample {
                memory_committed: 0,
                cpu_percent: -1.0,
            };
        };

        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        match self.system.process(pid) {
            Some(process) => {
                let raw = f64::from(process.cpu_usage());
                let cpu_percent = if self.normalize_cpu {
                    raw / self.cores as f64
                } else {
                    raw
                };
                HostSample {
                    memory_committed: process.memory(),
                    cpu_percent,
                }
            }
            None => HostSample {
                memory_committed: 0,
                cpu_percent: -1.0,
            },
        }
    }
}
