//! Worker count sizing from available hardware parallelism

use std::fmt;
use std::thread::available_parallelism;

use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Multiplier applied to schedulable cores for I/O-bound pools
pub const IO_BOUND_FACTOR: usize = 5;

/// Multiplier applied to total logical cores for CPU-bound pools
pub const CPU_BOUND_FACTOR: usize = 2;

/// Upper bound on any pool's worker count, including explicit overrides
pub const MAX_WORKERS: usize = 4096;

/// Class of work a pool is sized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadClass {
    /// Dominated by processor cycles
    CpuBound,
    /// Dominated by waiting on disk or network
    IoBound,
}

impl WorkloadClass {
    /// Pool name used in logs and errors
    pub fn pool_name(self) -> &'static str {
        match self {
            WorkloadClass::CpuBound => "cpu-pool",
            WorkloadClass::IoBound => "io-pool",
        }
    }
}

impl fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadClass::CpuBound => f.write_str("cpu-bound"),
            WorkloadClass::IoBound => f.write_str("io-bound"),
        }
    }
}

/// Core counts reported by the host
///
/// Either value may be zero when the platform cannot report it; sizing
/// floors both at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostParallelism {
    /// Logical cores this process may be scheduled on (affinity mask)
    pub schedulable: usize,
    /// All logical cores on the machine
    pub total: usize,
}

impl HostParallelism {
    pub fn new(schedulable: usize, total: usize) -> Self {
        Self { schedulable, total }
    }

    /// Query the current host
    pub fn detect() -> Self {
        let schedulable = available_parallelism().map_or(0, |n| n.get());
        Self {
            schedulable,
            total: online_cpus().max(schedulable),
        }
    }

    /// Worker count for the given class of work
    ///
    /// I/O-bound pools get five workers per schedulable core since their
    /// workers mostly sit idle waiting. CPU-bound pools get two per logical
    /// core. Never returns zero.
    pub fn size(&self, class: WorkloadClass) -> usize {
        match class {
            WorkloadClass::IoBound => IO_BOUND_FACTOR * self.schedulable.max(1),
            WorkloadClass::CpuBound => CPU_BOUND_FACTOR * self.total.max(1),
        }
    }
}

/// Logical CPUs online on the machine, ignoring this process's affinity mask
fn online_cpus() -> usize {
    let system = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    system.cpus().len()
}

/// Worker count for `class` on the current host
pub fn size(class: WorkloadClass) -> usize {
    HostParallelism::detect().size(class)
}
