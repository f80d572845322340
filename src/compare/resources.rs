use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Process CPU and resident memory at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// Samples taken around one comparison phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseResources {
    pub before: ResourceSample,
    pub after: ResourceSample,
}

impl PhaseResources {
    pub fn memory_delta_mb(&self) -> f64 {
        self.after.memory_mb - self.before.memory_mb
    }
}

/// Reads this process's usage through `sysinfo`.
pub struct ResourceMonitor {
    inner: Mutex<MonitorState>,
}

struct MonitorState {
    system: System,
    pid: Pid,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes, so take a baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Mutex::new(MonitorState { system, pid }),
        }
    }

    pub fn sample(&self) -> ResourceSample {
        let mut state = self.lock();
        let pid = state.pid;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match state.system.process(pid) {
            Some(process) => ResourceSample {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => ResourceSample::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
