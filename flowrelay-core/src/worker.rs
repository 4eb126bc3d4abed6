//! Worker lifecycle types consumed by the topology layer. The supervisor
//! runtime pairs each worker's lifecycle state with its most recent
//! heartbeat; this crate only reads those snapshots, it never drives the
//! lifecycle itself.

use std::fmt;

use crate::collective::TaskId;

/// Lifecycle state of a worker process as tracked by its supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Active,
    Killed,
}

/// Most recent heartbeat reported by a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerHeartbeat {
    /// Report time, epoch seconds.
    hb_time: i64,
    port: u16,
    tasks: Vec<TaskId>,
}

impl WorkerHeartbeat {
    pub fn new(hb_time: i64, port: u16, tasks: Vec<TaskId>) -> Self {
        WorkerHeartbeat {
            hb_time,
            port,
            tasks,
        }
    }

    pub fn hb_time(&self) -> i64 {
        self.hb_time
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }
}

/// A worker's lifecycle state paired with its last reported heartbeat.
/// Immutable snapshot; the supervisor publishes a fresh value every sweep.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerHealth {
    state: WorkerState,
    heartbeat: WorkerHeartbeat,
}

impl WorkerHealth {
    pub fn new(state: WorkerState, heartbeat: WorkerHeartbeat) -> Self {
        WorkerHealth { state, heartbeat }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn heartbeat(&self) -> &WorkerHeartbeat {
        &self.heartbeat
    }
}

impl fmt::Debug for WorkerHealth {
    /// Formats as `<state>(hb=<secs>,port=<port>,tasks=<count>)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            WorkerState::Starting => "starting",
            WorkerState::Active => "active",
            WorkerState::Killed => "killed",
        };
        write!(
            f,
            "{}(hb={},port={},tasks={})",
            state,
            self.heartbeat.hb_time,
            self.heartbeat.port,
            self.heartbeat.tasks.len()
        )
    }
}
