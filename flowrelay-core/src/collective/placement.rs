//! Normalizes the raw placement map into the locality-first traversal order
//! used by the pipeline builder: the root's supervisor first, the root's
//! worker first within it, everything else in ascending id/port order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collective::TaskId;
use crate::error::{Error, Result};

/// Nested placement mapping for one execution group:
/// supervisor id -> worker port -> tasks hosted by that worker.
pub type PlacementMap = BTreeMap<String, BTreeMap<u16, BTreeSet<TaskId>>>;

/// Placement of one execution group as published by the assignment
/// subsystem, together with the location of the task that originates the
/// broadcast/gather.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlacement {
    /// Which supervisor hosts which worker, and which tasks each worker runs.
    pub placements: PlacementMap,
    /// Task originating the broadcast/gather.
    pub root_task: TaskId,
    /// Supervisor hosting the root task.
    pub root_supervisor: String,
    /// Worker port hosting the root task.
    pub root_port: u16,
}

impl TaskPlacement {
    /// Structural consistency check: every task must be assigned to exactly
    /// one worker. The pipeline builder does not require this to be called;
    /// callers that prefer failing fast over building a lopsided pipeline
    /// can run it before [`crate::collective::RelayPipeline::build`].
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<TaskId> = HashSet::new();
        for (supervisor, workers) in &self.placements {
            for (port, tasks) in workers {
                for task in tasks {
                    if !seen.insert(*task) {
                        return Err(Error::Placement(format!(
                            "Task {task} appears in more than one worker (last seen in {supervisor}:{port})"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One worker process and the tasks it hosts, in relay traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerGroup {
    pub(crate) port: u16,
    /// Task ids hosted in this worker, ascending. The first entry becomes
    /// the worker's gateway.
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) pinned: bool,
}

impl WorkerGroup {
    /// Traversal order within a supervisor: pinned first, then ascending port.
    fn relay_order(&self, other: &Self) -> Ordering {
        other
            .pinned
            .cmp(&self.pinned)
            .then_with(|| self.port.cmp(&other.port))
    }
}

/// One supervisor and its workers, in relay traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SupervisorGroup {
    pub(crate) id: String,
    pub(crate) workers: Vec<WorkerGroup>,
    pub(crate) pinned: bool,
}

impl SupervisorGroup {
    /// Traversal order across supervisors: pinned first, then ascending id.
    fn relay_order(&self, other: &Self) -> Ordering {
        other
            .pinned
            .cmp(&self.pinned)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Groups the placement map for deterministic, locality-first traversal.
///
/// The root's supervisor group sorts before every other supervisor group and
/// the root's worker group sorts before every other worker of that
/// supervisor, so the first hop of the chain stays inside the root's own
/// process. If the root location does not match any entry, nothing is pinned
/// and the order falls back to plain ascending id/port.
///
/// Workers with no assigned tasks cannot nominate a gateway and are skipped;
/// their supervisor group is kept so the chain-split index is computed over
/// the same supervisor count the input had.
pub(crate) fn build_supervisor_groups(placement: &TaskPlacement) -> Vec<SupervisorGroup> {
    let mut groups = Vec::with_capacity(placement.placements.len());
    for (supervisor, workers) in &placement.placements {
        let mut worker_groups = Vec::with_capacity(workers.len());
        for (&port, tasks) in workers {
            if tasks.is_empty() {
                warn!(
                    supervisor = supervisor.as_str(),
                    port, "Skipping worker with no assigned tasks"
                );
                continue;
            }
            worker_groups.push(WorkerGroup {
                port,
                // BTreeSet iteration yields ascending task ids.
                tasks: tasks.iter().copied().collect(),
                pinned: *supervisor == placement.root_supervisor && port == placement.root_port,
            });
        }
        worker_groups.sort_by(|a, b| a.relay_order(b));
        groups.push(SupervisorGroup {
            id: supervisor.clone(),
            workers: worker_groups,
            pinned: *supervisor == placement.root_supervisor,
        });
    }
    groups.sort_by(|a, b| a.relay_order(b));
    groups
}
