//! Relay-pipeline construction for collective broadcast/gather.
//!
//! The placement map of an execution group is normalized into supervisor and
//! worker groups ordered so that the root task's own worker comes first, then
//! flattened into a chain of relay nodes, one per worker. Each node names the
//! worker's gateway task (the only task that crosses the inter-worker hop),
//! the tasks reachable in memory once data arrives at the gateway, and the
//! gateway of the next node in the chain.

mod placement;
mod pipeline;

pub use placement::{PlacementMap, TaskPlacement};
pub use pipeline::RelayPipeline;

/// Identifier of a single scheduled task within an execution group.
pub type TaskId = i64;

/// Marks a chain boundary: the synthetic head of a chain has no previous
/// task, and the tail of a chain has no target task.
pub(crate) const NO_TASK: TaskId = -1;
