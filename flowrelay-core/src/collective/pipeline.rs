//! Builds the relay-node chain out of the normalized supervisor groups and
//! answers the per-task neighborhood queries used by the dispatch layer.

use std::collections::BTreeSet;
use std::fmt;

use tracing::info;

use crate::collective::placement::{SupervisorGroup, TaskPlacement, build_supervisor_groups};
use crate::collective::{NO_TASK, TaskId};

/// One worker's participation in the relay chain.
///
/// `source_task` is the worker's gateway: the single task that receives and
/// sends across the inter-worker hop. Every other task of the worker sits in
/// `in_memory_tasks` and is reached without a network hop once data arrives
/// at the gateway. `previous_task`/`target_task` link the node to its chain
/// neighbors, with [`NO_TASK`] marking the chain boundaries.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct RelayNode {
    pub(crate) previous_task: TaskId,
    pub(crate) source_task: TaskId,
    pub(crate) in_memory_tasks: BTreeSet<TaskId>,
    pub(crate) target_task: TaskId,
}

impl RelayNode {
    /// Synthetic head starting a chain at the root task. Its target is
    /// back-patched as soon as the chain gets its first worker node.
    fn head(root_task: TaskId) -> Self {
        RelayNode {
            previous_task: NO_TASK,
            source_task: root_task,
            in_memory_tasks: BTreeSet::new(),
            target_task: NO_TASK,
        }
    }

    /// Adds every task this node associates with `task_id`: the in-memory
    /// peers, the gateway, and the next hop. `task_id` itself and the
    /// chain-end sentinel are never added.
    fn add_neighbors(&self, task_id: TaskId, out: &mut BTreeSet<TaskId>) {
        out.extend(self.in_memory_tasks.iter().copied().filter(|&t| t != task_id));
        if self.source_task != task_id {
            out.insert(self.source_task);
        }
        if self.target_task >= 0 && self.target_task != task_id {
            out.insert(self.target_task);
        }
    }
}

impl fmt::Debug for RelayNode {
    /// Formats as `p: <previous>, s: <source>, m: <in-memory set>, t: <target>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p: {}, s: {}, m: {:?}, t: {}",
            self.previous_task, self.source_task, self.in_memory_tasks, self.target_task
        )
    }
}

/// Relay pipeline of one execution group, rooted at a single task.
///
/// Built once per placement assignment and read-only afterwards, so any
/// number of readers may query it concurrently. When the placement changes,
/// the surrounding runtime builds a brand-new pipeline and swaps the shared
/// reference; nodes of a live pipeline are never patched in place.
pub struct RelayPipeline {
    root_task: TaskId,
    nodes: Vec<RelayNode>,
}

impl RelayPipeline {
    /// Builds the pipeline for `placement`.
    ///
    /// With `split` disabled the result is a single chain beginning at the
    /// root's own worker. With `split` enabled a second chain is started at
    /// the middle supervisor group, halving the worst-case relay depth; both
    /// chains originate at the root task.
    pub fn build(placement: &TaskPlacement, split: bool) -> Self {
        let groups = build_supervisor_groups(placement);
        let nodes = build_nodes(placement.root_task, &groups, split);
        let pipeline = RelayPipeline {
            root_task: placement.root_task,
            nodes,
        };
        info!(split, "Built relay pipeline {:?}", pipeline);
        pipeline
    }

    /// Task at which the broadcast/gather originates.
    pub fn root_task(&self) -> TaskId {
        self.root_task
    }

    /// Every task `task_id` exchanges data with, across all relay nodes that
    /// reference it: in-memory peers, its worker's gateway, and the next hop
    /// of each such node. Empty when `task_id` is not part of the pipeline.
    pub fn all_associated(&self, task_id: TaskId) -> BTreeSet<TaskId> {
        let mut tasks = BTreeSet::new();
        for node in self.search(task_id) {
            node.add_neighbors(task_id, &mut tasks);
        }
        tasks
    }

    /// Tasks reachable from `task_id` when it acts as its worker's gateway.
    ///
    /// A task that is merely co-located with a gateway forwards to nobody,
    /// so the result is empty for it; the distinction matters when a peer is
    /// promoted to relay duty and must know what the gateway would forward.
    pub fn downstream_of(&self, task_id: TaskId) -> BTreeSet<TaskId> {
        let mut tasks = BTreeSet::new();
        for node in self.search(task_id) {
            if node.source_task == task_id {
                node.add_neighbors(task_id, &mut tasks);
            }
        }
        tasks
    }

    /// Relay nodes referencing `task_id` as gateway or in-memory peer.
    /// A linear scan is fine here: the pipeline is as long as the worker
    /// count, which stays small next to the task count.
    fn search(&self, task_id: TaskId) -> impl Iterator<Item = &RelayNode> {
        self.nodes
            .iter()
            .filter(move |n| n.source_task == task_id || n.in_memory_tasks.contains(&task_id))
    }
}

impl fmt::Debug for RelayPipeline {
    /// Formats as `root=<id> [<node>][<node>]...` with one bracket per relay
    /// node in chain order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root={}", self.root_task)?;
        for node in &self.nodes {
            write!(f, " [{:?}]", node)?;
        }
        Ok(())
    }
}

/// Flattens the ordered supervisor groups into linked relay nodes.
///
/// A synthetic head carrying the root task opens the chain at the first
/// supervisor group and, when `split` is set, a second chain at the middle
/// group. Each worker node is appended with a provisional `-1` target and
/// back-patches the tail it follows, so only the true tail of each chain
/// keeps the sentinel.
fn build_nodes(root_task: TaskId, groups: &[SupervisorGroup], split: bool) -> Vec<RelayNode> {
    let mut nodes: Vec<RelayNode> = Vec::new();
    let half = groups.len() / 2;
    for (i, group) in groups.iter().enumerate() {
        if i == 0 || (split && i == half) {
            nodes.push(RelayNode::head(root_task));
        }
        for worker in &group.workers {
            // The gateway is the numerically smallest task of the worker;
            // the task list is already ascending.
            let Some((&gateway, peers)) = worker.tasks.split_first() else {
                continue;
            };
            let tail = nodes.last_mut().expect("a chain head precedes every worker node");
            let previous_task = tail.source_task;
            tail.target_task = gateway;
            nodes.push(RelayNode {
                previous_task,
                source_task: gateway,
                in_memory_tasks: peers.iter().copied().collect(),
                target_task: NO_TASK,
            });
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collective::PlacementMap;

    fn placement_of(entries: &[(&str, u16, &[TaskId])], root: (TaskId, &str, u16)) -> TaskPlacement {
        let mut placements = PlacementMap::new();
        for (supervisor, port, tasks) in entries {
            placements
                .entry((*supervisor).to_string())
                .or_default()
                .insert(*port, tasks.iter().copied().collect());
        }
        TaskPlacement {
            placements,
            root_task: root.0,
            root_supervisor: root.1.to_string(),
            root_port: root.2,
        }
    }

    fn assert_node(node: &RelayNode, previous: TaskId, source: TaskId, in_memory: &[TaskId], target: TaskId) {
        assert_eq!(node.previous_task, previous, "previous of {:?}", node);
        assert_eq!(node.source_task, source, "source of {:?}", node);
        assert_eq!(
            node.in_memory_tasks,
            in_memory.iter().copied().collect::<BTreeSet<_>>(),
            "in-memory tasks of {:?}",
            node
        );
        assert_eq!(node.target_task, target, "target of {:?}", node);
    }

    fn two_supervisor_placement() -> TaskPlacement {
        placement_of(
            &[("s1", 100, &[5, 6]), ("s1", 101, &[7]), ("s2", 200, &[8])],
            (5, "s1", 100),
        )
    }

    #[test]
    fn test_single_chain_layout() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        assert_eq!(pipeline.root_task(), 5);
        assert_eq!(pipeline.nodes.len(), 4);
        assert_node(&pipeline.nodes[0], -1, 5, &[], 5);
        assert_node(&pipeline.nodes[1], 5, 5, &[6], 7);
        assert_node(&pipeline.nodes[2], 5, 7, &[], 8);
        assert_node(&pipeline.nodes[3], 7, 8, &[], -1);
    }

    #[test]
    fn test_consecutive_nodes_are_linked() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        for pair in pipeline.nodes.windows(2) {
            assert_eq!(pair[0].target_task, pair[1].source_task);
        }
        assert_eq!(pipeline.nodes.last().unwrap().target_task, NO_TASK);
    }

    #[test]
    fn test_all_associated_for_in_memory_peer() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        let associated = pipeline.all_associated(6);
        assert_eq!(associated, [5, 7].into_iter().collect());
        // 6 never acts as a gateway, so it forwards to nobody.
        assert!(pipeline.downstream_of(6).is_empty());
    }

    #[test]
    fn test_gateway_neighborhood() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        assert_eq!(pipeline.all_associated(5), [6, 7].into_iter().collect());
        assert_eq!(pipeline.downstream_of(5), [6, 7].into_iter().collect());
    }

    #[test]
    fn test_mid_chain_gateway_forwards_onward() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        // 7 hosts no peers, so its neighborhood is just the next hop.
        assert_eq!(pipeline.all_associated(7), [8].into_iter().collect());
        assert_eq!(pipeline.downstream_of(7), [8].into_iter().collect());
        // The chain tail has no next hop and no peers.
        assert!(pipeline.downstream_of(8).is_empty());
    }

    #[test]
    fn test_empty_placement_yields_empty_pipeline() {
        let pipeline = RelayPipeline::build(&placement_of(&[], (5, "s1", 100)), false);

        assert!(pipeline.nodes.is_empty());
        assert!(pipeline.all_associated(5).is_empty());
        assert!(pipeline.downstream_of(5).is_empty());
    }

    #[test]
    fn test_unknown_task_returns_empty_sets() {
        let pipeline = RelayPipeline::build(&two_supervisor_placement(), false);

        assert!(pipeline.all_associated(42).is_empty());
        assert!(pipeline.downstream_of(42).is_empty());
    }

    #[test]
    fn test_split_builds_two_chains_from_the_middle_group() {
        let placement = placement_of(
            &[
                ("s1", 100, &[1]),
                ("s2", 200, &[2]),
                ("s3", 300, &[3]),
                ("s4", 400, &[4]),
            ],
            (1, "s1", 100),
        );
        let pipeline = RelayPipeline::build(&placement, true);

        assert_eq!(pipeline.nodes.len(), 6);
        // First chain covers supervisor groups s1 and s2.
        assert_node(&pipeline.nodes[0], -1, 1, &[], 1);
        assert_node(&pipeline.nodes[1], 1, 1, &[], 2);
        assert_node(&pipeline.nodes[2], 1, 2, &[], -1);
        // Second chain starts at group index 2 (s3), rooted at the same task.
        assert_node(&pipeline.nodes[3], -1, 1, &[], 3);
        assert_node(&pipeline.nodes[4], 1, 3, &[], 4);
        assert_node(&pipeline.nodes[5], 3, 4, &[], -1);

        let heads: Vec<_> = pipeline
            .nodes
            .iter()
            .filter(|n| n.previous_task == NO_TASK)
            .collect();
        assert_eq!(heads.len(), 2);
        assert!(heads.iter().all(|h| h.source_task == 1));
    }

    #[test]
    fn test_every_input_task_covered_exactly_once() {
        let placement = placement_of(
            &[
                ("s1", 100, &[5, 6]),
                ("s1", 101, &[7]),
                ("s2", 200, &[8, 9, 10]),
                ("s3", 300, &[11]),
            ],
            (5, "s1", 100),
        );
        let pipeline = RelayPipeline::build(&placement, false);

        let worker_nodes: Vec<_> = pipeline
            .nodes
            .iter()
            .filter(|n| n.previous_task != NO_TASK)
            .collect();
        let mut covered = BTreeSet::new();
        let mut count = 0;
        for node in &worker_nodes {
            covered.insert(node.source_task);
            covered.extend(node.in_memory_tasks.iter().copied());
            count += 1 + node.in_memory_tasks.len();
        }

        let expected: BTreeSet<TaskId> = (5..=11).collect();
        assert_eq!(covered, expected);
        // No task is duplicated across nodes.
        assert_eq!(count, expected.len());
    }

    #[test]
    fn test_rebuild_is_structurally_identical() {
        let placement = placement_of(
            &[("s1", 100, &[5, 6]), ("s1", 101, &[7]), ("s2", 200, &[8])],
            (5, "s1", 100),
        );

        let first = RelayPipeline::build(&placement, true);
        let second = RelayPipeline::build(&placement, true);
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.root_task(), second.root_task());
    }

    #[test]
    fn test_missing_root_still_builds_a_well_formed_chain() {
        let placement = placement_of(
            &[("s1", 100, &[5, 6]), ("s2", 200, &[8])],
            (99, "s9", 999),
        );
        let pipeline = RelayPipeline::build(&placement, false);

        // Plain ascending order, headed by the (absent) root task.
        assert_eq!(pipeline.nodes.len(), 3);
        assert_node(&pipeline.nodes[0], -1, 99, &[], 5);
        assert_node(&pipeline.nodes[1], 99, 5, &[6], 8);
        assert_node(&pipeline.nodes[2], 5, 8, &[], -1);
    }

    #[test]
    fn test_debug_layout_format() {
        let placement = placement_of(&[("s1", 100, &[5, 6])], (5, "s1", 100));
        let pipeline = RelayPipeline::build(&placement, false);

        assert_eq!(
            format!("{:?}", pipeline),
            "root=5 [p: -1, s: 5, m: {}, t: 5] [p: 5, s: 5, m: {6}, t: -1]"
        );
    }
}
