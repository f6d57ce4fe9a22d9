//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! The executor keeps its own flat list of remaining tasks; the DAG is built
//! from that list to answer structural questions: in what order a plan would
//! run, which tasks sit on cycles, and why a stalled task can never run.

use crate::core::kind::TaskKind;
use crate::core::task::Task;
use crate::error::{Error, Result};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Why a task could not be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum BlockReason {
    /// A dependency is neither completed nor scheduled.
    MissingDependency { missing: Vec<TaskKind> },
    /// The task sits on a dependency cycle.
    DependencyCycle { cycle: Vec<TaskKind> },
    /// The task waits on another task that is itself blocked.
    UpstreamBlocked { upstream: Vec<TaskKind> },
    /// The workflow was cancelled before the task ran.
    Cancelled,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |kinds: &[TaskKind]| {
            kinds
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            BlockReason::MissingDependency { missing } => {
                write!(f, "missing dependency: {}", join(missing))
            }
            BlockReason::DependencyCycle { cycle } => {
                write!(f, "dependency cycle: {}", join(cycle))
            }
            BlockReason::UpstreamBlocked { upstream } => {
                write!(f, "blocked upstream: {}", join(upstream))
            }
            BlockReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The task dependency graph.
///
/// Nodes are tasks keyed by kind (a workflow holds at most one task per
/// kind). An edge `a -> b` means `b` waits on `a`.
pub struct TaskDAG {
    graph: DiGraph<Task, ()>,
    task_index: HashMap<TaskKind, NodeIndex>,
}

impl TaskDAG {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Build a DAG from a task list without rejecting cycles.
    ///
    /// Edges are created for every dependency that is itself in `tasks`;
    /// dependencies outside the list are left for `diagnose` to report.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut dag = Self::new();
        for task in tasks {
            dag.add_task(task.clone());
        }
        for task in tasks {
            let to = dag.task_index[&task.kind];
            for dep in &task.dependencies {
                if let Some(&from) = dag.task_index.get(dep) {
                    dag.graph.update_edge(from, to, ());
                }
            }
        }
        dag
    }

    /// Add a task. A second task of the same kind is ignored.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.kind) {
            return index;
        }
        let kind = task.kind;
        let index = self.graph.add_node(task);
        self.task_index.insert(kind, index);
        index
    }

    pub fn get_task(&self, kind: TaskKind) -> Option<&Task> {
        self.task_index
            .get(&kind)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.task_index.contains_key(&kind)
    }

    /// Kinds in dependency order.
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<TaskKind>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let kind = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.kind.as_str())
                .unwrap_or("unknown");
            Error::Validation(format!("Cycle detected at task: {}", kind))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .map(|t| t.kind)
            .collect())
    }

    /// Groups of kinds that form dependency cycles (including self-loops).
    pub fn cycles(&self) -> Vec<Vec<TaskKind>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .map(|scc| {
                let mut kinds: Vec<TaskKind> = scc
                    .into_iter()
                    .filter_map(|i| self.graph.node_weight(i))
                    .map(|t| t.kind)
                    .collect();
                kinds.sort();
                kinds
            })
            .collect()
    }

    /// Explain why each task in the graph can never become ready.
    ///
    /// Intended for a stalled workflow: every task here is assumed to be
    /// pending. Tasks that are blocked only because an upstream task is
    /// blocked are reported as `UpstreamBlocked`.
    pub fn diagnose(&self, completed: &HashSet<TaskKind>) -> Vec<(TaskKind, BlockReason)> {
        let mut in_cycle: HashMap<TaskKind, Vec<TaskKind>> = HashMap::new();
        for cycle in self.cycles() {
            for kind in &cycle {
                in_cycle.insert(*kind, cycle.clone());
            }
        }

        let mut reasons: Vec<(TaskKind, BlockReason)> = self
            .graph
            .node_weights()
            .map(|task| {
                let missing: Vec<TaskKind> = task
                    .dependencies
                    .iter()
                    .filter(|d| !completed.contains(*d) && !self.contains(**d))
                    .copied()
                    .collect();
                let reason = if !missing.is_empty() {
                    BlockReason::MissingDependency { missing }
                } else if let Some(cycle) = in_cycle.get(&task.kind) {
                    BlockReason::DependencyCycle {
                        cycle: cycle.clone(),
                    }
                } else {
                    BlockReason::UpstreamBlocked {
                        upstream: task
                            .dependencies
                            .iter()
                            .filter(|d| !completed.contains(*d))
                            .copied()
                            .collect(),
                    }
                };
                (task.kind, reason)
            })
            .collect();
        reasons.sort_by_key(|(kind, _)| *kind);
        reasons
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
