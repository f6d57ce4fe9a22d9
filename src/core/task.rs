//! Task data model for the workflow graph.
//!
//! Tasks are the atomic units of specialist work. Each task names its kind,
//! the kinds it waits on, and, once executed, the outcome of its remote call.

use crate::completion::CompletionErrorKind;
use crate::core::kind::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority of planned tasks by kind. Lower runs first.
pub fn planned_priority(kind: TaskKind) -> u32 {
    match kind {
        TaskKind::VisionAnalysis => 1,
        TaskKind::ArchitecturalConsultation | TaskKind::StyleAnalysis => 2,
        TaskKind::PromptEngineering | TaskKind::TechnicalReview => 3,
        TaskKind::QualityAssurance => 4,
    }
}

/// Priority of tasks injected mid-run; below every planned task.
pub const INJECTED_PRIORITY: u32 = 5;

/// Where a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "origin")]
pub enum TaskOrigin {
    /// Emitted by the planner from the user request.
    Planned,
    /// Injected because another task's output asked for it.
    Injected { by: TaskKind },
}

/// Result of one task's remote call.
///
/// Both variants carry text so downstream tasks can always be given a
/// dependency context, but consumers can tell real content from degraded
/// output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskOutcome {
    Success {
        text: String,
    },
    Failed {
        error: CompletionErrorKind,
        sentinel: String,
    },
}

impl TaskOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    /// Build the error sentinel for a failed call made by `agent`.
    pub fn failed(agent: &str, error: CompletionErrorKind, message: &str) -> Self {
        Self::Failed {
            error,
            sentinel: format!("Error in {}: {}", agent, message),
        }
    }

    /// Text as seen by dependents: the output or the error sentinel.
    pub fn text(&self) -> &str {
        match self {
            TaskOutcome::Success { text } => text,
            TaskOutcome::Failed { sentinel, .. } => sentinel,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// A single unit of specialist work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    /// Text sent as the user message.
    pub input: String,
    /// Opaque annotations (image presence, hints, routing origin).
    pub context: BTreeMap<String, serde_json::Value>,
    /// Kinds that must have produced an outcome before this task runs.
    pub dependencies: BTreeSet<TaskKind>,
    pub priority: u32,
    pub origin: TaskOrigin,
    pub outcome: Option<TaskOutcome>,
}

impl Task {
    /// Create a planned task with the default priority for its kind.
    pub fn new(kind: TaskKind, input: &str) -> Self {
        Self {
            kind,
            input: input.to_string(),
            context: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            priority: planned_priority(kind),
            origin: TaskOrigin::Planned,
            outcome: None,
        }
    }

    /// Create a task requested by the output of `by`.
    pub fn injected(kind: TaskKind, input: &str, by: TaskKind) -> Self {
        Self::new(kind, input)
            .depends_on(by)
            .with_priority(INJECTED_PRIORITY)
            .with_context("dynamic_routing", serde_json::Value::Bool(true))
            .with_origin(TaskOrigin::Injected { by })
    }

    pub fn depends_on(mut self, kind: TaskKind) -> Self {
        self.dependencies.insert(kind);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    fn with_origin(mut self, origin: TaskOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Check whether every dependency has produced an outcome.
    pub fn is_ready<F>(&self, produced: F) -> bool
    where
        F: Fn(&TaskKind) -> bool,
    {
        self.dependencies.iter().all(produced)
    }

    pub fn complete(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_injected(&self) -> bool {
        matches!(self.origin, TaskOrigin::Injected { .. })
    }
}
