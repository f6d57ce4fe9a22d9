//! Workflow executor: runs a task set against the registry.
//!
//! Execution proceeds in passes. Each pass takes every task whose
//! dependencies have produced an outcome, runs them concurrently, and merges
//! the outcomes back one at a time in (priority, insertion) order. Tasks
//! requested by an output are queued during the merge and join the remaining
//! set only when the pass ends. When nothing is ready the remaining tasks are
//! diagnosed, logged and dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionError, CompletionErrorKind, Images};
use crate::config::WorkflowConfig;
use crate::core::{BlockReason, Task, TaskDAG, TaskKind, TaskOutcome, WorkflowId};
use crate::orchestration::registry::TaskRegistry;
use crate::util::preview;
use crate::{alog, alog_debug, alog_warn};

/// Phrases in an output that request another specialist.
pub const TRIGGER_PHRASES: [(&str, TaskKind); 2] = [
    ("style analysis", TaskKind::StyleAnalysis),
    ("technical review", TaskKind::TechnicalReview),
];

/// Kinds requested by `text`, excluding the kind that produced it.
pub fn triggered_kinds(text: &str, source: TaskKind) -> Vec<TaskKind> {
    let text = text.to_lowercase();
    TRIGGER_PHRASES
        .iter()
        .filter(|(phrase, kind)| *kind != source && text.contains(phrase))
        .map(|(_, kind)| *kind)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Upper bound on a single remote call. No retries.
    pub call_timeout: Duration,
    /// Ready tasks run at most this many at a time.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            max_concurrent: config.max_concurrent.max(1),
        }
    }
}

/// Progress notifications emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    TaskStarted {
        kind: TaskKind,
    },
    TaskFinished {
        kind: TaskKind,
        success: bool,
        elapsed: Duration,
    },
    TaskInjected {
        kind: TaskKind,
        by: TaskKind,
    },
    TaskDropped {
        kind: TaskKind,
        reason: BlockReason,
    },
    WorkflowComplete {
        id: WorkflowId,
        executed: usize,
    },
}

/// Per-request inputs shared by every task of one run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInput {
    /// Original user message; becomes the input of injected tasks.
    pub message: String,
    pub images: Option<Images>,
    /// Running session context prepended to every task context.
    pub session_context: String,
}

impl WorkflowInput {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: Option<Images>) -> Self {
        self.images = images;
        self
    }

    pub fn with_session_context(mut self, context: &str) -> Self {
        self.session_context = context.to_string();
        self
    }
}

/// Everything one workflow run produced.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRun {
    pub id: WorkflowId,
    pub results: BTreeMap<TaskKind, TaskOutcome>,
    /// Kinds in the order their outcomes were merged.
    pub executed: Vec<TaskKind>,
    pub injected: Vec<TaskKind>,
    pub dropped: Vec<(TaskKind, BlockReason)>,
    /// Some executed task received another task's output as context.
    pub collaborated: bool,
    pub cancelled: bool,
}

impl WorkflowRun {
    pub fn outcome(&self, kind: TaskKind) -> Option<&TaskOutcome> {
        self.results.get(&kind)
    }

    /// Kinds whose call failed.
    pub fn degraded(&self) -> Vec<TaskKind> {
        self.executed
            .iter()
            .copied()
            .filter(|k| self.results.get(k).is_some_and(|o| !o.is_success()))
            .collect()
    }
}

/// Runs task sets against a registry.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<TaskRegistry>,
    config: ExecutorConfig,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<TaskRegistry>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            config,
            event_tx: None,
        }
    }

    /// Send progress events to `tx`. Events are dropped when the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.try_send(event).is_err() {
                alog_debug!("Workflow event dropped: channel full or closed");
            }
        }
    }

    /// Run `tasks` to completion, to a stall, or until `cancel` fires.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        input: &WorkflowInput,
        cancel: &CancellationToken,
    ) -> WorkflowRun {
        let mut run = WorkflowRun::default();
        let mut next_seq = 0usize;
        let mut remaining: Vec<(usize, Task)> = Vec::new();

        for task in tasks {
            if remaining.iter().any(|(_, t)| t.kind == task.kind) {
                alog_warn!("Workflow {}: duplicate {} task ignored", run.id.short(), task.kind);
                continue;
            }
            remaining.push((next_seq, task));
            next_seq += 1;
        }

        alog!(
            "Workflow {} started with {} tasks",
            run.id.short(),
            remaining.len()
        );

        while !remaining.is_empty() {
            if cancel.is_cancelled() {
                self.drop_cancelled(&mut run, remaining.drain(..).map(|(_, t)| t.kind));
                break;
            }

            let produced: HashSet<TaskKind> = run.results.keys().copied().collect();
            let (mut ready, blocked): (Vec<_>, Vec<_>) = remaining
                .drain(..)
                .partition(|(_, task)| task.is_ready(|dep| produced.contains(dep)));
            remaining = blocked;

            if ready.is_empty() {
                self.drop_stalled(&mut run, &remaining, &produced);
                remaining.clear();
                break;
            }

            ready.sort_by_key(|(seq, task)| (task.priority, *seq));
            let pass_kinds: HashSet<TaskKind> = ready.iter().map(|(_, t)| t.kind).collect();

            let jobs: Vec<_> = ready
                .iter()
                .map(|(_, task)| {
                    let context = task_context(&input.session_context, task, &run.results);
                    self.execute(task, context, input.images.clone(), cancel)
                })
                .collect();
            let outcomes: Vec<Option<TaskOutcome>> = stream::iter(jobs)
                .buffered(self.config.max_concurrent.max(1))
                .collect()
                .await;

            let mut pending: Vec<Task> = Vec::new();
            let mut interrupted = Vec::new();
            for ((_, mut task), outcome) in ready.into_iter().zip(outcomes) {
                let Some(outcome) = outcome else {
                    interrupted.push(task.kind);
                    continue;
                };

                for kind in triggered_kinds(outcome.text(), task.kind) {
                    let scheduled = run.results.contains_key(&kind)
                        || pass_kinds.contains(&kind)
                        || remaining.iter().any(|(_, t)| t.kind == kind)
                        || pending.iter().any(|t| t.kind == kind);
                    if scheduled {
                        continue;
                    }
                    alog!(
                        "Workflow {}: {} requested {}, injecting",
                        run.id.short(),
                        task.kind,
                        kind
                    );
                    self.emit(WorkflowEvent::TaskInjected { kind, by: task.kind });
                    run.injected.push(kind);
                    pending.push(Task::injected(kind, &input.message, task.kind));
                }

                if !task.dependencies.is_empty() {
                    run.collaborated = true;
                }
                task.complete(outcome.clone());
                run.executed.push(task.kind);
                run.results.insert(task.kind, outcome);
            }

            if !interrupted.is_empty() {
                self.drop_cancelled(&mut run, interrupted.into_iter());
            }

            for task in pending {
                remaining.push((next_seq, task));
                next_seq += 1;
            }
        }

        if cancel.is_cancelled() {
            run.cancelled = true;
        }

        alog!(
            "Workflow {} finished: {} executed, {} injected, {} dropped",
            run.id.short(),
            run.executed.len(),
            run.injected.len(),
            run.dropped.len()
        );
        self.emit(WorkflowEvent::WorkflowComplete {
            id: run.id,
            executed: run.executed.len(),
        });
        run
    }

    /// Execute one task. `None` means the call was cancelled.
    async fn execute(
        &self,
        task: &Task,
        context: String,
        images: Option<Images>,
        cancel: &CancellationToken,
    ) -> Option<TaskOutcome> {
        if cancel.is_cancelled() {
            return None;
        }

        let Some(agent) = self.registry.get(task.kind) else {
            alog_warn!("No agent registered for {}", task.kind);
            return Some(TaskOutcome::failed(
                task.kind.as_str(),
                CompletionErrorKind::Unregistered,
                "no agent registered",
            ));
        };
        let images = if task.kind.accepts_images() {
            images
        } else {
            None
        };

        self.emit(WorkflowEvent::TaskStarted { kind: task.kind });
        alog_debug!(
            "Task {} started ({}), input: {}",
            task.kind,
            agent.name(),
            preview(&task.input, 80)
        );
        let start = Instant::now();

        let call = tokio::time::timeout(
            self.config.call_timeout,
            agent.invoke(&task.input, &context, images),
        );
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                alog_debug!("Task {} cancelled mid-call", task.kind);
                return None;
            }
            result = call => match result {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(self.config.call_timeout)),
            },
        };
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(text) => {
                alog!(
                    "Task {} succeeded in {:?} ({} chars)",
                    task.kind,
                    elapsed,
                    text.len()
                );
                TaskOutcome::success(text)
            }
            Err(e) => {
                alog_warn!(
                    "Task {} failed in {:?} [{}]: {}",
                    task.kind,
                    elapsed,
                    e.kind(),
                    e
                );
                TaskOutcome::failed(agent.name(), e.kind(), &e.to_string())
            }
        };

        self.emit(WorkflowEvent::TaskFinished {
            kind: task.kind,
            success: outcome.is_success(),
            elapsed,
        });
        Some(outcome)
    }

    fn drop_stalled(
        &self,
        run: &mut WorkflowRun,
        remaining: &[(usize, Task)],
        produced: &HashSet<TaskKind>,
    ) {
        let tasks: Vec<Task> = remaining.iter().map(|(_, t)| t.clone()).collect();
        for (kind, reason) in TaskDAG::from_tasks(&tasks).diagnose(produced) {
            alog_warn!(
                "Workflow {}: dropping {} ({})",
                run.id.short(),
                kind,
                reason
            );
            self.emit(WorkflowEvent::TaskDropped {
                kind,
                reason: reason.clone(),
            });
            run.dropped.push((kind, reason));
        }
    }

    fn drop_cancelled(&self, run: &mut WorkflowRun, kinds: impl Iterator<Item = TaskKind>) {
        for kind in kinds {
            alog_warn!("Workflow {}: dropping {} (cancelled)", run.id.short(), kind);
            self.emit(WorkflowEvent::TaskDropped {
                kind,
                reason: BlockReason::Cancelled,
            });
            run.dropped.push((kind, BlockReason::Cancelled));
        }
    }
}

/// Session context followed by one `<kind>: <text>` line per dependency.
pub fn task_context(
    session_context: &str,
    task: &Task,
    results: &BTreeMap<TaskKind, TaskOutcome>,
) -> String {
    let mut context = session_context.to_string();
    for dep in &task.dependencies {
        if let Some(outcome) = results.get(dep) {
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&format!("{}: {}", dep, outcome.text()));
        }
    }
    context
}
