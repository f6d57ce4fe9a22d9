//! Output compiler: projects a workflow run onto the caller-facing shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{BlockReason, TaskKind, TaskOutcome, WorkflowId};
use crate::orchestration::executor::WorkflowRun;
use crate::session::SessionState;

const BASE_CONFIDENCE: f64 = 0.6;
const THOROUGH_CONFIDENCE: f64 = 0.8;
const THOROUGH_MIN_KINDS: usize = 3;
const BONUS_CONFIDENCE: f64 = 0.05;

/// A task that never ran, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedTask {
    pub kind: TaskKind,
    #[serde(flatten)]
    pub reason: BlockReason,
}

/// Stable result of one request. Every text field is present, empty when
/// its kind never ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledOutput {
    pub workflow_id: WorkflowId,
    pub workflow_executed: Vec<TaskKind>,
    pub architectural_analysis: String,
    pub expert_consultation: String,
    pub style_analysis: String,
    pub technical_review: String,
    pub optimized_prompt: String,
    pub quality_review: String,
    pub confidence_score: f64,
    pub agent_collaboration: bool,
    pub dynamic_routing: bool,
    /// Kinds whose output is an error sentinel.
    pub degraded: Vec<TaskKind>,
    pub dropped: Vec<DroppedTask>,
}

impl CompiledOutput {
    /// Text field for `kind`.
    pub fn field(&self, kind: TaskKind) -> &str {
        match kind {
            TaskKind::VisionAnalysis => &self.architectural_analysis,
            TaskKind::ArchitecturalConsultation => &self.expert_consultation,
            TaskKind::StyleAnalysis => &self.style_analysis,
            TaskKind::TechnicalReview => &self.technical_review,
            TaskKind::PromptEngineering => &self.optimized_prompt,
            TaskKind::QualityAssurance => &self.quality_review,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty() || !self.dropped.is_empty()
    }
}

/// Aggregate confidence of a result map.
///
/// 0.6 below three completed kinds, 0.8 otherwise, plus 0.05 for each
/// bonus specialist, capped at 1.0. Failed outcomes only count when
/// `count_failed` is set.
pub fn confidence(results: &BTreeMap<TaskKind, TaskOutcome>, count_failed: bool) -> f64 {
    let counts = |o: &TaskOutcome| count_failed || o.is_success();
    let completed = results.values().filter(|o| counts(*o)).count();
    let mut score = if completed < THOROUGH_MIN_KINDS {
        BASE_CONFIDENCE
    } else {
        THOROUGH_CONFIDENCE
    };
    for kind in TaskKind::BONUS {
        if results.get(&kind).is_some_and(counts) {
            score += BONUS_CONFIDENCE;
        }
    }
    score.min(1.0)
}

#[derive(Debug, Clone, Default)]
pub struct OutputCompiler {
    count_failed: bool,
    max_context_chars: usize,
}

impl OutputCompiler {
    pub fn new(count_failed: bool, max_context_chars: usize) -> Self {
        Self {
            count_failed,
            max_context_chars,
        }
    }

    pub fn compile(&self, run: &WorkflowRun) -> CompiledOutput {
        let text = |kind| {
            run.outcome(kind)
                .map(|o| o.text().to_string())
                .unwrap_or_default()
        };
        CompiledOutput {
            workflow_id: run.id,
            workflow_executed: run.executed.clone(),
            architectural_analysis: text(TaskKind::VisionAnalysis),
            expert_consultation: text(TaskKind::ArchitecturalConsultation),
            style_analysis: text(TaskKind::StyleAnalysis),
            technical_review: text(TaskKind::TechnicalReview),
            optimized_prompt: text(TaskKind::PromptEngineering),
            quality_review: text(TaskKind::QualityAssurance),
            confidence_score: confidence(&run.results, self.count_failed),
            agent_collaboration: run.collaborated,
            dynamic_routing: !run.injected.is_empty(),
            degraded: run.degraded(),
            dropped: run
                .dropped
                .iter()
                .map(|(kind, reason)| DroppedTask {
                    kind: *kind,
                    reason: reason.clone(),
                })
                .collect(),
        }
    }

    /// Fold a finished run into the session so later requests see it.
    pub fn update_session(&self, state: &mut SessionState, run: &WorkflowRun) {
        state.record(&run.results, self.max_context_chars);
    }
}
