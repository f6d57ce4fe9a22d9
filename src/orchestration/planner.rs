//! Task planner: turns a user request into the initial task set.
//!
//! The core chain is fixed (consultation, prompt engineering, quality
//! review, plus vision analysis when images are attached). The optional
//! specialists are chosen by an `IntentClassifier`.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::completion::Images;
use crate::core::{Task, TaskKind};

/// Raw request as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub message: String,
    pub images: Option<Images>,
    pub style_hint: Option<String>,
    pub view_hint: Option<String>,
}

impl PlanRequest {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = if images.is_empty() {
            None
        } else {
            Some(Arc::new(images))
        };
        self
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style_hint = non_blank(style);
        self
    }

    pub fn with_view(mut self, view: &str) -> Self {
        self.view_hint = non_blank(view);
        self
    }

    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|i| !i.is_empty())
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Decides which optional specialists a message calls for.
pub trait IntentClassifier: Send + Sync {
    /// Optional specialist kinds to plan for `message`.
    fn specialists(&self, message: &str) -> BTreeSet<TaskKind>;
}

/// Case-insensitive substring matching against fixed keyword lists.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(TaskKind, Vec<String>)>,
}

pub const STYLE_KEYWORDS: [&str; 5] = ["style", "historical", "period", "classical", "modern"];
pub const TECHNICAL_KEYWORDS: [&str; 5] =
    ["structural", "engineering", "technical", "code", "regulation"];

impl KeywordClassifier {
    /// A classifier with no rules; never plans a specialist.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add (or extend) the keyword list for `kind`.
    pub fn with_keywords(mut self, kind: TaskKind, keywords: &[&str]) -> Self {
        let keywords = keywords.iter().map(|k| k.to_lowercase());
        match self.rules.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, existing)) => existing.extend(keywords),
            None => self.rules.push((kind, keywords.collect())),
        }
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::empty()
            .with_keywords(TaskKind::StyleAnalysis, &STYLE_KEYWORDS)
            .with_keywords(TaskKind::TechnicalReview, &TECHNICAL_KEYWORDS)
    }
}

impl IntentClassifier for KeywordClassifier {
    fn specialists(&self, message: &str) -> BTreeSet<TaskKind> {
        let message = message.to_lowercase();
        self.rules
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| message.contains(k.as_str())))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Builds the initial task list for a request.
#[derive(Clone)]
pub struct TaskPlanner {
    classifier: Arc<dyn IntentClassifier>,
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self::new(Arc::new(KeywordClassifier::default()))
    }
}

impl TaskPlanner {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Plan the tasks for `request`, in insertion order.
    ///
    /// Pure: identical requests give identical plans.
    pub fn plan(&self, request: &PlanRequest) -> Vec<Task> {
        let message = request.message.as_str();
        let has_images = request.has_images();
        let specialists = self.classifier.specialists(message);
        let mut tasks = Vec::new();

        if has_images {
            tasks.push(
                Task::new(TaskKind::VisionAnalysis, message)
                    .with_context("has_images", serde_json::Value::Bool(true)),
            );
        }

        let consultation = Task::new(TaskKind::ArchitecturalConsultation, message);
        tasks.push(if has_images {
            consultation.depends_on(TaskKind::VisionAnalysis)
        } else {
            consultation
        });

        tasks.push(
            Task::new(TaskKind::PromptEngineering, &prompt_input(request))
                .depends_on(TaskKind::ArchitecturalConsultation),
        );
        tasks.push(
            Task::new(TaskKind::QualityAssurance, message)
                .depends_on(TaskKind::PromptEngineering),
        );

        if specialists.contains(&TaskKind::StyleAnalysis) {
            let style = Task::new(TaskKind::StyleAnalysis, message);
            tasks.push(if has_images {
                style.depends_on(TaskKind::VisionAnalysis)
            } else {
                style
            });
        }
        if specialists.contains(&TaskKind::TechnicalReview) {
            tasks.push(
                Task::new(TaskKind::TechnicalReview, message)
                    .depends_on(TaskKind::ArchitecturalConsultation),
            );
        }

        tasks
            .into_iter()
            .map(|task| with_hints(task, request))
            .collect()
    }
}

/// Message for the prompt engineer, with hint lines appended.
fn prompt_input(request: &PlanRequest) -> String {
    let mut input = request.message.clone();
    if let Some(style) = &request.style_hint {
        input.push_str(&format!("\nPreferred style: {}", style));
    }
    if let Some(view) = &request.view_hint {
        input.push_str(&format!("\nView: {}", view));
    }
    input
}

fn with_hints(task: Task, request: &PlanRequest) -> Task {
    let task = match &request.style_hint {
        Some(style) => task.with_context("style_hint", serde_json::Value::from(style.as_str())),
        None => task,
    };
    match &request.view_hint {
        Some(view) => task.with_context("view_hint", serde_json::Value::from(view.as_str())),
        None => task,
    }
}
