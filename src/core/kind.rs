//! Task kinds: the closed set of specialist work categories.

use serde::{Deserialize, Serialize};

/// Category of specialist work in the orchestration graph.
///
/// Each kind maps to exactly one registered agent. The declaration order is
/// the canonical order used for serialized maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    VisionAnalysis,
    ArchitecturalConsultation,
    PromptEngineering,
    QualityAssurance,
    StyleAnalysis,
    TechnicalReview,
}

impl TaskKind {
    /// Every known kind, in canonical order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::VisionAnalysis,
        TaskKind::ArchitecturalConsultation,
        TaskKind::PromptEngineering,
        TaskKind::QualityAssurance,
        TaskKind::StyleAnalysis,
        TaskKind::TechnicalReview,
    ];

    /// Optional specialists that raise the confidence score when they complete.
    pub const BONUS: [TaskKind; 2] = [TaskKind::StyleAnalysis, TaskKind::TechnicalReview];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::VisionAnalysis => "vision_analysis",
            TaskKind::ArchitecturalConsultation => "architectural_consultation",
            TaskKind::PromptEngineering => "prompt_engineering",
            TaskKind::QualityAssurance => "quality_assurance",
            TaskKind::StyleAnalysis => "style_analysis",
            TaskKind::TechnicalReview => "technical_review",
        }
    }

    /// Whether this kind receives the request images.
    pub fn accepts_images(&self) -> bool {
        matches!(self, TaskKind::VisionAnalysis)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown task kind: {}", s))
    }
}
