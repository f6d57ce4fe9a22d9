//! Task registry: which agent handles which task kind.
//!
//! An agent is a role-specific system instruction bound to a deployment and
//! a completion client. Different "agents" usually share one client and
//! differ only in instructions and deployment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest, Images};
use crate::config::Config;
use crate::core::TaskKind;

const VISION_INSTRUCTIONS: &str = "You are an expert architectural vision analyst.

COLLABORATION PROTOCOL:
- If analysis reveals specific architectural styles, flag for Style Analysis
- If technical issues detected, flag for Technical Review
- Always provide structured output with confidence scores

Analyze images for: architectural style, spatial composition, materials, lighting, design principles.
Return JSON format: {\"analysis\": \"...\", \"style\": \"...\", \"technical_notes\": \"...\", \"confidence\": 0.0-1.0, \"next_steps\": []}";

const CONSULTATION_INSTRUCTIONS: &str = "You are a senior architectural consultant with intelligent routing capabilities.

COLLABORATION PROTOCOL:
- Determine if additional specialist input needed
- Route complex technical questions to Technical Review
- Route style-specific requests to Style Analysis
- Coordinate with other agents based on complexity

Provide: recommendations, design strategy, technical considerations, space planning.
Return JSON format: {\"consultation\": \"...\", \"recommendations\": [], \"routing\": [], \"confidence\": 0.0-1.0}";

const PROMPT_INSTRUCTIONS: &str = "You are a FLUX prompt optimization specialist.

COLLABORATION PROTOCOL:
- Request clarification from Vision Analyst if image analysis unclear
- Coordinate with Architectural Expert for technical accuracy
- Validate prompts with Quality Assurance

Create optimized FLUX prompts for architectural visualization.
Return JSON format: {\"prompt\": \"...\", \"style_tags\": [], \"technical_specs\": [], \"confidence\": 0.0-1.0}";

const QA_INSTRUCTIONS: &str = "You are a QA specialist with orchestration awareness.

COLLABORATION PROTOCOL:
- Review all agent outputs for consistency
- Identify gaps requiring additional agent input
- Coordinate final output compilation
- Suggest workflow improvements

Review and enhance architectural consultation outputs.
Return JSON format: {\"review\": \"...\", \"enhancements\": [], \"gaps\": [], \"final_output\": \"...\", \"confidence\": 0.0-1.0}";

const STYLE_INSTRUCTIONS: &str = "You are an architectural style specialist.

Focus on: historical context, style authenticity, regional variations, contemporary interpretations.
Return JSON format: {\"style_analysis\": \"...\", \"historical_context\": \"...\", \"recommendations\": [], \"confidence\": 0.0-1.0}";

const TECHNICAL_INSTRUCTIONS: &str = "You are a technical architecture specialist.

Focus on: structural considerations, building codes, technical feasibility, engineering constraints.
Return JSON format: {\"technical_review\": \"...\", \"constraints\": [], \"recommendations\": [], \"confidence\": 0.0-1.0}";

/// Identity and instructions of one specialist agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub instructions: String,
    pub deployment: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl AgentProfile {
    pub fn new(name: &str, instructions: &str, deployment: &str) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            deployment: deployment.to_string(),
            max_tokens: 1500,
            temperature: 0.7,
        }
    }

    /// Built-in profile for a kind, using the deployments from config.
    pub fn builtin(kind: TaskKind, config: &Config) -> Self {
        let agent = config.models.agent_deployment.as_str();
        let review = config.models.review_deployment.as_str();
        let profile = match kind {
            TaskKind::VisionAnalysis => Self::new("Vision Analyst", VISION_INSTRUCTIONS, agent),
            TaskKind::ArchitecturalConsultation => {
                Self::new("Architectural Expert", CONSULTATION_INSTRUCTIONS, agent)
            }
            TaskKind::PromptEngineering => {
                Self::new("FLUX Prompt Engineer", PROMPT_INSTRUCTIONS, agent)
            }
            TaskKind::QualityAssurance => Self::new("Quality Assurance", QA_INSTRUCTIONS, review),
            TaskKind::StyleAnalysis => Self::new("Style Specialist", STYLE_INSTRUCTIONS, agent),
            TaskKind::TechnicalReview => {
                Self::new("Technical Reviewer", TECHNICAL_INSTRUCTIONS, agent)
            }
        };
        profile.with_limits(config.models.max_tokens, config.models.temperature)
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// A profile bound to the client that serves it.
#[derive(Clone)]
pub struct Agent {
    pub profile: AgentProfile,
    client: Arc<dyn CompletionClient>,
}

impl Agent {
    pub fn new(profile: AgentProfile, client: Arc<dyn CompletionClient>) -> Self {
        Self { profile, client }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Build the request this agent would send.
    pub fn request(&self, input: &str, context: &str, images: Option<Images>) -> CompletionRequest {
        let request = CompletionRequest::new(
            &self.profile.deployment,
            &self.profile.instructions,
            input,
        )
        .with_context(context)
        .with_limits(self.profile.max_tokens, self.profile.temperature);
        match images {
            Some(images) => request.with_images(images),
            None => request,
        }
    }

    pub async fn invoke(
        &self,
        input: &str,
        context: &str,
        images: Option<Images>,
    ) -> Result<String, CompletionError> {
        let request = self.request(input, context, images);
        self.client.complete(&request).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.profile.name)
            .field("deployment", &self.profile.deployment)
            .finish()
    }
}

/// Mapping from task kind to the agent that executes it.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    agents: HashMap<TaskKind, Agent>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the six built-in agents, all served by `client`.
    pub fn from_config(config: &Config, client: Arc<dyn CompletionClient>) -> Self {
        let mut registry = Self::new();
        for kind in TaskKind::ALL {
            registry.register(kind, Agent::new(AgentProfile::builtin(kind, config), Arc::clone(&client)));
        }
        registry
    }

    /// Bind (or replace) the agent for `kind`.
    pub fn register(&mut self, kind: TaskKind, agent: Agent) -> &mut Self {
        self.agents.insert(kind, agent);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<&Agent> {
        self.agents.get(&kind)
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.agents.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
