//! Multi-agent orchestration.
//!
//! A request flows planner → executor → compiler. The registry binds each
//! task kind to the agent that serves it, and the orchestrator threads
//! session context between requests.

pub mod compiler;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod registry;

pub use compiler::{confidence, CompiledOutput, DroppedTask, OutputCompiler};
pub use executor::{
    ExecutorConfig, WorkflowEvent, WorkflowExecutor, WorkflowInput, WorkflowRun, TRIGGER_PHRASES,
};
pub use orchestrator::{Orchestrator, DEFAULT_SESSION};
pub use planner::{IntentClassifier, KeywordClassifier, PlanRequest, TaskPlanner};
pub use registry::{Agent, AgentProfile, TaskRegistry};
