//! Request entry point: plan, execute, compile, remember.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::completion::{AzureChatClient, CompletionClient};
use crate::config::Config;
use crate::core::TaskDAG;
use crate::orchestration::compiler::{CompiledOutput, OutputCompiler};
use crate::orchestration::executor::{ExecutorConfig, WorkflowEvent, WorkflowExecutor, WorkflowInput};
use crate::orchestration::planner::{IntentClassifier, PlanRequest, TaskPlanner};
use crate::orchestration::registry::TaskRegistry;
use crate::session::{FileSessionStore, InMemorySessionStore, SessionLocks, SessionState, SessionStore};
use crate::{alog, alog_debug, alog_error, alog_warn, Result};

/// Session id used when the caller does not supply one.
pub const DEFAULT_SESSION: &str = "default";

/// Ties the planner, executor, compiler and session store together.
///
/// Requests for the same session id are serialized; different sessions run
/// concurrently.
pub struct Orchestrator {
    planner: TaskPlanner,
    executor: WorkflowExecutor,
    compiler: OutputCompiler,
    sessions: Arc<dyn SessionStore>,
    locks: SessionLocks,
}

impl Orchestrator {
    pub fn new(registry: TaskRegistry, config: &Config, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            planner: TaskPlanner::default(),
            executor: WorkflowExecutor::new(
                Arc::new(registry),
                ExecutorConfig::from_config(&config.workflow),
            ),
            compiler: OutputCompiler::new(
                config.workflow.count_failed_tasks,
                config.sessions.max_context_chars,
            ),
            sessions,
            locks: SessionLocks::new(),
        }
    }

    /// Build an orchestrator that talks to Azure OpenAI.
    ///
    /// Sessions are kept in memory unless `sessions.persist` is set.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client: Arc<dyn CompletionClient> = Arc::new(AzureChatClient::from_config(config)?);
        let registry = TaskRegistry::from_config(config, client);
        let sessions: Arc<dyn SessionStore> = if config.sessions.persist {
            Arc::new(
                FileSessionStore::open(
                    &Config::sessions_path()?,
                    config.sessions.ttl(),
                    config.sessions.max_sessions,
                )
                .await?,
            )
        } else {
            Arc::new(InMemorySessionStore::from_config(&config.sessions))
        };
        Ok(Self::new(registry, config, sessions))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.planner = TaskPlanner::new(classifier);
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.executor = self.executor.with_events(tx);
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Run one request to completion.
    pub async fn process_request(
        &self,
        request: &PlanRequest,
        session_id: &str,
    ) -> Result<CompiledOutput> {
        self.process_request_with_cancel(request, session_id, &CancellationToken::new())
            .await
    }

    /// Run one request, stopping early when `cancel` fires.
    ///
    /// A cancelled run still returns the outputs produced so far, with the
    /// unfinished tasks listed as dropped. Failing to store the session is
    /// logged and does not discard the output.
    pub async fn process_request_with_cancel(
        &self,
        request: &PlanRequest,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CompiledOutput> {
        let _guard = self.locks.acquire(session_id).await;

        match self.sessions.evict_expired().await {
            Ok(0) => {}
            Ok(expired) => alog_debug!("Evicted {} expired sessions", expired),
            Err(e) => alog_warn!("Session sweep failed: {}", e),
        }
        let mut state = self
            .sessions
            .get(session_id)
            .await?
            .unwrap_or_else(SessionState::new);

        let tasks = self.planner.plan(request);
        match TaskDAG::from_tasks(&tasks).topological_order() {
            Ok(order) => alog!(
                "Session {}: planned {} tasks ({})",
                session_id,
                tasks.len(),
                order
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            ),
            Err(e) => alog_warn!("Session {}: plan is not a DAG: {}", session_id, e),
        }

        let input = WorkflowInput::new(&request.message)
            .with_images(request.images.clone())
            .with_session_context(&state.context);
        let run = self.executor.run(tasks, &input, cancel).await;

        let output = self.compiler.compile(&run);
        self.compiler.update_session(&mut state, &run);
        if let Err(e) = self.sessions.put(session_id, state).await {
            alog_error!("Session {}: failed to store state: {}", session_id, e);
        }

        alog!(
            "Session {}: workflow {} confidence {:.2}{}",
            session_id,
            run.id.short(),
            output.confidence_score,
            if output.is_degraded() { " (degraded)" } else { "" }
        );
        Ok(output)
    }
}
