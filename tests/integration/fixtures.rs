//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted completion clients (fixed replies, failures, delays)
//! - Registries and orchestrators wired to those clients

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use archai::completion::{CompletionClient, CompletionError, CompletionRequest};
use archai::config::Config;
use archai::core::TaskKind;
use archai::orchestration::{Agent, AgentProfile, Orchestrator, TaskRegistry};
use archai::session::{InMemorySessionStore, SessionStore};

/// Behavior of one agent in a scripted client.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(String),
    Fail(CompletionError),
    Delay(Duration, String),
}

/// Completion client that answers per task kind.
///
/// The kind is read from the request deployment, so it must be used with
/// [`registry`], which names each agent's deployment after its kind.
/// Unscripted kinds reply `"<kind> output"`.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: HashMap<TaskKind, Script>,
    calls: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, kind: TaskKind, text: &str) -> Self {
        self.scripts.insert(kind, Script::Reply(text.to_string()));
        self
    }

    pub fn fail(mut self, kind: TaskKind, error: CompletionError) -> Self {
        self.scripts.insert(kind, Script::Fail(error));
        self
    }

    pub fn delay(mut self, kind: TaskKind, delay: Duration) -> Self {
        self.scripts
            .insert(kind, Script::Delay(delay, format!("{} output", kind)));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Requests received so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests received for one kind.
    pub fn calls_for(&self, kind: TaskKind) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.deployment == kind.as_str())
            .collect()
    }

    /// Kinds in the order their calls started.
    pub fn call_order(&self) -> Vec<TaskKind> {
        self.calls()
            .iter()
            .map(|c| c.deployment.parse().unwrap())
            .collect()
    }

    /// Highest number of calls that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.lock().unwrap().push(request.clone());
        let kind: TaskKind = request
            .deployment
            .parse()
            .map_err(|e: String| CompletionError::Upstream {
                status: Some(404),
                message: e,
            })?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.scripts.get(&kind) {
            Some(Script::Reply(text)) => Ok(text.clone()),
            Some(Script::Fail(err)) => Err(err.clone()),
            Some(Script::Delay(delay, text)) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            None => Ok(format!("{} output", kind)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Registry with every built-in agent served by `client`, deployment = kind.
pub fn registry(client: Arc<ScriptedClient>) -> TaskRegistry {
    let config = Config::default();
    let mut registry = TaskRegistry::new();
    for kind in TaskKind::ALL {
        let mut profile = AgentProfile::builtin(kind, &config);
        profile.deployment = kind.as_str().to_string();
        registry.register(kind, Agent::new(profile, client.clone()));
    }
    registry
}

/// Orchestrator over `client` with an in-memory session store.
pub fn orchestrator(client: Arc<ScriptedClient>, config: &Config) -> Orchestrator {
    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::from_config(&config.sessions));
    Orchestrator::new(registry(client), config, sessions)
}

/// A small PNG-ish blob; content is never inspected.
pub fn image() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]
}
