//! Fan-out, time bounds and cancellation.
//!
//! These tests run on a paused clock so that delays and timeouts resolve
//! instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use archai::completion::CompletionErrorKind;
use archai::config::Config;
use archai::core::{BlockReason, Task, TaskKind, TaskOutcome};
use archai::orchestration::{ExecutorConfig, WorkflowEvent, WorkflowExecutor, WorkflowInput};
use archai::PlanRequest;

use crate::fixtures::{orchestrator, registry, ScriptedClient};

use TaskKind::*;

fn independent_specialists() -> Vec<Task> {
    vec![
        Task::new(ArchitecturalConsultation, "x"),
        Task::new(StyleAnalysis, "x"),
        Task::new(TechnicalReview, "x"),
    ]
}

fn executor(client: Arc<ScriptedClient>, timeout_secs: u64, max_concurrent: usize) -> WorkflowExecutor {
    WorkflowExecutor::new(
        Arc::new(registry(client)),
        ExecutorConfig {
            call_timeout: Duration::from_secs(timeout_secs),
            max_concurrent,
        },
    )
}

/// Given three independent tasks and room for four calls
/// When the pass runs
/// Then all three calls are in flight together and merge in priority order
#[tokio::test(start_paused = true)]
async fn test_ready_tasks_run_concurrently() {
    let client = ScriptedClient::new()
        .delay(ArchitecturalConsultation, Duration::from_secs(10))
        .delay(StyleAnalysis, Duration::from_secs(5))
        .delay(TechnicalReview, Duration::from_secs(1))
        .build();

    let run = executor(client.clone(), 120, 4)
        .run(
            independent_specialists(),
            &WorkflowInput::new("x"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(client.max_in_flight(), 3);
    assert_eq!(
        run.executed,
        vec![ArchitecturalConsultation, StyleAnalysis, TechnicalReview]
    );
}

/// Given a concurrency limit of one
/// When three independent tasks are ready
/// Then calls never overlap
#[tokio::test(start_paused = true)]
async fn test_max_concurrent_bounds_fan_out() {
    let client = ScriptedClient::new()
        .delay(ArchitecturalConsultation, Duration::from_secs(3))
        .delay(StyleAnalysis, Duration::from_secs(3))
        .delay(TechnicalReview, Duration::from_secs(3))
        .build();

    let run = executor(client.clone(), 120, 1)
        .run(
            independent_specialists(),
            &WorkflowInput::new("x"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(client.max_in_flight(), 1);
    assert_eq!(run.executed.len(), 3);
}

/// Given an agent slower than the call timeout
/// When the workflow runs
/// Then that task fails with a timeout and its dependents still run
#[tokio::test(start_paused = true)]
async fn test_slow_call_times_out_without_retry() {
    let client = ScriptedClient::new()
        .delay(ArchitecturalConsultation, Duration::from_secs(600))
        .build();
    let mut config = Config::default();
    config.workflow.call_timeout_secs = 30;
    let orch = orchestrator(client.clone(), &config);

    let output = orch
        .process_request(&PlanRequest::new("A cabin"), "t")
        .await
        .unwrap();

    assert_eq!(output.degraded, vec![ArchitecturalConsultation]);
    assert!(output.expert_consultation.starts_with("Error in Architectural Expert: timed out"));
    assert_eq!(output.workflow_executed.len(), 3);
    assert_eq!(client.calls_for(ArchitecturalConsultation).len(), 1);
}

/// Given a workflow whose first call is still running
/// When the token is cancelled
/// Then the running and pending tasks are dropped as cancelled
#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_call_drops_remaining() {
    let client = ScriptedClient::new()
        .delay(ArchitecturalConsultation, Duration::from_secs(60))
        .build();
    let orch = orchestrator(client.clone(), &Config::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let output = orch
        .process_request_with_cancel(&PlanRequest::new("A cabin"), "x", &cancel)
        .await
        .unwrap();

    assert!(output.workflow_executed.is_empty());
    assert_eq!(output.dropped.len(), 3);
    assert!(output
        .dropped
        .iter()
        .all(|d| d.reason == BlockReason::Cancelled));
    assert_eq!(output.dropped[0].kind, ArchitecturalConsultation);
    assert_eq!(client.calls_for(PromptEngineering).len(), 0);
}

/// Given cancellation after the first pass
/// When the second pass would start
/// Then completed outputs are kept
#[tokio::test(start_paused = true)]
async fn test_cancellation_keeps_completed_outputs() {
    let client = ScriptedClient::new()
        .delay(ArchitecturalConsultation, Duration::from_secs(1))
        .delay(PromptEngineering, Duration::from_secs(60))
        .build();
    let orch = orchestrator(client, &Config::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let output = orch
        .process_request_with_cancel(&PlanRequest::new("A cabin"), "y", &cancel)
        .await
        .unwrap();

    assert_eq!(output.workflow_executed, vec![ArchitecturalConsultation]);
    assert_eq!(output.expert_consultation, "architectural_consultation output");
    let dropped: Vec<TaskKind> = output.dropped.iter().map(|d| d.kind).collect();
    assert_eq!(dropped, vec![PromptEngineering, QualityAssurance]);
}

/// Given an event channel
/// When a failing task and an injected task run
/// Then the channel reports both
#[tokio::test]
async fn test_events_report_failures_and_injections() {
    let client = ScriptedClient::new()
        .reply(ArchitecturalConsultation, "needs style analysis")
        .fail(
            PromptEngineering,
            archai::completion::CompletionError::RateLimited {
                message: "slow down".to_string(),
                retry_after: None,
            },
        )
        .build();
    let (tx, mut rx) = mpsc::channel(64);
    let exec = executor(client, 120, 4).with_events(tx);

    let tasks = vec![
        Task::new(ArchitecturalConsultation, "x"),
        Task::new(PromptEngineering, "x").depends_on(ArchitecturalConsultation),
    ];
    let run = exec
        .run(tasks, &WorkflowInput::new("x"), &CancellationToken::new())
        .await;
    drop(exec);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(events.contains(&WorkflowEvent::TaskInjected {
        kind: StyleAnalysis,
        by: ArchitecturalConsultation
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::TaskFinished {
            kind: PromptEngineering,
            success: false,
            ..
        }
    )));
    match run.outcome(PromptEngineering) {
        Some(TaskOutcome::Failed { error, .. }) => {
            assert_eq!(*error, CompletionErrorKind::RateLimited)
        }
        other => panic!("expected rate-limited failure, got {:?}", other),
    }
}
