//! End-to-end workflow integration tests.
//!
//! Each test submits a request through the orchestrator and checks the
//! compiled output together with the calls the agents received.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use archai::completion::CompletionError;
use archai::config::Config;
use archai::core::{BlockReason, Task, TaskKind};
use archai::orchestration::{ExecutorConfig, IntentClassifier, WorkflowExecutor, WorkflowInput};
use archai::PlanRequest;

use crate::fixtures::{image, orchestrator, registry, ScriptedClient};

use TaskKind::*;

/// Given "Design a modern house" and no images
/// When the request runs
/// Then the core chain plus style analysis execute, ties broken by plan order
#[tokio::test]
async fn test_modern_house_runs_style_analysis() {
    let client = ScriptedClient::new().build();
    let orch = orchestrator(client.clone(), &Config::default());

    let output = orch
        .process_request(&PlanRequest::new("Design a modern house"), "a")
        .await
        .unwrap();

    assert_eq!(
        output.workflow_executed,
        vec![
            ArchitecturalConsultation,
            StyleAnalysis,
            PromptEngineering,
            QualityAssurance
        ]
    );
    assert_eq!(output.style_analysis, "style_analysis output");
    assert_eq!(output.architectural_analysis, "");
    assert_eq!(output.technical_review, "");
    assert!((output.confidence_score - 0.85).abs() < 1e-9);
    assert!(output.agent_collaboration);
    assert!(!output.dynamic_routing);
    assert!(!output.is_degraded());

    // Style analysis has no dependencies, so only session context (empty).
    assert_eq!(client.calls_for(StyleAnalysis)[0].context, "");
}

/// Given "Analyze this structural issue" with one image
/// When the request runs
/// Then vision runs first with the image and technical review follows consultation
#[tokio::test]
async fn test_structural_issue_with_image() {
    let client = ScriptedClient::new()
        .reply(VisionAnalysis, "Cracked concrete lintel.")
        .build();
    let orch = orchestrator(client.clone(), &Config::default());
    let request = PlanRequest::new("Analyze this structural issue").with_images(vec![image()]);

    let output = orch.process_request(&request, "b").await.unwrap();

    assert_eq!(output.workflow_executed.len(), 5);
    assert_eq!(output.workflow_executed[0], VisionAnalysis);
    assert_eq!(output.architectural_analysis, "Cracked concrete lintel.");
    assert!(!output.technical_review.is_empty());
    assert!((output.confidence_score - 0.85).abs() < 1e-9);

    let order = client.call_order();
    let pos = |k| order.iter().position(|o| *o == k).unwrap();
    assert!(pos(TechnicalReview) > pos(ArchitecturalConsultation));

    for call in client.calls() {
        let expected = if call.deployment == VisionAnalysis.as_str() { 1 } else { 0 };
        assert_eq!(call.image_count(), expected, "images for {}", call.deployment);
    }
    assert!(client.calls_for(ArchitecturalConsultation)[0]
        .context
        .contains("vision_analysis: Cracked concrete lintel."));
}

/// Given consultation fails with a transport error
/// When the request runs
/// Then dependents still run and receive the error sentinel as context
#[tokio::test]
async fn test_failed_task_degrades_but_workflow_completes() {
    let client = ScriptedClient::new()
        .fail(
            ArchitecturalConsultation,
            CompletionError::Transport("connection reset".to_string()),
        )
        .build();
    let orch = orchestrator(client.clone(), &Config::default());

    let output = orch
        .process_request(&PlanRequest::new("A cabin"), "c")
        .await
        .unwrap();

    assert_eq!(output.workflow_executed.len(), 3);
    assert_eq!(
        output.expert_consultation,
        "Error in Architectural Expert: transport error: connection reset"
    );
    assert_eq!(output.degraded, vec![ArchitecturalConsultation]);
    assert_eq!(output.optimized_prompt, "prompt_engineering output");
    assert_eq!(output.confidence_score, 0.6);

    let prompt_call = &client.calls_for(PromptEngineering)[0];
    assert!(prompt_call
        .context
        .contains("architectural_consultation: Error in Architectural Expert"));
}

/// Given failed tasks are configured to count
/// When one of three tasks fails
/// Then confidence still reaches the three-kind level
#[tokio::test]
async fn test_count_failed_tasks_option() {
    let client = ScriptedClient::new()
        .fail(QualityAssurance, CompletionError::Auth("bad key".to_string()))
        .build();
    let mut config = Config::default();
    config.workflow.count_failed_tasks = true;
    let orch = orchestrator(client, &config);

    let output = orch
        .process_request(&PlanRequest::new("A cabin"), "d")
        .await
        .unwrap();
    assert_eq!(output.degraded, vec![QualityAssurance]);
    assert_eq!(output.confidence_score, 0.8);
}

/// Given consultation asks for a technical review that was not planned
/// When the request runs
/// Then a technical review is injected, depends on consultation, and runs
#[tokio::test]
async fn test_dynamic_injection_of_technical_review() {
    let client = ScriptedClient::new()
        .reply(
            ArchitecturalConsultation,
            "Cantilever is ambitious; recommend a Technical Review.",
        )
        .build();
    let orch = orchestrator(client.clone(), &Config::default());

    let output = orch
        .process_request(&PlanRequest::new("A cliffside villa"), "e")
        .await
        .unwrap();

    assert!(output.dynamic_routing);
    assert_eq!(output.technical_review, "technical_review output");
    assert_eq!(output.workflow_executed.len(), 4);
    assert_eq!(client.calls_for(TechnicalReview).len(), 1);

    let review = &client.calls_for(TechnicalReview)[0];
    assert_eq!(review.user_input, "A cliffside villa");
    assert!(review
        .context
        .contains("architectural_consultation: Cantilever is ambitious"));
}

/// Given an error sentinel mentions a trigger phrase
/// When the failure is merged
/// Then injection still happens
#[tokio::test]
async fn test_injection_scans_error_sentinels() {
    let client = ScriptedClient::new()
        .fail(
            PromptEngineering,
            CompletionError::Upstream {
                status: Some(500),
                message: "style analysis backend unavailable".to_string(),
            },
        )
        .build();
    let orch = orchestrator(client.clone(), &Config::default());

    let output = orch
        .process_request(&PlanRequest::new("A cabin"), "f")
        .await
        .unwrap();
    assert!(output.dynamic_routing);
    assert_eq!(output.style_analysis, "style_analysis output");
}

/// Given two specialists each request the other
/// When both run
/// Then neither is scheduled twice
#[tokio::test]
async fn test_mutual_requests_do_not_repeat_tasks() {
    let client = ScriptedClient::new()
        .reply(StyleAnalysis, "a technical review would help")
        .reply(TechnicalReview, "a style analysis would help")
        .build();
    let orch = orchestrator(client.clone(), &Config::default());

    let output = orch
        .process_request(&PlanRequest::new("modern structural tower"), "g")
        .await
        .unwrap();

    assert!(!output.dynamic_routing);
    assert_eq!(client.calls_for(StyleAnalysis).len(), 1);
    assert_eq!(client.calls_for(TechnicalReview).len(), 1);
    assert!((output.confidence_score - 0.9).abs() < 1e-9);
}

/// Given a dependency cycle and a task downstream of it
/// When the executor stalls
/// Then the stalled tasks are dropped with their reasons and the rest runs
#[tokio::test]
async fn test_stall_drops_cyclic_and_downstream_tasks() {
    let client = ScriptedClient::new().build();
    let executor = WorkflowExecutor::new(Arc::new(registry(client.clone())), ExecutorConfig::default());
    let tasks = vec![
        Task::new(ArchitecturalConsultation, "x"),
        Task::new(StyleAnalysis, "x").depends_on(TechnicalReview),
        Task::new(TechnicalReview, "x").depends_on(StyleAnalysis),
        Task::new(QualityAssurance, "x").depends_on(StyleAnalysis),
    ];

    let run = executor
        .run(tasks, &WorkflowInput::new("x"), &CancellationToken::new())
        .await;

    assert_eq!(run.executed, vec![ArchitecturalConsultation]);
    assert_eq!(run.dropped.len(), 3);
    let reason = |k| run.dropped.iter().find(|(d, _)| *d == k).map(|(_, r)| r.clone());
    assert_eq!(
        reason(StyleAnalysis),
        Some(BlockReason::DependencyCycle {
            cycle: vec![StyleAnalysis, TechnicalReview]
        })
    );
    assert_eq!(
        reason(QualityAssurance),
        Some(BlockReason::UpstreamBlocked {
            upstream: vec![StyleAnalysis]
        })
    );
    assert_eq!(client.calls().len(), 1);
}

/// Given a classifier that only asks for technical review
/// When a style-flavored request runs
/// Then the classifier decides the specialists, not the default keywords
#[tokio::test]
async fn test_custom_classifier_drives_planning() {
    struct TechnicalOnly;
    impl IntentClassifier for TechnicalOnly {
        fn specialists(&self, _message: &str) -> BTreeSet<TaskKind> {
            BTreeSet::from([TechnicalReview])
        }
    }

    let client = ScriptedClient::new().build();
    let orch = orchestrator(client.clone(), &Config::default())
        .with_classifier(Arc::new(TechnicalOnly));

    let output = orch
        .process_request(&PlanRequest::new("A modern villa"), "k")
        .await
        .unwrap();

    assert_eq!(output.style_analysis, "");
    assert_eq!(output.technical_review, "technical_review output");
    assert!(client.calls_for(StyleAnalysis).is_empty());
}

/// Given identical requests
/// When planned twice through separate sessions
/// Then the same kinds execute in the same order
#[tokio::test]
async fn test_repeated_requests_are_deterministic() {
    let client = ScriptedClient::new().build();
    let orch = orchestrator(client, &Config::default());
    let request = PlanRequest::new("historical engineering museum").with_images(vec![image()]);

    let first = orch.process_request(&request, "h1").await.unwrap();
    let second = orch.process_request(&request, "h2").await.unwrap();
    assert_eq!(first.workflow_executed, second.workflow_executed);
    assert_ne!(first.workflow_id, second.workflow_id);
}
