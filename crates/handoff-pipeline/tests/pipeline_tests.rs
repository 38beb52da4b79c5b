//! End-to-end tests for the orchestrator, notifier and runner.
//!
//! Contracts are built to satisfy the standard gate profiles unless a test
//! breaks them on purpose.

use chrono::{Duration as ChronoDuration, Utc};
use handoff_core::{
    Contract, DesignPrinciple, HandoffError, MetricCriterion, ReviewDecision, Stage, StageAgent, Violation,
};
use handoff_pipeline::{
    EventNotifier, Orchestrator, PipelineConfig, PipelineEvent, PipelinePhase, PipelineRunner, StoryStatus, Topic,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn intake(story_id: &str) -> Contract {
    Contract::new(story_id, Stage::Intake, Stage::ProductOwner)
        .with_data("issue", serde_json::json!({ "title": "Timed quiz for onboarding" }))
}

/// A contract from `stage` that passes every standard gate
fn handoff(story_id: &str, stage: Stage) -> Contract {
    let target = stage.next().expect("agent stages have a successor");
    let mut contract = Contract::new(story_id, stage, target);
    if stage.position() >= Stage::Developer.position() {
        contract = contract.with_metric(
            "performance",
            "response_time_ms",
            MetricCriterion::max(120.0, 200.0).with_unit("ms"),
        );
    }
    if stage.position() >= Stage::TestEngineer.position() {
        contract = contract.with_metric("test_quality", "coverage_pct", MetricCriterion::min(88.0, 80.0));
    }
    if stage.position() >= Stage::QaTester.position() {
        contract = contract.with_metric(
            "accessibility",
            "wcag_compliance_pct",
            MetricCriterion::min(97.0, 95.0),
        );
    }
    contract
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(PipelineConfig::default()).unwrap()
}

async fn advance_to(orchestrator: &Orchestrator, story_id: &str, until: Stage) {
    for stage in Stage::AGENTS {
        if stage == until {
            return;
        }
        orchestrator.submit(handoff(story_id, stage)).await.unwrap();
    }
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>, count: usize) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while events.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("events delivered in time")
            .expect("channel open");
        events.push(event);
    }
    events
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_six_handoffs_reach_approved_then_deployed() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-100")).await.unwrap();

    let mut phases = Vec::new();
    for stage in Stage::AGENTS {
        let transition = orchestrator.submit(handoff("STORY-GH-100", stage)).await.unwrap();
        assert!(transition.compliance.overall_compliant);
        assert!(transition.gates.passed, "{}", transition.gates.summary);
        phases.push(transition.to);
    }
    assert_eq!(
        phases,
        vec![
            PipelinePhase::Analyzed,
            PipelinePhase::Designed,
            PipelinePhase::Implemented,
            PipelinePhase::Tested,
            PipelinePhase::Validated,
            PipelinePhase::Approved,
        ]
    );

    let state = orchestrator.deploy("STORY-GH-100").await.unwrap();
    assert_eq!(state.status, StoryStatus::Deployed);
    assert_eq!(state.phase, PipelinePhase::Deployed);
    assert_eq!(state.history.len(), 6);
    assert!(state.history.iter().all(|h| h.contract_hash.starts_with("blake3:")));
    assert!(state.finished_at.is_some());

    let err = orchestrator.deploy("STORY-GH-100").await.unwrap_err();
    assert!(matches!(err, HandoffError::StoryClosed { .. }));
}

#[tokio::test]
async fn test_runner_drives_agents_end_to_end() {
    struct Agent(Stage);

    impl StageAgent for Agent {
        fn stage(&self) -> Stage {
            self.0
        }

        fn produce(&self, input: &Contract) -> Result<Contract, HandoffError> {
            Ok(handoff(&input.story_id, self.0))
        }
    }

    let agents = Stage::AGENTS
        .iter()
        .map(|&s| Box::new(Agent(s)) as Box<dyn StageAgent>)
        .collect();
    let runner = PipelineRunner::new(Arc::new(orchestrator()), agents).unwrap();
    let report = runner.run(intake("STORY-GH-101")).await.unwrap();

    assert_eq!(report.status, StoryStatus::Deployed);
    assert_eq!(report.accepted_handoffs(), 6);
}

// =============================================================================
// Sequence and schema failures
// =============================================================================

#[tokio::test]
async fn test_skipping_stages_is_a_sequence_violation() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-102")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-102", Stage::Developer).await;

    let skipping = Contract::new("STORY-GH-102", Stage::GameDesigner, Stage::QaTester);
    let err = orchestrator.submit(skipping).await.unwrap_err();
    match err {
        HandoffError::SequenceViolation { from, to, .. } => {
            assert_eq!(from, Stage::GameDesigner);
            assert_eq!(to, Stage::QaTester);
        }
        other => panic!("unexpected error: {other}"),
    }

    let state = orchestrator.snapshot("STORY-GH-102").await.unwrap();
    assert_eq!(state.phase, PipelinePhase::Designed);
    assert_eq!(state.history.len(), 2);
    assert!(state.failed_attempts.is_empty());
}

// =============================================================================
// Compliance and retry budget
// =============================================================================

#[tokio::test]
async fn test_compliance_failure_returns_to_source_stage() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-103")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-103", Stage::GameDesigner).await;

    let failing = handoff("STORY-GH-103", Stage::GameDesigner)
        .with_design_principle(DesignPrinciple::TimeRespect, false);
    let err = orchestrator.submit(failing).await.unwrap_err();

    assert!(err.is_recoverable());
    let names: Vec<&str> = err.violations().iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["time_respect"]);
    assert!(err.violations()[0].recommendation.is_some());

    let state = orchestrator.snapshot("STORY-GH-103").await.unwrap();
    assert_eq!(state.phase, PipelinePhase::Analyzed);
    assert_eq!(state.expected_producer(), Some(Stage::GameDesigner));

    let revised = orchestrator.submit(handoff("STORY-GH-103", Stage::GameDesigner)).await.unwrap();
    assert_eq!(revised.revision, 2);
    assert_eq!(revised.to, PipelinePhase::Designed);
}

#[tokio::test]
async fn test_gate_failures_exhaust_retry_budget() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-104")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-104", Stage::Developer).await;

    let slow = || {
        Contract::new("STORY-GH-104", Stage::Developer, Stage::TestEngineer).with_metric(
            "performance",
            "response_time_ms",
            MetricCriterion::max(340.0, 200.0),
        )
    };

    for expected_left in [2, 1, 0] {
        let err = orchestrator.submit(slow()).await.unwrap_err();
        match err {
            HandoffError::GateViolation { retries_left, ref violations, .. } => {
                assert_eq!(retries_left, expected_left);
                assert_eq!(violations[0].name, "performance.response_time_ms");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    let state = orchestrator.snapshot("STORY-GH-104").await.unwrap();
    assert_eq!(state.status, StoryStatus::Blocked);
    assert!(state.blocked_reason.as_deref().unwrap().contains("developer"));

    let err = orchestrator.submit(handoff("STORY-GH-104", Stage::Developer)).await.unwrap_err();
    assert!(matches!(err, HandoffError::StoryBlocked { .. }));
}

// =============================================================================
// Monotonic tightening
// =============================================================================

#[tokio::test]
async fn test_looser_threshold_is_a_monotonicity_violation() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-105")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-105", Stage::TestEngineer).await;

    let loosened = Contract::new("STORY-GH-105", Stage::TestEngineer, Stage::QaTester)
        .with_metric("performance", "response_time_ms", MetricCriterion::max(150.0, 250.0))
        .with_metric("test_quality", "coverage_pct", MetricCriterion::min(88.0, 80.0));
    let before = orchestrator.snapshot("STORY-GH-105").await.unwrap();
    let err = orchestrator.submit(loosened).await.unwrap_err();
    let after = orchestrator.snapshot("STORY-GH-105").await.unwrap();
    assert_eq!(after.revision_count(Stage::TestEngineer), 0);
    assert_eq!(after.updated_at, before.updated_at);
    match err {
        HandoffError::MonotonicityViolation { gate, recorded, declared, .. } => {
            assert_eq!(gate, "performance.response_time_ms");
            assert_eq!(recorded, 200.0);
            assert_eq!(declared, 250.0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let tightened = Contract::new("STORY-GH-105", Stage::TestEngineer, Stage::QaTester)
        .with_metric("performance", "response_time_ms", MetricCriterion::max(150.0, 180.0))
        .with_metric("test_quality", "coverage_pct", MetricCriterion::min(88.0, 80.0));
    orchestrator.submit(tightened).await.unwrap();

    let state = orchestrator.snapshot("STORY-GH-105").await.unwrap();
    assert_eq!(state.thresholds.get("performance.response_time_ms").unwrap().threshold, 180.0);
    assert!(state.failed_attempts.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_for_one_story_have_one_winner() {
    let orchestrator = Arc::new(orchestrator());
    orchestrator.register(intake("STORY-GH-106")).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move {
            orchestrator.submit(handoff("STORY-GH-106", Stage::ProductOwner)).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err.category(), "SEQUENCE"),
        }
    }
    assert_eq!(winners, 1);

    let state = orchestrator.snapshot("STORY-GH-106").await.unwrap();
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.phase, PipelinePhase::Analyzed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_stories_progress_in_parallel() {
    let orchestrator = Arc::new(orchestrator());
    let mut tasks = Vec::new();
    for n in 0..10 {
        let orchestrator = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move {
            let story_id = format!("STORY-GH-2{:02}", n);
            orchestrator.register(intake(&story_id)).await?;
            for stage in Stage::AGENTS {
                orchestrator.submit(handoff(&story_id, stage)).await?;
            }
            orchestrator.deploy(&story_id).await
        }));
    }
    for task in tasks {
        let state = task.await.unwrap().unwrap();
        assert_eq!(state.status, StoryStatus::Deployed);
    }
    assert_eq!(orchestrator.story_ids().len(), 10);
}

// =============================================================================
// Review decisions
// =============================================================================

#[tokio::test]
async fn test_revision_request_routes_back_and_keeps_history() {
    let orchestrator = orchestrator();
    orchestrator.register(intake("STORY-GH-107")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-107", Stage::QualityReviewer).await;

    let review = handoff("STORY-GH-107", Stage::QualityReviewer).with_review_decision(
        ReviewDecision::RequestRevision {
            return_to: Stage::Developer,
            reason: Some("timer ignores pause".into()),
        },
    );
    let transition = orchestrator.submit(review).await.unwrap();
    assert_eq!(transition.to, PipelinePhase::RevisionRequested);

    let state = orchestrator.snapshot("STORY-GH-107").await.unwrap();
    assert_eq!(state.expected_producer(), Some(Stage::Developer));
    assert_eq!(state.history.len(), 6);

    for stage in [Stage::Developer, Stage::TestEngineer, Stage::QaTester, Stage::QualityReviewer] {
        orchestrator.submit(handoff("STORY-GH-107", stage)).await.unwrap();
    }

    let state = orchestrator.snapshot("STORY-GH-107").await.unwrap();
    assert_eq!(state.status, StoryStatus::Approved);
    assert_eq!(state.history.len(), 10);
    assert_eq!(state.revision_count(Stage::Developer), 2);
    assert_eq!(state.history[6].from, PipelinePhase::RevisionRequested);
    assert_eq!(state.history[6].stage, Stage::Developer);
}

#[tokio::test]
async fn test_manual_review_and_archival() {
    let config = PipelineConfig::default().with_auto_approve(false);
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.register(intake("STORY-GH-108")).await.unwrap();
    advance_to(&orchestrator, "STORY-GH-108", Stage::Deployment).await;

    let state = orchestrator.snapshot("STORY-GH-108").await.unwrap();
    assert_eq!(state.phase, PipelinePhase::Reviewed);
    assert_eq!(state.expected_producer(), None);

    let state = orchestrator
        .decide("STORY-GH-108", ReviewDecision::Reject { reason: Some("out of scope".into()) })
        .await
        .unwrap();
    assert_eq!(state.status, StoryStatus::Rejected);

    assert!(orchestrator.archive_expired(Utc::now()).await.is_empty());
    let archived = orchestrator.archive_expired(Utc::now() + ChronoDuration::days(8)).await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].history.len(), 6);
    assert!(orchestrator.story_ids().is_empty());
}

#[tokio::test]
async fn test_stalled_stage_is_reported() {
    let config = PipelineConfig::default().with_stage_budget(Stage::ProductOwner, Duration::from_secs(60));
    let orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.register(intake("STORY-GH-109")).await.unwrap();

    let later = Utc::now() + ChronoDuration::minutes(5);
    let stalled = orchestrator.stalled(later).await;
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].stage, Stage::ProductOwner);
    assert_eq!(stalled[0].budget, Duration::from_secs(60));

    orchestrator.abandon("STORY-GH-109", "product owner unresponsive").await.unwrap();
    assert!(orchestrator.stalled(later).await.is_empty());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_arrive_in_story_order() {
    let notifier = Arc::new(EventNotifier::new());
    let orchestrator = Arc::new(orchestrator().with_notifier(Arc::clone(&notifier)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    notifier
        .subscribe("**", move |event| {
            tx.send(event.clone())?;
            Ok(())
        })
        .unwrap();

    let mut tasks = Vec::new();
    for story_id in ["STORY-GH-110", "STORY-GH-111", "STORY-GH-112"] {
        let orchestrator = Arc::clone(&orchestrator);
        tasks.push(tokio::spawn(async move {
            orchestrator.register(intake(story_id)).await.unwrap();
            for stage in Stage::AGENTS {
                orchestrator.submit(handoff(story_id, stage)).await.unwrap();
            }
            orchestrator.deploy(story_id).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = notifier.journal().len();
    let events = collect(&mut rx, total).await;
    let mut per_story: HashMap<String, Vec<u64>> = HashMap::new();
    for event in &events {
        per_story.entry(event.story_id.clone()).or_default().push(event.sequence);
    }
    for sequences in per_story.values() {
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        assert_eq!(sequences, &expected);
    }

    let story = notifier.journal().entries_for_story("STORY-GH-110");
    assert_eq!(story.first().unwrap().topic, Topic::started(Stage::ProductOwner));
    assert_eq!(story.last().unwrap().topic.to_string(), "pipeline.deployed");
}

#[tokio::test]
async fn test_failing_subscriber_does_not_stall_the_pipeline() {
    let notifier = Arc::new(EventNotifier::new());
    let orchestrator = orchestrator().with_notifier(Arc::clone(&notifier));

    let failures = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&failures);
    notifier
        .subscribe("stage.**", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("downstream unavailable".into())
        })
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    notifier
        .subscribe("pipeline.*", move |event| {
            tx.send(event.clone())?;
            Ok(())
        })
        .unwrap();

    orchestrator.register(intake("STORY-GH-113")).await.unwrap();
    for stage in Stage::AGENTS {
        orchestrator.submit(handoff("STORY-GH-113", stage)).await.unwrap();
    }
    orchestrator.deploy("STORY-GH-113").await.unwrap();

    let outcomes = collect(&mut rx, 2).await;
    let topics: Vec<String> = outcomes.iter().map(|e| e.topic.to_string()).collect();
    assert_eq!(topics, vec!["pipeline.approved", "pipeline.deployed"]);
    assert!(failures.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_rejection_event_carries_violations() {
    let notifier = Arc::new(EventNotifier::new());
    let orchestrator = orchestrator().with_notifier(Arc::clone(&notifier));
    let (tx, mut rx) = mpsc::unbounded_channel();
    notifier
        .subscribe("pipeline.rejected", move |event| {
            tx.send(event.clone())?;
            Ok(())
        })
        .unwrap();

    orchestrator.register(intake("STORY-GH-114")).await.unwrap();
    let failing = handoff("STORY-GH-114", Stage::ProductOwner)
        .with_design_principle(DesignPrinciple::ProfessionalTone, false);
    orchestrator.submit(failing).await.unwrap_err();

    let event = collect(&mut rx, 1).await.remove(0);
    assert_eq!(event.payload["scope"], "handoff");
    assert_eq!(event.payload["stage"], "product_owner");
    let violations: Vec<Violation> = serde_json::from_value(event.payload["violations"].clone()).unwrap();
    assert_eq!(violations[0].name, "professional_tone");
}
