//! Pipeline Orchestrator: one state machine per story
//!
//! Validation, scoring and gating are pure and run before the story lock
//! is taken. The story map lock is only held to look up or insert an
//! entry; transitions on a story are serialized by that story's own async
//! mutex, so different stories never contend.

use crate::config::PipelineConfig;
use crate::events::{PipelineEvent, PipelineOutcome, Topic};
use crate::notifier::EventNotifier;
use crate::state::{HistoryEntry, PipelinePhase, PipelineState, StoryStatus};
use chrono::{DateTime, Utc};
use handoff_compliance::{ComplianceEngine, ComplianceResult};
use handoff_core::{Contract, HandoffError, ReviewDecision, SchemaValidator, Stage};
use handoff_quality::{GateReport, QualityGate};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type StoryEntry = Arc<Mutex<PipelineState>>;

/// Result of an accepted handoff
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub story_id: String,
    pub stage: Stage,
    pub from: PipelinePhase,
    /// Phase after the handoff and any review decision it carried
    pub to: PipelinePhase,
    pub status: StoryStatus,
    pub revision: u32,
    pub contract_hash: String,
    pub compliance: ComplianceResult,
    pub gates: GateReport,
}

/// A story whose awaited stage is over its response budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StalledStory {
    pub story_id: String,
    pub stage: Stage,
    pub waiting: Duration,
    pub budget: Duration,
}

pub struct Orchestrator {
    config: PipelineConfig,
    validator: SchemaValidator,
    compliance: ComplianceEngine,
    gates: QualityGate,
    notifier: Arc<EventNotifier>,
    stories: RwLock<HashMap<String, StoryEntry>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self, HandoffError> {
        config.validate()?;
        Ok(Self {
            validator: SchemaValidator::new(),
            compliance: ComplianceEngine::new(config.compliance.clone()),
            gates: QualityGate::new(config.gates.clone()),
            notifier: Arc::new(EventNotifier::new()),
            stories: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    /// Start tracking a story from its intake contract
    pub async fn register(&self, intake: Contract) -> Result<PipelineState, HandoffError> {
        self.validator.validate_contract(&intake)?;
        if intake.source_stage != Stage::Intake {
            return Err(HandoffError::SequenceViolation {
                from: intake.source_stage,
                to: intake.target_stage,
                reason: "stories are registered from an intake contract".into(),
            });
        }

        let story_id = intake.story_id.clone();
        let mut state = PipelineState::new(intake, Utc::now());
        let event = self.event(&mut state, Topic::started(Stage::ProductOwner), json!({}));
        let snapshot = state.clone();

        {
            let mut stories = self.stories.write();
            if stories.contains_key(&story_id) {
                return Err(HandoffError::DuplicateStory(story_id));
            }
            stories.insert(story_id.clone(), Arc::new(Mutex::new(state)));
            // Published before the entry is reachable so it stays first.
            self.notifier.publish(event);
        }

        info!(story_id = %story_id, "story registered");
        Ok(snapshot)
    }

    /// Submit the contract a stage emitted for its story.
    ///
    /// Schema, sequence and monotonicity failures are returned as-is and do
    /// not count against the retry budget. Compliance and gate failures
    /// count; the story is blocked once the budget is spent.
    pub async fn submit(&self, contract: Contract) -> Result<Transition, HandoffError> {
        self.validator.validate_contract(&contract)?;
        let stage = contract.source_stage;
        let Some(completed) = PipelinePhase::completed_by(stage) else {
            return Err(HandoffError::SequenceViolation {
                from: stage,
                to: contract.target_stage,
                reason: "only agent stages submit handoffs".into(),
            });
        };

        let compliance = self.compliance.score(&contract);
        let gates = self.gates.evaluate(&contract, stage);
        let contract_hash = contract.digest()?;

        let entry = self.entry(&contract.story_id)?;
        let mut state = entry.lock().await;
        ensure_open(&state)?;
        match state.expected_producer() {
            Some(expected) if expected == stage => {}
            expected => {
                let reason = match expected {
                    Some(expected) => format!("story is {}, awaiting {}", state.phase, expected),
                    None => format!("story is {}, no handoff expected", state.phase),
                };
                return Err(HandoffError::SequenceViolation {
                    from: stage,
                    to: contract.target_stage,
                    reason,
                });
            }
        }

        state.thresholds.check(&contract)?;
        let now = Utc::now();
        *state.revisions.entry(stage).or_insert(0) += 1;
        state.touch(now);

        if !compliance.overall_compliant || !gates.passed {
            return Err(self.reject_attempt(&mut state, stage, compliance, gates, now));
        }

        let from = state.phase;
        let revision = state.revision_count(stage);
        let decision = contract.review_decision().cloned();
        state.thresholds.record(&contract);
        state.failed_attempts.remove(&stage);
        state.revision_target = None;
        state.phase = completed;
        state.history.push(HistoryEntry {
            stage,
            from,
            to: completed,
            revision,
            contract: Arc::new(contract),
            contract_hash: contract_hash.clone(),
            compliance: compliance.clone(),
            gates: gates.clone(),
            accepted_at: now,
        });

        info!(
            story_id = %state.story_id,
            stage = %stage,
            from = %from,
            to = %completed,
            revision,
            score = compliance.aggregate_score,
            "handoff accepted"
        );
        let event = self.event(
            &mut state,
            Topic::completed(stage),
            json!({
                "from": from,
                "to": completed,
                "revision": revision,
                "contract_hash": contract_hash,
                "aggregate_score": compliance.aggregate_score,
            }),
        );
        self.notifier.publish(event);

        match state.expected_producer() {
            Some(next) => self.await_stage(&mut state, next, now),
            None if stage == Stage::QualityReviewer => match decision {
                Some(decision) => self.apply_decision(&mut state, decision, now),
                None if self.config.auto_approve => {
                    self.apply_decision(&mut state, ReviewDecision::Approve { reason: None }, now)
                }
                None => debug!(story_id = %state.story_id, "awaiting review decision"),
            },
            None => {}
        }

        Ok(Transition {
            story_id: state.story_id.clone(),
            stage,
            from,
            to: state.phase,
            status: state.status,
            revision,
            contract_hash,
            compliance,
            gates,
        })
    }

    /// Apply a review decision to a story waiting in `reviewed`
    pub async fn decide(&self, story_id: &str, decision: ReviewDecision) -> Result<PipelineState, HandoffError> {
        check_decision(&decision)?;
        let entry = self.entry(story_id)?;
        let mut state = entry.lock().await;
        ensure_open(&state)?;
        if state.phase != PipelinePhase::Reviewed {
            return Err(HandoffError::InvalidDecision(format!(
                "{}: story is {}, not awaiting a review decision",
                story_id, state.phase
            )));
        }
        self.apply_decision(&mut state, decision, Utc::now());
        Ok(state.clone())
    }

    /// Move an approved story to its terminal state
    pub async fn deploy(&self, story_id: &str) -> Result<PipelineState, HandoffError> {
        let entry = self.entry(story_id)?;
        let mut state = entry.lock().await;
        ensure_open(&state)?;
        if state.status != StoryStatus::Approved {
            return Err(HandoffError::InvalidDecision(format!(
                "{}: story is {}, only approved stories deploy",
                story_id, state.phase
            )));
        }

        let now = Utc::now();
        state.finish(PipelinePhase::Deployed, StoryStatus::Deployed, now);
        info!(story_id = %story_id, "story deployed");
        let event = self.event(&mut state, Topic::Pipeline(PipelineOutcome::Deployed), json!({}));
        self.notifier.publish(event);
        Ok(state.clone())
    }

    /// Block a story from outside. Transitions are refused until `resume`.
    pub async fn abandon(&self, story_id: &str, reason: &str) -> Result<PipelineState, HandoffError> {
        let entry = self.entry(story_id)?;
        let mut state = entry.lock().await;
        if state.status.is_closed() {
            return Err(closed(&state));
        }
        self.block(&mut state, reason.to_string(), Utc::now());
        Ok(state.clone())
    }

    /// Unblock a story and give the awaited stage a fresh retry budget
    pub async fn resume(&self, story_id: &str) -> Result<PipelineState, HandoffError> {
        let entry = self.entry(story_id)?;
        let mut state = entry.lock().await;
        if state.status != StoryStatus::Blocked {
            return Err(HandoffError::InvalidDecision(format!(
                "{}: story is {}, not blocked",
                story_id, state.status
            )));
        }

        let now = Utc::now();
        state.status = if state.phase == PipelinePhase::Approved {
            StoryStatus::Approved
        } else {
            StoryStatus::Active
        };
        state.blocked_reason = None;
        state.failed_attempts.clear();
        state.touch(now);
        info!(story_id = %story_id, phase = %state.phase, "story resumed");
        if let Some(stage) = state.expected_producer() {
            self.await_stage(&mut state, stage, now);
        }
        Ok(state.clone())
    }

    /// Progress report from the awaited stage
    pub async fn report_milestone(&self, story_id: &str, stage: Stage, label: &str) -> Result<(), HandoffError> {
        let entry = self.entry(story_id)?;
        let mut state = entry.lock().await;
        ensure_open(&state)?;
        if state.expected_producer() != Some(stage) {
            return Err(HandoffError::Agent {
                stage,
                message: format!("{}: not the awaited stage (story is {})", story_id, state.phase),
            });
        }

        let now = Utc::now();
        state.awaiting_since = now;
        state.touch(now);
        let event = self.event(&mut state, Topic::milestone(stage), json!({ "label": label }));
        self.notifier.publish(event);
        Ok(())
    }

    /// Stories whose awaited stage has been silent for longer than its budget
    pub async fn stalled(&self, now: DateTime<Utc>) -> Vec<StalledStory> {
        let mut stalled = Vec::new();
        for entry in self.entries() {
            let state = entry.lock().await;
            let Some(stage) = state.expected_producer() else {
                continue;
            };
            let budget = self.config.budget_for(stage);
            let waiting = (now - state.awaiting_since).to_std().unwrap_or_default();
            if waiting > budget {
                stalled.push(StalledStory {
                    story_id: state.story_id.clone(),
                    stage,
                    waiting,
                    budget,
                });
            }
        }
        stalled.sort_by(|a, b| a.story_id.cmp(&b.story_id));
        stalled
    }

    pub async fn snapshot(&self, story_id: &str) -> Result<PipelineState, HandoffError> {
        let entry = self.entry(story_id)?;
        let state = entry.lock().await;
        Ok(state.clone())
    }

    pub fn story_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.stories.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove rejected and deployed stories older than the retention
    /// window, returning their final state
    pub async fn archive_expired(&self, now: DateTime<Utc>) -> Vec<PipelineState> {
        let retention = self.config.retention();
        let mut expired = Vec::new();
        for entry in self.entries() {
            let state = entry.lock().await;
            let Some(finished_at) = state.finished_at else {
                continue;
            };
            let age = (now - finished_at).to_std().unwrap_or_default();
            if state.status.is_closed() && age >= retention {
                expired.push(state.clone());
            }
        }

        let mut stories = self.stories.write();
        for state in &expired {
            stories.remove(&state.story_id);
            info!(story_id = %state.story_id, status = %state.status, "story archived");
        }
        expired
    }

    fn entry(&self, story_id: &str) -> Result<StoryEntry, HandoffError> {
        self.stories
            .read()
            .get(story_id)
            .cloned()
            .ok_or_else(|| HandoffError::UnknownStory(story_id.to_string()))
    }

    fn entries(&self) -> Vec<StoryEntry> {
        self.stories.read().values().cloned().collect()
    }

    fn event(&self, state: &mut PipelineState, topic: Topic, payload: serde_json::Value) -> PipelineEvent {
        let sequence = state.next_sequence();
        PipelineEvent::new(state.story_id.clone(), topic, sequence, payload)
    }

    fn await_stage(&self, state: &mut PipelineState, stage: Stage, now: DateTime<Utc>) {
        state.awaiting_since = now;
        let payload = json!({ "phase": state.phase });
        let event = self.event(state, Topic::started(stage), payload);
        self.notifier.publish(event);
    }

    fn reject_attempt(
        &self,
        state: &mut PipelineState,
        stage: Stage,
        compliance: ComplianceResult,
        gates: GateReport,
        now: DateTime<Utc>,
    ) -> HandoffError {
        let attempts = {
            let attempts = state.failed_attempts.entry(stage).or_insert(0);
            *attempts += 1;
            *attempts
        };
        let retries_left = self.config.max_retries.saturating_sub(attempts);

        let mut violations = compliance.violations.clone();
        violations.extend(gates.violations());
        warn!(
            story_id = %state.story_id,
            stage = %stage,
            attempt = attempts,
            retries_left,
            violations = %handoff_core::violation_names(&violations).join(","),
            "handoff rejected"
        );
        let event = self.event(
            state,
            Topic::Pipeline(PipelineOutcome::Rejected),
            json!({
                "scope": "handoff",
                "stage": stage,
                "attempt": attempts,
                "retries_left": retries_left,
                "violations": violations,
                "recommendations": compliance.recommendations,
            }),
        );
        self.notifier.publish(event);

        if retries_left == 0 {
            let reason = format!("{} exhausted {} attempts", stage, self.config.max_retries);
            self.block(state, reason, now);
        }

        let story_id = state.story_id.clone();
        if compliance.overall_compliant {
            HandoffError::GateViolation {
                story_id,
                stage,
                violations,
                retries_left,
            }
        } else {
            let mut recommendations = compliance.recommendations;
            recommendations.extend(
                gates
                    .violations()
                    .into_iter()
                    .filter_map(|v| v.recommendation.map(|r| format!("{}: {}", v.name, r))),
            );
            HandoffError::ComplianceViolation {
                story_id,
                stage,
                violations,
                recommendations,
                retries_left,
            }
        }
    }

    fn apply_decision(&self, state: &mut PipelineState, decision: ReviewDecision, now: DateTime<Utc>) {
        info!(story_id = %state.story_id, decision = decision.label(), "review decision");
        match decision {
            ReviewDecision::Approve { reason } => {
                state.phase = PipelinePhase::Approved;
                state.status = StoryStatus::Approved;
                state.touch(now);
                let event = self.event(state, Topic::Pipeline(PipelineOutcome::Approved), json!({ "reason": reason }));
                self.notifier.publish(event);
            }
            ReviewDecision::RequestRevision { return_to, reason } => {
                state.phase = PipelinePhase::RevisionRequested;
                state.revision_target = Some(return_to);
                state.failed_attempts.remove(&return_to);
                state.touch(now);
                let event = self.event(
                    state,
                    Topic::Pipeline(PipelineOutcome::RevisionRequested),
                    json!({ "return_to": return_to, "reason": reason }),
                );
                self.notifier.publish(event);
                self.await_stage(state, return_to, now);
            }
            ReviewDecision::Reject { reason } => {
                state.finish(PipelinePhase::Rejected, StoryStatus::Rejected, now);
                let event = self.event(
                    state,
                    Topic::Pipeline(PipelineOutcome::Rejected),
                    json!({ "scope": "story", "reason": reason }),
                );
                self.notifier.publish(event);
            }
        }
    }

    fn block(&self, state: &mut PipelineState, reason: String, now: DateTime<Utc>) {
        warn!(story_id = %state.story_id, reason = %reason, "story blocked");
        state.status = StoryStatus::Blocked;
        state.blocked_reason = Some(reason.clone());
        state.touch(now);
        let payload = json!({ "phase": state.phase, "reason": reason });
        let event = self.event(state, Topic::Pipeline(PipelineOutcome::Blocked), payload);
        self.notifier.publish(event);
    }
}

fn ensure_open(state: &PipelineState) -> Result<(), HandoffError> {
    if state.status.is_closed() {
        return Err(closed(state));
    }
    if state.status == StoryStatus::Blocked {
        return Err(HandoffError::StoryBlocked {
            story_id: state.story_id.clone(),
            reason: state.blocked_reason.clone().unwrap_or_default(),
        });
    }
    Ok(())
}

fn closed(state: &PipelineState) -> HandoffError {
    HandoffError::StoryClosed {
        story_id: state.story_id.clone(),
        status: state.status.to_string(),
    }
}

fn check_decision(decision: &ReviewDecision) -> Result<(), HandoffError> {
    if let ReviewDecision::RequestRevision { return_to, .. } = decision {
        if !return_to.is_agent() || !return_to.precedes(Stage::QualityReviewer) {
            return Err(HandoffError::InvalidDecision(format!(
                "cannot return a story to {}",
                return_to
            )));
        }
    }
    Ok(())
}
