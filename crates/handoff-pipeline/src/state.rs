//! Per-story pipeline state
//!
//! Only the orchestrator mutates a [`PipelineState`]. Callers see clones
//! through [`crate::Orchestrator::snapshot`].

use chrono::{DateTime, Utc};
use handoff_compliance::ComplianceResult;
use handoff_core::{Contract, Stage};
use handoff_quality::{GateReport, ThresholdLedger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where a story stands in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Received,
    Analyzed,
    Designed,
    Implemented,
    Tested,
    Validated,
    Reviewed,
    Approved,
    RevisionRequested,
    Rejected,
    Deployed,
}

impl PipelinePhase {
    /// Phase reached once `stage` has handed off successfully
    pub fn completed_by(stage: Stage) -> Option<Self> {
        match stage {
            Stage::ProductOwner => Some(PipelinePhase::Analyzed),
            Stage::GameDesigner => Some(PipelinePhase::Designed),
            Stage::Developer => Some(PipelinePhase::Implemented),
            Stage::TestEngineer => Some(PipelinePhase::Tested),
            Stage::QaTester => Some(PipelinePhase::Validated),
            Stage::QualityReviewer => Some(PipelinePhase::Reviewed),
            Stage::Intake | Stage::Deployment => None,
        }
    }

    /// Stage whose contract moves the story out of this phase. Review
    /// decisions, revision routing and terminal phases have none.
    pub fn next_producer(&self) -> Option<Stage> {
        match self {
            PipelinePhase::Received => Some(Stage::ProductOwner),
            PipelinePhase::Analyzed => Some(Stage::GameDesigner),
            PipelinePhase::Designed => Some(Stage::Developer),
            PipelinePhase::Implemented => Some(Stage::TestEngineer),
            PipelinePhase::Tested => Some(Stage::QaTester),
            PipelinePhase::Validated => Some(Stage::QualityReviewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Received => "received",
            PipelinePhase::Analyzed => "analyzed",
            PipelinePhase::Designed => "designed",
            PipelinePhase::Implemented => "implemented",
            PipelinePhase::Tested => "tested",
            PipelinePhase::Validated => "validated",
            PipelinePhase::Reviewed => "reviewed",
            PipelinePhase::Approved => "approved",
            PipelinePhase::RevisionRequested => "revision_requested",
            PipelinePhase::Rejected => "rejected",
            PipelinePhase::Deployed => "deployed",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Active,
    Blocked,
    Rejected,
    Approved,
    Deployed,
}

impl StoryStatus {
    /// No further transition is possible
    pub fn is_closed(&self) -> bool {
        matches!(self, StoryStatus::Rejected | StoryStatus::Deployed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Active => "active",
            StoryStatus::Blocked => "blocked",
            StoryStatus::Rejected => "rejected",
            StoryStatus::Approved => "approved",
            StoryStatus::Deployed => "deployed",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Stage that produced the contract
    pub stage: Stage,
    pub from: PipelinePhase,
    pub to: PipelinePhase,
    /// Submission count of `stage` when this contract was accepted
    pub revision: u32,
    /// Contract as accepted
    pub contract: Arc<Contract>,
    /// `blake3:<hex>` of the contract's canonical JSON
    pub contract_hash: String,
    pub compliance: ComplianceResult,
    pub gates: GateReport,
    /// When the orchestrator accepted it
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub story_id: String,
    /// Position in the pipeline
    pub phase: PipelinePhase,
    /// Whether the story can still move
    pub status: StoryStatus,
    /// Contract the story was registered with
    pub intake: Arc<Contract>,
    /// Accepted handoffs, oldest first. Append-only.
    pub history: Vec<HistoryEntry>,
    /// Submissions per stage, accepted or not
    pub revisions: BTreeMap<Stage, u32>,
    /// Failed compliance/gate attempts per stage in the current cycle
    pub failed_attempts: BTreeMap<Stage, u32>,
    /// Strictest accepted threshold per gate
    pub thresholds: ThresholdLedger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the awaited stage was last handed work or reported progress
    pub awaiting_since: DateTime<Utc>,
    /// Set when the story is rejected or deployed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the story is blocked, while it is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// Stage a review sent the story back to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_target: Option<Stage>,
    /// Sequence number of the last event published for this story
    pub last_sequence: u64,
}

impl PipelineState {
    pub fn new(intake: Contract, now: DateTime<Utc>) -> Self {
        let mut thresholds = ThresholdLedger::new();
        thresholds.record(&intake);
        Self {
            story_id: intake.story_id.clone(),
            phase: PipelinePhase::Received,
            status: StoryStatus::Active,
            intake: Arc::new(intake),
            history: Vec::new(),
            revisions: BTreeMap::new(),
            failed_attempts: BTreeMap::new(),
            thresholds,
            created_at: now,
            updated_at: now,
            awaiting_since: now,
            finished_at: None,
            blocked_reason: None,
            revision_target: None,
            last_sequence: 0,
        }
    }

    /// Stage allowed to submit the next contract, if any
    pub fn expected_producer(&self) -> Option<Stage> {
        if self.status != StoryStatus::Active {
            return None;
        }
        match self.phase {
            PipelinePhase::RevisionRequested => self.revision_target,
            phase => phase.next_producer(),
        }
    }

    /// Most recently accepted contract, or the intake contract
    pub fn current_contract(&self) -> Arc<Contract> {
        self.history
            .last()
            .map(|entry| Arc::clone(&entry.contract))
            .unwrap_or_else(|| Arc::clone(&self.intake))
    }

    /// Latest accepted contract from `stage`
    pub fn accepted_from(&self, stage: Stage) -> Option<&HistoryEntry> {
        self.history.iter().rev().find(|entry| entry.stage == stage)
    }

    pub fn revision_count(&self, stage: Stage) -> u32 {
        self.revisions.get(&stage).copied().unwrap_or(0)
    }

    pub fn failed_attempts(&self, stage: Stage) -> u32 {
        self.failed_attempts.get(&stage).copied().unwrap_or(0)
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub(crate) fn finish(&mut self, phase: PipelinePhase, status: StoryStatus, now: DateTime<Utc>) {
        self.phase = phase;
        self.status = status;
        self.finished_at = Some(now);
        self.touch(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_follow_stage_order() {
        for stage in Stage::AGENTS {
            let completed = PipelinePhase::completed_by(stage).unwrap();
            assert_eq!(completed.next_producer(), stage.next().filter(|s| s.is_agent()));
        }
        assert_eq!(PipelinePhase::Received.next_producer(), Some(Stage::ProductOwner));
        assert_eq!(PipelinePhase::completed_by(Stage::Deployment), None);
    }

    #[test]
    fn test_expected_producer() {
        let intake = Contract::new("STORY-GH-1", Stage::Intake, Stage::ProductOwner);
        let mut state = PipelineState::new(intake, Utc::now());
        assert_eq!(state.expected_producer(), Some(Stage::ProductOwner));

        state.phase = PipelinePhase::RevisionRequested;
        state.revision_target = Some(Stage::Developer);
        assert_eq!(state.expected_producer(), Some(Stage::Developer));

        state.status = StoryStatus::Blocked;
        assert_eq!(state.expected_producer(), None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let intake = Contract::new("STORY-GH-1", Stage::Intake, Stage::ProductOwner);
        let state = PipelineState::new(intake, Utc::now());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "received");
        assert_eq!(json["status"], "active");
        assert_eq!(json["intake"]["story_id"], "STORY-GH-1");
    }
}
