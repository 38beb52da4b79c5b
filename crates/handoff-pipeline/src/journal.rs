//! Event journal
//!
//! Bounded in-memory record of every published event, for inspection and
//! debugging. The oldest entries are dropped first.

use crate::events::{PipelineEvent, PipelineOutcome, StageStep, Topic};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

pub struct EventJournal {
    entries: RwLock<VecDeque<PipelineEvent>>,
    max_entries: usize,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max,
        }
    }

    pub fn record(&self, event: PipelineEvent) {
        let mut entries = self.entries.write();
        entries.push_back(event);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn entries(&self) -> Vec<PipelineEvent> {
        self.entries.read().iter().cloned().collect()
    }

    /// Events of one story in emission order
    pub fn entries_for_story(&self, story_id: &str) -> Vec<PipelineEvent> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.story_id == story_id)
            .cloned()
            .collect()
    }

    pub fn entries_since(&self, since: DateTime<Utc>) -> Vec<PipelineEvent> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.occurred_at >= since)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Export as JSON Lines
    pub fn to_jsonl(&self) -> String {
        self.entries
            .read()
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn stats(&self) -> JournalStats {
        let entries = self.entries.read();
        let count = |outcome: PipelineOutcome| {
            entries
                .iter()
                .filter(|e| e.topic == Topic::Pipeline(outcome))
                .count()
        };
        let completed_handoffs = entries
            .iter()
            .filter(|e| matches!(e.topic, Topic::Stage(_, StageStep::Completed)))
            .count();
        let rejections = count(PipelineOutcome::Rejected);

        JournalStats {
            total: entries.len(),
            completed_handoffs,
            rejections,
            blocked: count(PipelineOutcome::Blocked),
            revisions_requested: count(PipelineOutcome::RevisionRequested),
            approved: count(PipelineOutcome::Approved),
            deployed: count(PipelineOutcome::Deployed),
            rejection_rate: if completed_handoffs + rejections > 0 {
                rejections as f64 / (completed_handoffs + rejections) as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalStats {
    pub total: usize,
    pub completed_handoffs: usize,
    pub rejections: usize,
    pub blocked: usize,
    pub revisions_requested: usize,
    pub approved: usize,
    pub deployed: usize,
    /// Rejections over all handoff outcomes
    pub rejection_rate: f64,
}
