//! Threshold ledger: the strictest threshold accepted so far per gate
//!
//! One ledger lives with each story. A contract may only repeat or tighten
//! a threshold that an earlier stage already had accepted.

use handoff_core::{Bound, Contract, HandoffError, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strictest accepted threshold for one gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    /// Tightest value accepted so far
    pub threshold: f64,
    /// Direction the threshold was first declared with
    pub bound: Bound,
    /// Stage whose contract set this threshold
    pub stage: Stage,
}

/// Per-story record of accepted thresholds, keyed by `dimension.metric`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLedger {
    entries: BTreeMap<String, ThresholdRecord>,
}

impl ThresholdLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gate: &str) -> Option<&ThresholdRecord> {
        self.entries.get(gate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject a contract that loosens or flips a recorded threshold
    pub fn check(&self, contract: &Contract) -> Result<(), HandoffError> {
        for (gate, criterion) in declared_thresholds(contract) {
            let Some(recorded) = self.entries.get(&gate) else {
                continue;
            };
            let (bound, threshold) = criterion;
            if bound != recorded.bound || bound.is_looser(threshold, recorded.threshold) {
                return Err(HandoffError::MonotonicityViolation {
                    story_id: contract.story_id.clone(),
                    stage: contract.source_stage,
                    gate,
                    recorded: recorded.threshold,
                    declared: threshold,
                });
            }
        }
        Ok(())
    }

    /// Record the thresholds of an accepted contract, keeping the strictest
    pub fn record(&mut self, contract: &Contract) {
        for (gate, (bound, threshold)) in declared_thresholds(contract) {
            let stage = contract.source_stage;
            self.entries
                .entry(gate)
                .and_modify(|r| {
                    if r.bound == bound && bound.is_looser(r.threshold, threshold) {
                        r.threshold = threshold;
                        r.stage = stage;
                    }
                })
                .or_insert(ThresholdRecord { threshold, bound, stage });
        }
    }
}

fn declared_thresholds(contract: &Contract) -> Vec<(String, (Bound, f64))> {
    contract
        .output_specifications
        .validation_criteria
        .iter()
        .flat_map(|(dimension, metrics)| {
            metrics.iter().filter_map(move |(metric, criterion)| {
                criterion
                    .threshold
                    .map(|t| (format!("{}.{}", dimension, metric), (criterion.bound, t)))
            })
        })
        .collect()
}
