//! Handoff Quality: stage-aware quality gates
//!
//! A contract passes its gates when every declared metric sits within its
//! threshold, every handoff criterion is met and the output covers the
//! input requirements. Thresholds come from the contract itself and from
//! the [`StageProfiles`] of the producing stage; the stricter one wins.
//! The [`ThresholdLedger`] keeps a story from loosening a threshold an
//! earlier stage already accepted.
//!
//! # Example
//!
//! ```
//! use handoff_core::{Contract, MetricCriterion, Stage};
//! use handoff_quality::QualityGate;
//!
//! let contract = Contract::new("STORY-GH-7", Stage::Developer, Stage::TestEngineer)
//!     .with_metric("performance", "response_time_ms", MetricCriterion::max(240.0, 200.0));
//!
//! let report = QualityGate::default().evaluate(&contract, Stage::Developer);
//! assert!(!report.passed);
//! assert_eq!(report.violations()[0].name, "performance.response_time_ms");
//! ```

pub mod gate;
pub mod ledger;
pub mod profile;

pub use gate::{CheckStatus, GateCategory, GateCheck, GateOptions, GateReport, QualityGate};
pub use ledger::{ThresholdLedger, ThresholdRecord};
pub use profile::{
    GateProfile, GateThreshold, StageProfiles, ACCESSIBILITY_GATE, COVERAGE_GATE, RESPONSE_TIME_GATE,
};

use handoff_core::Contract;

/// Evaluate with the standard profiles, as produced by its source stage
pub fn evaluate(contract: &Contract) -> GateReport {
    QualityGate::default().evaluate(contract, contract.source_stage)
}
