//! Handoff Compliance: DNA principle scoring
//!
//! Every contract reports against five design principles and four
//! architecture principles. The [`ComplianceEngine`] aggregates what the
//! producing stage declared into one [`ComplianceResult`], using the same
//! rules for every stage.
//!
//! # Example
//!
//! ```
//! use handoff_compliance::ComplianceEngine;
//! use handoff_core::{Contract, DesignPrinciple, Stage};
//!
//! let contract = Contract::new("STORY-GH-9", Stage::GameDesigner, Stage::Developer)
//!     .with_design_principle(DesignPrinciple::TimeRespect, false);
//!
//! let result = ComplianceEngine::default().score(&contract);
//! assert!(!result.overall_compliant);
//! assert_eq!(result.violation_names(), vec!["time_respect"]);
//! ```

pub mod engine;
pub mod result;

pub use engine::{ComplianceConfig, ComplianceEngine, DEFAULT_MINIMUM, FAIL_SCORE, PASS_SCORE};
pub use result::{ComplianceResult, PrincipleOutcome};

use handoff_core::Contract;

/// Score with the default configuration
pub fn score(contract: &Contract) -> ComplianceResult {
    ComplianceEngine::default().score(contract)
}

/// Whether a contract would pass compliance under the default configuration
pub fn is_compliant(contract: &Contract) -> bool {
    score(contract).overall_compliant
}
