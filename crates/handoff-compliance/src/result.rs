//! ComplianceResult: produced fresh for every scoring pass
use chrono::{DateTime, Utc};
use handoff_core::{PrincipleGroup, Stage, Violation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome for a single principle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipleOutcome {
    pub name: String,
    pub group: PrincipleGroup,
    pub passed: bool,
    /// Sub-score used in the aggregate (declared, or 5.0 / 1.0)
    pub score: f64,
    /// Whether `score` came from a declared sub-score
    pub declared_score: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// Stage whose contract was scored
    pub stage: Stage,
    /// Per-principle outcomes, design first
    pub principles: Vec<PrincipleOutcome>,
    /// Mean of all sub-scores, one decimal, 1.0–5.0
    pub aggregate_score: f64,
    /// Minimum applied to this stage
    pub minimum_score: f64,
    /// Every principle passed and the aggregate met the minimum
    pub overall_compliant: bool,
    /// One per failing principle, plus `aggregate_score` on a shortfall
    pub violations: Vec<Violation>,
    /// Never blocking
    pub recommendations: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl ComplianceResult {
    /// Names of the failing checks, in order
    pub fn violation_names(&self) -> Vec<&str> {
        handoff_core::violation_names(&self.violations)
    }

    /// Outcome for a principle by name
    pub fn principle(&self, name: &str) -> Option<&PrincipleOutcome> {
        self.principles.iter().find(|p| p.name == name)
    }

    pub fn failing_principles(&self) -> impl Iterator<Item = &PrincipleOutcome> {
        self.principles.iter().filter(|p| !p.passed)
    }

    pub fn summary(&self) -> String {
        if self.overall_compliant {
            format!(
                "COMPLIANT: {} scored {:.1} (min {:.1})",
                self.stage, self.aggregate_score, self.minimum_score
            )
        } else {
            format!(
                "NON-COMPLIANT: {} scored {:.1} (min {:.1}); failing: {}",
                self.stage,
                self.aggregate_score,
                self.minimum_score,
                self.violation_names().join(", ")
            )
        }
    }
}

impl fmt::Display for ComplianceResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
