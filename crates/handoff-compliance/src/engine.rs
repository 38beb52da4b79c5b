//! Compliance Engine
//!
//! Aggregates the sub-scores each stage embedded in its contract. The
//! engine never computes a principle itself; it only resolves, averages
//! and thresholds what was declared.

use crate::result::{ComplianceResult, PrincipleOutcome};
use chrono::Utc;
use handoff_core::{Contract, HandoffError, Principle, Stage, Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score given to a passing principle without a declared sub-score
pub const PASS_SCORE: f64 = 5.0;
/// Score given to a failing principle without a declared sub-score
pub const FAIL_SCORE: f64 = 1.0;
/// Default aggregate minimum
pub const DEFAULT_MINIMUM: f64 = 3.5;

/// Thresholds for compliance scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Aggregate minimum for every stage without an override
    pub minimum_score: f64,
    /// Per-stage overrides, keyed by stage name
    pub stage_minimums: BTreeMap<String, f64>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            minimum_score: DEFAULT_MINIMUM,
            stage_minimums: BTreeMap::new(),
        }
    }
}

impl ComplianceConfig {
    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum_score = minimum;
        self
    }

    pub fn with_stage_minimum(mut self, stage: Stage, minimum: f64) -> Self {
        self.stage_minimums.insert(stage.to_string(), minimum);
        self
    }

    /// Minimum applied to contracts produced by `stage`
    pub fn minimum_for(&self, stage: Stage) -> f64 {
        self.stage_minimums
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.minimum_score)
    }

    /// Reject minimums outside the score scale and unknown stage names
    pub fn validate(&self) -> Result<(), HandoffError> {
        check_minimum("minimum_score", self.minimum_score)?;
        for (name, minimum) in &self.stage_minimums {
            let stage = name
                .parse::<Stage>()
                .map_err(|e| HandoffError::Config(format!("stage_minimums.{}: {}", name, e)))?;
            if !stage.is_agent() {
                return Err(HandoffError::Config(format!(
                    "stage_minimums.{}: not an agent stage",
                    name
                )));
            }
            check_minimum(&format!("stage_minimums.{}", name), *minimum)?;
        }
        Ok(())
    }
}

fn check_minimum(field: &str, minimum: f64) -> Result<(), HandoffError> {
    if (FAIL_SCORE..=PASS_SCORE).contains(&minimum) {
        Ok(())
    } else {
        Err(HandoffError::Config(format!(
            "{}: {} outside {:.1}..={:.1}",
            field, minimum, FAIL_SCORE, PASS_SCORE
        )))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceEngine {
    config: ComplianceConfig,
}

impl ComplianceEngine {
    pub fn new(config: ComplianceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplianceConfig {
        &self.config
    }

    /// Score a contract against the nine principles
    pub fn score(&self, contract: &Contract) -> ComplianceResult {
        let stage = contract.source_stage;
        let minimum = self.config.minimum_for(stage);
        let mut principles = Vec::with_capacity(Principle::ALL.len());
        let mut violations = Vec::new();
        let mut recommendations = Vec::new();

        for principle in Principle::ALL {
            let (compliant, declared, notes) = resolve(contract, principle);

            // An out-of-scale sub-score cannot be trusted: treat it as failing.
            let out_of_scale = declared.filter(|s| !s.is_finite() || !(FAIL_SCORE..=PASS_SCORE).contains(s));
            let passed = compliant && out_of_scale.is_none();
            let score = match declared {
                Some(s) if out_of_scale.is_none() => s,
                _ if passed => PASS_SCORE,
                _ => FAIL_SCORE,
            };

            if !passed {
                let reason = match (out_of_scale, notes) {
                    (Some(s), _) => format!("sub-score {} outside {:.1}..={:.1}", s, FAIL_SCORE, PASS_SCORE),
                    (None, Some(notes)) => format!("reported as non-compliant: {}", notes),
                    (None, None) => "reported as non-compliant".to_string(),
                };
                violations.push(
                    Violation::new(principle.name(), ViolationKind::Principle, reason)
                        .with_location(principle.path())
                        .with_recommendation(principle.recommendation()),
                );
                recommendations.push(format!("{}: {}", principle.name(), principle.recommendation()));
            } else if declared.is_some() && score < minimum {
                recommendations.push(format!(
                    "{}: sub-score {:.1} is below the {:.1} minimum",
                    principle.name(),
                    score,
                    minimum
                ));
            }

            principles.push(PrincipleOutcome {
                name: principle.name().to_string(),
                group: principle.group(),
                passed,
                score,
                declared_score: declared.is_some() && out_of_scale.is_none(),
            });
        }

        let mean = principles.iter().map(|p| p.score).sum::<f64>() / principles.len() as f64;
        let aggregate_score = round_to_tenth(mean);
        let meets_minimum = aggregate_score >= minimum;
        if !meets_minimum {
            violations.push(
                Violation::new(
                    "aggregate_score",
                    ViolationKind::Aggregate,
                    format!("aggregate {:.1} below minimum {:.1}", aggregate_score, minimum),
                )
                .with_location("compliance")
                .with_recommendation("raise the lowest principle sub-scores"),
            );
        }

        for (block_stage, checks) in &contract.compliance.enhanced_validation {
            for (check, ok) in checks {
                if !ok {
                    recommendations.push(format!(
                        "{}.{}: enhanced check did not pass",
                        block_stage, check
                    ));
                }
            }
        }

        let overall_compliant = principles.iter().all(|p| p.passed) && meets_minimum;

        ComplianceResult {
            stage,
            principles,
            aggregate_score,
            minimum_score: minimum,
            overall_compliant,
            violations,
            recommendations,
            evaluated_at: Utc::now(),
        }
    }
}

fn resolve(contract: &Contract, principle: Principle) -> (bool, Option<f64>, Option<&str>) {
    match principle {
        Principle::Design(p) => {
            let value = contract.compliance.design_principles.get(p);
            (value.is_compliant(), value.score(), value.notes())
        }
        Principle::Architecture(p) => (contract.compliance.architecture_principles.get(p), None, None),
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
