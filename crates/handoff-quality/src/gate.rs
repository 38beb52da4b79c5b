//! Quality Gate evaluation for handoff contracts
//!
//! Evaluates the gates and handoff criteria a contract declares against
//! its declared metrics and the stage profile, and produces a report.
//! Anything that cannot be decided from declared data fails closed.

use super::profile::{GateProfile, StageProfiles};
use handoff_core::{Bound, Contract, MetricCriterion, Stage, Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Family a gate belongs to, by dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateCategory {
    Performance,
    Security,
    Quality,
}

impl GateCategory {
    /// Category of a gate name (`dimension` or `dimension.metric`)
    pub fn of(gate: &str) -> Self {
        match gate.split('.').next().unwrap_or_default() {
            "performance" => GateCategory::Performance,
            "security" => GateCategory::Security,
            _ => GateCategory::Quality,
        }
    }
}

/// Status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

/// Single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    /// Gate, criterion or completeness rule name
    pub name: String,
    pub kind: ViolationKind,
    /// Derived from the dimension of `name`
    pub category: GateCategory,
    pub status: CheckStatus,
    /// Human-readable outcome, e.g. `120ms <= 200ms`
    pub message: String,
    /// Declared value, for metric checks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<f64>,
    /// Threshold applied, after taking the stricter of declared and profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl GateCheck {
    fn new(name: impl Into<String>, kind: ViolationKind, status: CheckStatus, message: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            category: GateCategory::of(&name),
            name,
            kind,
            status,
            message: message.into(),
            declared: None,
            threshold: None,
        }
    }

    fn fail(name: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self::new(name, kind, CheckStatus::Fail, message)
    }
}

/// Overall gate report for one contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    /// Stage the contract was evaluated for
    pub stage: Stage,
    /// Profile used for evaluation, if the stage has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Checks in evaluation order
    pub checks: Vec<GateCheck>,
    /// No check failed
    pub passed: bool,
    pub summary: String,
}

impl GateReport {
    pub fn failing(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    /// Categories with at least one failing check
    pub fn failed_categories(&self) -> BTreeSet<GateCategory> {
        self.failing().map(|c| c.category).collect()
    }

    /// Failing checks as violations for the producing stage
    pub fn violations(&self) -> Vec<Violation> {
        self.failing()
            .map(|c| {
                let violation = Violation::new(&c.name, c.kind, &c.message);
                match c.kind {
                    ViolationKind::Gate => violation
                        .with_location(format!("output_specifications.validation_criteria.{}", c.name))
                        .with_recommendation("bring the declared metric within the threshold"),
                    ViolationKind::Criterion => violation
                        .with_location(format!("output_specifications.handoff_checklist.{}", c.name))
                        .with_recommendation("complete the criterion or declare its status"),
                    _ => violation.with_location(format!("input_requirements.{}", c.name)),
                }
            })
            .collect()
    }
}

/// Evaluation switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateOptions {
    /// Gates in these categories are reported as skipped
    #[serde(default)]
    pub skip_categories: Vec<GateCategory>,
}

impl GateOptions {
    /// Skip performance-heavy checks
    pub fn fast() -> Self {
        Self {
            skip_categories: vec![GateCategory::Performance],
        }
    }
}

/// Quality gate that evaluates handoff contracts
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    profiles: StageProfiles,
    options: GateOptions,
}

impl QualityGate {
    pub fn new(profiles: StageProfiles) -> Self {
        Self {
            profiles,
            options: GateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn profiles(&self) -> &StageProfiles {
        &self.profiles
    }

    /// Evaluate `contract` as a handoff out of `stage`
    pub fn evaluate(&self, contract: &Contract, stage: Stage) -> GateReport {
        let profile = self.profiles.for_stage(stage);
        let mut checks = Vec::new();

        // === Profile-required gates must be declared ===
        if let Some(profile) = profile {
            for gate in profile.required.keys() {
                if !declares_gate(contract, gate) {
                    checks.push(GateCheck::fail(
                        gate.as_str(),
                        ViolationKind::Gate,
                        format!("required by {} but not declared", profile.name),
                    ));
                } else if !contract.quality_gates.contains(gate)
                    && !self.skipped(gate)
                    && criterion_for(contract, gate).is_none()
                {
                    // Declared through its dimension only, with no metric to evaluate
                    checks.push(GateCheck::fail(
                        gate.as_str(),
                        ViolationKind::Gate,
                        format!("required by {} but no declared validation criteria", profile.name),
                    ));
                }
            }
        }

        // === Declared quality gates ===
        let mut seen = BTreeSet::new();
        for gate in &contract.quality_gates {
            if !seen.insert(gate.as_str()) {
                continue;
            }
            if self.skipped(gate) {
                checks.push(GateCheck::new(
                    gate.as_str(),
                    ViolationKind::Gate,
                    CheckStatus::Skipped,
                    "skipped",
                ));
                continue;
            }
            checks.extend(self.evaluate_gate(contract, gate, profile));
        }

        // === Handoff criteria ===
        for criterion in &contract.handoff_criteria {
            let check = match contract.output_specifications.handoff_checklist.get(criterion) {
                Some(true) => GateCheck::new(criterion.as_str(), ViolationKind::Criterion, CheckStatus::Pass, "met"),
                Some(false) => GateCheck::fail(criterion.as_str(), ViolationKind::Criterion, "declared as not met"),
                None => GateCheck::fail(criterion.as_str(), ViolationKind::Criterion, "no declared status"),
            };
            checks.push(check);
        }

        // === Input completeness ===
        checks.extend(completeness_checks(contract));

        let passed = !checks.iter().any(|c| c.status == CheckStatus::Fail);
        let summary = if passed {
            format!("{}: all {} checks passed", stage, checks.len())
        } else {
            let fails: Vec<&str> = checks
                .iter()
                .filter(|c| c.status == CheckStatus::Fail)
                .map(|c| c.name.as_str())
                .collect();
            format!("{}: blocked by {}", stage, fails.join(", "))
        };

        GateReport {
            stage,
            profile: profile.map(|p| p.name.clone()),
            checks,
            passed,
            summary,
        }
    }

    fn skipped(&self, gate: &str) -> bool {
        self.options.skip_categories.contains(&GateCategory::of(gate))
    }

    fn evaluate_gate(&self, contract: &Contract, gate: &str, profile: Option<&GateProfile>) -> Vec<GateCheck> {
        let criteria = &contract.output_specifications.validation_criteria;
        let (dimension, metric) = match gate.split_once('.') {
            Some((dimension, metric)) => (dimension, Some(metric)),
            None => (gate, None),
        };
        let Some(metrics) = criteria.get(dimension) else {
            return vec![GateCheck::fail(gate, ViolationKind::Gate, "no declared validation criteria")];
        };

        match metric {
            Some(metric) => match metrics.get(metric) {
                Some(criterion) => vec![evaluate_metric(gate, criterion, profile)],
                None => vec![GateCheck::fail(gate, ViolationKind::Gate, "no declared validation criteria")],
            },
            None if metrics.is_empty() => {
                vec![GateCheck::fail(gate, ViolationKind::Gate, "dimension declares no metrics")]
            }
            None => metrics
                .iter()
                .map(|(metric, criterion)| {
                    evaluate_metric(&format!("{}.{}", dimension, metric), criterion, profile)
                })
                .collect(),
        }
    }
}

fn declares_gate(contract: &Contract, gate: &str) -> bool {
    let dimension = gate.split('.').next().unwrap_or_default();
    contract
        .quality_gates
        .iter()
        .any(|declared| declared == gate || declared == dimension)
}

fn criterion_for<'a>(contract: &'a Contract, gate: &str) -> Option<&'a MetricCriterion> {
    let (dimension, metric) = gate.split_once('.')?;
    contract
        .output_specifications
        .validation_criteria
        .get(dimension)
        .and_then(|metrics| metrics.get(metric))
}

fn evaluate_metric(name: &str, criterion: &MetricCriterion, profile: Option<&GateProfile>) -> GateCheck {
    let enforced = profile.and_then(|p| p.threshold(name));
    if let Some(enforced) = enforced {
        if enforced.bound != criterion.bound {
            return GateCheck::fail(
                name,
                ViolationKind::Gate,
                format!("declared bound {:?} conflicts with the stage profile", criterion.bound),
            );
        }
    }

    let Some(declared) = criterion.declared else {
        return GateCheck::fail(name, ViolationKind::Gate, "no declared value");
    };

    let threshold = match (criterion.threshold, enforced.map(|e| e.threshold)) {
        (Some(a), Some(b)) => criterion.bound.stricter(a, b),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => {
            return GateCheck::fail(name, ViolationKind::Gate, "no threshold declared or enforced");
        }
    };

    let unit = criterion.unit.as_deref().unwrap_or("");
    let admitted = declared.is_finite() && criterion.bound.admits(declared, threshold);
    let message = if admitted {
        format!("{}{} {} {}{}", declared, unit, criterion.bound.symbol(), threshold, unit)
    } else {
        match criterion.bound {
            Bound::Max => format!("{}{} exceeds ceiling {}{}", declared, unit, threshold, unit),
            Bound::Min => format!("{}{} below floor {}{}", declared, unit, threshold, unit),
        }
    };

    let mut check = GateCheck::new(
        name,
        ViolationKind::Gate,
        if admitted { CheckStatus::Pass } else { CheckStatus::Fail },
        message,
    );
    check.declared = Some(declared);
    check.threshold = Some(threshold);
    check
}

fn completeness_checks(contract: &Contract) -> Vec<GateCheck> {
    let input = &contract.input_requirements;
    let output = &contract.output_specifications;
    let mut checks = Vec::new();

    let mut push = |name: &str, missing: Vec<&String>, required: usize| {
        if required == 0 {
            return;
        }
        let check = if missing.is_empty() {
            GateCheck::new(name, ViolationKind::Completeness, CheckStatus::Pass, "complete")
        } else {
            let missing: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            GateCheck::fail(name, ViolationKind::Completeness, format!("missing {}", missing.join(", ")))
        };
        checks.push(check);
    };

    push(
        "required_files",
        input
            .required_files
            .iter()
            .filter(|f| !output.deliverables.contains(f))
            .collect(),
        input.required_files.len(),
    );
    push(
        "required_data",
        input
            .required_data
            .iter()
            .filter(|d| !output.data.contains_key(d.as_str()))
            .collect(),
        input.required_data.len(),
    );
    push(
        "validation_rules",
        input
            .validation_rules
            .iter()
            .filter(|r| !contract.quality_gates.contains(r) && !contract.handoff_criteria.contains(r))
            .collect(),
        input.validation_rules.len(),
    );

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{GateThreshold, ACCESSIBILITY_GATE, COVERAGE_GATE, RESPONSE_TIME_GATE};

    fn developer_contract(response_ms: f64) -> Contract {
        Contract::new("STORY-GH-5", Stage::Developer, Stage::TestEngineer).with_metric(
            "performance",
            "response_time_ms",
            MetricCriterion::max(response_ms, 200.0).with_unit("ms"),
        )
    }

    #[test]
    fn test_passing_contract() {
        let report = QualityGate::default().evaluate(&developer_contract(120.0), Stage::Developer);
        assert!(report.passed, "{}", report.summary);
        assert_eq!(report.profile.as_deref(), Some("developer@1.0"));
        assert_eq!(report.checks[0].message, "120ms <= 200ms");
    }

    #[test]
    fn test_ceiling_exceeded() {
        let report = QualityGate::default().evaluate(&developer_contract(240.0), Stage::Developer);
        assert!(!report.passed);
        assert_eq!(report.failed_categories().into_iter().collect::<Vec<_>>(), vec![GateCategory::Performance]);
        let violations = report.violations();
        assert_eq!(violations[0].name, RESPONSE_TIME_GATE);
        assert!(violations[0].reason.contains("exceeds ceiling 200ms"));
    }

    #[test]
    fn test_profile_threshold_wins_when_stricter() {
        let profiles = StageProfiles::empty().with_profile(
            Stage::Developer,
            GateProfile::new("tight").with_gate(RESPONSE_TIME_GATE, GateThreshold::max(100.0)),
        );
        let report = QualityGate::new(profiles).evaluate(&developer_contract(150.0), Stage::Developer);
        assert!(!report.passed);
        assert_eq!(report.checks[0].threshold, Some(100.0));
    }

    #[test]
    fn test_required_gate_missing_fails_closed() {
        let contract = developer_contract(120.0);
        let report = QualityGate::default().evaluate(&contract, Stage::TestEngineer);
        assert!(!report.passed);
        assert!(report.failing().any(|c| c.name == COVERAGE_GATE && c.message.contains("not declared")));
    }

    #[test]
    fn test_undeclared_value_fails_closed() {
        let mut contract = Contract::new("STORY-GH-5", Stage::QaTester, Stage::QualityReviewer);
        contract.quality_gates.push(ACCESSIBILITY_GATE.to_string());
        let report = QualityGate::new(StageProfiles::empty()).evaluate(&contract, Stage::QaTester);
        assert!(!report.passed);
        assert_eq!(report.checks[0].message, "no declared validation criteria");

        let contract = Contract::new("STORY-GH-5", Stage::QaTester, Stage::QualityReviewer).with_metric(
            "accessibility",
            "wcag_compliance_pct",
            MetricCriterion {
                declared: None,
                threshold: Some(95.0),
                bound: Bound::Min,
                unit: None,
            },
        );
        let report = QualityGate::new(StageProfiles::empty()).evaluate(&contract, Stage::QaTester);
        assert_eq!(report.checks[0].message, "no declared value");
    }

    #[test]
    fn test_dimension_gate_covers_every_metric() {
        let mut contract = Contract::new("STORY-GH-5", Stage::QaTester, Stage::QualityReviewer)
            .with_metric("security", "critical_findings", MetricCriterion::max(0.0, 0.0))
            .with_metric("security", "high_findings", MetricCriterion::max(2.0, 1.0));
        contract.quality_gates = vec!["security".to_string()];
        let report = QualityGate::new(StageProfiles::empty()).evaluate(&contract, Stage::QaTester);
        assert_eq!(report.checks.len(), 2);
        assert!(report.failing().all(|c| c.name == "security.high_findings"));
        assert!(report.failed_categories().contains(&GateCategory::Security));
    }

    #[test]
    fn test_dimension_gate_does_not_hide_required_metric() {
        let mut contract = Contract::new("STORY-GH-5", Stage::Developer, Stage::TestEngineer).with_metric(
            "performance",
            "throughput_rps",
            MetricCriterion::min(50.0, 10.0),
        );
        contract.quality_gates = vec!["performance".to_string()];

        let report = QualityGate::default().evaluate(&contract, Stage::Developer);
        assert!(!report.passed);
        let failing: Vec<&GateCheck> = report.failing().collect();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].name, RESPONSE_TIME_GATE);
        assert!(failing[0].message.contains("no declared validation criteria"));
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "performance.throughput_rps" && c.status == CheckStatus::Pass));
    }

    #[test]
    fn test_dimension_gate_applies_profile_threshold() {
        let mut contract = developer_contract(180.0);
        contract.output_specifications.validation_criteria.get_mut("performance").unwrap().insert(
            "response_time_ms".to_string(),
            MetricCriterion {
                declared: Some(180.0),
                threshold: None,
                bound: Bound::Max,
                unit: None,
            },
        );
        contract.quality_gates = vec!["performance".to_string()];
        let profiles = StageProfiles::standard().with_profile(
            Stage::Developer,
            GateProfile::new("tight").with_gate(RESPONSE_TIME_GATE, GateThreshold::max(150.0)),
        );

        let report = QualityGate::new(profiles).evaluate(&contract, Stage::Developer);
        assert!(!report.passed);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].threshold, Some(150.0));
    }

    #[test]
    fn test_handoff_criteria_and_completeness() {
        let mut contract = Contract::new("STORY-GH-5", Stage::GameDesigner, Stage::Developer)
            .with_handoff_criterion("wireframes_approved", true)
            .with_handoff_criterion("copy_reviewed", false)
            .with_deliverable("design/flow.md");
        contract.handoff_criteria.push("assets_exported".into());
        contract.input_requirements.required_files = vec!["design/flow.md".into(), "design/assets.zip".into()];
        contract.input_requirements.validation_rules = vec!["wireframes_approved".into()];

        let report = QualityGate::default().evaluate(&contract, Stage::GameDesigner);
        let failing: Vec<&str> = report.failing().map(|c| c.name.as_str()).collect();
        assert_eq!(failing, vec!["copy_reviewed", "assets_exported", "required_files"]);
        assert!(report.summary.contains("blocked by"));
    }

    #[test]
    fn test_fast_mode_skips_performance() {
        let gate = QualityGate::default().with_options(GateOptions::fast());
        let report = gate.evaluate(&developer_contract(900.0), Stage::Developer);
        assert!(report.passed);
        assert_eq!(report.checks[0].status, CheckStatus::Skipped);
    }
}
