//! Gate profiles: the thresholds each stage enforces
//!
//! Thresholds only ever tighten along the pipeline. A later stage may add
//! gates or make an existing one stricter, never looser.

use handoff_core::{Bound, HandoffError, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A threshold enforced by a stage regardless of what the contract declares
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThreshold {
    /// Limit enforced on the declared value
    pub threshold: f64,
    pub bound: Bound,
}

impl GateThreshold {
    pub fn max(threshold: f64) -> Self {
        Self { threshold, bound: Bound::Max }
    }

    pub fn min(threshold: f64) -> Self {
        Self { threshold, bound: Bound::Min }
    }
}

/// Gates one stage requires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateProfile {
    /// Profile name (e.g. "developer@1.0")
    pub name: String,
    /// Gate name (`dimension.metric`) → enforced threshold
    pub required: BTreeMap<String, GateThreshold>,
}

impl GateProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: BTreeMap::new(),
        }
    }

    pub fn with_gate(mut self, gate: impl Into<String>, threshold: GateThreshold) -> Self {
        self.required.insert(gate.into(), threshold);
        self
    }

    pub fn threshold(&self, gate: &str) -> Option<&GateThreshold> {
        self.required.get(gate)
    }
}

/// Profiles for every agent stage, keyed by stage name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageProfiles {
    stages: BTreeMap<String, GateProfile>,
}

pub const RESPONSE_TIME_GATE: &str = "performance.response_time_ms";
pub const COVERAGE_GATE: &str = "test_quality.coverage_pct";
pub const ACCESSIBILITY_GATE: &str = "accessibility.wcag_compliance_pct";

impl StageProfiles {
    /// No stage enforces anything beyond what contracts declare
    pub fn empty() -> Self {
        Self {
            stages: BTreeMap::new(),
        }
    }

    /// Default profiles: latency from implementation on, coverage from
    /// testing on, accessibility from validation on.
    pub fn standard() -> Self {
        let developer = GateProfile::new("developer@1.0").with_gate(RESPONSE_TIME_GATE, GateThreshold::max(200.0));
        let test_engineer = GateProfile::new("test_engineer@1.0")
            .with_gate(RESPONSE_TIME_GATE, GateThreshold::max(200.0))
            .with_gate(COVERAGE_GATE, GateThreshold::min(80.0));
        let qa_tester = GateProfile::new("qa_tester@1.0")
            .with_gate(RESPONSE_TIME_GATE, GateThreshold::max(200.0))
            .with_gate(COVERAGE_GATE, GateThreshold::min(80.0))
            .with_gate(ACCESSIBILITY_GATE, GateThreshold::min(95.0));
        let quality_reviewer = GateProfile {
            name: "quality_reviewer@1.0".to_string(),
            ..qa_tester.clone()
        };

        Self::empty()
            .with_profile(Stage::Developer, developer)
            .with_profile(Stage::TestEngineer, test_engineer)
            .with_profile(Stage::QaTester, qa_tester)
            .with_profile(Stage::QualityReviewer, quality_reviewer)
    }

    pub fn with_profile(mut self, stage: Stage, profile: GateProfile) -> Self {
        self.stages.insert(stage.to_string(), profile);
        self
    }

    pub fn for_stage(&self, stage: Stage) -> Option<&GateProfile> {
        self.stages.get(stage.as_str())
    }

    /// Load profiles from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, HandoffError> {
        let profiles: Self =
            serde_yaml::from_str(yaml).map_err(|e| HandoffError::Config(e.to_string()))?;
        profiles.validate()?;
        Ok(profiles)
    }

    /// Stage names must be agents and thresholds must not loosen downstream
    pub fn validate(&self) -> Result<(), HandoffError> {
        for name in self.stages.keys() {
            let stage = name
                .parse::<Stage>()
                .map_err(|e| HandoffError::Config(format!("gate profile {}: {}", name, e)))?;
            if !stage.is_agent() {
                return Err(HandoffError::Config(format!(
                    "gate profile {}: not an agent stage",
                    name
                )));
            }
        }

        let mut strictest: BTreeMap<&str, (Stage, GateThreshold)> = BTreeMap::new();
        for stage in Stage::AGENTS {
            let Some(profile) = self.for_stage(stage) else {
                continue;
            };
            for (gate, current) in &profile.required {
                if let Some((earlier, previous)) = strictest.get(gate.as_str()) {
                    if previous.bound != current.bound {
                        return Err(HandoffError::Config(format!(
                            "gate {}: {} flips the bound set by {}",
                            gate, stage, earlier
                        )));
                    }
                    if current.bound.is_looser(current.threshold, previous.threshold) {
                        return Err(HandoffError::Config(format!(
                            "gate {}: {} loosens {} to {} (set by {})",
                            gate, stage, previous.threshold, current.threshold, earlier
                        )));
                    }
                }
                strictest.insert(gate.as_str(), (stage, *current));
            }
        }
        Ok(())
    }
}

impl Default for StageProfiles {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_profiles_tighten_monotonically() {
        let profiles = StageProfiles::standard();
        assert!(profiles.validate().is_ok());
        assert!(profiles.for_stage(Stage::ProductOwner).is_none());
        assert_eq!(
            profiles
                .for_stage(Stage::QaTester)
                .and_then(|p| p.threshold(ACCESSIBILITY_GATE))
                .map(|t| t.threshold),
            Some(95.0)
        );
    }

    #[test]
    fn test_loosening_profile_is_rejected() {
        let profiles = StageProfiles::standard().with_profile(
            Stage::QaTester,
            GateProfile::new("loose").with_gate(RESPONSE_TIME_GATE, GateThreshold::max(500.0)),
        );
        let err = profiles.validate().unwrap_err();
        assert!(err.to_string().contains("loosens"));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
developer:
  name: developer@2.0
  required:
    performance.response_time_ms: { threshold: 250.0, bound: max }
qa_tester:
  name: qa@2.0
  required:
    performance.response_time_ms: { threshold: 150.0, bound: max }
"#;
        let profiles = StageProfiles::from_yaml(yaml).unwrap();
        assert_eq!(profiles.for_stage(Stage::Developer).unwrap().name, "developer@2.0");

        let bad = "deployment:\n  name: nope\n";
        assert!(StageProfiles::from_yaml(bad).is_err());
    }
}
