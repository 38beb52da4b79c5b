//! Pipeline configuration
//!
//! Every field has a default, so an empty YAML or JSON document is a valid
//! configuration.

use handoff_compliance::ComplianceConfig;
use handoff_core::{HandoffError, Stage};
use handoff_quality::StageProfiles;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_STAGE_BUDGET_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Failed compliance/gate attempts per stage before the story is blocked
    pub max_retries: u32,
    /// Approve a reviewed story when the reviewer declares no decision
    pub auto_approve: bool,
    /// Seconds a stage may take before the story is reported as stalled
    pub stage_budget_secs: u64,
    /// Per-stage budget overrides, keyed by stage name
    pub stage_budgets: BTreeMap<String, u64>,
    /// Seconds a rejected or deployed story is kept before archival
    pub retention_secs: u64,
    pub compliance: ComplianceConfig,
    pub gates: StageProfiles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            auto_approve: true,
            stage_budget_secs: DEFAULT_STAGE_BUDGET_SECS,
            stage_budgets: BTreeMap::new(),
            retention_secs: DEFAULT_RETENTION_SECS,
            compliance: ComplianceConfig::default(),
            gates: StageProfiles::standard(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, HandoffError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| HandoffError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, HandoffError> {
        let config: Self = serde_json::from_str(json).map_err(|e| HandoffError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or YAML for any other extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HandoffError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HandoffError::Config(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn with_stage_budget(mut self, stage: Stage, budget: Duration) -> Self {
        self.stage_budgets.insert(stage.to_string(), budget.as_secs());
        self
    }

    pub fn with_gates(mut self, gates: StageProfiles) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_compliance(mut self, compliance: ComplianceConfig) -> Self {
        self.compliance = compliance;
        self
    }

    /// Response budget of `stage`
    pub fn budget_for(&self, stage: Stage) -> Duration {
        let secs = self
            .stage_budgets
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.stage_budget_secs);
        Duration::from_secs(secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.max_retries == 0 {
            return Err(HandoffError::Config("max_retries: must be at least 1".into()));
        }
        for name in self.stage_budgets.keys() {
            let stage: Stage = name
                .parse()
                .map_err(|e| HandoffError::Config(format!("stage_budgets.{}: {}", name, e)))?;
            if !stage.is_agent() {
                return Err(HandoffError::Config(format!("stage_budgets.{}: not an agent stage", name)));
            }
        }
        self.compliance.validate()?;
        self.gates.validate()
    }
}
