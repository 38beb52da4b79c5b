//! Contract: the versioned payload exchanged between two stages
use crate::error::HandoffError;
use crate::principle::{ArchitecturePrinciple, DesignPrinciple};
use crate::schema::SchemaValidator;
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The only contract version this engine accepts
pub const CONTRACT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contract {
    /// Semantic version, must equal [`CONTRACT_VERSION`]
    pub version: String,
    /// `STORY-<source>-<n>`
    pub story_id: String,
    /// Stage that produced this contract
    pub source_stage: Stage,
    /// Stage that consumes it; must be the successor of `source_stage`
    pub target_stage: Stage,
    /// Self-reported DNA compliance
    pub compliance: Compliance,
    /// What the consumer needs from this handoff
    pub input_requirements: InputRequirements,
    /// Deliverables and declared metrics
    pub output_specifications: OutputSpecifications,
    /// Gates that must all evaluate true, in order
    pub quality_gates: Vec<String>,
    /// Conditions beyond schema validity, in order
    pub handoff_criteria: Vec<String>,
    /// Notes and, for the reviewer, the review decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_coordination: Option<TeamCoordination>,
    /// Revision marker; not part of the wire format
    #[serde(skip)]
    pub revision: u32,
}

/// The nine DNA principles, reported by the producing stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Compliance {
    pub design_principles: DesignPrinciples,
    pub architecture_principles: ArchitecturePrinciples,
    /// Stage-specific checks keyed by stage name. Informational only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enhanced_validation: BTreeMap<String, BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignPrinciples {
    pub pedagogical_value: PrincipleValue,
    pub policy_to_practice: PrincipleValue,
    pub time_respect: PrincipleValue,
    pub holistic_thinking: PrincipleValue,
    pub professional_tone: PrincipleValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchitecturePrinciples {
    pub api_first: bool,
    pub stateless_backend: bool,
    pub separation_of_concerns: bool,
    pub simplicity_first: bool,
}

/// A design principle is reported either as a bare flag or with a sub-score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrincipleValue {
    Flag(bool),
    Assessed(PrincipleAssessment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipleAssessment {
    pub compliant: bool,
    /// Sub-score on the 1.0–5.0 scale, computed by the producing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PrincipleValue {
    pub fn is_compliant(&self) -> bool {
        match self {
            PrincipleValue::Flag(flag) => *flag,
            PrincipleValue::Assessed(a) => a.compliant,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            PrincipleValue::Flag(_) => None,
            PrincipleValue::Assessed(a) => a.score,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            PrincipleValue::Flag(_) => None,
            PrincipleValue::Assessed(a) => a.notes.as_deref(),
        }
    }

    /// Assessed value with a sub-score
    pub fn scored(compliant: bool, score: f64) -> Self {
        PrincipleValue::Assessed(PrincipleAssessment {
            compliant,
            score: Some(score),
            notes: None,
        })
    }
}

impl From<bool> for PrincipleValue {
    fn from(flag: bool) -> Self {
        PrincipleValue::Flag(flag)
    }
}

impl DesignPrinciples {
    pub fn get(&self, principle: DesignPrinciple) -> &PrincipleValue {
        match principle {
            DesignPrinciple::PedagogicalValue => &self.pedagogical_value,
            DesignPrinciple::PolicyToPractice => &self.policy_to_practice,
            DesignPrinciple::TimeRespect => &self.time_respect,
            DesignPrinciple::HolisticThinking => &self.holistic_thinking,
            DesignPrinciple::ProfessionalTone => &self.professional_tone,
        }
    }

    pub fn set(&mut self, principle: DesignPrinciple, value: PrincipleValue) {
        let slot = match principle {
            DesignPrinciple::PedagogicalValue => &mut self.pedagogical_value,
            DesignPrinciple::PolicyToPractice => &mut self.policy_to_practice,
            DesignPrinciple::TimeRespect => &mut self.time_respect,
            DesignPrinciple::HolisticThinking => &mut self.holistic_thinking,
            DesignPrinciple::ProfessionalTone => &mut self.professional_tone,
        };
        *slot = value;
    }
}

impl ArchitecturePrinciples {
    pub fn get(&self, principle: ArchitecturePrinciple) -> bool {
        match principle {
            ArchitecturePrinciple::ApiFirst => self.api_first,
            ArchitecturePrinciple::StatelessBackend => self.stateless_backend,
            ArchitecturePrinciple::SeparationOfConcerns => self.separation_of_concerns,
            ArchitecturePrinciple::SimplicityFirst => self.simplicity_first,
        }
    }

    pub fn set(&mut self, principle: ArchitecturePrinciple, value: bool) {
        match principle {
            ArchitecturePrinciple::ApiFirst => self.api_first = value,
            ArchitecturePrinciple::StatelessBackend => self.stateless_backend = value,
            ArchitecturePrinciple::SeparationOfConcerns => self.separation_of_concerns = value,
            ArchitecturePrinciple::SimplicityFirst => self.simplicity_first = value,
        }
    }
}

impl Compliance {
    /// Every principle reported as passing, without sub-scores
    pub fn all_compliant() -> Self {
        Self {
            design_principles: DesignPrinciples {
                pedagogical_value: PrincipleValue::Flag(true),
                policy_to_practice: PrincipleValue::Flag(true),
                time_respect: PrincipleValue::Flag(true),
                holistic_thinking: PrincipleValue::Flag(true),
                professional_tone: PrincipleValue::Flag(true),
            },
            architecture_principles: ArchitecturePrinciples {
                api_first: true,
                stateless_backend: true,
                separation_of_concerns: true,
                simplicity_first: true,
            },
            enhanced_validation: BTreeMap::new(),
        }
    }
}

/// What the consuming stage needs before it accepts the handoff
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRequirements {
    /// Files that must appear in `deliverables`
    pub required_files: Vec<String>,
    /// Keys that must appear in `data`
    pub required_data: Vec<String>,
    /// Names that must appear among the gates or handoff criteria
    pub validation_rules: Vec<String>,
}

/// What the producing stage delivers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpecifications {
    pub deliverables: Vec<String>,
    /// dimension → metric → criterion
    pub validation_criteria: BTreeMap<String, BTreeMap<String, MetricCriterion>>,
    /// Structured payload (the intake system fills this for the first contract)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
    /// Declared status of each handoff criterion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub handoff_checklist: BTreeMap<String, bool>,
}

/// Direction in which a threshold binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    /// Declared value must not exceed the threshold (latency, error rate)
    Max,
    /// Declared value must reach the threshold (coverage, accessibility)
    Min,
}

impl Bound {
    /// Whether `value` satisfies `threshold` under this bound
    pub fn admits(&self, value: f64, threshold: f64) -> bool {
        match self {
            Bound::Max => value <= threshold,
            Bound::Min => value >= threshold,
        }
    }

    /// The stricter of two thresholds
    pub fn stricter(&self, a: f64, b: f64) -> f64 {
        match self {
            Bound::Max => a.min(b),
            Bound::Min => a.max(b),
        }
    }

    /// Whether `candidate` is looser than `reference`
    pub fn is_looser(&self, candidate: f64, reference: f64) -> bool {
        match self {
            Bound::Max => candidate > reference,
            Bound::Min => candidate < reference,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Bound::Max => "<=",
            Bound::Min => ">=",
        }
    }
}

/// A declared metric and the threshold it is measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricCriterion {
    /// Value measured by the producing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared: Option<f64>,
    /// Limit the value is held to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub bound: Bound,
    /// Display suffix, e.g. `ms` or `%`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricCriterion {
    /// Ceiling criterion (declared <= threshold)
    pub fn max(declared: f64, threshold: f64) -> Self {
        Self {
            declared: Some(declared),
            threshold: Some(threshold),
            bound: Bound::Max,
            unit: None,
        }
    }

    /// Floor criterion (declared >= threshold)
    pub fn min(declared: f64, threshold: f64) -> Self {
        Self {
            declared: Some(declared),
            threshold: Some(threshold),
            bound: Bound::Min,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Free-form coordination block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamCoordination {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Only meaningful on contracts from the reviewing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_decision: Option<ReviewDecision>,
}

/// Outcome of the review stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    RequestRevision {
        return_to: Stage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ReviewDecision {
    pub fn label(&self) -> &'static str {
        match self {
            ReviewDecision::Approve { .. } => "approve",
            ReviewDecision::RequestRevision { .. } => "request_revision",
            ReviewDecision::Reject { .. } => "reject",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ReviewDecision::Approve { reason }
            | ReviewDecision::RequestRevision { reason, .. }
            | ReviewDecision::Reject { reason } => reason.as_deref(),
        }
    }
}

impl Contract {
    /// A contract for `story_id` on the edge `source → target`, with every
    /// principle passing and no gates declared
    pub fn new(story_id: impl Into<String>, source: Stage, target: Stage) -> Self {
        Self {
            version: CONTRACT_VERSION.to_string(),
            story_id: story_id.into(),
            source_stage: source,
            target_stage: target,
            compliance: Compliance::all_compliant(),
            input_requirements: InputRequirements::default(),
            output_specifications: OutputSpecifications::default(),
            quality_gates: Vec::new(),
            handoff_criteria: Vec::new(),
            team_coordination: None,
            revision: 0,
        }
    }

    /// Parse and validate a contract from JSON text
    pub fn from_json(json: &str) -> Result<Self, HandoffError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Validate a JSON value and convert it into a contract
    pub fn from_value(value: Value) -> Result<Self, HandoffError> {
        SchemaValidator::new().validate(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value, HandoffError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, HandoffError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `blake3:<hex>` over the canonical JSON encoding
    pub fn digest(&self) -> Result<String, HandoffError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("blake3:{}", blake3::hash(&bytes)))
    }

    /// Produce a new revision. The story id is preserved whatever `edit` does.
    pub fn revise(&self, edit: impl FnOnce(&mut Contract)) -> Contract {
        let mut next = self.clone();
        edit(&mut next);
        next.story_id = self.story_id.clone();
        next.revision = self.revision + 1;
        next
    }

    pub fn review_decision(&self) -> Option<&ReviewDecision> {
        self.team_coordination
            .as_ref()
            .and_then(|tc| tc.review_decision.as_ref())
    }

    pub fn with_design_principle(
        mut self,
        principle: DesignPrinciple,
        value: impl Into<PrincipleValue>,
    ) -> Self {
        self.compliance.design_principles.set(principle, value.into());
        self
    }

    pub fn with_architecture_principle(mut self, principle: ArchitecturePrinciple, value: bool) -> Self {
        self.compliance.architecture_principles.set(principle, value);
        self
    }

    /// Declare a metric and register `dimension.metric` as a quality gate
    pub fn with_metric(
        mut self,
        dimension: impl Into<String>,
        metric: impl Into<String>,
        criterion: MetricCriterion,
    ) -> Self {
        let dimension = dimension.into();
        let metric = metric.into();
        let gate = format!("{}.{}", dimension, metric);
        self.output_specifications
            .validation_criteria
            .entry(dimension)
            .or_default()
            .insert(metric, criterion);
        if !self.quality_gates.contains(&gate) {
            self.quality_gates.push(gate);
        }
        self
    }

    /// Declare a handoff criterion and its status
    pub fn with_handoff_criterion(mut self, name: impl Into<String>, met: bool) -> Self {
        let name = name.into();
        self.output_specifications
            .handoff_checklist
            .insert(name.clone(), met);
        if !self.handoff_criteria.contains(&name) {
            self.handoff_criteria.push(name);
        }
        self
    }

    pub fn with_deliverable(mut self, file: impl Into<String>) -> Self {
        self.output_specifications.deliverables.push(file.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output_specifications.data.insert(key.into(), value);
        self
    }

    pub fn with_review_decision(mut self, decision: ReviewDecision) -> Self {
        self.team_coordination
            .get_or_insert_with(TeamCoordination::default)
            .review_decision = Some(decision);
        self
    }
}
