//! Unified error taxonomy for handoffs
use crate::stage::Stage;
use crate::violation::Violation;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandoffError {
    #[error("SCHEMA/{path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("VERSION/{found}: unsupported contract version (supported: {supported})")]
    UnsupportedVersion { found: String, supported: String },

    #[error("COMPLIANCE/{story_id}: {stage} failed [{}], {retries_left} retries left", join_names(.violations))]
    ComplianceViolation {
        story_id: String,
        stage: Stage,
        violations: Vec<Violation>,
        recommendations: Vec<String>,
        retries_left: u32,
    },

    #[error("GATE/{story_id}: {stage} failed [{}], {retries_left} retries left", join_names(.violations))]
    GateViolation {
        story_id: String,
        stage: Stage,
        violations: Vec<Violation>,
        retries_left: u32,
    },

    #[error("SEQUENCE/{from}->{to}: {reason}")]
    SequenceViolation { from: Stage, to: Stage, reason: String },

    #[error("MONOTONIC/{gate}: {stage} declared {declared} but {recorded} was already accepted for {story_id}")]
    MonotonicityViolation {
        story_id: String,
        stage: Stage,
        gate: String,
        recorded: f64,
        declared: f64,
    },

    #[error("STORY/{0}: not registered")]
    UnknownStory(String),

    #[error("STORY/{0}: already registered")]
    DuplicateStory(String),

    #[error("STORY/{story_id}: blocked ({reason})")]
    StoryBlocked { story_id: String, reason: String },

    #[error("STORY/{story_id}: closed with status {status}")]
    StoryClosed { story_id: String, status: String },

    #[error("DECISION/{0}")]
    InvalidDecision(String),

    #[error("CONFIG/{0}")]
    Config(String),

    #[error("AGENT/{stage}: {message}")]
    Agent { stage: Stage, message: String },
}

impl HandoffError {
    /// Shorthand for a schema violation at `path`
    pub fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        HandoffError::SchemaViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Compliance and gate failures go back to the producing stage for
    /// another attempt. Everything else surfaces to the caller as-is.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HandoffError::ComplianceViolation { .. } | HandoffError::GateViolation { .. }
        )
    }

    /// Violations carried by a recoverable failure
    pub fn violations(&self) -> &[Violation] {
        match self {
            HandoffError::ComplianceViolation { violations, .. }
            | HandoffError::GateViolation { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Remaining attempts carried by a recoverable failure
    pub fn retries_left(&self) -> Option<u32> {
        match self {
            HandoffError::ComplianceViolation { retries_left, .. }
            | HandoffError::GateViolation { retries_left, .. } => Some(*retries_left),
            _ => None,
        }
    }

    /// Short category code, matching the message prefix
    pub fn category(&self) -> &'static str {
        match self {
            HandoffError::SchemaViolation { .. } => "SCHEMA",
            HandoffError::UnsupportedVersion { .. } => "VERSION",
            HandoffError::ComplianceViolation { .. } => "COMPLIANCE",
            HandoffError::GateViolation { .. } => "GATE",
            HandoffError::SequenceViolation { .. } => "SEQUENCE",
            HandoffError::MonotonicityViolation { .. } => "MONOTONIC",
            HandoffError::UnknownStory(_)
            | HandoffError::DuplicateStory(_)
            | HandoffError::StoryBlocked { .. }
            | HandoffError::StoryClosed { .. } => "STORY",
            HandoffError::InvalidDecision(_) => "DECISION",
            HandoffError::Config(_) => "CONFIG",
            HandoffError::Agent { .. } => "AGENT",
        }
    }
}

impl From<serde_json::Error> for HandoffError {
    fn from(err: serde_json::Error) -> Self {
        HandoffError::schema("$", err.to_string())
    }
}

fn join_names(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
