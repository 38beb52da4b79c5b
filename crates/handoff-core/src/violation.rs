//! Violations reported back to the stage that produced a contract
//!
//! Every rejection carries the failing principle or gate by name, a reason
//! and, where one exists, a recommendation for the revision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which check family produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A DNA design or architecture principle
    Principle,
    /// The aggregate compliance score
    Aggregate,
    /// A quality gate on a declared metric
    Gate,
    /// A handoff criterion from the checklist
    Criterion,
    /// Input requirements not covered by the output
    Completeness,
}

/// Severity of a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Warning = 1,
    Error = 2,
}

/// A single named failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Principle, gate or criterion name (e.g. `time_respect`)
    pub name: String,
    /// Check family
    pub kind: ViolationKind,
    /// Human-readable reason
    pub reason: String,
    /// Severity of this violation
    pub severity: ViolationSeverity,
    /// Field path the violation refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Suggested fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Violation {
    /// Create a new error-level violation
    pub fn new(name: impl Into<String>, kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            reason: reason.into(),
            severity: ViolationSeverity::Error,
            location: None,
            recommendation: None,
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: ViolationSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the field path
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Attach a recommendation
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)?;
        if let Some(rec) = &self.recommendation {
            write!(f, " (recommendation: {})", rec)?;
        }
        Ok(())
    }
}

/// Names of a violation list, in order
pub fn violation_names(violations: &[Violation]) -> Vec<&str> {
    violations.iter().map(|v| v.name.as_str()).collect()
}
