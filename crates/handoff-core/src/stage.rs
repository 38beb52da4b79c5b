//! Stage graph: the six agents plus the intake origin and deployment sink.
//!
//! Ordering is explicit. A handoff is legal only along one of the edges in
//! [`EDGES`]; nothing is inferred from names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A participant in the handoff graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// External issue intake (origin only)
    Intake,
    /// Analysis: turns the request into a story
    ProductOwner,
    /// Design
    GameDesigner,
    /// Implementation
    Developer,
    /// Testing
    TestEngineer,
    /// Validation
    QaTester,
    /// Review
    QualityReviewer,
    /// Deployment sink (target only)
    Deployment,
}

/// Every legal directed edge, in pipeline order
pub const EDGES: [(Stage, Stage); 7] = [
    (Stage::Intake, Stage::ProductOwner),
    (Stage::ProductOwner, Stage::GameDesigner),
    (Stage::GameDesigner, Stage::Developer),
    (Stage::Developer, Stage::TestEngineer),
    (Stage::TestEngineer, Stage::QaTester),
    (Stage::QaTester, Stage::QualityReviewer),
    (Stage::QualityReviewer, Stage::Deployment),
];

impl Stage {
    /// All stages, origin first
    pub const ALL: [Stage; 8] = [
        Stage::Intake,
        Stage::ProductOwner,
        Stage::GameDesigner,
        Stage::Developer,
        Stage::TestEngineer,
        Stage::QaTester,
        Stage::QualityReviewer,
        Stage::Deployment,
    ];

    /// The six processing agents, in order
    pub const AGENTS: [Stage; 6] = [
        Stage::ProductOwner,
        Stage::GameDesigner,
        Stage::Developer,
        Stage::TestEngineer,
        Stage::QaTester,
        Stage::QualityReviewer,
    ];

    /// Wire name (`snake_case`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::ProductOwner => "product_owner",
            Stage::GameDesigner => "game_designer",
            Stage::Developer => "developer",
            Stage::TestEngineer => "test_engineer",
            Stage::QaTester => "qa_tester",
            Stage::QualityReviewer => "quality_reviewer",
            Stage::Deployment => "deployment",
        }
    }

    /// Human-facing role of the stage
    pub fn role(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::ProductOwner => "analysis",
            Stage::GameDesigner => "design",
            Stage::Developer => "implementation",
            Stage::TestEngineer => "testing",
            Stage::QaTester => "validation",
            Stage::QualityReviewer => "review",
            Stage::Deployment => "deployment",
        }
    }

    /// Position in the pipeline (intake = 0, deployment = 7)
    pub fn position(&self) -> usize {
        Stage::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// Whether this is one of the six processing agents
    pub fn is_agent(&self) -> bool {
        !matches!(self, Stage::Intake | Stage::Deployment)
    }

    /// The single stage this one may hand off to
    pub fn next(&self) -> Option<Stage> {
        EDGES.iter().find(|(from, _)| from == self).map(|(_, to)| *to)
    }

    /// The single stage that may hand off to this one
    pub fn previous(&self) -> Option<Stage> {
        EDGES.iter().find(|(_, to)| to == self).map(|(from, _)| *from)
    }

    /// Whether `self → to` is one of the legal edges
    pub fn can_hand_off_to(&self, to: Stage) -> bool {
        EDGES.contains(&(*self, to))
    }

    /// Whether `self` comes strictly before `other` in the pipeline
    pub fn precedes(&self, other: Stage) -> bool {
        self.position() < other.position()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_form_a_single_chain() {
        let mut stage = Stage::Intake;
        let mut hops = 0;
        while let Some(next) = stage.next() {
            assert_eq!(next.previous(), Some(stage));
            stage = next;
            hops += 1;
        }
        assert_eq!(stage, Stage::Deployment);
        assert_eq!(hops, 7);
    }

    #[test]
    fn test_skipping_is_illegal() {
        assert!(Stage::GameDesigner.can_hand_off_to(Stage::Developer));
        assert!(!Stage::GameDesigner.can_hand_off_to(Stage::QaTester));
        assert!(!Stage::Developer.can_hand_off_to(Stage::GameDesigner));
        assert!(!Stage::Intake.can_hand_off_to(Stage::Deployment));
    }

    #[test]
    fn test_wire_names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
        assert!("qa".parse::<Stage>().is_err());
    }

    #[test]
    fn test_agents_exclude_endpoints() {
        assert_eq!(Stage::AGENTS.len(), 6);
        assert!(Stage::AGENTS.iter().all(Stage::is_agent));
        assert!(!Stage::Intake.is_agent());
        assert!(Stage::Developer.precedes(Stage::QaTester));
    }
}
