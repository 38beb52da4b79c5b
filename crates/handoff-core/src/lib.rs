//! Handoff Core: contract model, stage graph and schema validation
//!
//! Every handoff between two stages carries a [`Contract`]. This crate owns
//! its wire format, the fixed stage graph it must travel along, and the
//! [`SchemaValidator`] that gates every transfer.
//!
//! # Example
//!
//! ```
//! use handoff_core::{Contract, SchemaValidator, Stage};
//!
//! let contract = Contract::new("STORY-GH-42", Stage::GameDesigner, Stage::Developer);
//! assert!(SchemaValidator::new().validate_contract(&contract).is_ok());
//!
//! let skipping = Contract::new("STORY-GH-42", Stage::GameDesigner, Stage::QaTester);
//! assert!(SchemaValidator::new().validate_contract(&skipping).is_err());
//! ```

pub mod agent;
pub mod contract;
pub mod error;
pub mod principle;
pub mod schema;
pub mod stage;
pub mod violation;

pub use agent::StageAgent;
pub use contract::{
    ArchitecturePrinciples, Bound, Compliance, Contract, DesignPrinciples, InputRequirements,
    MetricCriterion, OutputSpecifications, PrincipleAssessment, PrincipleValue, ReviewDecision,
    TeamCoordination, CONTRACT_VERSION,
};
pub use error::HandoffError;
pub use principle::{ArchitecturePrinciple, DesignPrinciple, Principle, PrincipleGroup};
pub use schema::{is_valid_story_id, SchemaValidator, ValidationResult};
pub use stage::{Stage, EDGES};
pub use violation::{violation_names, Violation, ViolationKind, ViolationSeverity};
