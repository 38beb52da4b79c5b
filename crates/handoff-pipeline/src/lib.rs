//! Handoff Pipeline: orchestration of stories across the six stages
//!
//! The [`Orchestrator`] owns one state machine per story and is the only
//! component that publishes transition events. Subscribers attach to its
//! [`EventNotifier`]; external stages plug in through
//! [`handoff_core::StageAgent`] and the [`PipelineRunner`].
//!
//! # Example
//!
//! ```
//! use handoff_core::{Contract, Stage};
//! use handoff_pipeline::{Orchestrator, PipelineConfig, PipelinePhase};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let orchestrator = Orchestrator::new(PipelineConfig::default()).unwrap();
//! orchestrator
//!     .register(Contract::new("STORY-GH-1", Stage::Intake, Stage::ProductOwner))
//!     .await
//!     .unwrap();
//!
//! let transition = orchestrator
//!     .submit(Contract::new("STORY-GH-1", Stage::ProductOwner, Stage::GameDesigner))
//!     .await
//!     .unwrap();
//! assert_eq!(transition.to, PipelinePhase::Analyzed);
//! # });
//! ```

pub mod config;
pub mod events;
pub mod journal;
pub mod notifier;
pub mod orchestrator;
pub mod runner;
pub mod state;

pub use config::PipelineConfig;
pub use events::{PipelineEvent, PipelineOutcome, StageStep, Topic, TopicPattern};
pub use journal::{EventJournal, JournalStats};
pub use notifier::{EventNotifier, HandlerResult, SubscriptionId};
pub use orchestrator::{Orchestrator, StalledStory, Transition};
pub use runner::{PipelineRunner, RunReport, StageRun};
pub use state::{HistoryEntry, PipelinePhase, PipelineState, StoryStatus};
