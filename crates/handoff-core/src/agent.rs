//! StageAgent: contract between the engine and an external stage
use crate::contract::Contract;
use crate::error::HandoffError;
use crate::stage::Stage;
use crate::violation::Violation;

/// An external processing stage.
///
/// The engine never inspects what an agent generates. It only sees the
/// contract the agent emits for the next stage.
pub trait StageAgent: Send + Sync {
    /// The stage this agent plays
    fn stage(&self) -> Stage;

    /// Consume the upstream contract and emit the contract for the next stage
    fn produce(&self, input: &Contract) -> Result<Contract, HandoffError>;

    /// Emit a new revision after a rejected handoff.
    ///
    /// The default re-emits the previous attempt unchanged, which lets the
    /// retry budget run out for agents that cannot self-correct.
    fn revise(&self, previous: &Contract, violations: &[Violation]) -> Result<Contract, HandoffError> {
        let _ = violations;
        Ok(previous.revise(|_| {}))
    }
}
