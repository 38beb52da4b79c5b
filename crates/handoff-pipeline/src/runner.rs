//! Pipeline Runner: drives registered agents through the orchestrator
use crate::orchestrator::Orchestrator;
use crate::state::{PipelinePhase, PipelineState, StoryStatus};
use handoff_core::{Contract, HandoffError, Stage, StageAgent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_MAX_HANDOFFS: usize = 64;

/// One stage's turn, including its rejected attempts
#[derive(Debug, Clone, Serialize)]
pub struct StageRun {
    pub stage: Stage,
    pub attempts: u32,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_hash: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub story_id: String,
    pub pipeline_id: String,
    pub runs: Vec<StageRun>,
    pub phase: PipelinePhase,
    pub status: StoryStatus,
    pub total_ms: u64,
}

impl RunReport {
    pub fn accepted_handoffs(&self) -> usize {
        self.runs.iter().filter(|r| r.accepted).count()
    }
}

pub struct PipelineRunner {
    orchestrator: Arc<Orchestrator>,
    agents: HashMap<Stage, Box<dyn StageAgent>>,
    pipeline_id: String,
    max_handoffs: usize,
    auto_deploy: bool,
}

impl PipelineRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, agents: Vec<Box<dyn StageAgent>>) -> Result<Self, HandoffError> {
        let mut stages: Vec<Stage> = agents.iter().map(|a| a.stage()).collect();
        stages.sort();
        let pipeline_id = stages.iter().map(Stage::as_str).collect::<Vec<_>>().join("→");

        let mut by_stage = HashMap::new();
        for agent in agents {
            let stage = agent.stage();
            if !stage.is_agent() {
                return Err(HandoffError::Config(format!("{} cannot run as an agent", stage)));
            }
            if by_stage.insert(stage, agent).is_some() {
                return Err(HandoffError::Config(format!("two agents registered for {}", stage)));
            }
        }

        Ok(Self {
            orchestrator,
            agents: by_stage,
            pipeline_id,
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            auto_deploy: true,
        })
    }

    /// Cap on stage turns per story, so review loops end
    pub fn with_max_handoffs(mut self, max: usize) -> Self {
        self.max_handoffs = max;
        self
    }

    /// Deploy approved stories as part of the run
    pub fn with_auto_deploy(mut self, auto_deploy: bool) -> Self {
        self.auto_deploy = auto_deploy;
        self
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Register `intake` and run agents until the story is deployed,
    /// blocked, rejected or waiting on a review decision
    pub async fn run(&self, intake: Contract) -> Result<RunReport, HandoffError> {
        let start = Instant::now();
        let story_id = intake.story_id.clone();
        self.orchestrator.register(intake).await?;

        let mut runs = Vec::new();
        loop {
            let state = self.orchestrator.snapshot(&story_id).await?;
            let Some(stage) = state.expected_producer() else {
                break;
            };
            if runs.len() >= self.max_handoffs {
                return Err(HandoffError::Agent {
                    stage,
                    message: format!("{}: {} stage turns without finishing", story_id, runs.len()),
                });
            }
            runs.push(self.turn(&state, stage).await?);
        }

        let mut state = self.orchestrator.snapshot(&story_id).await?;
        if self.auto_deploy && state.status == StoryStatus::Approved {
            state = self.orchestrator.deploy(&story_id).await?;
        }

        let report = RunReport {
            story_id,
            pipeline_id: self.pipeline_id.clone(),
            runs,
            phase: state.phase,
            status: state.status,
            total_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            story_id = %report.story_id,
            status = %report.status,
            handoffs = report.accepted_handoffs(),
            total_ms = report.total_ms,
            "pipeline run finished"
        );
        Ok(report)
    }

    async fn turn(&self, state: &PipelineState, stage: Stage) -> Result<StageRun, HandoffError> {
        let agent = self.agents.get(&stage).ok_or_else(|| HandoffError::Agent {
            stage,
            message: "no agent registered".into(),
        })?;

        let input = upstream_contract(state, stage);
        let start = Instant::now();
        let mut contract = agent.produce(&input)?;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.orchestrator.submit(contract.clone()).await {
                Ok(transition) => {
                    return Ok(StageRun {
                        stage,
                        attempts,
                        accepted: true,
                        contract_hash: Some(transition.contract_hash),
                        latency_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(err) if err.retries_left().is_some_and(|left| left > 0) => {
                    debug!(story_id = %state.story_id, stage = %stage, attempt = attempts, error = %err, "revising");
                    contract = agent.revise(&contract, err.violations())?;
                }
                Err(err) if err.is_recoverable() => {
                    return Ok(StageRun {
                        stage,
                        attempts,
                        accepted: false,
                        contract_hash: None,
                        latency_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Contract the awaited stage consumes: the latest accepted handoff from
/// the stage before it, or the intake contract
fn upstream_contract(state: &PipelineState, stage: Stage) -> Contract {
    match stage.previous() {
        Some(previous) if previous != Stage::Intake => state
            .accepted_from(previous)
            .map(|entry| entry.contract.as_ref().clone())
            .unwrap_or_else(|| state.current_contract().as_ref().clone()),
        _ => state.intake.as_ref().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    struct Passthrough(Stage);

    impl StageAgent for Passthrough {
        fn stage(&self) -> Stage {
            self.0
        }

        fn produce(&self, input: &Contract) -> Result<Contract, HandoffError> {
            let next = self.0.next().ok_or_else(|| HandoffError::Agent {
                stage: self.0,
                message: "no next stage".into(),
            })?;
            Ok(Contract::new(input.story_id.clone(), self.0, next))
        }
    }

    fn agents() -> Vec<Box<dyn StageAgent>> {
        Stage::AGENTS
            .iter()
            .map(|&s| Box::new(Passthrough(s)) as Box<dyn StageAgent>)
            .collect()
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let config = PipelineConfig::default().with_gates(handoff_quality::StageProfiles::empty());
        Arc::new(Orchestrator::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_runs_to_deployment() {
        let runner = PipelineRunner::new(orchestrator(), agents()).unwrap();
        assert!(runner.pipeline_id().starts_with("product_owner→game_designer"));

        let report = runner
            .run(Contract::new("STORY-GH-11", Stage::Intake, Stage::ProductOwner))
            .await
            .unwrap();
        assert_eq!(report.status, StoryStatus::Deployed);
        assert_eq!(report.accepted_handoffs(), 6);
        assert!(report.runs.iter().all(|r| r.attempts == 1));
    }

    #[tokio::test]
    async fn test_missing_agent() {
        let mut agents = agents();
        agents.retain(|a| a.stage() != Stage::Developer);
        let runner = PipelineRunner::new(orchestrator(), agents).unwrap();
        let err = runner
            .run(Contract::new("STORY-GH-12", Stage::Intake, Stage::ProductOwner))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "AGENT");
    }

    #[test]
    fn test_duplicate_agents_rejected() {
        let mut agents = agents();
        agents.push(Box::new(Passthrough(Stage::Developer)));
        assert!(PipelineRunner::new(orchestrator(), agents).is_err());
        assert!(PipelineRunner::new(orchestrator(), vec![Box::new(Passthrough(Stage::Intake)) as Box<dyn StageAgent>]).is_err());
    }
}
