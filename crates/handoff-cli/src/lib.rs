//! handoff-validate: check contract files before they are handed off
//!
//! Each file is schema-validated, scored for compliance and run through the
//! quality gates of its source stage. The process exit code reports the
//! most severe failure across all files:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | every contract passed |
//! | 1 | contract failure (unreadable, schema, sequence, compliance) |
//! | 2 | performance gate unmet |
//! | 3 | security gate unmet |
//! | 4 | other quality gate failed |

use anyhow::Context;
use clap::Parser;
use handoff_compliance::ComplianceEngine;
use handoff_core::{Contract, Stage};
use handoff_pipeline::PipelineConfig;
use handoff_quality::{CheckStatus, GateCategory, GateOptions, QualityGate};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "handoff-validate")]
#[command(about = "Validate story handoff contracts", long_about = None)]
#[command(version)]
pub struct Args {
    /// Contract files, or directories to scan for *.json
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only validate contracts produced by this stage
    #[arg(long)]
    pub agent: Option<Stage>,

    /// Print every check, and log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip performance gates
    #[arg(long)]
    pub fast: bool,

    /// Pipeline configuration (YAML or JSON)
    #[arg(long, env = "HANDOFF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print one JSON report per file instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Pass = 0,
    ContractFailure = 1,
    Performance = 2,
    Security = 3,
    Quality = 4,
}

impl ExitCode {
    /// Most severe of two codes: any failure beats a pass and a lower
    /// failure code beats a higher one
    pub fn worst(self, other: ExitCode) -> ExitCode {
        match (self, other) {
            (ExitCode::Pass, code) | (code, ExitCode::Pass) => code,
            (a, b) => a.min(b),
        }
    }

    fn for_categories(categories: &BTreeSet<GateCategory>) -> ExitCode {
        if categories.contains(&GateCategory::Performance) {
            ExitCode::Performance
        } else if categories.contains(&GateCategory::Security) {
            ExitCode::Security
        } else if categories.is_empty() {
            ExitCode::Pass
        } else {
            ExitCode::Quality
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// Produced by a stage other than `--agent`
    Skipped,
    ContractFailure,
    GateFailure(BTreeSet<GateCategory>),
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Passed | Outcome::Skipped => ExitCode::Pass,
            Outcome::ContractFailure => ExitCode::ContractFailure,
            Outcome::GateFailure(categories) => ExitCode::for_categories(categories),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Failures, and every check when verbose
    pub messages: Vec<String>,
}

impl FileReport {
    fn failed(path: &Path, stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            stage,
            outcome: Outcome::ContractFailure,
            score: None,
            messages: vec![message.into()],
        }
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.outcome {
            Outcome::Passed => "PASS",
            Outcome::Skipped => "SKIP",
            Outcome::ContractFailure | Outcome::GateFailure(_) => "FAIL",
        };
        write!(f, "{} {}", label, self.path.display())?;
        if let Some(stage) = self.stage {
            write!(f, " ({})", stage)?;
        }
        if let Some(score) = self.score {
            write!(f, " score {:.1}", score)?;
        }
        for message in &self.messages {
            write!(f, "\n    {}", message)?;
        }
        Ok(())
    }
}

/// Validates contract files against one pipeline configuration
pub struct Validator {
    compliance: ComplianceEngine,
    gates: QualityGate,
    agent: Option<Stage>,
    verbose: bool,
}

impl Validator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            compliance: ComplianceEngine::new(config.compliance.clone()),
            gates: QualityGate::new(config.gates.clone()),
            agent: None,
            verbose: false,
        }
    }

    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let config = match &args.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        let options = if args.fast { GateOptions::fast() } else { GateOptions::default() };
        let mut validator = Self::new(&config).with_options(options);
        validator.agent = args.agent;
        validator.verbose = args.verbose;
        Ok(validator)
    }

    pub fn with_options(mut self, options: GateOptions) -> Self {
        self.gates = self.gates.with_options(options);
        self
    }

    pub fn with_agent(mut self, agent: Stage) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn validate_file(&self, path: &Path) -> FileReport {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => return FileReport::failed(path, None, format!("READ: {}", err)),
        };
        let contract = match Contract::from_json(&text) {
            Ok(contract) => contract,
            Err(err) => return FileReport::failed(path, None, err.to_string()),
        };
        self.validate_contract(path, &contract)
    }

    pub fn validate_contract(&self, path: &Path, contract: &Contract) -> FileReport {
        let stage = contract.source_stage;
        if self.agent.is_some_and(|agent| agent != stage) {
            debug!(path = %path.display(), stage = %stage, "skipped");
            return FileReport {
                path: path.to_path_buf(),
                stage: Some(stage),
                outcome: Outcome::Skipped,
                score: None,
                messages: Vec::new(),
            };
        }

        let compliance = self.compliance.score(contract);
        let gates = self.gates.evaluate(contract, stage);
        let mut messages = Vec::new();

        for violation in &compliance.violations {
            messages.push(violation.to_string());
        }
        for check in &gates.checks {
            match check.status {
                CheckStatus::Fail => messages.push(format!("GATE/{}: {}", check.name, check.message)),
                _ if self.verbose => messages.push(format!("ok {}: {}", check.name, check.message)),
                _ => {}
            }
        }
        if self.verbose {
            messages.extend(compliance.recommendations.iter().map(|r| format!("hint {}", r)));
        }

        let outcome = if !compliance.overall_compliant {
            Outcome::ContractFailure
        } else if !gates.passed {
            Outcome::GateFailure(gates.failed_categories())
        } else {
            Outcome::Passed
        };

        FileReport {
            path: path.to_path_buf(),
            stage: Some(stage),
            outcome,
            score: Some(compliance.aggregate_score),
            messages,
        }
    }
}

/// Expand directories into the `*.json` files beneath them, sorted
pub fn collect_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_dir(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_dir(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}

/// Validate everything `args` names and print a report per file
pub fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let validator = Validator::from_args(args)?;
    let files = collect_files(&args.paths)?;
    if files.is_empty() {
        anyhow::bail!("no contract files found");
    }

    let mut code = ExitCode::Pass;
    for path in &files {
        let report = validator.validate_file(path);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report);
        }
        code = code.worst(report.outcome.exit_code());
    }

    info!(files = files.len(), exit_code = code as u8, "validation finished");
    Ok(code)
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
