//! Pipeline events, topics and subscription patterns

use chrono::{DateTime, Utc};
use handoff_core::{HandoffError, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle step of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStep {
    Started,
    Milestone,
    Completed,
}

/// Story-wide outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Rejected,
    Blocked,
    RevisionRequested,
    Approved,
    Deployed,
}

/// Dot-separated event topic, e.g. `stage.developer.completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Stage(Stage, StageStep),
    Pipeline(PipelineOutcome),
}

impl Topic {
    pub fn started(stage: Stage) -> Self {
        Topic::Stage(stage, StageStep::Started)
    }

    pub fn milestone(stage: Stage) -> Self {
        Topic::Stage(stage, StageStep::Milestone)
    }

    pub fn completed(stage: Stage) -> Self {
        Topic::Stage(stage, StageStep::Completed)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Stage(stage, step) => {
                let step = match step {
                    StageStep::Started => "started",
                    StageStep::Milestone => "milestone",
                    StageStep::Completed => "completed",
                };
                write!(f, "stage.{}.{}", stage, step)
            }
            Topic::Pipeline(outcome) => {
                let outcome = match outcome {
                    PipelineOutcome::Rejected => "rejected",
                    PipelineOutcome::Blocked => "blocked",
                    PipelineOutcome::RevisionRequested => "revision_requested",
                    PipelineOutcome::Approved => "approved",
                    PipelineOutcome::Deployed => "deployed",
                };
                write!(f, "pipeline.{}", outcome)
            }
        }
    }
}

impl FromStr for Topic {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HandoffError::Config(format!("invalid topic '{}'", s));
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            ["stage", stage, step] => {
                let stage: Stage = stage.parse().map_err(|_| invalid())?;
                let step = match *step {
                    "started" => StageStep::Started,
                    "milestone" => StageStep::Milestone,
                    "completed" => StageStep::Completed,
                    _ => return Err(invalid()),
                };
                Ok(Topic::Stage(stage, step))
            }
            ["pipeline", outcome] => {
                let outcome = match *outcome {
                    "rejected" => PipelineOutcome::Rejected,
                    "blocked" => PipelineOutcome::Blocked,
                    "revision_requested" => PipelineOutcome::RevisionRequested,
                    "approved" => PipelineOutcome::Approved,
                    "deployed" => PipelineOutcome::Deployed,
                    _ => return Err(invalid()),
                };
                Ok(Topic::Pipeline(outcome))
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Subscription pattern over topics.
///
/// `*` matches exactly one segment and a trailing `**` matches one or more
/// remaining segments: `stage.*.completed`, `pipeline.*`, `stage.**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    segments: Vec<String>,
}

impl TopicPattern {
    pub fn new(pattern: &str) -> Result<Self, HandoffError> {
        let segments: Vec<String> = pattern.split('.').map(str::to_string).collect();
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() || (segment == "**" && i != last) {
                return Err(HandoffError::Config(format!("invalid topic pattern '{}'", pattern)));
            }
        }
        Ok(Self { segments })
    }

    /// Matches every topic
    pub fn all() -> Self {
        Self {
            segments: vec!["**".to_string()],
        }
    }

    pub fn matches(&self, topic: &Topic) -> bool {
        let topic = topic.to_string();
        let parts: Vec<&str> = topic.split('.').collect();
        for (i, segment) in self.segments.iter().enumerate() {
            if segment == "**" {
                return parts.len() > i;
            }
            match parts.get(i) {
                Some(part) if segment == "*" || segment == part => {}
                _ => return false,
            }
        }
        parts.len() == self.segments.len()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for TopicPattern {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Something that happened to a story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: Uuid,
    pub story_id: String,
    pub topic: Topic,
    /// Per-story emission order, starting at 1
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PipelineEvent {
    pub fn new(story_id: impl Into<String>, topic: Topic, sequence: u64, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            story_id: story_id.into(),
            topic,
            sequence,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_round_trip() {
        let topics = [
            Topic::started(Stage::ProductOwner),
            Topic::milestone(Stage::Developer),
            Topic::completed(Stage::QualityReviewer),
            Topic::Pipeline(PipelineOutcome::RevisionRequested),
        ];
        for topic in topics {
            assert_eq!(topic.to_string().parse::<Topic>().unwrap(), topic);
        }
        assert_eq!(Topic::completed(Stage::QaTester).to_string(), "stage.qa_tester.completed");
        assert!("stage.deployer.started".parse::<Topic>().is_err());
        assert!("pipeline.paused".parse::<Topic>().is_err());
    }

    #[test]
    fn test_pattern_wildcards() {
        let completed = TopicPattern::new("stage.*.completed").unwrap();
        assert!(completed.matches(&Topic::completed(Stage::Developer)));
        assert!(!completed.matches(&Topic::started(Stage::Developer)));

        let pipeline = TopicPattern::new("pipeline.*").unwrap();
        assert!(pipeline.matches(&Topic::Pipeline(PipelineOutcome::Approved)));
        assert!(!pipeline.matches(&Topic::completed(Stage::Developer)));

        let stages = TopicPattern::new("stage.**").unwrap();
        assert!(stages.matches(&Topic::milestone(Stage::TestEngineer)));
        assert!(!stages.matches(&Topic::Pipeline(PipelineOutcome::Deployed)));

        assert!(TopicPattern::all().matches(&Topic::Pipeline(PipelineOutcome::Deployed)));
        let exact = TopicPattern::new("pipeline.deployed").unwrap();
        assert!(exact.matches(&Topic::Pipeline(PipelineOutcome::Deployed)));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(TopicPattern::new("stage..completed").is_err());
        assert!(TopicPattern::new("**.completed").is_err());
        assert!(TopicPattern::new("").is_err());
    }

    #[test]
    fn test_event_serializes_topic_as_string() {
        let event = PipelineEvent::new("STORY-GH-1", Topic::started(Stage::GameDesigner), 3, serde_json::json!({}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "stage.game_designer.started");
        assert_eq!(json["sequence"], 3);
    }
}
