//! Judgment capability consumed by the persona engine.
//!
//! Every decision that needs natural-language reasoning goes through the
//! [`Cognition`] trait: scoring memories, planning a day, resolving where an
//! activity happens, deciding whether to talk, producing dialogue and
//! reflecting. Text embeddings go through [`Embedder`].
//!
//! The engine only depends on these traits. [`crate::llm::LlmCognition`] is
//! the model-backed implementation and [`crate::testing::ScriptedCognition`]
//! is the deterministic one used by tests.

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::maze::MazeAccess;
use crate::memory::{NodeId, NodeKind, Spo, Utterance};
use crate::path::Path;
use crate::persona::Persona;

/// Errors from a judgment call.
#[derive(Debug, Error)]
pub enum CognitionError {
    /// The reply could not be decoded into the expected shape
    #[error("Could not decode reply: {0}")]
    Decode(String),

    /// The reply decoded but broke a semantic constraint
    #[error("Reply failed validation: {0}")]
    Validation(String),

    /// Connectivity or server failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credentials missing or rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Retries ran out; carries the last retryable failure
    #[error("Prompt {prompt} failed after {attempts} attempts: {last}")]
    Exhausted {
        prompt: String,
        attempts: u32,
        last: Box<CognitionError>,
    },

    /// A prompt template could not be rendered
    #[error("Template error: {0}")]
    Template(String),
}

impl CognitionError {
    /// Whether asking again could produce a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CognitionError::Decode(_) | CognitionError::Validation(_))
    }
}

impl From<openai::Error> for CognitionError {
    fn from(err: openai::Error) -> Self {
        match err {
            e if e.is_decode() => CognitionError::Decode(e.to_string()),
            openai::Error::NoApiKey => CognitionError::Auth("API key not configured".to_string()),
            openai::Error::Api { status, message } if status == 401 || status == 403 => {
                CognitionError::Auth(format!("status {status}: {message}"))
            }
            e => CognitionError::Transport(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CognitionError {
    fn from(err: serde_json::Error) -> Self {
        CognitionError::Decode(err.to_string())
    }
}

/// Result type for judgment calls.
pub type CognitionResult<T> = std::result::Result<T, CognitionError>;

/// One schedule entry. Serialized as `[activity, minutes]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u32)", into = "(String, u32)")]
pub struct Plan {
    pub activity: String,
    /// Length in minutes
    pub duration: u32,
}

impl Plan {
    pub fn new(activity: impl Into<String>, duration: u32) -> Self {
        Self {
            activity: activity.into(),
            duration,
        }
    }
}

impl From<(String, u32)> for Plan {
    fn from((activity, duration): (String, u32)) -> Self {
        Self { activity, duration }
    }
}

impl From<Plan> for (String, u32) {
    fn from(plan: Plan) -> Self {
        (plan.activity, plan.duration)
    }
}

/// Total minutes covered by a schedule.
pub fn schedule_minutes(plans: &[Plan]) -> u32 {
    plans.iter().map(|p| p.duration).sum()
}

/// A reflection result: a new thought and the memories that support it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insight {
    pub text: String,
    pub evidence: Vec<NodeId>,
}

/// Natural-language judgment calls made by the persona engine.
///
/// Persona arguments are read-only views; implementations read identity,
/// schedule and memory through the [`Persona`] accessors.
#[async_trait]
pub trait Cognition: Send + Sync {
    /// How memorable an event or thought is, 1 to 10.
    async fn importance(&self, persona: &Persona, kind: NodeKind, description: &str)
        -> CognitionResult<i32>;

    /// How memorable a conversation is, 1 to 10.
    async fn chat_importance(
        &self,
        persona: &Persona,
        transcript: &[Utterance],
        description: &str,
    ) -> CognitionResult<i32>;

    /// Emotional charge of an event or thought, negative is unpleasant.
    async fn valence(&self, persona: &Persona, kind: NodeKind, description: &str)
        -> CognitionResult<i32>;

    /// Emotional charge of a conversation.
    async fn chat_valence(
        &self,
        persona: &Persona,
        transcript: &[Utterance],
        description: &str,
    ) -> CognitionResult<i32>;

    async fn wake_up_hour(&self, persona: &Persona) -> CognitionResult<NaiveTime>;

    /// Broad strokes of the day.
    async fn daily_plan(&self, persona: &Persona, wake_up: NaiveTime)
        -> CognitionResult<Vec<String>>;

    /// Hour by hour schedule covering the whole day.
    async fn hourly_schedule(&self, persona: &Persona, wake_up: NaiveTime)
        -> CognitionResult<Vec<Plan>>;

    /// Split one entry into smaller tasks with the same total duration.
    async fn decompose_plan(&self, persona: &Persona, plan: &Plan) -> CognitionResult<Vec<Plan>>;

    /// Rewrite the `[start, end)` window of the schedule around an inserted activity.
    async fn reaction_schedule(
        &self,
        persona: &Persona,
        inserted: &Plan,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CognitionResult<Vec<Plan>>;

    async fn activity_sector(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        world: &str,
    ) -> CognitionResult<String>;

    async fn activity_arena(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        world: &str,
        sector: &str,
    ) -> CognitionResult<String>;

    async fn activity_object(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        arena: &Path,
    ) -> CognitionResult<String>;

    /// Glyph summarizing an activity.
    async fn pronunciatio(&self, persona: &Persona, activity: &str) -> CognitionResult<String>;

    /// Triple describing what the persona is doing.
    async fn activity_spo(&self, persona: &Persona, activity: &str) -> CognitionResult<Spo>;

    /// State of the object used by an activity.
    async fn object_state(&self, persona: &Persona, object: &str, activity: &str)
        -> CognitionResult<String>;

    async fn object_pronunciatio(&self, persona: &Persona, description: &str)
        -> CognitionResult<String>;

    async fn object_spo(&self, persona: &Persona, object: &str, description: &str)
        -> CognitionResult<Spo>;

    /// Whether `init` starts a conversation with `target`.
    async fn decide_to_talk(
        &self,
        init: &Persona,
        target: &Persona,
        events: &[NodeId],
        thoughts: &[NodeId],
    ) -> CognitionResult<bool>;

    /// Whether `init` waits for `target` to finish before continuing.
    async fn decide_to_wait(
        &self,
        init: &Persona,
        target: &Persona,
        events: &[NodeId],
        thoughts: &[NodeId],
    ) -> CognitionResult<bool>;

    async fn conversation_summary(&self, persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String>;

    /// What the persona should remember for planning after a conversation.
    async fn planning_thought(&self, persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String>;

    /// Anything else worth remembering after a conversation.
    async fn conversation_memo(&self, persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String>;

    async fn relationship_summary(
        &self,
        init: &Persona,
        target: &Persona,
        memories: &[NodeId],
    ) -> CognitionResult<String>;

    /// Next line spoken by `init`, and whether it ends the conversation.
    async fn next_utterance(
        &self,
        init: &Persona,
        target: &Persona,
        maze: &dyn MazeAccess,
        conversation: &[Utterance],
        relevant: &[NodeId],
        relationship: &str,
    ) -> CognitionResult<(Utterance, bool)>;

    /// Questions to reflect on, drawn from recent memories.
    async fn focal_points(&self, persona: &Persona, statements: &[NodeId], count: usize)
        -> CognitionResult<Vec<String>>;

    async fn insights(&self, persona: &Persona, statements: &[NodeId], count: usize)
        -> CognitionResult<Vec<Insight>>;

    async fn planning_note(&self, persona: &Persona, statements: &[String])
        -> CognitionResult<String>;

    async fn planning_feelings(&self, persona: &Persona, statements: &[String])
        -> CognitionResult<String>;

    /// New "currently" status from a planning note and feelings.
    async fn current_plans(&self, persona: &Persona, note: &str, feelings: &str)
        -> CognitionResult<String>;

    async fn daily_requirements(&self, persona: &Persona) -> CognitionResult<String>;
}

/// Text to vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CognitionResult<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(CognitionError::Decode("x".into()).is_retryable());
        assert!(CognitionError::Validation("x".into()).is_retryable());
        assert!(!CognitionError::Transport("x".into()).is_retryable());
        assert!(!CognitionError::Auth("x".into()).is_retryable());
    }

    #[test]
    fn test_openai_error_mapping() {
        let err: CognitionError = openai::Error::Parse("bad json".into()).into();
        assert!(matches!(err, CognitionError::Decode(_)));

        let err: CognitionError = openai::Error::NoApiKey.into();
        assert!(matches!(err, CognitionError::Auth(_)));

        let err: CognitionError = openai::Error::Api {
            status: 401,
            message: "nope".into(),
        }
        .into();
        assert!(matches!(err, CognitionError::Auth(_)));

        let err: CognitionError = openai::Error::Api {
            status: 500,
            message: "oops".into(),
        }
        .into();
        assert!(matches!(err, CognitionError::Transport(_)));
    }

    #[test]
    fn test_plan_serializes_as_pair() {
        let plan = Plan::new("sleeping", 360);
        assert_eq!(serde_json::to_string(&plan).unwrap(), r#"["sleeping",360]"#);
        let back: Plan = serde_json::from_str(r#"["reading", 60]"#).unwrap();
        assert_eq!(back, Plan::new("reading", 60));
        assert_eq!(schedule_minutes(&[plan, back]), 420);
    }
}
