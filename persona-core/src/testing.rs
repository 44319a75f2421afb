//! Testing utilities for the persona engine.
//!
//! This module provides deterministic stand-ins for integration tests:
//! - `ScriptedCognition`, a [`Cognition`] with fixed, configurable answers
//! - `HashEmbedder`, a bag-of-words [`Embedder`] that never calls out
//! - `grid_maze` for building small worlds from ASCII art
//! - `sample_persona` for a ready-to-step persona

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::cognition::{Cognition, CognitionResult, Embedder, Insight, Plan};
use crate::maze::{Maze, MazeAccess, Tile, TilePos};
use crate::memory::{AssociativeMemory, NodeId, NodeKind, Spo, Utterance};
use crate::path::Path;
use crate::persona::{Identity, Persona, State};
use crate::spatial::SpatialMemory;

/// World, sector and arena of every tile built by [`grid_maze`].
pub const GRID_ARENA: &str = "the Ville:cafe:kitchen";

/// A cognition with scripted answers.
///
/// Every call is recorded by name so tests can assert on what the engine asked.
pub struct ScriptedCognition {
    importance: i32,
    valence: i32,
    wake_up: NaiveTime,
    talk: bool,
    wait: bool,
    sector: String,
    arena: String,
    object: String,
    conversation_turns: usize,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedCognition {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCognition {
    pub fn new() -> Self {
        Self {
            importance: 4,
            valence: 0,
            wake_up: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
            talk: true,
            wait: true,
            sector: "cafe".to_string(),
            arena: "kitchen".to_string(),
            object: "stove".to_string(),
            conversation_turns: 3,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Score returned for every importance call.
    pub fn with_importance(mut self, importance: i32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_valence(mut self, valence: i32) -> Self {
        self.valence = valence;
        self
    }

    pub fn with_wake_up(mut self, wake_up: NaiveTime) -> Self {
        self.wake_up = wake_up;
        self
    }

    pub fn with_decide_to_talk(mut self, talk: bool) -> Self {
        self.talk = talk;
        self
    }

    pub fn with_decide_to_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Location every activity resolves to.
    pub fn with_location(
        mut self,
        sector: impl Into<String>,
        arena: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        self.sector = sector.into();
        self.arena = arena.into();
        self.object = object.into();
        self
    }

    /// Number of utterances after which a conversation ends.
    pub fn with_conversation_turns(mut self, turns: usize) -> Self {
        self.conversation_turns = turns;
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.to_string());
        }
    }
}

#[async_trait]
impl Cognition for ScriptedCognition {
    async fn importance(&self, _: &Persona, _: NodeKind, _: &str) -> CognitionResult<i32> {
        self.record("importance");
        Ok(self.importance)
    }

    async fn chat_importance(&self, _: &Persona, _: &[Utterance], _: &str) -> CognitionResult<i32> {
        self.record("chat_importance");
        Ok(self.importance)
    }

    async fn valence(&self, _: &Persona, _: NodeKind, _: &str) -> CognitionResult<i32> {
        self.record("valence");
        Ok(self.valence)
    }

    async fn chat_valence(&self, _: &Persona, _: &[Utterance], _: &str) -> CognitionResult<i32> {
        self.record("chat_valence");
        Ok(self.valence)
    }

    async fn wake_up_hour(&self, _: &Persona) -> CognitionResult<NaiveTime> {
        self.record("wake_up_hour");
        Ok(self.wake_up)
    }

    async fn daily_plan(&self, _: &Persona, wake_up: NaiveTime) -> CognitionResult<Vec<String>> {
        self.record("daily_plan");
        Ok(vec![
            format!("wake up at {}", wake_up.format("%-I:%M %p")),
            "have breakfast".to_string(),
            "work on painting".to_string(),
            "relax in the evening".to_string(),
        ])
    }

    /// Sleep until wake-up, breakfast, work, two hours of rest and sleep.
    async fn hourly_schedule(&self, _: &Persona, wake_up: NaiveTime) -> CognitionResult<Vec<Plan>> {
        self.record("hourly_schedule");
        let asleep = (wake_up.hour() * 60).min(18 * 60);
        Ok(vec![
            Plan::new("sleeping", asleep),
            Plan::new("having breakfast", 60),
            Plan::new("working on painting", 24 * 60 - asleep - 300),
            Plan::new("relaxing", 120),
            Plan::new("sleeping", 120),
        ])
    }

    async fn decompose_plan(&self, _: &Persona, plan: &Plan) -> CognitionResult<Vec<Plan>> {
        self.record("decompose_plan");
        let first = plan.duration / 2;
        Ok(vec![
            Plan::new(format!("{} (getting started)", plan.activity), first),
            Plan::new(format!("{} (wrapping up)", plan.activity), plan.duration - first),
        ])
    }

    /// The inserted activity first, the rest of the window after it.
    async fn reaction_schedule(
        &self,
        _: &Persona,
        inserted: &Plan,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CognitionResult<Vec<Plan>> {
        self.record("reaction_schedule");
        let window = (end - start).num_minutes().max(0) as u32;
        let first = inserted.duration.min(window);
        let mut plans = vec![Plan::new(inserted.activity.clone(), first)];
        if window > first {
            plans.push(Plan::new("getting back to the day", window - first));
        }
        Ok(plans)
    }

    async fn activity_sector(
        &self,
        _: &Persona,
        _: &dyn MazeAccess,
        _: &str,
        _: &str,
    ) -> CognitionResult<String> {
        self.record("activity_sector");
        Ok(self.sector.clone())
    }

    async fn activity_arena(
        &self,
        _: &Persona,
        _: &dyn MazeAccess,
        _: &str,
        _: &str,
        _: &str,
    ) -> CognitionResult<String> {
        self.record("activity_arena");
        Ok(self.arena.clone())
    }

    async fn activity_object(
        &self,
        _: &Persona,
        _: &dyn MazeAccess,
        _: &str,
        _: &Path,
    ) -> CognitionResult<String> {
        self.record("activity_object");
        Ok(self.object.clone())
    }

    async fn pronunciatio(&self, _: &Persona, _: &str) -> CognitionResult<String> {
        self.record("pronunciatio");
        Ok("🙂".to_string())
    }

    async fn activity_spo(&self, persona: &Persona, activity: &str) -> CognitionResult<Spo> {
        self.record("activity_spo");
        Ok(Spo::new(persona.name(), "is", activity))
    }

    async fn object_state(&self, _: &Persona, _: &str, activity: &str) -> CognitionResult<String> {
        self.record("object_state");
        Ok(format!("being used for {activity}"))
    }

    async fn object_pronunciatio(&self, _: &Persona, _: &str) -> CognitionResult<String> {
        self.record("object_pronunciatio");
        Ok("⚙️".to_string())
    }

    async fn object_spo(&self, _: &Persona, object: &str, description: &str) -> CognitionResult<Spo> {
        self.record("object_spo");
        Ok(Spo::new(object, "is", description))
    }

    async fn decide_to_talk(
        &self,
        _: &Persona,
        _: &Persona,
        _: &[NodeId],
        _: &[NodeId],
    ) -> CognitionResult<bool> {
        self.record("decide_to_talk");
        Ok(self.talk)
    }

    async fn decide_to_wait(
        &self,
        _: &Persona,
        _: &Persona,
        _: &[NodeId],
        _: &[NodeId],
    ) -> CognitionResult<bool> {
        self.record("decide_to_wait");
        Ok(self.wait)
    }

    async fn conversation_summary(&self, _: &Persona, _: &[Utterance]) -> CognitionResult<String> {
        self.record("conversation_summary");
        Ok("conversing about the day".to_string())
    }

    async fn planning_thought(&self, _: &Persona, _: &[Utterance]) -> CognitionResult<String> {
        self.record("planning_thought");
        Ok("remember to follow up tomorrow".to_string())
    }

    async fn conversation_memo(&self, _: &Persona, _: &[Utterance]) -> CognitionResult<String> {
        self.record("conversation_memo");
        Ok("enjoyed the conversation".to_string())
    }

    async fn relationship_summary(
        &self,
        init: &Persona,
        target: &Persona,
        _: &[NodeId],
    ) -> CognitionResult<String> {
        self.record("relationship_summary");
        Ok(format!("{} and {} are neighbours", init.name(), target.name()))
    }

    async fn next_utterance(
        &self,
        init: &Persona,
        _: &Persona,
        _: &dyn MazeAccess,
        conversation: &[Utterance],
        _: &[NodeId],
        _: &str,
    ) -> CognitionResult<(Utterance, bool)> {
        self.record("next_utterance");
        let n = conversation.len() + 1;
        Ok((
            Utterance::new(init.name(), format!("Line {n}")),
            n >= self.conversation_turns,
        ))
    }

    async fn focal_points(
        &self,
        persona: &Persona,
        _: &[NodeId],
        count: usize,
    ) -> CognitionResult<Vec<String>> {
        self.record("focal_points");
        Ok((1..=count)
            .map(|i| format!("What matters most to {} ({i})?", persona.name()))
            .collect())
    }

    /// One insight backed by the first statement.
    async fn insights(
        &self,
        persona: &Persona,
        statements: &[NodeId],
        _: usize,
    ) -> CognitionResult<Vec<Insight>> {
        self.record("insights");
        Ok(statements
            .first()
            .map(|id| Insight {
                text: format!("{} notices a pattern", persona.name()),
                evidence: vec![*id],
            })
            .into_iter()
            .collect())
    }

    async fn planning_note(&self, _: &Persona, _: &[String]) -> CognitionResult<String> {
        self.record("planning_note");
        Ok("stay focused on the painting".to_string())
    }

    async fn planning_feelings(&self, _: &Persona, _: &[String]) -> CognitionResult<String> {
        self.record("planning_feelings");
        Ok("content".to_string())
    }

    async fn current_plans(&self, persona: &Persona, _: &str, _: &str) -> CognitionResult<String> {
        self.record("current_plans");
        Ok(format!("{} is working on a painting", persona.name()))
    }

    async fn daily_requirements(&self, _: &Persona) -> CognitionResult<String> {
        self.record("daily_requirements");
        Ok("work on the painting, eat lunch at the cafe".to_string())
    }
}

/// Deterministic bag-of-words embeddings.
///
/// Texts sharing words get similar vectors; no vector is ever zero.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 32 }
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimensions];
        vector[0] = 1.0;
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[hasher.finish() as usize % self.dimensions] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CognitionResult<Vec<f64>> {
        Ok(self.embed_sync(text))
    }
}

/// Build a maze from ASCII rows.
///
/// `#` blocks movement and `S` is a stove; every other character is open
/// floor. All tiles belong to [`GRID_ARENA`].
///
/// # Panics
///
/// Panics when rows differ in length.
pub fn grid_maze(rows: &[&str]) -> Maze {
    let arena = Path::parse(GRID_ARENA).unwrap_or_default();
    let stove = Path::parse(&format!("{GRID_ARENA}:stove")).unwrap_or_default();
    let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);

    let tiles = rows
        .iter()
        .map(|row| {
            row.chars()
                .map(|c| match c {
                    '#' => Tile::new(arena.clone()).with_collision(true),
                    'S' => Tile::new(stove.clone()),
                    _ => Tile::new(arena.clone()),
                })
                .collect()
        })
        .collect();

    match Maze::new("the Ville", width, rows.len(), 32, tiles) {
        Ok(maze) => maze,
        Err(e) => panic!("invalid grid: {e}"),
    }
}

/// A persona with a plain identity, scripted cognition and hash embeddings.
pub fn sample_persona(name: &str, position: TilePos) -> Persona {
    let (first_name, last_name) = name.split_once(' ').unwrap_or((name, ""));
    let state = State {
        position,
        identity: Identity {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            age: 35,
            innate_traits: "curious, patient".to_string(),
            learned_traits: format!("{first_name} is a painter who loves the cafe."),
            current_plans: format!("{first_name} is preparing an exhibition."),
            lifestyle: "goes to bed around 10pm, wakes up around 7am".to_string(),
            living_area: Path::parse(GRID_ARENA).unwrap_or_default(),
        },
        daily_plan_requirements: "work on the painting".to_string(),
        reflection_trigger: 150,
        reflection_trigger_current: 150,
        ..Default::default()
    };

    Persona::new(
        name,
        state,
        AssociativeMemory::new(),
        SpatialMemory::new(),
        Arc::new(ScriptedCognition::new()),
        Arc::new(HashEmbedder::default()),
    )
}
