//! The persona engine.
//!
//! A [`Persona`] owns its scratch [`State`], its associative memory and its
//! spatial memory. Each simulation step runs [`Persona::step`], which goes
//! through five phases in order:
//!
//! 1. perceive: register nearby locations and turn nearby events into memories
//! 2. retrieve: look up memories related to what was just perceived
//! 3. plan: keep the day's schedule current, pick the activity, maybe react
//! 4. reflect: turn accumulated memories into higher level thoughts
//! 5. execute: route towards the activity and take one tile of movement
//!
//! Judgment calls go through the shared [`Cognition`] capability.

mod converse;
mod execute;
mod perceive;
mod plan;
mod reflect;
mod retrieve;
mod state;

pub use retrieve::{cosine_similarity, normalize, Retrieved, DEFAULT_RETRIEVAL_COUNT};
pub use state::{Activity, Attention, ChatState, Identity, RetrievalWeights, State};

use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::cognition::{Cognition, Embedder, Plan};
use crate::error::Result;
use crate::maze::{Event, Maze, TilePos};
use crate::memory::{AssociativeMemory, ConceptNode, NodeDraft, NodeId, NodeKind, Spo, Utterance};
use crate::path::{Level, Path};
use crate::spatial::SpatialMemory;

/// Lifetime of reflective thoughts.
const THOUGHT_LIFETIME_DAYS: i64 = 30;

/// Date format used in prompts and plan thoughts.
pub(crate) const DAY_FORMAT: &str = "%A %B %d";

/// Whether this step starts a new day for the persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewDay {
    No,
    /// Very first step of the simulation
    First,
    /// The date changed since the last step
    New,
}

/// What a persona did in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub tile: TilePos,
    pub pronunciatio: String,
    pub event: Event,
}

/// A simulated person.
pub struct Persona {
    name: String,
    state: State,
    memory: AssociativeMemory,
    spatial: SpatialMemory,
    cognition: Arc<dyn Cognition>,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persona")
            .field("name", &self.name)
            .field("position", &self.state.position)
            .field("activity", &self.state.activity.description)
            .field("memories", &self.memory.len())
            .finish()
    }
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        state: State,
        memory: AssociativeMemory,
        spatial: SpatialMemory,
        cognition: Arc<dyn Cognition>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            memory,
            spatial,
            cognition,
            embedder,
        }
    }

    pub fn with_cognition(mut self, cognition: Arc<dyn Cognition>) -> Self {
        self.cognition = cognition;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Advance this persona to `time` and decide its next tile.
    ///
    /// `others` holds every other persona in the simulation; a conversation
    /// started this step also updates the partner's schedule.
    #[instrument(skip_all, fields(persona = %self.name))]
    pub async fn step(
        &mut self,
        maze: &Maze,
        others: &mut BTreeMap<String, Persona>,
        time: NaiveDateTime,
    ) -> Result<Movement> {
        let started = Instant::now();
        info!("persona step start");

        let new_day = match self.state.current_time {
            None => NewDay::First,
            Some(prev) if prev.date() != time.date() => NewDay::New,
            Some(_) => NewDay::No,
        };
        self.state.current_time = Some(time);

        let phase = Instant::now();
        let perceived = self.perceive(maze).await?;
        debug!(phase = "perceive", elapsed_ms = phase.elapsed().as_millis() as u64, "phase done");

        let phase = Instant::now();
        let retrieved = self.retrieve_for_perceptions(&perceived)?;
        debug!(phase = "retrieve", elapsed_ms = phase.elapsed().as_millis() as u64, "phase done");

        let phase = Instant::now();
        let address = self.plan(maze, others, retrieved, new_day).await?;
        debug!(phase = "plan", elapsed_ms = phase.elapsed().as_millis() as u64, "phase done");

        let phase = Instant::now();
        self.reflect().await?;
        debug!(phase = "reflect", elapsed_ms = phase.elapsed().as_millis() as u64, "phase done");

        let phase = Instant::now();
        let movement = self.execute(maze, others, &address)?;
        debug!(phase = "execute", elapsed_ms = phase.elapsed().as_millis() as u64, "phase done");

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "persona step done"
        );
        Ok(movement)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Scratch state for loaders and tools that seed a persona directly.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn memory(&self) -> &AssociativeMemory {
        &self.memory
    }

    pub fn spatial(&self) -> &SpatialMemory {
        &self.spatial
    }

    pub fn position(&self) -> TilePos {
        self.state.position
    }

    pub fn set_position(&mut self, pos: TilePos) {
        self.state.position = pos;
    }

    /// Simulated time of the last step, or the epoch before the first one.
    pub fn current_time(&self) -> NaiveDateTime {
        self.state.now()
    }

    /// Midnight of the current day.
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.current_time().date().and_time(NaiveTime::MIN)
    }

    /// Identity summary used as the preamble of most prompts.
    pub fn identity_stable_set(&self) -> String {
        let id = &self.state.identity;
        [
            format!("Name: {}", self.name),
            format!("Age: {}", id.age),
            format!("Innate traits: {}", id.innate_traits),
            format!("Learned traits: {}", id.learned_traits),
            format!("Currently: {}", id.current_plans),
            format!("Lifestyle: {}", id.lifestyle),
            format!("Daily plan requirements: {}", self.state.daily_plan_requirements),
            format!("Current date: {}", self.current_time().format(DAY_FORMAT)),
        ]
        .join(",\n")
    }

    pub fn first_name(&self) -> &str {
        &self.state.identity.first_name
    }

    pub fn lifestyle(&self) -> &str {
        &self.state.identity.lifestyle
    }

    pub fn current_plans(&self) -> &str {
        &self.state.identity.current_plans
    }

    pub fn living_area(&self) -> &Path {
        &self.state.identity.living_area
    }

    /// Transcript of the ongoing conversation, if any.
    pub fn chat(&self) -> &[Utterance] {
        &self.state.chat.transcript
    }

    pub fn chatting_with(&self) -> Option<&str> {
        self.state.chat.with.as_deref()
    }

    /// Newest conversation with `other`.
    pub fn last_chat(&self, other: &str) -> Option<NodeId> {
        self.memory.last_chat(other)
    }

    /// A memory of this persona.
    pub fn node(&self, id: NodeId) -> Result<&ConceptNode> {
        self.memory.node(id)
    }

    pub fn daily_plan_requirements(&self) -> &str {
        &self.state.daily_plan_requirements
    }

    pub fn daily_plan(&self) -> &[String] {
        &self.state.daily_plan
    }

    pub fn daily_schedule(&self) -> &[Plan] {
        &self.state.daily_schedule
    }

    pub fn schedule_index(&self) -> usize {
        self.state.schedule_index(0)
    }

    pub fn original_schedule(&self) -> &[Plan] {
        &self.state.original_schedule
    }

    pub fn original_schedule_index(&self) -> usize {
        self.state.original_schedule_index(0)
    }

    pub fn activity(&self) -> &Activity {
        &self.state.activity
    }

    pub fn activity_description(&self) -> &str {
        &self.state.activity.description
    }

    /// Start of the live schedule entry `idx`, the end of the entry before it.
    pub fn activity_end_time(&self, idx: usize) -> NaiveDateTime {
        let minutes: u32 = self
            .state
            .daily_schedule
            .iter()
            .take(idx)
            .map(|p| p.duration)
            .sum();
        self.start_of_day() + Duration::minutes(i64::from(minutes))
    }

    /// When the persona wakes up, if it is currently scheduled to sleep.
    pub fn wake_up_time(&self) -> Option<NaiveDateTime> {
        let idx = self.schedule_index();
        let current = self.state.daily_schedule.get(idx)?;
        if !current.activity.contains("sleeping") {
            return None;
        }
        let minutes: u32 = self.state.daily_schedule[..=idx]
            .iter()
            .map(|p| p.duration)
            .sum();
        Some(self.start_of_day() + Duration::minutes(i64::from(minutes)))
    }

    /// Known sectors of the world of `path`, quoted for prompts.
    pub fn known_sectors(&self, path: &Path) -> Vec<String> {
        quote(self.spatial.known(path, Level::Sector))
    }

    pub fn known_arenas(&self, path: &Path) -> Vec<String> {
        quote(self.spatial.known(path, Level::Arena))
    }

    pub fn known_objects(&self, path: &Path) -> Vec<String> {
        quote(self.spatial.known(path, Level::Object))
    }

    pub fn planned_path(&self) -> impl ExactSizeIterator<Item = &TilePos> {
        self.state.planned_path.iter()
    }

    pub fn has_planned_path(&self) -> bool {
        !self.state.planned_path.is_empty()
    }

    /// Event this persona puts on its own tile.
    pub fn current_event(&self) -> Event {
        let activity = &self.state.activity;
        if activity.address.is_empty() {
            Event::subject_only(self.name.clone())
        } else {
            Event::new(activity.spo.clone(), activity.description.clone())
        }
    }

    /// Event this persona's activity puts on the object it uses.
    pub fn current_object_event(&self) -> Event {
        let activity = &self.state.activity;
        if activity.address.is_empty() {
            return Event::default();
        }
        Event::new(
            Spo::new(
                activity.address.to_string(),
                activity.object_spo.predicate.clone(),
                activity.object_spo.object.clone(),
            ),
            activity.object_description.clone(),
        )
    }

    /// Forget chat cooldowns, used when the clock jumps forward.
    pub fn reset_chat_buffer(&mut self) {
        self.state.chat.buffer.clear();
    }

    /// Embedding of `text`, from the cache or freshly computed and cached.
    async fn embedding(&mut self, text: &str) -> Result<Vec<f64>> {
        if let Some(cached) = self.memory.embedding(text) {
            return Ok(cached.to_vec());
        }
        let embedding = self.embedder.embed(text).await?;
        self.memory.save_embedding(text, embedding.clone());
        Ok(embedding)
    }

    /// Store a perceived event and charge the reflection trigger.
    fn add_event_memory(
        &mut self,
        event: Event,
        keywords: Vec<String>,
        importance: i32,
        valence: i32,
        evidence: Vec<NodeId>,
        embedding: Vec<f64>,
    ) -> NodeId {
        let draft = NodeDraft {
            embedding_key: event.description.clone(),
            spo: event.spo,
            description: event.description,
            keywords,
            importance,
            valence,
            created: self.current_time(),
            expiration: None,
            embedding,
        };
        let id = self.memory.add_event(draft, evidence);

        self.state.reflection_trigger_current -= importance;
        self.state.reflection_elements += 1;
        id
    }

    /// Store a thought, scoring and describing it through cognition.
    async fn remember_thought(&mut self, thought: String, evidence: Vec<NodeId>) -> Result<NodeId> {
        let cognition = self.cognition.clone();
        let spo = cognition.activity_spo(self, &thought).await?;
        let (importance, valence) = futures::try_join!(
            cognition.importance(self, NodeKind::Thought, &thought),
            cognition.valence(self, NodeKind::Thought, &thought),
        )?;
        let embedding = self.embedding(&thought).await?;

        let created = self.current_time();
        let draft = NodeDraft {
            keywords: vec![spo.subject.clone(), spo.predicate.clone(), spo.object.clone()],
            spo,
            description: thought.clone(),
            importance,
            valence,
            created,
            expiration: Some(created + Duration::days(THOUGHT_LIFETIME_DAYS)),
            embedding_key: thought,
            embedding,
        };
        self.memory.add_thought(draft, evidence)
    }
}

fn quote(names: Vec<String>) -> Vec<String> {
    names.into_iter().map(|n| format!("\"{n}\"")).collect()
}

/// Deepest segment of an event subject or object, used as a keyword.
fn keyword_of(s: &str) -> String {
    Path::parse(s)
        .map(|p| p.base().to_string())
        .unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_persona;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_identity_stable_set() {
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1));
        persona.state.current_time = Some(at(9, 0));
        let set = persona.identity_stable_set();
        assert!(set.starts_with("Name: Klaus Mueller,\n"));
        assert!(set.contains("Current date: Monday February 13"));
    }

    #[test]
    fn test_wake_up_time() {
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1));
        persona.state.current_time = Some(at(3, 0));
        persona.state.daily_schedule = vec![
            Plan::new("sleeping", 420),
            Plan::new("breakfast", 60),
            Plan::new("work", 960),
        ];
        assert_eq!(persona.wake_up_time(), Some(at(7, 0)));
        assert_eq!(persona.activity_end_time(2), at(8, 0));

        persona.state.current_time = Some(at(7, 30));
        assert_eq!(persona.wake_up_time(), None);
    }

    #[test]
    fn test_current_events() {
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1));
        assert_eq!(persona.current_event(), Event::subject_only("Klaus Mueller"));
        assert_eq!(persona.current_object_event(), Event::default());

        persona.state.activity = Activity {
            address: Path::parse("w:s:a:desk").unwrap(),
            description: "writing".into(),
            spo: Spo::new("Klaus Mueller", "is", "writing"),
            object_description: "being written on".into(),
            object_spo: Spo::new("desk", "is", "being written on"),
            ..Default::default()
        };
        assert_eq!(persona.current_event().description, "writing");
        let obj = persona.current_object_event();
        assert_eq!(obj.spo.subject, "w:s:a:desk");
        assert_eq!(obj.spo.object, "being written on");
    }

    #[test]
    fn test_keyword_of() {
        assert_eq!(keyword_of("the Ville:cafe:kitchen:stove"), "stove");
        assert_eq!(keyword_of("Maria Lopez"), "Maria Lopez");
        assert_eq!(keyword_of("a:b:c:d:e"), "a:b:c:d:e");
    }
}
