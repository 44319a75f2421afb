//! Model-backed judgment.
//!
//! [`LlmCognition`] implements [`Cognition`] on top of an OpenAI-compatible
//! chat endpoint. Each call renders a prompt from the [`PromptRegistry`],
//! constrains the reply to the prompt's JSON schema, decodes it and runs a
//! semantic check. Decode and validation failures are retried up to
//! [`LlmConfig::max_retries`] times; transport and auth failures are not.
//!
//! [`OpenAiEmbedder`] implements [`Embedder`] with the embeddings endpoint.

mod prompts;
pub mod schema;

pub use prompts::{Prompt, PromptRegistry};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use openai::{Message, OpenAi, Request};
use serde::de::DeserializeOwned;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cognition::{
    Cognition, CognitionError, CognitionResult, Embedder, Insight, Plan,
};
use crate::maze::MazeAccess;
use crate::memory::{ConceptNode, NodeId, NodeKind, Spo, Utterance};
use crate::path::{Level, Path};
use crate::persona::{Persona, DAY_FORMAT};
use schema::*;

const DEFAULT_MAX_RETRIES: u32 = 5;
const CLOCK_FORMAT: &str = "%H:%M";
const HOUR_FORMAT: &str = "%I:%M %p";
const LAST_CHAT_FORMAT: &str = "%B %d, %Y, %H:%M:%S";

/// Tuning for [`LlmCognition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// Attempts per judgment call
    pub max_retries: u32,
    /// Chat model override; the client's default when `None`
    pub model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            model: None,
        }
    }
}

impl LlmConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// [`Cognition`] backed by a chat model.
pub struct LlmCognition {
    client: OpenAi,
    prompts: PromptRegistry,
    config: LlmConfig,
}

impl LlmCognition {
    pub fn new(client: OpenAi, prompts: PromptRegistry, config: LlmConfig) -> Self {
        Self {
            client,
            prompts,
            config,
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Run a prompt and decode the reply, retrying until `check` accepts it.
    async fn request<T, F>(&self, name: &str, vars: &[(&str, &str)], check: F) -> CognitionResult<T>
    where
        T: DeserializeOwned + Send,
        F: Fn(&T) -> CognitionResult<()> + Send,
    {
        let prompt = self.prompts.get(name)?;
        let text = prompt.render(vars)?;
        let max = self.config.max_retries;

        info!(
            prompt = name,
            prompt_hash = %fingerprint(&text),
            prompt_length = text.len(),
            max_retries = max,
            "llm call start"
        );

        let start = Instant::now();
        let mut last = None;
        for attempt in 1..=max {
            let mut request = Request::new(vec![Message::user(text.clone())])
                .with_schema(prompt.schema_name(), prompt.schema().clone());
            if let Some(model) = &self.config.model {
                request = request.with_model(model.clone());
            }

            let outcome = match self.client.complete(request).await {
                Ok(response) => serde_json::from_str::<T>(&response.text)
                    .map_err(CognitionError::from)
                    .and_then(|reply| check(&reply).map(|()| reply)),
                Err(e) => Err(CognitionError::from(e)),
            };

            match outcome {
                Ok(reply) => {
                    info!(
                        prompt = name,
                        attempts = attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "llm call ok"
                    );
                    return Ok(reply);
                }
                Err(e) if e.is_retryable() => {
                    warn!(prompt = name, attempt, reason = %e, "llm call retry");
                    last = Some(e);
                }
                Err(e) => {
                    error!(
                        prompt = name,
                        attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        error = %e,
                        "llm call failed"
                    );
                    return Err(e);
                }
            }
        }

        error!(
            prompt = name,
            attempts = max,
            latency_ms = start.elapsed().as_millis() as u64,
            prompt_raw = %text,
            "llm call exhausted retries"
        );
        Err(CognitionError::Exhausted {
            prompt: name.to_string(),
            attempts: max,
            last: Box::new(
                last.unwrap_or_else(|| CognitionError::Validation("no attempts allowed".into())),
            ),
        })
    }

    async fn ask<T>(&self, name: &str, vars: &[(&str, &str)]) -> CognitionResult<T>
    where
        T: DeserializeOwned + Send,
    {
        self.request(name, vars, |_: &T| Ok(())).await
    }
}

/// Short stable fingerprint of a rendered prompt for logs.
fn fingerprint(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn node<'a>(persona: &'a Persona, id: NodeId) -> CognitionResult<&'a ConceptNode> {
    persona
        .node(id)
        .map_err(|e| CognitionError::Template(e.to_string()))
}

fn descriptions(persona: &Persona, ids: &[NodeId]) -> CognitionResult<Vec<String>> {
    ids.iter()
        .map(|&id| node(persona, id).map(|n| n.description.clone()))
        .collect()
}

fn numbered<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {}", i + 1, l.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn transcript(conversation: &[Utterance]) -> String {
    conversation
        .iter()
        .map(|u| format!("{}: {}", u.speaker, u.sentence))
        .collect::<Vec<_>>()
        .join("\n")
}

/// "Observations: ..., Thoughts: ..." built from retrieved memories.
fn context(persona: &Persona, events: &[NodeId], thoughts: &[NodeId]) -> CognitionResult<String> {
    if events.is_empty() && thoughts.is_empty() {
        return Ok("None".to_string());
    }
    let mut out = String::new();
    if !events.is_empty() {
        out.push_str("Observations: ");
        for description in descriptions(persona, events)? {
            out.push_str(&description.replacen("is", "was", 1));
            out.push_str(". ");
        }
    }
    if !thoughts.is_empty() {
        out.push_str(", Thoughts: ");
        for description in descriptions(persona, thoughts)? {
            out.push_str(&description);
            out.push_str(". ");
        }
    }
    Ok(out)
}

/// Split `action (sub-action)`; plain activities are both.
fn split_action(activity: &str) -> (&str, &str) {
    activity
        .strip_suffix(')')
        .and_then(|s| s.rsplit_once(" ("))
        .unwrap_or((activity, activity))
}

/// One line describing what the persona is doing relative to its route.
fn status(persona: &Persona) -> String {
    let description = persona.activity_description();
    let (_, doing) = split_action(description);
    if description.contains("waiting") {
        format!("{} is {doing}", persona.name())
    } else if !persona.has_planned_path() {
        format!("{} is already {doing}", persona.name())
    } else {
        format!("{} is on the way to {doing}", persona.name())
    }
}

/// Location name from a reply, without quotes or padding.
fn clean(output: &str) -> String {
    output.trim().trim_matches('"').trim().to_string()
}

fn tile_path(persona: &Persona, maze: &dyn MazeAccess) -> CognitionResult<Path> {
    maze.tile(persona.position())
        .map(|t| t.path.clone())
        .ok_or_else(|| {
            CognitionError::Template(format!(
                "{} stands outside the maze at {}",
                persona.name(),
                persona.position()
            ))
        })
}

fn slot_lines(slots: &[Slot]) -> String {
    slots
        .iter()
        .map(|s| {
            format!(
                "{} ~ {}: {}",
                s.start.format(CLOCK_FORMAT),
                s.end.format(CLOCK_FORMAT),
                s.activity
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Schedule context for decomposition: the current hourly entry and the two after it.
fn decomposition_context(persona: &Persona, plan: &Plan) -> (String, Option<(NaiveDateTime, NaiveDateTime)>) {
    let original = persona.original_schedule();
    let idx = persona.original_schedule_index();
    let start_of_day = persona.start_of_day();

    let mut at = start_of_day
        + Duration::minutes(i64::from(
            original.iter().take(idx).map(|p| p.duration).sum::<u32>(),
        ));
    let mut lines = Vec::new();
    let mut bounds = None;
    for entry in original.iter().skip(idx).take(3) {
        let end = at + Duration::minutes(i64::from(entry.duration));
        lines.push(Slot {
            start: at,
            end,
            activity: entry.activity.clone(),
        });
        if bounds.is_none() && entry.activity == plan.activity {
            bounds = Some((at, end));
        }
        at = end;
    }
    let bounds = bounds.or_else(|| lines.first().map(|s| (s.start, s.end)));
    (slot_lines(&lines), bounds)
}

#[async_trait]
impl Cognition for LlmCognition {
    async fn importance(&self, persona: &Persona, kind: NodeKind, description: &str)
        -> CognitionResult<i32> {
        let identity = persona.identity_stable_set();
        let (prompt, key) = match kind {
            NodeKind::Event => ("poignancy_event_v1", "event"),
            NodeKind::Thought => ("poignancy_thought_v1", "thought"),
            NodeKind::Chat => return self.chat_importance(persona, persona.chat(), description).await,
        };
        let vars = [("name", persona.name()), ("identity", identity.as_str()), (key, description)];
        let reply: PoignancyReply = self.ask(prompt, &vars).await?;
        Ok(reply.poignancy)
    }

    async fn chat_importance(
        &self,
        persona: &Persona,
        conversation: &[Utterance],
        description: &str,
    ) -> CognitionResult<i32> {
        let identity = persona.identity_stable_set();
        let conversation = transcript(conversation);
        let vars = [
            ("name", persona.name()),
            ("identity", identity.as_str()),
            ("description", description),
            ("conversation", conversation.as_str()),
        ];
        let reply: PoignancyReply = self.ask("poignancy_chat_v1", &vars).await?;
        Ok(reply.poignancy)
    }

    async fn valence(&self, persona: &Persona, kind: NodeKind, description: &str)
        -> CognitionResult<i32> {
        let identity = persona.identity_stable_set();
        let (prompt, key) = match kind {
            NodeKind::Event => ("valence_event_v1", "event"),
            NodeKind::Thought => ("valence_thought_v1", "thought"),
            NodeKind::Chat => return self.chat_valence(persona, persona.chat(), description).await,
        };
        let vars = [("name", persona.name()), ("identity", identity.as_str()), (key, description)];
        let reply: ValenceReply = self.ask(prompt, &vars).await?;
        Ok(reply.valence)
    }

    async fn chat_valence(
        &self,
        persona: &Persona,
        conversation: &[Utterance],
        description: &str,
    ) -> CognitionResult<i32> {
        let identity = persona.identity_stable_set();
        let conversation = transcript(conversation);
        let vars = [
            ("name", persona.name()),
            ("identity", identity.as_str()),
            ("description", description),
            ("conversation", conversation.as_str()),
        ];
        let reply: ValenceReply = self.ask("valence_chat_v1", &vars).await?;
        Ok(reply.valence)
    }

    async fn wake_up_hour(&self, persona: &Persona) -> CognitionResult<NaiveTime> {
        let identity = persona.identity_stable_set();
        let vars = [
            ("identity", identity.as_str()),
            ("lifestyle", persona.lifestyle()),
            ("first_name", persona.first_name()),
        ];
        let reply: WakeUpReply = self
            .request("wake_up_hour_v2", &vars, |r: &WakeUpReply| {
                parse_wake_up(&r.wake_up_time)
                    .map(|_| ())
                    .map_err(|e| CognitionError::Validation(e.to_string()))
            })
            .await?;
        parse_wake_up(&reply.wake_up_time)
    }

    async fn daily_plan(&self, persona: &Persona, wake_up: NaiveTime)
        -> CognitionResult<Vec<String>> {
        let identity = persona.identity_stable_set();
        let date = persona.current_time().format(DAY_FORMAT).to_string();
        let wake_up = wake_up.format(HOUR_FORMAT).to_string();
        let vars = [
            ("identity", identity.as_str()),
            ("lifestyle", persona.lifestyle()),
            ("name", persona.name()),
            ("current_date", date.as_str()),
            ("wake_up_hour", wake_up.as_str()),
        ];
        let reply: DailyPlanReply = self.ask("daily_planning_v7", &vars).await?;
        Ok(reply.schedule)
    }

    async fn hourly_schedule(&self, persona: &Persona, _wake_up: NaiveTime)
        -> CognitionResult<Vec<Plan>> {
        let identity = persona.identity_stable_set();
        let plan = numbered(persona.daily_plan());
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("daily_plan", plan.as_str()),
        ];
        let reply: HourlyScheduleReply = self
            .request("generate_hourly_schedule_v2", &vars, HourlyScheduleReply::validate)
            .await?;
        Ok(reply.into_plans())
    }

    async fn decompose_plan(&self, persona: &Persona, plan: &Plan) -> CognitionResult<Vec<Plan>> {
        let identity = persona.identity_stable_set();
        let date = persona.current_time().format("%B %d, %Y").to_string();
        let (schedule, bounds) = decomposition_context(persona, plan);
        let (start, end) = bounds
            .map(|(s, e)| (s.format(CLOCK_FORMAT).to_string(), e.format(CLOCK_FORMAT).to_string()))
            .unwrap_or_default();
        let duration = plan.duration.to_string();
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("current_date", date.as_str()),
            ("schedule", schedule.as_str()),
            ("activity", plan.activity.as_str()),
            ("activity_start_time", start.as_str()),
            ("activity_end_time", end.as_str()),
            ("activity_duration", duration.as_str()),
        ];
        let total = plan.duration;
        let reply: DecompositionReply = self
            .request("task_decomp_v3", &vars, |r: &DecompositionReply| r.validate(total))
            .await?;
        Ok(reply.into_plans())
    }

    async fn reaction_schedule(
        &self,
        persona: &Persona,
        inserted: &Plan,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CognitionResult<Vec<Plan>> {
        let window = ReactionWindow::new(
            persona.daily_schedule(),
            persona.start_of_day(),
            persona.current_time(),
            start,
            end,
        );

        let identity = persona.identity_stable_set();
        let original = slot_lines(&window.original);
        let truncated = if window.kept.is_empty() {
            "Nothing yet.".to_string()
        } else {
            slot_lines(&window.kept)
        };
        let start_time = start.format(CLOCK_FORMAT).to_string();
        let end_time = end.format(CLOCK_FORMAT).to_string();
        let from = window.planning_from(end).format(CLOCK_FORMAT).to_string();
        let inserted_duration = inserted.duration.to_string();
        let minutes = window.remaining.to_string();
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("original_start_time", start_time.as_str()),
            ("original_end_time", end_time.as_str()),
            ("original_plans", original.as_str()),
            ("truncated_plans", truncated.as_str()),
            ("inserted_activity", inserted.activity.as_str()),
            ("inserted_duration", inserted_duration.as_str()),
            ("planning_from", from.as_str()),
            ("planning_minutes", minutes.as_str()),
        ];

        let reply: ReactionScheduleReply = self
            .request("new_decomp_schedule_v2", &vars, |r: &ReactionScheduleReply| {
                r.validate(&window)
            })
            .await?;
        Ok(reply.into_plans(window))
    }

    async fn activity_sector(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        world: &str,
    ) -> CognitionResult<String> {
        let here = tile_path(persona, maze)?;
        let living = persona.living_area().clone();
        let (action, sub_action) = split_action(activity);

        let identity = persona.identity_stable_set();
        let living_arenas = persona.known_arenas(&living.at(Level::Sector)).join(", ");
        let current_arenas = persona.known_arenas(&here.at(Level::Sector)).join(", ");
        let known_sectors = persona.known_sectors(&here.at(Level::World)).join(", ");
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("living_sector", living.sector()),
            ("living_arenas", living_arenas.as_str()),
            ("current_sector", here.sector()),
            ("current_arenas", current_arenas.as_str()),
            ("known_sectors", known_sectors.as_str()),
            ("daily_plan_requirements", persona.daily_plan_requirements()),
            ("action", action),
            ("sub_action", sub_action),
        ];

        let reply: ChoiceReply = self
            .request("action_location_sector_v3", &vars, |r: &ChoiceReply| {
                let candidate = Path::new(world, clean(&r.output), "", "");
                if maze.exists(&candidate) {
                    Ok(())
                } else {
                    Err(CognitionError::Validation(format!("{candidate} does not exist")))
                }
            })
            .await?;
        Ok(clean(&reply.output))
    }

    async fn activity_arena(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        world: &str,
        sector: &str,
    ) -> CognitionResult<String> {
        let here = tile_path(persona, maze)?;
        let (action, sub_action) = split_action(activity);

        let identity = persona.identity_stable_set();
        let current = here.to_string();
        let known_arenas = persona
            .known_arenas(&Path::new(world, sector, "", ""))
            .join(", ");
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("current_location", current.as_str()),
            ("destination_sector", sector),
            ("known_arenas", known_arenas.as_str()),
            ("activity", action),
            ("sub_action", sub_action),
        ];

        let reply: ChoiceReply = self
            .request("action_location_arena_v1", &vars, |r: &ChoiceReply| {
                let candidate = Path::new(world, sector, clean(&r.output), "");
                if maze.exists(&candidate) {
                    Ok(())
                } else {
                    Err(CognitionError::Validation(format!("{candidate} does not exist")))
                }
            })
            .await?;
        Ok(clean(&reply.output))
    }

    async fn activity_object(
        &self,
        persona: &Persona,
        maze: &dyn MazeAccess,
        activity: &str,
        arena: &Path,
    ) -> CognitionResult<String> {
        let identity = persona.identity_stable_set();
        let target = arena.to_string();
        let known_objects = persona.known_objects(arena).join(", ");
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("target_location", target.as_str()),
            ("activity", activity),
            ("known_objects", known_objects.as_str()),
        ];

        let reply: ChoiceReply = self
            .request("action_object_v3", &vars, |r: &ChoiceReply| {
                let candidate = arena.with(Level::Object, clean(&r.output));
                if maze.exists(&candidate) {
                    Ok(())
                } else {
                    Err(CognitionError::Validation(format!("{candidate} does not exist")))
                }
            })
            .await?;
        Ok(clean(&reply.output))
    }

    async fn pronunciatio(&self, _persona: &Persona, activity: &str) -> CognitionResult<String> {
        let reply: EmojiReply = self
            .ask("generate_pronunciatio_v2", &[("activity", activity)])
            .await?;
        Ok(reply.emoji)
    }

    async fn activity_spo(&self, persona: &Persona, activity: &str) -> CognitionResult<Spo> {
        let vars = [("name", persona.name()), ("activity", activity)];
        let reply: TripleReply = self.ask("generate_event_triple_v2", &vars).await?;
        Ok(Spo::new(reply.subject, reply.predicate, reply.object))
    }

    async fn object_state(&self, persona: &Persona, object: &str, activity: &str)
        -> CognitionResult<String> {
        let vars = [("name", persona.name()), ("activity", activity), ("object", object)];
        let reply: ObjectStateReply = self.ask("generate_obj_event_v2", &vars).await?;
        Ok(reply.state)
    }

    async fn object_pronunciatio(&self, _persona: &Persona, description: &str)
        -> CognitionResult<String> {
        let reply: EmojiReply = self
            .ask("generate_pronunciatio_v2", &[("activity", description)])
            .await?;
        Ok(reply.emoji)
    }

    async fn object_spo(&self, _persona: &Persona, object: &str, description: &str)
        -> CognitionResult<Spo> {
        let vars = [("name", object), ("activity", description)];
        let reply: TripleReply = self.ask("generate_event_triple_v2", &vars).await?;
        Ok(Spo::new(reply.subject, reply.predicate, reply.object))
    }

    async fn decide_to_talk(
        &self,
        init: &Persona,
        target: &Persona,
        events: &[NodeId],
        thoughts: &[NodeId],
    ) -> CognitionResult<bool> {
        let context = context(init, events, thoughts)?;
        let last_chat = match init.last_chat(target.name()) {
            Some(id) => {
                let node = node(init, id)?;
                format!(
                    "{} last chatted with {} on {} about {}.",
                    init.name(),
                    target.name(),
                    node.created.format(LAST_CHAT_FORMAT),
                    node.description
                )
            }
            None => String::new(),
        };
        let now = init.current_time().format(CLOCK_FORMAT).to_string();
        let (init_status, target_status) = (status(init), status(target));
        let vars = [
            ("context", context.as_str()),
            ("current_time", now.as_str()),
            ("last_chat", last_chat.as_str()),
            ("init_status", init_status.as_str()),
            ("target_status", target_status.as_str()),
            ("init_name", init.name()),
            ("target_name", target.name()),
        ];
        let reply: DecideToTalkReply = self.ask("decide_to_talk_v3", &vars).await?;
        debug!(init = init.name(), target = target.name(), reasoning = %reply.reasoning, "decide to talk");
        Ok(reply.should_talk.trim().eq_ignore_ascii_case("yes"))
    }

    async fn decide_to_wait(
        &self,
        init: &Persona,
        target: &Persona,
        events: &[NodeId],
        thoughts: &[NodeId],
    ) -> CognitionResult<bool> {
        let context = context(init, events, thoughts)?;
        let now = init.current_time().format(CLOCK_FORMAT).to_string();
        let target_end = target
            .activity_end_time(target.schedule_index() + 1)
            .format(CLOCK_FORMAT)
            .to_string();
        let (init_status, target_status) = (status(init), status(target));
        let vars = [
            ("context", context.as_str()),
            ("current_time", now.as_str()),
            ("init_status", init_status.as_str()),
            ("target_status", target_status.as_str()),
            ("target_end_time", target_end.as_str()),
            ("init_name", init.name()),
            ("target_name", target.name()),
        ];
        let reply: DecideToWaitReply = self.ask("decide_to_react_v2", &vars).await?;
        Ok(reply.choice == 1)
    }

    async fn conversation_summary(&self, _persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String> {
        let conversation = transcript(conversation);
        let reply: SummaryReply = self
            .ask("summarize_conversation_v2", &[("conversation", conversation.as_str())])
            .await?;
        Ok(reply.summary)
    }

    async fn planning_thought(&self, persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String> {
        let conversation = transcript(conversation);
        let vars = [("name", persona.name()), ("conversation", conversation.as_str())];
        let reply: PlanningThoughtReply = self.ask("planning_thought_on_convo_v2", &vars).await?;
        Ok(reply.planning_thought)
    }

    async fn conversation_memo(&self, persona: &Persona, conversation: &[Utterance])
        -> CognitionResult<String> {
        let conversation = transcript(conversation);
        let vars = [("name", persona.name()), ("conversation", conversation.as_str())];
        let reply: MemoReply = self.ask("memo_on_convo_v1", &vars).await?;
        Ok(reply.memo)
    }

    async fn relationship_summary(
        &self,
        init: &Persona,
        target: &Persona,
        memories: &[NodeId],
    ) -> CognitionResult<String> {
        let statements = descriptions(init, memories)?.join("\n");
        let vars = [
            ("statements", statements.as_str()),
            ("init_name", init.name()),
            ("target_name", target.name()),
        ];
        let reply: RelationshipReply = self.ask("summarize_chat_relationship_v2", &vars).await?;
        Ok(reply.relationship_summary)
    }

    async fn next_utterance(
        &self,
        init: &Persona,
        target: &Persona,
        maze: &dyn MazeAccess,
        conversation: &[Utterance],
        relevant: &[NodeId],
        relationship: &str,
    ) -> CognitionResult<(Utterance, bool)> {
        let here = tile_path(init, maze)?;
        let identity = init.identity_stable_set();
        let memories = descriptions(init, relevant)?.join("\n");
        let location = format!("{} in {}", here.arena(), here.sector());
        let so_far = if conversation.is_empty() {
            "The conversation has not started yet. Start it!".to_string()
        } else {
            transcript(conversation)
        };
        let vars = [
            ("init_identity", identity.as_str()),
            ("init_name", init.name()),
            ("memories", memories.as_str()),
            ("relationship", relationship),
            ("init_activity", init.activity_description()),
            ("target_name", target.name()),
            ("target_activity", target.activity_description()),
            ("current_location", location.as_str()),
            ("conversation", so_far.as_str()),
        ];
        let reply: UtteranceReply = self.ask("iterative_convo_v2", &vars).await?;
        Ok((Utterance::new(init.name(), reply.utterance), reply.ends_conversation))
    }

    async fn focal_points(&self, persona: &Persona, statements: &[NodeId], count: usize)
        -> CognitionResult<Vec<String>> {
        let identity = persona.identity_stable_set();
        let statements = descriptions(persona, statements)?.join("\n");
        let count = count.to_string();
        let vars = [
            ("identity", identity.as_str()),
            ("statements", statements.as_str()),
            ("count", count.as_str()),
        ];
        let reply: FocalPointsReply = self.ask("generate_focal_pt_v2", &vars).await?;
        Ok(reply.questions)
    }

    async fn insights(&self, persona: &Persona, statements: &[NodeId], count: usize)
        -> CognitionResult<Vec<Insight>> {
        let lines = numbered(&descriptions(persona, statements)?);
        let count = count.to_string();
        let vars = [
            ("statements", lines.as_str()),
            ("count", count.as_str()),
            ("name", persona.name()),
        ];
        let n = statements.len();
        let reply: InsightsReply = self
            .request("insight_and_evidence_v2", &vars, |r: &InsightsReply| r.validate(n))
            .await?;

        Ok(reply
            .insights
            .into_iter()
            .map(|entry| Insight {
                text: entry.insight,
                evidence: entry.reasons.iter().map(|&r| statements[r - 1]).collect(),
            })
            .collect())
    }

    async fn planning_note(&self, persona: &Persona, statements: &[String])
        -> CognitionResult<String> {
        let identity = persona.identity_stable_set();
        let date = persona.current_time().format(DAY_FORMAT).to_string();
        let statements = statements.join("\n");
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("current_date", date.as_str()),
            ("statements", statements.as_str()),
        ];
        let reply: SchedulingMemoryReply = self
            .ask("extract_scheduling_information_v1", &vars)
            .await?;
        Ok(reply.memory)
    }

    async fn planning_feelings(&self, persona: &Persona, statements: &[String])
        -> CognitionResult<String> {
        let identity = persona.identity_stable_set();
        let statements = statements.join("\n");
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("statements", statements.as_str()),
        ];
        let reply: FeelingsReply = self.ask("describe_agent_feelings_v1", &vars).await?;
        Ok(reply.feelings)
    }

    async fn current_plans(&self, persona: &Persona, note: &str, feelings: &str)
        -> CognitionResult<String> {
        let now = persona.current_time();
        let today = now.format(DAY_FORMAT).to_string();
        let yesterday = (now - Duration::days(1)).format(DAY_FORMAT).to_string();
        let vars = [
            ("name", persona.name()),
            ("currently", persona.current_plans()),
            ("current_date", today.as_str()),
            ("yesterday", yesterday.as_str()),
            ("planning_note", note),
            ("thought_note", feelings),
        ];
        let reply: CurrentlyReply = self.ask("generate_currently_v1", &vars).await?;
        Ok(reply.status)
    }

    async fn daily_requirements(&self, persona: &Persona) -> CognitionResult<String> {
        let identity = persona.identity_stable_set();
        let date = persona.current_time().format(DAY_FORMAT).to_string();
        let vars = [
            ("identity", identity.as_str()),
            ("name", persona.name()),
            ("current_date", date.as_str()),
        ];
        let reply: DailyRequirementsReply = self
            .ask("revise_daily_requirements_v1", &vars)
            .await?;
        Ok(reply.day)
    }
}

/// [`Embedder`] backed by the embeddings endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: OpenAi,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAi) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> CognitionResult<Vec<f64>> {
        let start = Instant::now();
        let vector = self.client.embed(text).await?;
        debug!(
            model = self.client.embedding_model(),
            dimensions = vector.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "embedded text"
        );
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::TilePos;
    use crate::testing::sample_persona;

    #[test]
    fn test_split_action() {
        assert_eq!(
            split_action("having breakfast (brewing coffee)"),
            ("having breakfast", "brewing coffee")
        );
        assert_eq!(
            split_action("working (on (the) paper)"),
            ("working (on", "the) paper")
        );
        assert_eq!(split_action("sleeping"), ("sleeping", "sleeping"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("hello!"));
        assert_eq!(fingerprint("hello").len(), 16);
    }

    #[test]
    fn test_status_lines() {
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(0, 0));
        persona.state_mut().activity.description = "working (reading a paper)".into();
        assert_eq!(status(&persona), "Klaus Mueller is already reading a paper");

        persona.state_mut().planned_path.push_back(TilePos::new(1, 0));
        assert_eq!(status(&persona), "Klaus Mueller is on the way to reading a paper");

        persona.state_mut().activity.description = "waiting to start cooking".into();
        assert_eq!(status(&persona), "Klaus Mueller is waiting to start cooking");
    }

    #[test]
    fn test_context_without_memories() {
        let persona = sample_persona("Klaus Mueller", TilePos::new(0, 0));
        assert_eq!(context(&persona, &[], &[]).unwrap(), "None");
        assert!(matches!(
            context(&persona, &[NodeId(7)], &[]),
            Err(CognitionError::Template(_))
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.model, None);
        let config = config.with_max_retries(2).with_model("gpt-4o-mini");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_unknown_prompt_fails_before_any_request() {
        let cognition = LlmCognition::new(OpenAi::new("test-key"), PromptRegistry::new(), LlmConfig::default());
        let persona = sample_persona("Klaus Mueller", TilePos::new(0, 0));
        let err = cognition
            .pronunciatio(&persona, "sleeping")
            .await
            .unwrap_err();
        assert!(matches!(err, CognitionError::Template(_)));
    }
}
