//! Reacting to other personas: starting conversations and waiting for them.

use chrono::{Duration, NaiveDateTime, Timelike};
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::info;

use super::retrieve::Retrieved;
use super::{Activity, Persona};
use super::plan::MINUTES_PER_DAY;
use crate::cognition::{schedule_minutes, Plan};
use crate::error::{Error, Result};
use crate::maze::Maze;
use crate::memory::{NodeId, Spo, Utterance};
use crate::path::{waiting_arg, Mode, Path};

/// Upper bound on exchanged utterance pairs.
const MAX_EXCHANGES: usize = 8;
/// Steps before the same two personas may chat again.
const CHAT_COOLDOWN: i32 = 800;
const RELATIONSHIP_RETRIEVAL_COUNT: usize = 50;
const UTTERANCE_RETRIEVAL_COUNT: usize = 15;
/// Utterances of the transcript used as focal points.
const RECENT_UTTERANCES: usize = 4;

/// How a persona responds to a focused event.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reaction {
    /// Start a conversation with the named persona
    Chat(String),
    /// Wait until the given time
    Wait(NaiveDateTime),
}

/// Conversation bookkeeping handed to [`Persona::create_react`].
struct ChatSetup {
    with: String,
    transcript: Vec<Utterance>,
    end_time: NaiveDateTime,
}

impl Persona {
    /// Pick at most one perceived event to focus on.
    ///
    /// Events caused by this persona are ignored; events of other personas
    /// come first, then non-idle events, chosen at random.
    pub(super) fn choose_retrieved(
        &self,
        retrieved: BTreeMap<String, Retrieved>,
    ) -> Result<Option<Retrieved>> {
        let mut candidates = Vec::with_capacity(retrieved.len());
        for (description, r) in retrieved {
            let subject = &self.memory.node(r.current)?.spo.subject;
            if *subject != self.name {
                let is_persona = !subject.contains(':');
                candidates.push((description, is_persona, r));
            }
        }

        let mut rng = rand::thread_rng();
        let personas: Vec<&Retrieved> = candidates
            .iter()
            .filter(|(_, is_persona, _)| *is_persona)
            .map(|(_, _, r)| r)
            .collect();
        if let Some(r) = personas.choose(&mut rng) {
            return Ok(Some((*r).clone()));
        }

        let active: Vec<&Retrieved> = candidates
            .iter()
            .filter(|(description, _, _)| !description.contains("is idle"))
            .map(|(_, _, r)| r)
            .collect();
        Ok(active.choose(&mut rng).map(|r| (*r).clone()))
    }

    /// Chat with or wait for the persona behind the focused event, if warranted.
    pub(super) async fn react(
        &mut self,
        maze: &Maze,
        others: &mut BTreeMap<String, Persona>,
        focused: &Retrieved,
    ) -> Result<()> {
        match self.should_react(focused, others).await? {
            Some(Reaction::Chat(target)) => self.chat_react(maze, others, &target).await,
            Some(Reaction::Wait(until)) => self.wait_react(until).await,
            None => Ok(()),
        }
    }

    async fn should_react(
        &self,
        focused: &Retrieved,
        others: &BTreeMap<String, Persona>,
    ) -> Result<Option<Reaction>> {
        if self.state.chat.with.is_some() || self.state.activity.address.has_mode(Mode::Waiting) {
            return Ok(None);
        }

        let subject = &self.memory.node(focused.current)?.spo.subject;
        if subject.contains(':') {
            return Ok(None);
        }
        let Some(target) = others.get(subject) else {
            return Ok(None);
        };
        if target.name == self.name {
            return Ok(None);
        }

        if self.lets_talk(target, focused).await? {
            return Ok(Some(Reaction::Chat(target.name.clone())));
        }
        Ok(self.lets_wait(target, focused).await?.map(Reaction::Wait))
    }

    /// Both personas are awake and doing something.
    fn can_interact(&self, target: &Persona) -> bool {
        let (mine, theirs) = (&self.state.activity, &target.state.activity);
        if mine.address.is_empty()
            || mine.description.is_empty()
            || theirs.address.is_empty()
            || theirs.description.is_empty()
        {
            return false;
        }
        if mine.description.contains("sleeping") || theirs.description.contains("sleeping") {
            return false;
        }
        self.current_time().hour() != 23
    }

    async fn lets_talk(&self, target: &Persona, focused: &Retrieved) -> Result<bool> {
        if !self.can_interact(target) {
            return Ok(false);
        }
        if target.state.activity.address.has_mode(Mode::Waiting) {
            return Ok(false);
        }
        if self.state.chat.with.is_some() || target.state.chat.with.is_some() {
            return Ok(false);
        }
        if self
            .state
            .chat
            .buffer
            .get(&target.name)
            .is_some_and(|steps| *steps > 0)
        {
            return Ok(false);
        }

        let (events, thoughts) = split(focused);
        Ok(self
            .cognition
            .decide_to_talk(self, target, &events, &thoughts)
            .await?)
    }

    /// When waiting for `target` is warranted, the time its activity ends.
    async fn lets_wait(&self, target: &Persona, focused: &Retrieved) -> Result<Option<NaiveDateTime>> {
        if !self.can_interact(target) {
            return Ok(None);
        }
        if target.state.activity.description.contains("waiting") {
            return Ok(None);
        }
        if self.state.planned_path.is_empty() {
            return Ok(None);
        }
        if self.state.activity.address != target.state.activity.address {
            return Ok(None);
        }

        let (events, thoughts) = split(focused);
        if !self
            .cognition
            .decide_to_wait(self, target, &events, &thoughts)
            .await?
        {
            return Ok(None);
        }

        let activity = &target.state.activity;
        let start = activity.start.unwrap_or_else(|| target.current_time());
        Ok(Some(start + Duration::minutes(i64::from(activity.duration))))
    }

    /// Hold a conversation with `target_name` and put it on both schedules.
    async fn chat_react(
        &mut self,
        maze: &Maze,
        others: &mut BTreeMap<String, Persona>,
        target_name: &str,
    ) -> Result<()> {
        let target = others
            .get_mut(target_name)
            .ok_or_else(|| Error::Invariant(format!("unknown chat partner {target_name}")))?;

        let (conversation, duration) = converse(self, target, maze).await?;
        let cognition = self.cognition.clone();
        let summary = cognition.conversation_summary(self, &conversation).await?;
        let end_time = ceil_minute(self.current_time()) + Duration::minutes(i64::from(duration));

        info!(
            with = target_name,
            utterances = conversation.len(),
            duration,
            "conversation held"
        );

        let target_name = target.name.clone();
        self.start_chat(&target_name, &summary, duration, conversation.clone(), end_time)
            .await?;
        let own_name = self.name.clone();
        target
            .start_chat(&own_name, &summary, duration, conversation, end_time)
            .await
    }

    async fn start_chat(
        &mut self,
        other: &str,
        summary: &str,
        duration: u32,
        transcript: Vec<Utterance>,
        end_time: NaiveDateTime,
    ) -> Result<()> {
        let activity = Activity {
            address: Path::special(Mode::Persona, other)?,
            duration,
            description: summary.to_string(),
            pronunciatio: "💬".to_string(),
            spo: Spo::new(self.name.clone(), "chat with", other),
            ..Default::default()
        };
        let chat = ChatSetup {
            with: other.to_string(),
            transcript,
            end_time,
        };
        self.create_react(activity, Some(chat)).await
    }

    /// Wait in place until `until`.
    async fn wait_react(&mut self, until: NaiveDateTime) -> Result<()> {
        let description = &self.state.activity.description;
        let task = description
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(inner, _)| inner)
            .unwrap_or(description)
            .to_string();

        let minutes = ((until - self.current_time()).num_minutes() + 1).max(0);
        let pos = self.state.position;
        let activity = Activity {
            address: Path::special(Mode::Waiting, &waiting_arg(pos.x, pos.y))?,
            duration: minutes as u32,
            description: format!("waiting to start {task}"),
            pronunciatio: "⌛".to_string(),
            spo: Spo::new(self.name.clone(), "waiting to start", task),
            ..Default::default()
        };
        self.create_react(activity, None).await
    }

    /// Splice `activity` into the schedule and make it current.
    ///
    /// The rewritten window starts at the current original hourly entry and
    /// spans it, or it and the next one when it is shorter than two hours.
    /// Live entries straddling the window edges keep their outside parts.
    async fn create_react(&mut self, activity: Activity, chat: Option<ChatSetup>) -> Result<()> {
        let start_of_day = self.start_of_day();
        let day_end = start_of_day + Duration::minutes(i64::from(MINUTES_PER_DAY));
        let original = &self.state.original_schedule;
        let orig_idx = self.state.original_schedule_index(0);

        let before: u32 = original.iter().take(orig_idx).map(|p| p.duration).sum();
        let start = (start_of_day + Duration::minutes(i64::from(before))).min(day_end);
        let window = match (original.get(orig_idx), original.get(orig_idx + 1)) {
            (Some(current), _) if current.duration >= 120 => current.duration,
            (Some(current), Some(next)) => current.duration + next.duration,
            _ => 120,
        };
        let end = (start + Duration::minutes(i64::from(window))).min(day_end);

        let inserted = Plan::new(activity.description.clone(), activity.duration);
        let cognition = self.cognition.clone();
        let replacement = cognition
            .reaction_schedule(self, &inserted, start, end)
            .await?;

        let (mut schedule, tail) =
            split_schedule(&self.state.daily_schedule, start_of_day, start, end);
        schedule.extend(replacement.into_iter().filter(|p| p.duration > 0));
        schedule.extend(tail);

        let total = schedule_minutes(&schedule);
        if total != MINUTES_PER_DAY {
            return Err(Error::Invariant(format!(
                "reaction schedule for {} covers {total} minutes",
                self.name
            )));
        }
        self.state.daily_schedule = schedule;

        match chat {
            Some(chat) => self.state.set_chat_activity(
                activity,
                chat.with.clone(),
                chat.transcript,
                BTreeMap::from([(chat.with, CHAT_COOLDOWN)]),
                chat.end_time,
            ),
            None => self.state.set_activity(activity),
        }
        Ok(())
    }
}

/// Entries of `schedule` before `start` and from `end` on, with entries
/// straddling either edge cut there.
fn split_schedule(
    schedule: &[Plan],
    start_of_day: NaiveDateTime,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> (Vec<Plan>, Vec<Plan>) {
    let minutes = |from: NaiveDateTime, to: NaiveDateTime| (to - from).num_minutes().max(0) as u32;
    let (mut head, mut tail) = (Vec::new(), Vec::new());
    let mut at = start_of_day;
    for plan in schedule {
        let until = at + Duration::minutes(i64::from(plan.duration));
        if until <= start {
            head.push(plan.clone());
        } else if at >= end {
            tail.push(plan.clone());
        } else {
            if at < start {
                head.push(Plan::new(plan.activity.clone(), minutes(at, start)));
            }
            if until > end {
                tail.push(Plan::new(plan.activity.clone(), minutes(end, until)));
            }
        }
        at = until;
    }
    (head, tail)
}

/// Alternate utterances until a side ends the conversation or the exchange
/// limit is hit. Returns the transcript and its duration in minutes.
async fn converse(
    init: &mut Persona,
    target: &mut Persona,
    maze: &Maze,
) -> Result<(Vec<Utterance>, u32)> {
    let mut transcript = Vec::new();
    let mut length = 0usize;

    for _ in 0..MAX_EXCHANGES {
        let (line, done) = utterance(init, target, maze, &transcript).await?;
        length += line.speaker.len() + line.sentence.len() + 3;
        transcript.push(line);
        if done {
            break;
        }

        let (line, done) = utterance(target, init, maze, &transcript).await?;
        length += line.speaker.len() + line.sentence.len() + 3;
        transcript.push(line);
        if done {
            break;
        }
    }

    Ok((transcript, (length / 8 / 30) as u32))
}

/// Next line from `speaker`, grounded in what it remembers about `listener`.
async fn utterance(
    speaker: &mut Persona,
    listener: &Persona,
    maze: &Maze,
    transcript: &[Utterance],
) -> Result<(Utterance, bool)> {
    let memories = speaker
        .retrieve_flat(&[listener.name.clone()], RELATIONSHIP_RETRIEVAL_COUNT)
        .await?;
    let cognition = speaker.cognition.clone();
    let relationship = cognition
        .relationship_summary(speaker, listener, &memories)
        .await?;

    let mut focal_points = vec![
        relationship.clone(),
        format!("{} is {}", listener.name, listener.activity_description()),
    ];
    let recent = transcript.len().saturating_sub(RECENT_UTTERANCES);
    focal_points.extend(
        transcript[recent..]
            .iter()
            .map(|u| format!("{}: {}", u.speaker, u.sentence)),
    );
    let relevant = speaker
        .retrieve_flat(&focal_points, UTTERANCE_RETRIEVAL_COUNT)
        .await?;

    Ok(cognition
        .next_utterance(speaker, listener, maze, transcript, &relevant, &relationship)
        .await?)
}

fn split(focused: &Retrieved) -> (Vec<NodeId>, Vec<NodeId>) {
    (
        focused.events.iter().copied().collect(),
        focused.thoughts.iter().copied().collect(),
    )
}

fn ceil_minute(t: NaiveDateTime) -> NaiveDateTime {
    let floored = t - Duration::seconds(i64::from(t.second())) - Duration::nanoseconds(i64::from(t.nanosecond()));
    if floored == t {
        t
    } else {
        floored + Duration::minutes(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::TilePos;
    use crate::testing::{grid_maze, sample_persona, ScriptedCognition};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn busy(name: &str, pos: TilePos, cognition: Arc<ScriptedCognition>) -> Persona {
        let mut persona = sample_persona(name, pos).with_cognition(cognition);
        persona.state.current_time = Some(at(10, 0, 0));
        persona.state.daily_schedule = vec![
            Plan::new("sleeping", 480),
            Plan::new("working", 120),
            Plan::new("lunch", 60),
            Plan::new("working", 780),
        ];
        persona.state.original_schedule = persona.state.daily_schedule.clone();
        persona.state.activity = Activity {
            address: Path::parse("the Ville:cafe:kitchen:stove").unwrap(),
            start: Some(at(10, 0, 0)),
            duration: 60,
            description: "cooking (making lunch)".into(),
            spo: Spo::new(name, "is", "cooking"),
            ..Default::default()
        };
        persona
    }

    #[test]
    fn test_ceil_minute() {
        assert_eq!(ceil_minute(at(10, 0, 0)), at(10, 0, 0));
        assert_eq!(ceil_minute(at(10, 0, 10)), at(10, 1, 0));
    }

    #[tokio::test]
    async fn test_wait_react_splices_schedule() {
        let cognition = Arc::new(ScriptedCognition::new());
        let mut persona = busy("Klaus Mueller", TilePos::new(1, 1), cognition);

        persona.wait_react(at(10, 30, 0)).await.unwrap();

        let activity = persona.activity();
        assert_eq!(activity.description, "waiting to start making lunch");
        assert_eq!(activity.duration, 31);
        assert!(activity.address.has_mode(Mode::Waiting));
        assert_eq!(activity.spo.predicate, "waiting to start");
        assert_eq!(schedule_minutes(persona.daily_schedule()), MINUTES_PER_DAY);
        assert!(persona
            .daily_schedule()
            .iter()
            .any(|p| p.activity == "waiting to start making lunch"));
    }

    /// Hourly schedule where the morning hours are shorter than the
    /// reaction window, so a second reaction overlaps the first.
    fn short_mornings(
        name: &str,
        pos: TilePos,
        cognition: Arc<ScriptedCognition>,
        now: NaiveDateTime,
    ) -> Persona {
        let mut persona = busy(name, pos, cognition);
        persona.state.current_time = Some(now);
        persona.state.daily_schedule = vec![
            Plan::new("sleeping", 480),
            Plan::new("working", 60),
            Plan::new("lunch", 60),
            Plan::new("working", 840),
        ];
        persona.state.original_schedule = persona.state.daily_schedule.clone();
        persona
    }

    #[tokio::test]
    async fn test_consecutive_reactions_keep_the_day() {
        let cognition = Arc::new(ScriptedCognition::new());
        let mut persona =
            short_mornings("Klaus Mueller", TilePos::new(1, 1), cognition, at(8, 10, 0));

        persona.wait_react(at(8, 40, 0)).await.unwrap();
        assert_eq!(schedule_minutes(persona.daily_schedule()), MINUTES_PER_DAY);

        persona.state.current_time = Some(at(9, 5, 0));
        persona.wait_react(at(9, 30, 0)).await.unwrap();

        let schedule = persona.daily_schedule();
        assert_eq!(schedule_minutes(schedule), MINUTES_PER_DAY);
        assert_eq!(persona.activity().duration, 26);
        // The first reaction is cut where the second window starts
        assert_eq!(schedule[0], Plan::new("sleeping", 480));
        assert_eq!(schedule[1], Plan::new("waiting to start making lunch", 31));
        assert_eq!(schedule[2], Plan::new("getting back to the day", 29));
        assert_eq!(schedule_minutes(&schedule[3..]), 900);
    }

    #[tokio::test]
    async fn test_chat_then_wait_keeps_the_day() {
        let maze = grid_maze(&["   ", "   "]);
        let cognition = Arc::new(ScriptedCognition::new().with_conversation_turns(8));
        let mut klaus =
            short_mornings("Klaus Mueller", TilePos::new(0, 0), cognition.clone(), at(8, 10, 0));
        let maria = short_mornings("Maria Lopez", TilePos::new(2, 1), cognition, at(8, 10, 0));
        let mut others = BTreeMap::from([("Maria Lopez".to_string(), maria)]);

        klaus
            .chat_react(&maze, &mut others, "Maria Lopez")
            .await
            .unwrap();
        assert_eq!(schedule_minutes(klaus.daily_schedule()), MINUTES_PER_DAY);
        assert_eq!(schedule_minutes(others["Maria Lopez"].daily_schedule()), MINUTES_PER_DAY);

        klaus.state.current_time = Some(at(9, 5, 0));
        klaus.wait_react(at(9, 30, 0)).await.unwrap();

        let schedule = klaus.daily_schedule();
        assert_eq!(schedule_minutes(schedule), MINUTES_PER_DAY);
        assert_eq!(schedule[0], Plan::new("sleeping", 480));
        let morning: u32 = schedule
            .iter()
            .take_while(|p| !p.activity.starts_with("waiting to start"))
            .map(|p| p.duration)
            .sum();
        assert_eq!(morning, 540);
    }

    #[test]
    fn test_split_schedule_cuts_straddling_entries() {
        let schedule = vec![
            Plan::new("sleeping", 480),
            Plan::new("waiting", 31),
            Plan::new("getting back to the day", 89),
            Plan::new("working", 840),
        ];
        let (head, tail) = split_schedule(&schedule, at(0, 0, 0), at(9, 0, 0), at(11, 0, 0));
        assert_eq!(
            head,
            vec![
                Plan::new("sleeping", 480),
                Plan::new("waiting", 31),
                Plan::new("getting back to the day", 29),
            ]
        );
        assert_eq!(tail, vec![Plan::new("working", 780)]);
        assert_eq!(schedule_minutes(&head) + 120 + schedule_minutes(&tail), MINUTES_PER_DAY);
    }

    #[tokio::test]
    async fn test_chat_react_updates_both() {
        let maze = grid_maze(&["   ", "   "]);
        let cognition = Arc::new(ScriptedCognition::new());
        let mut klaus = busy("Klaus Mueller", TilePos::new(0, 0), cognition.clone());
        let maria = busy("Maria Lopez", TilePos::new(2, 1), cognition);
        let mut others = BTreeMap::from([("Maria Lopez".to_string(), maria)]);

        klaus
            .chat_react(&maze, &mut others, "Maria Lopez")
            .await
            .unwrap();

        let maria = &others["Maria Lopez"];
        assert_eq!(klaus.chatting_with(), Some("Maria Lopez"));
        assert_eq!(maria.chatting_with(), Some("Klaus Mueller"));
        assert_eq!(klaus.chat(), maria.chat());
        assert!(!klaus.chat().is_empty());
        assert_eq!(klaus.activity().spo, Spo::new("Klaus Mueller", "chat with", "Maria Lopez"));
        assert_eq!(klaus.activity().address.arg(), "Maria Lopez");
        assert_eq!(klaus.state().chat.buffer["Maria Lopez"], CHAT_COOLDOWN);
        assert_eq!(schedule_minutes(klaus.daily_schedule()), MINUTES_PER_DAY);
        assert_eq!(schedule_minutes(maria.daily_schedule()), MINUTES_PER_DAY);
    }

    #[tokio::test]
    async fn test_no_talk_when_sleeping_or_buffered() {
        let cognition = Arc::new(ScriptedCognition::new());
        let mut klaus = busy("Klaus Mueller", TilePos::new(0, 0), cognition.clone());
        let mut maria = busy("Maria Lopez", TilePos::new(2, 1), cognition);
        let focused = Retrieved::default();

        assert!(klaus.lets_talk(&maria, &focused).await.unwrap());

        klaus.state.chat.buffer.insert("Maria Lopez".into(), 5);
        assert!(!klaus.lets_talk(&maria, &focused).await.unwrap());

        klaus.state.chat.buffer.clear();
        maria.state.activity.description = "sleeping".into();
        assert!(!klaus.lets_talk(&maria, &focused).await.unwrap());
    }
}
