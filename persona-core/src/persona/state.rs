//! Mutable per-persona scratch state.

use chrono::{Duration, NaiveDateTime, Timelike};
use std::collections::{BTreeMap, VecDeque};
use tracing::info;

use crate::cognition::Plan;
use crate::maze::TilePos;
use crate::memory::{Spo, Utterance};
use crate::path::Path;

/// Who the persona is. Fed into most judgment prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub innate_traits: String,
    pub learned_traits: String,
    /// The "currently" status line
    pub current_plans: String,
    pub lifestyle: String,
    pub living_area: Path,
}

/// Perception and memory tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct Attention {
    pub vision_radius: usize,
    /// Maximum events perceived per step
    pub bandwidth: usize,
    /// How many recent events suppress re-perceiving the same triple
    pub retention: usize,
}

impl Default for Attention {
    fn default() -> Self {
        Self {
            vision_radius: 4,
            bandwidth: 3,
            retention: 5,
        }
    }
}

/// Per-persona weights of the four retrieval components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalWeights {
    pub recency: f64,
    pub importance: f64,
    pub relevance: f64,
    pub valence: f64,
    /// Base of the recency score, raised to the recency rank
    pub recency_decay: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            importance: 1.0,
            relevance: 1.0,
            valence: 1.0,
            recency_decay: 0.99,
        }
    }
}

/// The activity currently being carried out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    /// Where it happens. Empty means no activity.
    pub address: Path,
    pub start: Option<NaiveDateTime>,
    /// Minutes
    pub duration: u32,
    pub description: String,
    pub pronunciatio: String,
    pub spo: Spo,
    pub object_description: String,
    pub object_pronunciatio: String,
    pub object_spo: Spo,
    /// Whether a route for this activity has been computed
    pub path_set: bool,
}

/// Conversation bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub with: Option<String>,
    pub transcript: Vec<Utterance>,
    pub end_time: Option<NaiveDateTime>,
    /// Steps until the persona may start another chat with a given name
    pub buffer: BTreeMap<String, i32>,
}

impl ChatState {
    pub(super) fn clear(&mut self) {
        self.with = None;
        self.transcript.clear();
        self.end_time = None;
    }
}

/// Everything about a persona that is not memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub position: TilePos,
    /// Simulated time of the last step; `None` before the first one
    pub current_time: Option<NaiveDateTime>,

    pub identity: Identity,
    pub attention: Attention,
    pub weights: RetrievalWeights,

    /// Reflection fires when this drops below 1
    pub reflection_trigger_current: i32,
    /// Value the trigger is reset to after reflecting
    pub reflection_trigger: i32,
    /// Memories added since the last reflection
    pub reflection_elements: u32,

    pub daily_plan_requirements: String,
    pub daily_plan: Vec<String>,
    /// Live schedule, including decompositions and reactions
    pub daily_schedule: Vec<Plan>,
    /// Hourly schedule as first generated for the day
    pub original_schedule: Vec<Plan>,

    pub planned_path: VecDeque<TilePos>,
    pub activity: Activity,
    pub chat: ChatState,
}

impl State {
    pub(crate) fn now(&self) -> NaiveDateTime {
        self.current_time.unwrap_or_default()
    }

    /// Replace the current activity. Clears any conversation.
    pub fn set_activity(&mut self, activity: Activity) {
        self.start_activity(activity);
        self.chat.clear();
        info!(
            node_type = "activity",
            address = %self.activity.address,
            start_time = %self.now(),
            duration = self.activity.duration,
            "activity set"
        );
    }

    /// Replace the current activity with a conversation.
    pub fn set_chat_activity(
        &mut self,
        mut activity: Activity,
        with: String,
        transcript: Vec<Utterance>,
        buffer: BTreeMap<String, i32>,
        end_time: NaiveDateTime,
    ) {
        activity.object_description.clear();
        activity.object_pronunciatio.clear();
        activity.object_spo = Spo::default();
        self.start_activity(activity);

        self.chat.buffer.extend(buffer);
        self.chat.transcript = transcript;
        self.chat.end_time = Some(end_time);
        info!(
            node_type = "chat",
            chatting_with = %with,
            address = %self.activity.address,
            start_time = %self.now(),
            duration = self.activity.duration,
            "activity set"
        );
        self.chat.with = Some(with);
    }

    fn start_activity(&mut self, activity: Activity) {
        self.activity = Activity {
            start: Some(self.now()),
            path_set: false,
            ..activity
        };
    }

    /// No activity, or the current one has run its course.
    pub fn is_activity_finished(&self) -> bool {
        if self.activity.address.is_empty() {
            return true;
        }

        let end = if self.chat.with.is_some() {
            self.chat.end_time
        } else {
            self.activity
                .start
                .map(|start| start + Duration::minutes(i64::from(self.activity.duration)))
        };

        match end {
            Some(end) => self.now() >= end,
            None => true,
        }
    }

    /// Index of the live schedule entry active `advance` minutes from now.
    pub fn schedule_index(&self, advance: u32) -> usize {
        index_at(&self.daily_schedule, self.elapsed_seconds(advance))
    }

    /// Index of the original hourly entry active `advance` minutes from now.
    pub fn original_schedule_index(&self, advance: u32) -> usize {
        index_at(&self.original_schedule, self.elapsed_seconds(advance))
    }

    fn elapsed_seconds(&self, advance: u32) -> i64 {
        let now = self.now();
        i64::from(now.num_seconds_from_midnight()) + i64::from(advance) * 60
    }
}

fn index_at(schedule: &[Plan], elapsed_seconds: i64) -> usize {
    let mut elapsed = 0i64;
    for (i, plan) in schedule.iter().enumerate() {
        elapsed += i64::from(plan.duration) * 60;
        if elapsed_seconds < elapsed {
            return i;
        }
    }
    schedule.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn state_at(time: NaiveDateTime) -> State {
        State {
            current_time: Some(time),
            daily_schedule: vec![
                Plan::new("sleeping", 360),
                Plan::new("waking up", 60),
                Plan::new("working", 1020),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_index() {
        assert_eq!(state_at(at(0, 0)).schedule_index(0), 0);
        assert_eq!(state_at(at(5, 59)).schedule_index(0), 0);
        assert_eq!(state_at(at(6, 0)).schedule_index(0), 1);
        assert_eq!(state_at(at(5, 30)).schedule_index(60), 1);
        assert_eq!(state_at(at(23, 30)).schedule_index(60), 3);
    }

    #[test]
    fn test_activity_lifecycle() {
        let mut state = state_at(at(8, 0));
        assert!(state.is_activity_finished());

        state.set_activity(Activity {
            address: Path::parse("w:s:a:o").unwrap(),
            duration: 30,
            description: "reading".into(),
            ..Default::default()
        });
        assert_eq!(state.activity.start, Some(at(8, 0)));
        assert!(!state.is_activity_finished());

        state.current_time = Some(at(8, 29));
        assert!(!state.is_activity_finished());
        state.current_time = Some(at(8, 30));
        assert!(state.is_activity_finished());
    }

    #[test]
    fn test_chat_activity_uses_chat_end() {
        let mut state = state_at(at(8, 0));
        let mut buffer = BTreeMap::new();
        buffer.insert("Maria".to_string(), 800);
        state.set_chat_activity(
            Activity {
                address: Path::parse("<persona> Maria").unwrap(),
                duration: 120,
                object_description: "stale".into(),
                ..Default::default()
            },
            "Maria".into(),
            vec![Utterance::new("Klaus", "Hi")],
            buffer,
            at(8, 5),
        );
        assert!(state.activity.object_description.is_empty());
        assert_eq!(state.chat.buffer.get("Maria"), Some(&800));

        state.current_time = Some(at(8, 5));
        assert!(state.is_activity_finished());

        state.set_activity(Activity {
            address: Path::parse("w:s:a").unwrap(),
            duration: 10,
            ..Default::default()
        });
        assert!(state.chat.with.is_none());
        assert!(state.chat.transcript.is_empty());
        assert_eq!(state.chat.buffer.len(), 1);
    }
}
