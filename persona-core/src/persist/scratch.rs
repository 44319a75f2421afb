//! `scratch.json`: everything about a persona that is not memory.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::formats::{current_time, nullable};
use super::{corrupt, PersistResult};
use crate::cognition::Plan;
use crate::maze::TilePos;
use crate::memory::{Spo, Utterance};
use crate::path::Path;
use crate::persona::{Activity, Attention, ChatState, Identity, RetrievalWeights, State};

fn default_weight() -> f64 {
    1.0
}

fn default_decay() -> f64 {
    RetrievalWeights::default().recency_decay
}

/// Triple that tolerates `null` members and a `null` triple.
fn loose_spo<'de, D: Deserializer<'de>>(d: D) -> Result<Spo, D::Error> {
    let parts = Option::<(Option<String>, Option<String>, Option<String>)>::deserialize(d)?;
    Ok(parts
        .map(|(s, p, o)| Spo::new(s.unwrap_or_default(), p.unwrap_or_default(), o.unwrap_or_default()))
        .unwrap_or_default())
}

/// On-disk persona state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scratch {
    pub vision_r: usize,
    pub att_bandwidth: usize,
    pub retention: usize,

    #[serde(default, with = "current_time")]
    pub curr_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub curr_tile: Option<TilePos>,
    #[serde(default, deserialize_with = "nullable")]
    pub daily_plan_req: String,

    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub first_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub last_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub age: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub innate: String,
    #[serde(default, deserialize_with = "nullable")]
    pub learned: String,
    #[serde(default, deserialize_with = "nullable")]
    pub currently: String,
    #[serde(default, deserialize_with = "nullable")]
    pub lifestyle: String,
    #[serde(default, deserialize_with = "nullable")]
    pub living_area: String,

    #[serde(default = "default_weight")]
    pub recency_w: f64,
    #[serde(default = "default_weight")]
    pub relevance_w: f64,
    #[serde(default = "default_weight")]
    pub importance_w: f64,
    #[serde(default = "default_weight")]
    pub valence_w: f64,
    #[serde(default = "default_decay")]
    pub recency_decay: f64,

    pub importance_trigger_max: i32,
    pub importance_trigger_curr: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub importance_ele_n: u32,

    #[serde(default, deserialize_with = "nullable")]
    pub daily_req: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub f_daily_schedule: Vec<Plan>,
    #[serde(default, deserialize_with = "nullable")]
    pub f_daily_schedule_hourly_org: Vec<Plan>,

    #[serde(default, deserialize_with = "nullable")]
    pub act_address: String,
    #[serde(default, with = "current_time")]
    pub act_start_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "nullable")]
    pub act_duration: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub act_description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub act_pronunciatio: String,
    #[serde(default, deserialize_with = "loose_spo")]
    pub act_event: Spo,
    #[serde(default, deserialize_with = "nullable")]
    pub act_obj_description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub act_obj_pronunciatio: String,
    #[serde(default, deserialize_with = "loose_spo")]
    pub act_obj_event: Spo,

    #[serde(default)]
    pub chatting_with: Option<String>,
    #[serde(default)]
    pub chat: Option<Vec<Utterance>>,
    #[serde(default, deserialize_with = "nullable")]
    pub chatting_with_buffer: BTreeMap<String, i32>,
    #[serde(default, with = "current_time")]
    pub chatting_end_time: Option<NaiveDateTime>,

    #[serde(default, deserialize_with = "nullable")]
    pub act_path_set: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub planned_path: Vec<TilePos>,
}

impl Scratch {
    pub fn from_state(name: &str, state: &State) -> Self {
        let identity = &state.identity;
        let activity = &state.activity;
        let chat = &state.chat;

        Self {
            vision_r: state.attention.vision_radius,
            att_bandwidth: state.attention.bandwidth,
            retention: state.attention.retention,
            curr_time: state.current_time,
            curr_tile: Some(state.position),
            daily_plan_req: state.daily_plan_requirements.clone(),
            name: name.to_string(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            age: identity.age,
            innate: identity.innate_traits.clone(),
            learned: identity.learned_traits.clone(),
            currently: identity.current_plans.clone(),
            lifestyle: identity.lifestyle.clone(),
            living_area: identity.living_area.to_string(),
            recency_w: state.weights.recency,
            relevance_w: state.weights.relevance,
            importance_w: state.weights.importance,
            valence_w: state.weights.valence,
            recency_decay: state.weights.recency_decay,
            importance_trigger_max: state.reflection_trigger,
            importance_trigger_curr: state.reflection_trigger_current,
            importance_ele_n: state.reflection_elements,
            daily_req: state.daily_plan.clone(),
            f_daily_schedule: state.daily_schedule.clone(),
            f_daily_schedule_hourly_org: state.original_schedule.clone(),
            act_address: activity.address.to_string(),
            act_start_time: activity.start,
            act_duration: activity.duration,
            act_description: activity.description.clone(),
            act_pronunciatio: activity.pronunciatio.clone(),
            act_event: activity.spo.clone(),
            act_obj_description: activity.object_description.clone(),
            act_obj_pronunciatio: activity.object_pronunciatio.clone(),
            act_obj_event: activity.object_spo.clone(),
            chatting_with: chat.with.clone(),
            chat: (!chat.transcript.is_empty()).then(|| chat.transcript.clone()),
            chatting_with_buffer: chat.buffer.clone(),
            chatting_end_time: chat.end_time,
            act_path_set: activity.path_set,
            planned_path: state.planned_path.iter().copied().collect(),
        }
    }

    /// Rebuild the in-memory state. `position` wins over `curr_tile`.
    pub fn into_state(self, position: TilePos) -> PersistResult<State> {
        let living_area = Path::parse(&self.living_area).map_err(corrupt)?;
        let address = Path::parse(&self.act_address).map_err(corrupt)?;

        Ok(State {
            position,
            current_time: self.curr_time,
            identity: Identity {
                first_name: self.first_name,
                last_name: self.last_name,
                age: self.age,
                innate_traits: self.innate,
                learned_traits: self.learned,
                current_plans: self.currently,
                lifestyle: self.lifestyle,
                living_area,
            },
            attention: Attention {
                vision_radius: self.vision_r,
                bandwidth: self.att_bandwidth,
                retention: self.retention,
            },
            weights: RetrievalWeights {
                recency: self.recency_w,
                importance: self.importance_w,
                relevance: self.relevance_w,
                valence: self.valence_w,
                recency_decay: self.recency_decay,
            },
            reflection_trigger_current: self.importance_trigger_curr,
            reflection_trigger: self.importance_trigger_max,
            reflection_elements: self.importance_ele_n,
            daily_plan_requirements: self.daily_plan_req,
            daily_plan: self.daily_req,
            daily_schedule: self.f_daily_schedule,
            original_schedule: self.f_daily_schedule_hourly_org,
            planned_path: VecDeque::from(self.planned_path),
            activity: Activity {
                address,
                start: self.act_start_time,
                duration: self.act_duration,
                description: self.act_description,
                pronunciatio: self.act_pronunciatio,
                spo: self.act_event,
                object_description: self.act_obj_description,
                object_pronunciatio: self.act_obj_pronunciatio,
                object_spo: self.act_obj_event,
                path_set: self.act_path_set,
            },
            chat: ChatState {
                with: self.chatting_with.filter(|name| !name.is_empty()),
                transcript: self.chat.unwrap_or_default(),
                end_time: self.chatting_end_time,
                buffer: self.chatting_with_buffer,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const BOOTSTRAP: &str = r#"{
        "vision_r": 8,
        "att_bandwidth": 8,
        "retention": 8,
        "curr_time": null,
        "curr_tile": null,
        "daily_plan_req": "Isabella Rodriguez opens Hobbs Cafe at 8am everyday",
        "name": "Isabella Rodriguez",
        "first_name": "Isabella",
        "last_name": "Rodriguez",
        "age": 34,
        "innate": "friendly, outgoing, hospitable",
        "learned": "Isabella Rodriguez is a cafe owner of Hobbs Cafe",
        "currently": "Isabella Rodriguez is planning on having a Valentine's Day party",
        "lifestyle": "Isabella Rodriguez goes to bed around 11pm",
        "living_area": "the Ville:Isabella Rodriguez's apartment:main room",
        "concept_forget": 100,
        "recency_w": 1,
        "relevance_w": 1,
        "importance_w": 1,
        "recency_decay": 0.995,
        "importance_trigger_max": 150,
        "importance_trigger_curr": 150,
        "importance_ele_n": 0,
        "thought_count": 5,
        "daily_req": [],
        "f_daily_schedule": [],
        "f_daily_schedule_hourly_org": [],
        "act_address": null,
        "act_start_time": null,
        "act_duration": null,
        "act_description": null,
        "act_pronunciatio": null,
        "act_event": ["Isabella Rodriguez", null, null],
        "act_obj_description": null,
        "act_obj_pronunciatio": null,
        "act_obj_event": [null, null, null],
        "chatting_with": null,
        "chat": null,
        "chatting_with_buffer": {},
        "chatting_end_time": null,
        "act_path_set": false,
        "planned_path": []
    }"#;

    #[test]
    fn test_bootstrap_scratch_with_nulls() {
        let scratch: Scratch = serde_json::from_str(BOOTSTRAP).unwrap();
        assert_eq!(scratch.name, "Isabella Rodriguez");
        assert_eq!(scratch.valence_w, 1.0);
        assert_eq!(scratch.act_event, Spo::new("Isabella Rodriguez", "", ""));

        let state = scratch.into_state(TilePos::new(72, 14)).unwrap();
        assert_eq!(state.position, TilePos::new(72, 14));
        assert_eq!(state.current_time, None);
        assert!(state.activity.address.is_empty());
        assert_eq!(state.identity.living_area.arena(), "main room");
        assert_eq!(state.weights.recency_decay, 0.995);
        assert_eq!(state.reflection_trigger, 150);
        assert!(state.chat.with.is_none());
        assert!(state.chat.transcript.is_empty());
    }

    #[test]
    fn test_state_survives_round_trip() {
        let now = NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();

        let mut state = State {
            position: TilePos::new(3, 4),
            current_time: Some(now),
            daily_schedule: vec![Plan::new("sleeping", 480), Plan::new("working", 960)],
            ..State::default()
        };
        state.identity.first_name = "Klaus".to_string();
        state.activity.address = Path::parse("the Ville:cafe:kitchen:stove").unwrap();
        state.activity.start = Some(now);
        state.activity.duration = 30;
        state.activity.spo = Spo::new("Klaus Mueller", "cook", "breakfast");
        state.chat.with = Some("Maria Lopez".to_string());
        state.chat.transcript = vec![Utterance::new("Klaus Mueller", "Hi!")];
        state.chat.buffer.insert("Maria Lopez".to_string(), 800);
        state.planned_path = VecDeque::from(vec![TilePos::new(3, 5), TilePos::new(3, 6)]);

        let json = serde_json::to_string(&Scratch::from_state("Klaus Mueller", &state)).unwrap();
        assert!(json.contains("\"curr_time\":\"February 13, 2023, 09:30:00\""));
        assert!(json.contains("\"act_event\":[\"Klaus Mueller\",\"cook\",\"breakfast\"]"));

        let restored: Scratch = serde_json::from_str(&json).unwrap();
        let restored = restored.into_state(TilePos::new(3, 4)).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_empty_chat_saved_as_null() {
        let scratch = Scratch::from_state("Klaus Mueller", &State::default());
        let value = serde_json::to_value(&scratch).unwrap();
        assert!(value["chat"].is_null());
        assert!(value["chatting_with"].is_null());
    }

    #[test]
    fn test_malformed_living_area() {
        let mut scratch: Scratch = serde_json::from_str(BOOTSTRAP).unwrap();
        scratch.living_area = "a:b:c:d:e".to_string();
        assert!(scratch.into_state(TilePos::default()).is_err());
    }
}
