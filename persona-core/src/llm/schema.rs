//! Structured reply shapes and their semantic validators.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use persona_macros::OutputSchema;
use serde::Deserialize;

use crate::cognition::{schedule_minutes, CognitionError, CognitionResult, Plan};

/// Labels the hourly schedule must carry, in order.
pub(crate) const HOUR_LABELS: [&str; 24] = [
    "12:00am", "01:00am", "02:00am", "03:00am", "04:00am", "05:00am", "06:00am", "07:00am",
    "08:00am", "09:00am", "10:00am", "11:00am", "12:00pm", "01:00pm", "02:00pm", "03:00pm",
    "04:00pm", "05:00pm", "06:00pm", "07:00pm", "08:00pm", "09:00pm", "10:00pm", "11:00pm",
];

/// How memorable something is
#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "poignancy")]
pub struct PoignancyReply {
    /// Short justification
    pub reasoning: String,
    /// Score from 1 (mundane) to 10 (life changing)
    pub poignancy: i32,
}

/// Emotional charge of something
#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "valence")]
pub struct ValenceReply {
    pub reasoning: String,
    /// Score from -10 (very unpleasant) to 10 (very pleasant)
    pub valence: i32,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "wake_up_hour")]
pub struct WakeUpReply {
    /// Time like 7:00am
    pub wake_up_time: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "daily_plan")]
pub struct DailyPlanReply {
    /// Broad strokes of the day, in order
    pub schedule: Vec<String>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "hourly_entry")]
pub struct HourlyEntry {
    /// Hour label like 01:00am
    pub time: String,
    pub activity: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "hourly_schedule")]
pub struct HourlyScheduleReply {
    /// Exactly 24 entries, one per hour starting at 12:00am
    pub schedule: Vec<HourlyEntry>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "subtask")]
pub struct Subtask {
    pub task: String,
    pub duration_in_minutes: u32,
    /// Minutes of the parent activity left after this task
    pub minutes_left: u32,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "task_decomposition")]
pub struct DecompositionReply {
    pub schedule: Vec<Subtask>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "timed_action")]
pub struct TimedAction {
    pub start_time: String,
    pub end_time: String,
    pub action: String,
    pub duration_in_minutes: u32,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "reaction_schedule")]
pub struct ReactionScheduleReply {
    pub schedule: Vec<TimedAction>,
}

/// A single location or object name
#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "choice")]
pub struct ChoiceReply {
    pub output: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "pronunciatio")]
pub struct EmojiReply {
    /// One or two emoji
    pub emoji: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "event_triple")]
pub struct TripleReply {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "object_state")]
pub struct ObjectStateReply {
    pub state: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "decide_to_talk")]
pub struct DecideToTalkReply {
    pub context: String,
    pub question: String,
    pub reasoning: String,
    /// "yes" or "no"
    pub should_talk: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "decide_to_wait")]
pub struct DecideToWaitReply {
    pub reasoning: String,
    /// 1 to wait, 2 to carry on
    pub choice: i32,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "utterance")]
pub struct UtteranceReply {
    pub utterance: String,
    pub ends_conversation: bool,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "relationship_summary")]
pub struct RelationshipReply {
    pub relationship_summary: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "conversation_summary")]
pub struct SummaryReply {
    pub summary: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "planning_thought")]
pub struct PlanningThoughtReply {
    pub planning_thought: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "memo")]
pub struct MemoReply {
    pub memo: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "focal_points")]
pub struct FocalPointsReply {
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "insight")]
pub struct InsightEntry {
    pub insight: String,
    /// 1-based statement numbers supporting the insight
    pub reasons: Vec<usize>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "insights")]
pub struct InsightsReply {
    pub insights: Vec<InsightEntry>,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "feelings")]
pub struct FeelingsReply {
    pub feelings: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "scheduling_memory")]
pub struct SchedulingMemoryReply {
    pub memory: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "currently")]
pub struct CurrentlyReply {
    pub status: String,
}

#[derive(Debug, Deserialize, OutputSchema)]
#[schema(name = "daily_requirements")]
pub struct DailyRequirementsReply {
    pub day: String,
}

fn invalid(msg: String) -> CognitionError {
    CognitionError::Validation(msg)
}

/// Lowercase with spaces removed, so "7:00 AM" reads as "7:00am".
fn squash(label: &str) -> String {
    label.replace(' ', "").to_lowercase()
}

/// Parse a wake-up time like `7:00 AM` or `07:00am`.
pub(crate) fn parse_wake_up(label: &str) -> CognitionResult<NaiveTime> {
    let label = squash(label);
    NaiveTime::parse_from_str(&label, "%I:%M%p")
        .map_err(|e| CognitionError::Decode(format!("bad wake up time {label:?}: {e}")))
}

impl HourlyScheduleReply {
    pub(crate) fn validate(&self) -> CognitionResult<()> {
        if self.schedule.len() != HOUR_LABELS.len() {
            return Err(invalid(format!(
                "hourly schedule has {} entries, expected 24",
                self.schedule.len()
            )));
        }
        for (entry, expected) in self.schedule.iter().zip(HOUR_LABELS) {
            let got = squash(&entry.time);
            if got != expected && got != expected.trim_start_matches('0') {
                return Err(invalid(format!(
                    "hourly schedule has wrong time, expected {expected}, got {}",
                    entry.time
                )));
            }
        }
        Ok(())
    }

    /// Merge consecutive identical hours into single entries.
    pub(crate) fn into_plans(self) -> Vec<Plan> {
        let mut plans: Vec<Plan> = Vec::new();
        for entry in self.schedule {
            match plans.last_mut() {
                Some(last) if last.activity == entry.activity => last.duration += 60,
                _ => plans.push(Plan::new(entry.activity, 60)),
            }
        }
        plans
    }
}

impl DecompositionReply {
    pub(crate) fn validate(&self, total: u32) -> CognitionResult<()> {
        let mut left = i64::from(total);
        for task in &self.schedule {
            left -= i64::from(task.duration_in_minutes);
            if left != i64::from(task.minutes_left) {
                return Err(invalid(format!(
                    "task {:?} says {} minutes left, expected {left}",
                    task.task, task.minutes_left
                )));
            }
        }
        if left != 0 {
            return Err(invalid(format!(
                "tasks add up to {} minutes, expected {total}",
                i64::from(total) - left
            )));
        }
        Ok(())
    }

    pub(crate) fn into_plans(self) -> Vec<Plan> {
        self.schedule
            .into_iter()
            .map(|t| Plan::new(t.task, t.duration_in_minutes))
            .collect()
    }
}

/// A schedule entry with its wall-clock bounds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub activity: String,
}

/// The part of a reaction window that is already settled.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ReactionWindow {
    /// Entries of the live schedule that fall inside the window
    pub original: Vec<Slot>,
    /// Entries kept as-is because they already happened, the last possibly cut at `now`
    pub kept: Vec<Slot>,
    pub kept_plans: Vec<Plan>,
    /// Minutes left to fill after the kept entries
    pub remaining: u32,
    /// Full window length in minutes
    pub total: u32,
}

impl ReactionWindow {
    /// Split the live schedule around `now` inside `[start, end)`.
    pub(crate) fn new(
        schedule: &[Plan],
        start_of_day: NaiveDateTime,
        now: NaiveDateTime,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        let total = (end - start).num_minutes().max(0) as u32;
        let mut window = ReactionWindow {
            remaining: total,
            total,
            ..Default::default()
        };

        let mut at = start_of_day;
        for plan in schedule {
            let until = at + Duration::minutes(i64::from(plan.duration));
            // Clip to the window; entries straddling an edge count only inside it.
            let (from, to) = (at.max(start), until.min(end));
            at = until;
            if from >= to {
                continue;
            }
            let slot = |end| Slot {
                start: from,
                end,
                activity: plan.activity.clone(),
            };
            window.original.push(slot(to));

            let length = (to - from).num_minutes() as u32;
            if to <= now {
                window.kept.push(slot(to));
                window.kept_plans.push(Plan::new(plan.activity.clone(), length));
                window.remaining = window.remaining.saturating_sub(length);
            } else if from < now {
                let rest_minutes = ((to - now).num_seconds() + 59) / 60;
                let cut = i64::from(length) - rest_minutes;
                if cut > 0 {
                    let cut = cut as u32;
                    window.kept.push(slot(now));
                    window.kept_plans.push(Plan::new(plan.activity.clone(), cut));
                    window.remaining = window.remaining.saturating_sub(cut);
                }
            }
        }
        window
    }

    /// Time the generated part has to start from.
    pub(crate) fn planning_from(&self, end: NaiveDateTime) -> NaiveDateTime {
        end - Duration::minutes(i64::from(self.remaining))
    }
}

impl ReactionScheduleReply {
    pub(crate) fn validate(&self, window: &ReactionWindow) -> CognitionResult<()> {
        let generated: u32 = self.schedule.iter().map(|a| a.duration_in_minutes).sum();
        if generated != window.remaining {
            return Err(invalid(format!(
                "reaction schedule fills {generated} minutes, expected {}",
                window.remaining
            )));
        }
        let full = generated + schedule_minutes(&window.kept_plans);
        if full != window.total {
            return Err(invalid(format!(
                "reaction window covers {full} minutes, expected {}",
                window.total
            )));
        }
        Ok(())
    }

    /// Settled entries followed by the generated ones.
    pub(crate) fn into_plans(self, window: ReactionWindow) -> Vec<Plan> {
        let mut plans = window.kept_plans;
        plans.extend(
            self.schedule
                .into_iter()
                .map(|a| Plan::new(a.action, a.duration_in_minutes)),
        );
        plans
    }
}

impl InsightsReply {
    pub(crate) fn validate(&self, statements: usize) -> CognitionResult<()> {
        for entry in &self.insights {
            if let Some(bad) = entry.reasons.iter().find(|&&r| r == 0 || r > statements) {
                return Err(invalid(format!(
                    "insight {:?} cites statement {bad}, only {statements} given",
                    entry.insight
                )));
            }
        }
        Ok(())
    }
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

    fn hourly(labels: &[&str], activity: impl Fn(usize) -> String) -> HourlyScheduleReply {
        HourlyScheduleReply {
            schedule: labels
                .iter()
                .enumerate()
                .map(|(i, t)| HourlyEntry {
                    time: t.to_string(),
                    activity: activity(i),
                })
                .collect(),
        }
    }

    #[test]
    fn test_schema_is_strict() {
        let schema = DecompositionReply::json_schema();
        assert_eq!(DecompositionReply::schema_name(), "task_decomposition");
        assert_eq!(schema["additionalProperties"], false);
        let item = &schema["properties"]["schedule"]["items"];
        assert_eq!(item["properties"]["minutes_left"]["type"], "integer");
        assert_eq!(item["required"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_wake_up() {
        assert_eq!(parse_wake_up("7:00 AM").unwrap(), NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(parse_wake_up("06:30am").unwrap(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert!(matches!(parse_wake_up("early"), Err(CognitionError::Decode(_))));
    }

    #[test]
    fn test_hourly_labels_and_merge() {
        let labels: Vec<String> = HOUR_LABELS
            .iter()
            .map(|l| l.trim_start_matches('0').to_uppercase())
            .collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        let reply = hourly(&labels, |i| if i < 7 { "sleeping".into() } else { "working".into() });
        reply.validate().unwrap();
        assert_eq!(
            reply.into_plans(),
            vec![Plan::new("sleeping", 420), Plan::new("working", 1020)]
        );

        let short = hourly(&HOUR_LABELS[..23], |_| "sleeping".into());
        assert!(short.validate().is_err());

        let mut shuffled = HOUR_LABELS;
        shuffled.swap(3, 4);
        assert!(hourly(&shuffled, |_| "x".into()).validate().is_err());
    }

    #[test]
    fn test_decomposition_chain() {
        let task = |task: &str, d, left| Subtask {
            task: task.into(),
            duration_in_minutes: d,
            minutes_left: left,
        };
        let good = DecompositionReply {
            schedule: vec![task("brewing coffee", 15, 45), task("reading news", 45, 0)],
        };
        good.validate(60).unwrap();

        let wrong_left = DecompositionReply {
            schedule: vec![task("brewing coffee", 15, 40), task("reading news", 45, 0)],
        };
        assert!(wrong_left.validate(60).is_err());

        let short = DecompositionReply {
            schedule: vec![task("brewing coffee", 15, 45)],
        };
        assert!(short.validate(60).is_err());
    }

    #[test]
    fn test_reaction_window_truncates_spanning_entry() {
        let schedule = vec![
            Plan::new("sleeping", 480),
            Plan::new("breakfast", 60),
            Plan::new("working", 120),
            Plan::new("lunch", 780),
        ];
        let window = ReactionWindow::new(&schedule, at(0, 0), at(9, 20), at(8, 0), at(11, 0));
        assert_eq!(window.total, 180);
        assert_eq!(window.original.len(), 2);
        assert_eq!(
            window.kept_plans,
            vec![Plan::new("breakfast", 60), Plan::new("working", 20)]
        );
        assert_eq!(window.remaining, 100);
        assert_eq!(window.planning_from(at(11, 0)), at(9, 20));

        let action = |a: &str, d| TimedAction {
            start_time: String::new(),
            end_time: String::new(),
            action: a.into(),
            duration_in_minutes: d,
        };
        let reply = ReactionScheduleReply {
            schedule: vec![action("chatting with Maria", 30), action("working", 70)],
        };
        reply.validate(&window).unwrap();
        let plans = reply.into_plans(window.clone());
        assert_eq!(schedule_minutes(&plans), 180);

        let too_long = ReactionScheduleReply {
            schedule: vec![action("chatting with Maria", 120)],
        };
        assert!(too_long.validate(&window).is_err());
    }

    #[test]
    fn test_reaction_window_clips_straddling_entry() {
        let schedule = vec![
            Plan::new("sleeping", 480),
            Plan::new("waiting", 31),
            Plan::new("getting back to the day", 89),
            Plan::new("working", 840),
        ];
        let end = at(0, 0) + Duration::minutes(1440);
        let window = ReactionWindow::new(&schedule, at(0, 0), at(9, 5), at(9, 0), end);
        assert_eq!(window.total, 900);
        assert_eq!(window.original.len(), 2);
        assert_eq!(window.original[0].start, at(9, 0));
        assert_eq!(window.kept_plans, vec![Plan::new("getting back to the day", 5)]);
        assert_eq!(window.remaining, 895);

        let action = |d| TimedAction {
            start_time: String::new(),
            end_time: String::new(),
            action: "waiting to start lunch".into(),
            duration_in_minutes: d,
        };
        let fits = ReactionScheduleReply {
            schedule: vec![action(895)],
        };
        fits.validate(&window).unwrap();
        assert_eq!(schedule_minutes(&fits.into_plans(window.clone())), 900);

        let whole_window = ReactionScheduleReply {
            schedule: vec![action(900)],
        };
        assert!(whole_window.validate(&window).is_err());
    }

    #[test]
    fn test_insight_reasons_in_range() {
        let reply = InsightsReply {
            insights: vec![InsightEntry {
                insight: "Klaus loves research".into(),
                reasons: vec![1, 3],
            }],
        };
        reply.validate(3).unwrap();
        assert!(reply.validate(2).is_err());

        let zero = InsightsReply {
            insights: vec![InsightEntry {
                insight: "x".into(),
                reasons: vec![0],
            }],
        };
        assert!(zero.validate(3).is_err());
    }
}
