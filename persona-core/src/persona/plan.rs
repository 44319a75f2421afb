//! Daily planning and activity selection.

use chrono::{Duration, Timelike};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::info;

use super::retrieve::{Retrieved, DEFAULT_RETRIEVAL_COUNT};
use super::{Activity, NewDay, Persona, DAY_FORMAT};
use crate::cognition::{schedule_minutes, Plan};
use crate::error::{Error, Result};
use crate::maze::Maze;
use crate::memory::{NodeDraft, Spo};
use crate::path::{Level, Path};

pub(crate) const MINUTES_PER_DAY: u32 = 24 * 60;

/// Importance given to the daily plan thought.
const PLAN_IMPORTANCE: i32 = 5;
const PLAN_LIFETIME_DAYS: i64 = 30;

/// Timestamp format of memories listed for identity revision.
const STATEMENT_FORMAT: &str = "%A %B %d -- %H:%M %p";

impl Persona {
    /// Keep the schedule current, pick the activity and maybe react to what
    /// was perceived. Returns the address of the resulting activity.
    pub(super) async fn plan(
        &mut self,
        maze: &Maze,
        others: &mut BTreeMap<String, Persona>,
        retrieved: BTreeMap<String, Retrieved>,
        new_day: NewDay,
    ) -> Result<Path> {
        if new_day != NewDay::No {
            self.long_term_planning(new_day).await?;
        }

        if self.state.is_activity_finished() {
            self.determine_activity(maze).await?;
        }

        if let Some(focused) = self.choose_retrieved(retrieved)? {
            self.react(maze, others, &focused).await?;
        }

        if self.state.activity.spo.predicate != "chat with" {
            self.state.chat.clear();
        }

        // Cooldown so two personas do not chat in a loop.
        let name = self.name.clone();
        for (other, steps) in self.state.chat.buffer.iter_mut() {
            if *other != name {
                *steps -= 1;
            }
        }

        Ok(self.state.activity.address.clone())
    }

    async fn long_term_planning(&mut self, new_day: NewDay) -> Result<()> {
        if new_day == NewDay::New {
            self.revise_identity().await?;
        }

        let cognition = self.cognition.clone();
        let wake_up = cognition.wake_up_hour(self).await?;
        self.state.daily_plan = cognition.daily_plan(self, wake_up).await?;
        self.state.daily_schedule = cognition.hourly_schedule(self, wake_up).await?;
        self.state.original_schedule = self.state.daily_schedule.clone();

        let now = self.current_time();
        let date = now.format(DAY_FORMAT).to_string();
        let thought = format!(
            "This is {}'s plan for {}: {}.",
            self.name,
            date,
            self.state.daily_plan.join(", ")
        );
        let embedding = self.embedding(&thought).await?;
        let draft = NodeDraft {
            spo: Spo::new(self.name.clone(), "plan", date),
            description: thought.clone(),
            keywords: vec!["plan".to_string()],
            importance: PLAN_IMPORTANCE,
            valence: 0,
            created: now,
            expiration: Some(now + Duration::days(PLAN_LIFETIME_DAYS)),
            embedding_key: thought,
            embedding,
        };
        self.memory.add_thought(draft, Vec::new())?;

        info!(
            wake_up = %wake_up,
            entries = self.state.daily_schedule.len(),
            "day planned"
        );
        Ok(())
    }

    /// Update the "currently" status and daily requirements from recent memories.
    async fn revise_identity(&mut self) -> Result<()> {
        let date = self.current_time().format(DAY_FORMAT);
        let focal_points = [
            format!("{}'s plan for {}.", self.name, date),
            format!("Important recent events for {}'s life.", self.name),
        ];
        let retrieved = self
            .retrieve_flat(&focal_points, DEFAULT_RETRIEVAL_COUNT)
            .await?;

        let mut statements = Vec::with_capacity(retrieved.len());
        for id in retrieved {
            let node = self.memory.node(id)?;
            statements.push(format!(
                "{}: {}",
                node.created.format(STATEMENT_FORMAT),
                node.embedding_key
            ));
        }

        let cognition = self.cognition.clone();
        let (note, feelings) = futures::try_join!(
            cognition.planning_note(self, &statements),
            cognition.planning_feelings(self, &statements),
        )?;
        self.state.identity.current_plans = cognition.current_plans(self, &note, &feelings).await?;
        self.state.daily_plan_requirements = cognition.daily_requirements(self).await?;
        info!(currently = %self.state.identity.current_plans, "identity revised");
        Ok(())
    }

    /// Refine the schedule around now and start the current entry.
    async fn determine_activity(&mut self, maze: &Maze) -> Result<()> {
        let idx = self.state.schedule_index(0);
        let idx_in_hour = self.state.schedule_index(60);

        if idx == 0 {
            self.decompose_at(0).await?;
            self.decompose_at(idx_in_hour + 1).await?;
        }
        if self.current_time().hour() < 23 {
            self.decompose_at(idx_in_hour).await?;
        }

        let total = schedule_minutes(&self.state.daily_schedule);
        match total.cmp(&MINUTES_PER_DAY) {
            Ordering::Less => self
                .state
                .daily_schedule
                .push(Plan::new("sleeping", MINUTES_PER_DAY - total)),
            Ordering::Greater => {
                return Err(Error::Invariant(format!(
                    "schedule of {} covers {total} minutes, more than a day",
                    self.name
                )))
            }
            Ordering::Equal => {}
        }

        let plan = self
            .state
            .daily_schedule
            .get(idx)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("no schedule entry {idx} for {}", self.name)))?;

        let world = maze.get(self.state.position)?.path.world().to_string();
        let cognition = self.cognition.clone();
        let sector = cognition
            .activity_sector(self, maze, &plan.activity, &world)
            .await?;
        let arena = cognition
            .activity_arena(self, maze, &plan.activity, &world, &sector)
            .await?;
        let arena_path = Path::new(world, sector, arena, "");
        let object = cognition
            .activity_object(self, maze, &plan.activity, &arena_path)
            .await?;
        let address = arena_path.with(Level::Object, object.clone());

        let (pronunciatio, spo, object_description) = futures::try_join!(
            cognition.pronunciatio(self, &plan.activity),
            cognition.activity_spo(self, &plan.activity),
            cognition.object_state(self, &object, &plan.activity),
        )?;
        let (object_pronunciatio, object_spo) = futures::try_join!(
            cognition.object_pronunciatio(self, &object_description),
            cognition.object_spo(self, &object, &object_description),
        )?;

        self.state.set_activity(Activity {
            address,
            duration: plan.duration,
            description: plan.activity,
            pronunciatio,
            spo,
            object_description,
            object_pronunciatio,
            object_spo,
            ..Default::default()
        });
        Ok(())
    }

    /// Replace the entry at `idx` by its decomposition when worthwhile.
    async fn decompose_at(&mut self, idx: usize) -> Result<()> {
        let Some(plan) = self.state.daily_schedule.get(idx).cloned() else {
            return Ok(());
        };
        if plan.duration < 60 || !should_decompose(&plan.activity, plan.duration) {
            return Ok(());
        }

        let cognition = self.cognition.clone();
        let parts = cognition.decompose_plan(self, &plan).await?;
        self.state.daily_schedule.splice(idx..=idx, parts);
        Ok(())
    }
}

/// Sleep is never split; other bed related entries only when short.
fn should_decompose(activity: &str, duration: u32) -> bool {
    if !activity.contains("sleep") && !activity.contains("bed") {
        return true;
    }
    if activity.contains("sleeping") || activity.contains("asleep") || activity.contains("in bed") {
        return false;
    }
    duration <= 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::TilePos;
    use crate::memory::NodeKind;
    use crate::testing::{grid_maze, sample_persona, ScriptedCognition};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_should_decompose() {
        assert!(should_decompose("working on painting", 120));
        assert!(!should_decompose("sleeping", 420));
        assert!(!should_decompose("going to bed (in bed)", 120));
        assert!(!should_decompose("getting ready for bed", 90));
        assert!(should_decompose("getting ready for bed", 60));
    }

    #[tokio::test]
    async fn test_first_day_planning() {
        let maze = grid_maze(&["   ", "   "]);
        let cognition = Arc::new(ScriptedCognition::new());
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1))
            .with_cognition(cognition.clone());
        persona.state.current_time = Some(at(8, 0));

        let address = persona
            .plan(&maze, &mut BTreeMap::new(), BTreeMap::new(), NewDay::First)
            .await
            .unwrap();

        assert_eq!(schedule_minutes(persona.daily_schedule()), MINUTES_PER_DAY);
        assert!(!address.is_empty());
        assert_eq!(persona.activity().start, Some(at(8, 0)));

        let plan_thought = persona
            .memory()
            .latest_thoughts()
            .iter()
            .filter_map(|id| persona.memory().get(*id))
            .find(|n| n.spo.predicate == "plan")
            .unwrap();
        assert_eq!(plan_thought.kind, NodeKind::Thought);
        assert_eq!(plan_thought.importance, PLAN_IMPORTANCE);
        assert!(plan_thought
            .description
            .starts_with("This is Klaus Mueller's plan for Monday February 13: "));
        assert_eq!(plan_thought.expiration, Some(at(8, 0) + Duration::days(30)));
        assert!(cognition.calls().contains(&"hourly_schedule".to_string()));
    }

    #[tokio::test]
    async fn test_overlong_schedule_is_invariant() {
        let maze = grid_maze(&["   ", "   "]);
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1));
        persona.state.current_time = Some(at(23, 30));
        persona.state.daily_schedule = vec![Plan::new("sleeping", 1000), Plan::new("sleeping", 500)];

        let err = persona.determine_activity(&maze).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[tokio::test]
    async fn test_buffer_counts_down() {
        let maze = grid_maze(&["   ", "   "]);
        let mut persona = sample_persona("Klaus Mueller", TilePos::new(1, 1));
        persona.state.current_time = Some(at(8, 0));
        persona.state.chat.buffer.insert("Maria Lopez".into(), 3);
        persona.state.chat.buffer.insert("Klaus Mueller".into(), 3);

        persona
            .plan(&maze, &mut BTreeMap::new(), BTreeMap::new(), NewDay::First)
            .await
            .unwrap();
        assert_eq!(persona.state().chat.buffer["Maria Lopez"], 2);
        assert_eq!(persona.state().chat.buffer["Klaus Mueller"], 3);
    }
}
