//! The step loop that drives every persona through simulated time.
//!
//! A step computes each persona's next tile against the maze as it was at
//! the start of the step, then commits tile events and positions for all of
//! them at once.

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::maze::{Event, Maze, TilePos};
use crate::memory::Utterance;
use crate::persona::Persona;

/// Steps at the start of each day that are never skipped, since that is
/// when daily schedules are made.
const PLANNING_STEPS: i32 = 3;

const DEFAULT_TIME_STEP_SECS: i64 = 10;

/// What one persona did in a step.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaMovement {
    pub tile: TilePos,
    pub pronunciatio: String,
    pub event: Event,
    pub chat: Vec<Utterance>,
}

/// Result of [`Simulation::execute_step`].
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: u32,
    /// Simulated time the step ran at
    pub time: NaiveDateTime,
    pub movements: BTreeMap<String, PersonaMovement>,
}

/// Where a running simulation writes its progress.
#[async_trait]
pub trait SimulationStore: Send + Sync {
    async fn save_movements(
        &self,
        step: u32,
        time: NaiveDateTime,
        movements: &BTreeMap<String, PersonaMovement>,
    ) -> Result<()>;

    async fn save_simulation(&self, simulation: &Simulation) -> Result<()>;

    async fn backup(&self, step: u32) -> Result<()>;
}

/// A world and the personas living in it.
#[derive(Debug)]
pub struct Simulation {
    current_time: NaiveDateTime,
    start_time: NaiveDateTime,
    time_step: Duration,
    maze: Maze,
    step: u32,
    personas: BTreeMap<String, Persona>,
    forked_from: String,
    /// Back up every this many steps; 0 disables backups
    backup_interval: u32,
}

impl Simulation {
    pub fn new(
        maze: Maze,
        personas: BTreeMap<String, Persona>,
        start_time: NaiveDateTime,
        current_time: NaiveDateTime,
    ) -> Self {
        Self {
            current_time,
            start_time,
            time_step: Duration::seconds(DEFAULT_TIME_STEP_SECS),
            maze,
            step: 0,
            personas,
            forked_from: String::new(),
            backup_interval: 0,
        }
    }

    pub fn with_time_step(mut self, time_step: Duration) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    pub fn with_forked_from(mut self, forked_from: impl Into<String>) -> Self {
        self.forked_from = forked_from.into();
        self
    }

    pub fn with_backup_interval(mut self, backup_interval: u32) -> Self {
        self.backup_interval = backup_interval;
        self
    }

    pub fn current_time(&self) -> NaiveDateTime {
        self.current_time
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn time_step(&self) -> Duration {
        self.time_step
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn personas(&self) -> &BTreeMap<String, Persona> {
        &self.personas
    }

    pub fn persona(&self, name: &str) -> Option<&Persona> {
        self.personas.get(name)
    }

    pub fn forked_from(&self) -> &str {
        &self.forked_from
    }

    pub fn backup_interval(&self) -> u32 {
        self.backup_interval
    }

    /// Run `steps` steps, saving after each one.
    pub async fn run(&mut self, steps: u32, store: &dyn SimulationStore) -> Result<()> {
        for _ in 0..steps {
            if self.backup_interval > 0 && self.step % self.backup_interval == 0 {
                store.backup(self.step).await?;
            }

            let outcome = self.execute_step().await?;
            store
                .save_movements(outcome.step, outcome.time, &outcome.movements)
                .await?;
            store.save_simulation(self).await?;
        }
        Ok(())
    }

    /// Advance every persona by one step and the clock by one time step.
    #[instrument(skip_all, fields(step = self.step))]
    pub async fn execute_step(&mut self) -> Result<StepOutcome> {
        let started = Instant::now();
        info!(sim_time = %self.current_time, "step start");

        self.skip_sleep();
        let time = self.current_time;

        // Personas that reached their destination start using its object.
        let mut in_use = Vec::new();
        for persona in self.personas.values() {
            if persona.has_planned_path() {
                continue;
            }
            let event = persona.current_object_event();
            if event.spo.subject.is_empty() {
                continue;
            }
            let pos = persona.position();
            let idle = Event::subject_only(event.spo.subject.clone());
            self.maze.add_event(pos, event.clone())?;
            self.maze.remove_event(pos, &idle)?;
            in_use.push((pos, event));
        }

        let names: Vec<String> = self.personas.keys().cloned().collect();
        let mut movements = BTreeMap::new();
        for name in names {
            let Some(mut persona) = self.personas.remove(&name) else {
                continue;
            };
            let stepped = persona.step(&self.maze, &mut self.personas, time).await;
            let chat = persona.chat().to_vec();
            self.personas.insert(name.clone(), persona);

            let movement = stepped?;
            movements.insert(
                name,
                PersonaMovement {
                    tile: movement.tile,
                    pronunciatio: movement.pronunciatio,
                    event: movement.event,
                    chat,
                },
            );
        }

        for (name, movement) in &movements {
            let persona = self
                .personas
                .get(name)
                .ok_or_else(|| Error::Invariant(format!("persona {name} vanished during the step")))?;
            self.maze.remove_subject_events(persona.position(), name)?;
            self.maze.add_event(movement.tile, persona.current_event())?;
        }

        for (name, movement) in &movements {
            if let Some(persona) = self.personas.get_mut(name) {
                persona.set_position(movement.tile);
            }
        }

        for (pos, event) in &in_use {
            self.maze.turn_event_idle(*pos, event)?;
        }

        let outcome = StepOutcome {
            step: self.step,
            time,
            movements,
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "step end"
        );
        self.current_time += self.time_step;
        self.step += 1;
        Ok(outcome)
    }

    /// Jump to shortly before the earliest wake-up when everyone is asleep.
    fn skip_sleep(&mut self) {
        if self.time_step <= Duration::zero() {
            return;
        }

        let midnight = self.current_time.date().and_time(NaiveTime::MIN);
        let since_midnight = self.current_time - midnight;
        let iterations = since_midnight.num_seconds() / self.time_step.num_seconds().max(1);
        if iterations < i64::from(PLANNING_STEPS) || self.personas.is_empty() {
            return;
        }

        let lead = self.time_step * PLANNING_STEPS;
        let mut earliest: Option<NaiveDateTime> = None;
        for persona in self.personas.values() {
            let asleep = persona
                .daily_schedule()
                .get(persona.schedule_index())
                .is_some_and(|plan| plan.activity.contains("sleeping"));
            if !asleep {
                return;
            }

            let Some(wake) = persona.wake_up_time() else {
                return;
            };
            let target = wake - lead;
            if persona.start_of_day() >= target {
                return;
            }
            earliest = Some(earliest.map_or(target, |e| e.min(target)));
        }

        let Some(earliest) = earliest else {
            return;
        };
        if self.current_time >= earliest {
            return;
        }

        debug!(
            from = %self.current_time,
            next_step_time = %earliest,
            "skipping sleep"
        );
        self.current_time = earliest;
        for persona in self.personas.values_mut() {
            persona.reset_chat_buffer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::Plan;
    use crate::testing::{grid_maze, sample_persona};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn sleeping_persona(name: &str, pos: TilePos, wake_minutes: u32, now: NaiveDateTime) -> Persona {
        let mut persona = sample_persona(name, pos);
        let state = persona.state_mut();
        state.current_time = Some(now);
        state.daily_schedule = vec![
            Plan::new("sleeping", wake_minutes),
            Plan::new("working", 1440 - wake_minutes),
        ];
        state.original_schedule = state.daily_schedule.clone();
        state.chat.buffer.insert("someone".to_string(), 10);
        persona
    }

    fn simulation(personas: Vec<Persona>, now: NaiveDateTime) -> Simulation {
        let maze = grid_maze(&["      ", "      ", "      "]);
        let personas = personas
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        Simulation::new(maze, personas, at(0, 0), now)
    }

    #[test]
    fn test_skip_sleep_jumps_to_earliest_wake_up() {
        let now = at(2, 0);
        let mut sim = simulation(
            vec![
                sleeping_persona("Klaus Mueller", TilePos::new(0, 0), 420, now),
                sleeping_persona("Maria Lopez", TilePos::new(1, 0), 360, now),
            ],
            now,
        );

        sim.skip_sleep();

        assert_eq!(sim.current_time(), at(6, 0) - Duration::seconds(30));
        for persona in sim.personas().values() {
            assert!(persona.state().chat.buffer.is_empty());
        }
    }

    #[test]
    fn test_no_skip_when_someone_is_awake() {
        let now = at(2, 0);
        let mut awake = sample_persona("Maria Lopez", TilePos::new(1, 0));
        awake.state_mut().current_time = Some(now);
        awake.state_mut().daily_schedule = vec![Plan::new("studying", 1440)];

        let mut sim = simulation(
            vec![sleeping_persona("Klaus Mueller", TilePos::new(0, 0), 420, now), awake],
            now,
        );
        sim.skip_sleep();
        assert_eq!(sim.current_time(), now);
    }

    #[test]
    fn test_no_skip_during_first_steps_of_the_day() {
        let now = at(0, 0) + Duration::seconds(20);
        let mut sim = simulation(
            vec![sleeping_persona("Klaus Mueller", TilePos::new(0, 0), 420, now)],
            now,
        );
        sim.skip_sleep();
        assert_eq!(sim.current_time(), now);
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SimulationStore for RecordingStore {
        async fn save_movements(
            &self,
            step: u32,
            _time: NaiveDateTime,
            movements: &BTreeMap<String, PersonaMovement>,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("movements {step} {}", movements.len()));
            Ok(())
        }

        async fn save_simulation(&self, simulation: &Simulation) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("save {}", simulation.step()));
            Ok(())
        }

        async fn backup(&self, step: u32) -> Result<()> {
            self.calls.lock().unwrap().push(format!("backup {step}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_saves_and_backs_up() {
        let mut sim = simulation(Vec::new(), at(9, 0)).with_backup_interval(2);
        let store = RecordingStore::default();

        sim.run(3, &store).await.unwrap();

        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![
                "backup 0",
                "movements 0 0",
                "save 1",
                "movements 1 0",
                "save 2",
                "backup 2",
                "movements 2 0",
                "save 3",
            ]
        );
        assert_eq!(sim.current_time(), at(9, 0) + Duration::seconds(30));
    }
}
