//! Simulation level files: meta, environment and movement.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::formats::{current_time, start_date};
use crate::maze::TilePos;
use crate::memory::Utterance;
use crate::simulation::{PersonaMovement, Simulation};

/// `reverie/meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMeta {
    #[serde(default)]
    pub fork_sim_code: String,
    #[serde(with = "start_date")]
    pub start_date: NaiveDateTime,
    #[serde(default, with = "current_time")]
    pub curr_time: Option<NaiveDateTime>,
    pub sec_per_step: i64,
    pub maze_name: String,
    pub persona_names: Vec<String>,
    pub step: u32,
    #[serde(default)]
    pub backup_interval: u32,
}

impl SimulationMeta {
    pub fn from_simulation(simulation: &Simulation, maze_name: &str) -> Self {
        Self {
            fork_sim_code: simulation.forked_from().to_string(),
            start_date: simulation.start_time(),
            curr_time: Some(simulation.current_time()),
            sec_per_step: simulation.time_step().num_seconds(),
            maze_name: maze_name.to_string(),
            persona_names: simulation.personas().keys().cloned().collect(),
            step: simulation.step(),
            backup_interval: simulation.backup_interval(),
        }
    }
}

/// Where a persona stands, one entry of `environment/<step>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub maze: String,
    pub x: usize,
    pub y: usize,
}

pub type Environment = BTreeMap<String, EnvironmentEntry>;

pub(super) fn environment(maze: &str, movements: &BTreeMap<String, PersonaMovement>) -> Environment {
    movements
        .iter()
        .map(|(name, m)| {
            let entry = EnvironmentEntry {
                maze: maze.to_string(),
                x: m.tile.x,
                y: m.tile.y,
            };
            (name.clone(), entry)
        })
        .collect()
}

/// One persona in `movement/<step>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub movement: TilePos,
    pub pronunciatio: String,
    pub description: String,
    pub chat: Option<Vec<Utterance>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementMeta {
    #[serde(with = "current_time")]
    pub curr_time: Option<NaiveDateTime>,
}

/// `movement/<step>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementsFile {
    pub persona: BTreeMap<String, MovementRecord>,
    pub meta: MovementMeta,
}

impl MovementsFile {
    pub fn new(time: NaiveDateTime, movements: &BTreeMap<String, PersonaMovement>) -> Self {
        let persona = movements
            .iter()
            .map(|(name, m)| {
                let record = MovementRecord {
                    movement: m.tile,
                    pronunciatio: m.pronunciatio.clone(),
                    description: m.event.description.clone(),
                    chat: (!m.chat.is_empty()).then(|| m.chat.clone()),
                };
                (name.clone(), record)
            })
            .collect();

        Self {
            persona,
            meta: MovementMeta {
                curr_time: Some(time),
            },
        }
    }
}
