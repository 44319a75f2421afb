//! Simulation persistence.
//!
//! Reads and writes the on-disk layout of a simulation folder:
//!
//! ```text
//! <simulation>/
//!   reverie/meta.json
//!   environment/<step>.json
//!   movement/<step>.json
//!   personas/<name>/bootstrap_memory/
//!     scratch.json
//!     spatial_memory.json
//!     associative_memory/{nodes,kw_strength,embeddings}.json
//! ```
//!
//! Mazes live in their own folder as CSV matrices (see [`load_maze`]).
//! Bootstrap files written by other tools contain `null` in many places,
//! so loading is lenient about missing values but strict about structure.

mod maze;
mod nodes;
mod records;
mod scratch;

pub use maze::load_maze;
pub use nodes::{KeywordStrengthRecord, NodeRecord};
pub use records::{Environment, EnvironmentEntry, MovementMeta, MovementRecord, MovementsFile, SimulationMeta};
pub use scratch::Scratch;

use async_trait::async_trait;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::cognition::{Cognition, Embedder};
use crate::maze::TilePos;
use crate::memory::AssociativeMemory;
use crate::persona::Persona;
use crate::simulation::{PersonaMovement, Simulation, SimulationStore};
use crate::spatial::SpatialMemory;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Corrupt record: {0}")]
    Corruption(String),
}

pub type PersistResult<T> = std::result::Result<T, PersistError>;

pub(crate) fn corrupt(err: impl fmt::Display) -> PersistError {
    PersistError::Corruption(err.to_string())
}

/// Write `value` as pretty JSON, creating parent folders.
pub async fn save_json<T: Serialize + ?Sized>(path: impl AsRef<FsPath>, value: &T) -> PersistResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Read a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: impl AsRef<FsPath>) -> PersistResult<T> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Serde helpers for the date formats used on disk.
pub(crate) mod formats {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Deserializer, Serializer};

    /// `"February 13, 2023, 14:05:00"`, `null` when unset.
    pub mod current_time {
        use super::*;

        const FORMAT: &str = "%B %d, %Y, %H:%M:%S";

        pub fn serialize<S: Serializer>(t: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_str(&t.format(FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(s) => NaiveDateTime::parse_from_str(&s, FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }

    /// `"February 13, 2023"`, read as midnight of that day.
    pub mod start_date {
        use super::*;

        const FORMAT: &str = "%B %d, %Y";

        pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&t.format(FORMAT).to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
            let s = String::deserialize(d)?;
            NaiveDate::parse_from_str(&s, FORMAT)
                .map(|date| date.and_time(NaiveTime::MIN))
                .map_err(serde::de::Error::custom)
        }
    }

    /// `"2023-02-13 14:05:00"`.
    pub mod memory_time {
        use super::*;

        pub(crate) const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

        pub fn serialize<S: Serializer>(t: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&t.format(FORMAT).to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
            let s = String::deserialize(d)?;
            NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
        }
    }

    pub mod memory_time_opt {
        use super::*;

        pub fn serialize<S: Serializer>(t: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
            match t {
                Some(t) => s.serialize_str(&t.format(memory_time::FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(s) => NaiveDateTime::parse_from_str(&s, memory_time::FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }

    /// Read `null` as the default value.
    pub fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }
}

/// Copy a folder tree. Only regular files and folders are copied.
pub async fn copy_dir(src: impl AsRef<FsPath>, dst: impl AsRef<FsPath>) -> PersistResult<()> {
    let mut pending = vec![(src.as_ref().to_path_buf(), dst.as_ref().to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let kind = entry.file_type().await?;
            let target = to.join(entry.file_name());
            if kind.is_dir() {
                pending.push((entry.path(), target));
            } else if kind.is_file() {
                fs::copy(entry.path(), &target).await?;
            } else {
                return Err(PersistError::InvalidFormat(format!(
                    "not a regular file: {}",
                    entry.path().display()
                )));
            }
        }
    }
    Ok(())
}

fn persona_memory_dir(persona_dir: &FsPath) -> PathBuf {
    persona_dir.join("bootstrap_memory")
}

/// Load a persona from `personas/<name>` and place it at `position`.
pub async fn load_persona(
    dir: impl AsRef<FsPath>,
    position: TilePos,
    cognition: Arc<dyn Cognition>,
    embedder: Arc<dyn Embedder>,
) -> PersistResult<Persona> {
    let dir = persona_memory_dir(dir.as_ref());

    let memory = nodes::load_associative_memory(&dir.join("associative_memory")).await?;
    let spatial: SpatialMemory = load_json(dir.join("spatial_memory.json")).await?;
    let scratch: Scratch = load_json(dir.join("scratch.json")).await?;

    let name = scratch.name.clone();
    let state = scratch.into_state(position)?;
    debug!(persona = %name, memories = memory.len(), "persona loaded");

    Ok(Persona::new(name, state, memory, spatial, cognition, embedder))
}

/// Write a persona's scratch state, spatial memory and memory stream.
pub async fn save_persona(dir: impl AsRef<FsPath>, persona: &Persona) -> PersistResult<()> {
    let dir = persona_memory_dir(dir.as_ref());

    save_json(dir.join("scratch.json"), &Scratch::from_state(persona.name(), persona.state())).await?;
    save_json(dir.join("spatial_memory.json"), persona.spatial()).await?;
    save_associative_memory(&dir.join("associative_memory"), persona.memory()).await
}

async fn save_associative_memory(dir: &FsPath, memory: &AssociativeMemory) -> PersistResult<()> {
    save_json(dir.join("embeddings.json"), memory.embeddings()).await?;
    save_json(dir.join("kw_strength.json"), &KeywordStrengthRecord::from_memory(memory)).await?;
    save_json(dir.join("nodes.json"), &nodes::node_records(memory)).await
}

/// Load a simulation folder and the maze it runs in.
///
/// Personas are placed where the environment file of the current step puts
/// them, and their current event is added to that tile.
pub async fn load_simulation(
    simulation_dir: impl AsRef<FsPath>,
    maze_dir: impl AsRef<FsPath>,
    cognition: Arc<dyn Cognition>,
    embedder: Arc<dyn Embedder>,
) -> PersistResult<Simulation> {
    let simulation_dir = simulation_dir.as_ref();
    let meta: SimulationMeta = load_json(simulation_dir.join("reverie").join("meta.json")).await?;

    let mut maze = load_maze(maze_dir.as_ref().join(&meta.maze_name), &meta.maze_name).await?;

    let environment: Environment = load_json(
        simulation_dir
            .join("environment")
            .join(format!("{}.json", meta.step)),
    )
    .await?;

    let mut personas = BTreeMap::new();
    for name in &meta.persona_names {
        let entry = environment.get(name).ok_or_else(|| {
            PersistError::InvalidFormat(format!("persona missing from environment file: {name}"))
        })?;
        let position = TilePos::new(entry.x, entry.y);

        let persona = load_persona(
            simulation_dir.join("personas").join(name),
            position,
            cognition.clone(),
            embedder.clone(),
        )
        .await?;

        maze.add_event(position, persona.current_event()).map_err(corrupt)?;
        personas.insert(name.clone(), persona);
    }

    let current_time = meta.curr_time.unwrap_or(meta.start_date);
    let simulation = Simulation::new(maze, personas, meta.start_date, current_time)
        .with_time_step(Duration::seconds(meta.sec_per_step))
        .with_step(meta.step)
        .with_forked_from(meta.fork_sim_code)
        .with_backup_interval(meta.backup_interval);

    info!(
        step = simulation.step(),
        personas = simulation.personas().len(),
        sim_time = %simulation.current_time(),
        "simulation loaded"
    );
    Ok(simulation)
}

/// Stores a running simulation in a simulations folder.
#[derive(Debug, Clone)]
pub struct FileStorage {
    simulations_dir: PathBuf,
    backup_dir: PathBuf,
    simulation: String,
    maze: String,
}

impl FileStorage {
    pub fn new(
        simulations_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        simulation: impl Into<String>,
        maze: impl Into<String>,
    ) -> Self {
        Self {
            simulations_dir: simulations_dir.into(),
            backup_dir: backup_dir.into(),
            simulation: simulation.into(),
            maze: maze.into(),
        }
    }

    pub fn simulation_dir(&self) -> PathBuf {
        self.simulations_dir.join(&self.simulation)
    }

    fn persona_dir(&self, name: &str) -> PathBuf {
        self.simulation_dir().join("personas").join(name)
    }

    fn backup_path(&self, step: u32) -> PathBuf {
        self.backup_dir.join(&self.simulation).join(step.to_string())
    }
}

#[async_trait]
impl SimulationStore for FileStorage {
    async fn save_movements(
        &self,
        step: u32,
        time: chrono::NaiveDateTime,
        movements: &BTreeMap<String, PersonaMovement>,
    ) -> crate::Result<()> {
        let file = MovementsFile::new(time, movements);
        let environment = records::environment(&self.maze, movements);

        let dir = self.simulation_dir();
        save_json(dir.join("movement").join(format!("{step}.json")), &file).await?;
        save_json(dir.join("environment").join(format!("{}.json", step + 1)), &environment).await?;
        Ok(())
    }

    async fn save_simulation(&self, simulation: &Simulation) -> crate::Result<()> {
        for (name, persona) in simulation.personas() {
            save_persona(self.persona_dir(name), persona).await?;
        }

        let meta = SimulationMeta::from_simulation(simulation, &self.maze);
        save_json(self.simulation_dir().join("reverie").join("meta.json"), &meta).await?;
        debug!(step = simulation.step(), "simulation saved");
        Ok(())
    }

    async fn backup(&self, step: u32) -> crate::Result<()> {
        let target = self.backup_path(step);
        copy_dir(self.simulation_dir(), &target).await?;
        info!(step, target = %target.display(), "simulation backed up");
        Ok(())
    }
}
