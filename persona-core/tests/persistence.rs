//! Saving a running simulation to disk and picking it up again.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use persona_core::persist::{load_maze, load_simulation, FileStorage, MovementsFile};
use persona_core::testing::sample_persona;
use persona_core::{
    HashEmbedder, Persona, ScriptedCognition, Simulation, SimulationStore, TilePos,
};
use std::path::Path as FsPath;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;

const WIDTH: usize = 5;
const HEIGHT: usize = 3;

fn eight_am() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

async fn write(dir: &FsPath, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    fs::write(path, content).await.unwrap();
}

fn layer(f: impl Fn(usize, usize) -> &'static str) -> String {
    (0..HEIGHT)
        .flat_map(|y| (0..WIDTH).map(move |x| (x, y)))
        .map(|(x, y)| f(x, y))
        .collect::<Vec<_>>()
        .join(", ")
}

/// An open 5x3 cafe kitchen with a stove in the far corner.
async fn write_maze(root: &FsPath) {
    let m = root.join("the_ville");
    write(
        &m,
        "matrix/maze_meta_info.json",
        &format!(
            r#"{{"world_name": "the Ville", "maze_width": {WIDTH}, "maze_height": {HEIGHT}, "sq_tile_size": 32}}"#
        ),
    )
    .await;
    write(&m, "matrix/special_blocks/world_blocks.csv", "100, the Ville\n").await;
    write(&m, "matrix/special_blocks/sector_blocks.csv", "200, the Ville, cafe\n").await;
    write(&m, "matrix/special_blocks/arena_blocks.csv", "300, the Ville, cafe, kitchen\n").await;
    write(&m, "matrix/special_blocks/game_object_blocks.csv", "400, the Ville, <all>, stove\n").await;
    write(&m, "matrix/special_blocks/spawning_location_blocks.csv", "").await;

    write(&m, "matrix/maze/collision_maze.csv", &layer(|_, _| "0")).await;
    write(&m, "matrix/maze/sector_maze.csv", &layer(|_, _| "200")).await;
    write(&m, "matrix/maze/arena_maze.csv", &layer(|_, _| "300")).await;
    write(
        &m,
        "matrix/maze/game_object_maze.csv",
        &layer(|x, y| if (x, y) == (WIDTH - 1, HEIGHT - 1) { "400" } else { "0" }),
    )
    .await;
    write(&m, "matrix/maze/spawning_location_maze.csv", &layer(|_, _| "0")).await;
}

fn quiet_persona(name: &str, pos: TilePos) -> Persona {
    let cognition = ScriptedCognition::new()
        .with_decide_to_talk(false)
        .with_decide_to_wait(false);
    sample_persona(name, pos).with_cognition(Arc::new(cognition))
}

async fn new_simulation(maze_root: &FsPath) -> Simulation {
    let maze = load_maze(maze_root.join("the_ville"), "the_ville").await.unwrap();
    let personas = [
        quiet_persona("Klaus Mueller", TilePos::new(0, 0)),
        quiet_persona("Maria Lopez", TilePos::new(0, 2)),
    ]
    .into_iter()
    .map(|p| (p.name().to_string(), p))
    .collect();
    Simulation::new(maze, personas, eight_am(), eight_am())
}

#[tokio::test]
async fn test_resume_from_disk() {
    let mazes = TempDir::new().unwrap();
    let sims = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    write_maze(mazes.path()).await;

    let storage = FileStorage::new(sims.path(), backups.path(), "july", "the_ville");
    let mut sim = new_simulation(mazes.path()).await.with_backup_interval(2);
    storage.save_simulation(&sim).await.unwrap();

    sim.run(3, &storage).await.unwrap();
    assert_eq!(sim.step(), 3);

    let loaded = load_simulation(
        storage.simulation_dir(),
        mazes.path(),
        Arc::new(ScriptedCognition::new()),
        Arc::new(HashEmbedder::default()),
    )
    .await
    .unwrap();

    assert_eq!(loaded.step(), 3);
    assert_eq!(loaded.current_time(), eight_am() + Duration::seconds(30));
    assert_eq!(loaded.start_time(), NaiveDate::from_ymd_opt(2023, 2, 13).unwrap().and_hms_opt(0, 0, 0).unwrap());
    assert_eq!(loaded.time_step(), Duration::seconds(10));
    assert_eq!(loaded.backup_interval(), 2);
    assert_eq!(loaded.personas().len(), 2);

    for (name, original) in sim.personas() {
        let restored = loaded.persona(name).unwrap();
        assert_eq!(restored.state(), original.state(), "{name} state differs");
        assert_eq!(restored.memory().nodes(), original.memory().nodes(), "{name} memory differs");
        assert_eq!(restored.memory().embeddings(), original.memory().embeddings());
        assert_eq!(restored.memory().event_strength(), original.memory().event_strength());
        assert_eq!(restored.spatial(), original.spatial());

        let tile = loaded.maze().get(restored.position()).unwrap();
        assert!(tile.events.contains(&restored.current_event()));
    }
}

#[tokio::test]
async fn test_step_files_and_backups() {
    let mazes = TempDir::new().unwrap();
    let sims = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    write_maze(mazes.path()).await;

    let storage = FileStorage::new(sims.path(), backups.path(), "july", "the_ville");
    let mut sim = new_simulation(mazes.path()).await.with_backup_interval(2);
    storage.save_simulation(&sim).await.unwrap();
    sim.run(3, &storage).await.unwrap();

    let dir = storage.simulation_dir();
    for step in 0..3 {
        let content = fs::read_to_string(dir.join("movement").join(format!("{step}.json")))
            .await
            .unwrap();
        let file: MovementsFile = serde_json::from_str(&content).unwrap();
        assert_eq!(file.persona.len(), 2);
        assert!(file.persona.values().all(|m| m.chat.is_none()));
    }
    for step in 1..=3 {
        assert!(fs::try_exists(dir.join("environment").join(format!("{step}.json")))
            .await
            .unwrap());
    }

    // Backups are taken before steps 0 and 2
    let backup_root = backups.path().join("july");
    assert!(fs::try_exists(backup_root.join("0").join("reverie").join("meta.json")).await.unwrap());
    assert!(fs::try_exists(backup_root.join("2").join("movement").join("1.json")).await.unwrap());
    assert!(!fs::try_exists(backup_root.join("1")).await.unwrap());
}
