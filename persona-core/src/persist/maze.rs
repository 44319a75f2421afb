//! Maze folders.
//!
//! ```text
//! <maze>/matrix/
//!   maze_meta_info.json
//!   special_blocks/{world,sector,arena,game_object,spawning_location}_blocks.csv
//!   maze/{collision,sector,arena,game_object,spawning_location}_maze.csv
//! ```
//!
//! Block files map a numeric tile color (first column) to a name (last
//! column). Each maze file is a single row of `width * height` colors.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path as FsPath;
use tokio::fs;
use tracing::debug;

use super::{corrupt, PersistError, PersistResult};
use crate::maze::{Event, Maze, Tile};
use crate::path::{Level, Path};

#[derive(Debug, Deserialize)]
struct MazeMetaInfo {
    world_name: String,
    maze_width: usize,
    maze_height: usize,
    sq_tile_size: u32,
}

fn parse_rows(content: &str) -> Vec<Vec<String>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(|cell| cell.trim().trim_matches('"').trim().to_string())
                .collect()
        })
        .collect()
}

async fn read_rows(path: &FsPath) -> PersistResult<Vec<Vec<String>>> {
    let content = fs::read_to_string(path).await?;
    Ok(parse_rows(&content))
}

/// Color to name from a block file.
async fn read_blocks(path: &FsPath) -> PersistResult<HashMap<String, String>> {
    let rows = read_rows(path).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let name = row.last()?.clone();
            let color = row.into_iter().next()?;
            Some((color, name))
        })
        .collect())
}

/// The single row of a maze file, checked against the grid size.
async fn read_layer(path: &FsPath, cells: usize) -> PersistResult<Vec<String>> {
    let layer = read_rows(path).await?.into_iter().next().unwrap_or_default();
    if layer.len() < cells {
        return Err(PersistError::InvalidFormat(format!(
            "{} has {} cells, expected {cells}",
            path.display(),
            layer.len()
        )));
    }
    Ok(layer)
}

/// Load the maze stored in `dir`.
pub async fn load_maze(dir: impl AsRef<FsPath>, name: &str) -> PersistResult<Maze> {
    let matrix = dir.as_ref().join("matrix");
    let meta: MazeMetaInfo = super::load_json(matrix.join("maze_meta_info.json")).await?;
    let (width, height) = (meta.maze_width, meta.maze_height);
    let cells = width * height;

    let blocks = matrix.join("special_blocks");
    let world = read_rows(&blocks.join("world_blocks.csv"))
        .await?
        .first()
        .and_then(|row| row.last().cloned())
        .ok_or_else(|| PersistError::InvalidFormat("world_blocks.csv is empty".to_string()))?;
    let sectors = read_blocks(&blocks.join("sector_blocks.csv")).await?;
    let arenas = read_blocks(&blocks.join("arena_blocks.csv")).await?;
    let objects = read_blocks(&blocks.join("game_object_blocks.csv")).await?;
    let spawns = read_blocks(&blocks.join("spawning_location_blocks.csv")).await?;

    let layers = matrix.join("maze");
    let collision = read_layer(&layers.join("collision_maze.csv"), cells).await?;
    let sector = read_layer(&layers.join("sector_maze.csv"), cells).await?;
    let arena = read_layer(&layers.join("arena_maze.csv"), cells).await?;
    let object = read_layer(&layers.join("game_object_maze.csv"), cells).await?;
    let spawn = read_layer(&layers.join("spawning_location_maze.csv"), cells).await?;

    let world_path = Path::parse(&world).map_err(corrupt)?;
    let mut tiles = Vec::with_capacity(height);
    for y in 0..height {
        let mut row = Vec::with_capacity(width);
        for x in 0..width {
            let i = y * width + x;

            let mut path = world_path.clone();
            if let Some(name) = sectors.get(&sector[i]) {
                path = path.with(Level::Sector, name.as_str());
            }
            if let Some(name) = arenas.get(&arena[i]) {
                path = path.with(Level::Arena, name.as_str());
            }
            if let Some(name) = objects.get(&object[i]) {
                path = path.with(Level::Object, name.as_str());
            }

            let is_object = path.is_object();
            let mut tile = Tile::new(path).with_collision(collision[i] != "0");
            if let Some(tag) = spawns.get(&spawn[i]) {
                tile = tile.with_spawning_location(tag.as_str());
            }
            if is_object {
                tile.events.insert(Event::subject_only(tile.path.to_string()));
            }
            row.push(tile);
        }
        tiles.push(row);
    }

    debug!(maze = name, world = %world, width, height, "maze loaded");
    Maze::new(meta.world_name, width, height, meta.sq_tile_size, tiles).map_err(corrupt)
}
