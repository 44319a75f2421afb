//! Tile grid shared by all personas.
//!
//! The grid is `height` rows of `width` tiles, indexed `[y][x]`. Every tile
//! knows its resolved address, whether it blocks movement, and a set of
//! transient events (what is happening on it right now). A reverse index maps
//! sector, arena and object addresses plus spawn-location addresses to the
//! tiles they cover.

mod pathfind;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::memory::Spo;
use crate::path::{Level, Mode, Path};

/// Something happening on a tile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Event {
    pub spo: Spo,
    pub description: String,
}

impl Event {
    pub fn new(spo: Spo, description: impl Into<String>) -> Self {
        Self {
            spo,
            description: description.into(),
        }
    }

    /// Event carrying only a subject, the idle form of an object.
    pub fn subject_only(subject: impl Into<String>) -> Self {
        Self {
            spo: Spo::new(subject, "", ""),
            description: String::new(),
        }
    }
}

/// Grid coordinate. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct TilePos {
    pub x: usize,
    pub y: usize,
}

impl TilePos {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &TilePos) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(usize, usize)> for TilePos {
    fn from((x, y): (usize, usize)) -> Self {
        Self { x, y }
    }
}

impl From<TilePos> for (usize, usize) {
    fn from(p: TilePos) -> Self {
        (p.x, p.y)
    }
}

/// One grid cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tile {
    pub path: Path,
    pub spawning_location: Option<String>,
    pub collision: bool,
    pub events: BTreeSet<Event>,
}

impl Tile {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub fn with_collision(mut self, collision: bool) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_spawning_location(mut self, tag: impl Into<String>) -> Self {
        self.spawning_location = Some(tag.into());
        self
    }
}

/// Read-only view of the world used by judgment calls that need to check
/// candidate locations.
pub trait MazeAccess: Send + Sync {
    /// Tile at a coordinate, if inside the grid.
    fn tile(&self, pos: TilePos) -> Option<&Tile>;

    /// Whether some tile carries this address.
    fn exists(&self, path: &Path) -> bool;
}

/// The world grid.
#[derive(Debug, Clone)]
pub struct Maze {
    name: String,
    width: usize,
    height: usize,
    tile_size: u32,
    tiles: Vec<Vec<Tile>>,
    address_tiles: HashMap<Path, Vec<TilePos>>,
}

impl Maze {
    /// Build a maze from rows of tiles.
    ///
    /// Fails when the rows do not match the declared dimensions.
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        tile_size: u32,
        tiles: Vec<Vec<Tile>>,
    ) -> Result<Self> {
        if tiles.len() != height {
            return Err(Error::Corruption(format!(
                "maze has {} rows, expected {height}",
                tiles.len()
            )));
        }
        if let Some((i, row)) = tiles.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(Error::Corruption(format!(
                "maze row {i} has {} tiles, expected {width}",
                row.len()
            )));
        }

        let mut address_tiles: HashMap<Path, Vec<TilePos>> = HashMap::new();
        for (y, row) in tiles.iter().enumerate() {
            for (x, tile) in row.iter().enumerate() {
                let pos = TilePos::new(x, y);
                let level = tile.path.level();
                for l in [Level::Sector, Level::Arena, Level::Object] {
                    if level >= l {
                        address_tiles.entry(tile.path.at(l)).or_default().push(pos);
                    }
                }
                if let Some(tag) = &tile.spawning_location {
                    let spawn = Path::special(Mode::SpawnLoc, tag)?;
                    address_tiles.entry(spawn).or_default().push(pos);
                }
            }
        }

        Ok(Self {
            name: name.into(),
            width,
            height,
            tile_size,
            tiles,
            address_tiles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tile at a coordinate that must be inside the grid.
    pub fn get(&self, pos: TilePos) -> Result<&Tile> {
        self.tiles
            .get(pos.y)
            .and_then(|row| row.get(pos.x))
            .ok_or_else(|| Error::Invariant(format!("tile {pos} outside the maze")))
    }

    fn get_mut(&mut self, pos: TilePos) -> Result<&mut Tile> {
        self.tiles
            .get_mut(pos.y)
            .and_then(|row| row.get_mut(pos.x))
            .ok_or_else(|| Error::Invariant(format!("tile {pos} outside the maze")))
    }

    /// Tiles covered by an address.
    pub fn tiles_for(&self, path: &Path) -> Option<&[TilePos]> {
        self.address_tiles.get(path).map(Vec::as_slice)
    }

    /// Square of side `2r + 1` around `pos`, clamped to the grid, x outer.
    pub fn nearby_tiles(&self, pos: TilePos, radius: usize) -> Vec<TilePos> {
        let left = pos.x.saturating_sub(radius);
        let right = (pos.x + radius + 1).min(self.width);
        let top = pos.y.saturating_sub(radius);
        let bottom = (pos.y + radius + 1).min(self.height);

        let mut nearby = Vec::with_capacity((right - left) * (bottom - top));
        for x in left..right {
            for y in top..bottom {
                nearby.push(TilePos::new(x, y));
            }
        }
        nearby
    }

    pub fn add_event(&mut self, pos: TilePos, event: Event) -> Result<()> {
        self.get_mut(pos)?.events.insert(event);
        Ok(())
    }

    pub fn remove_event(&mut self, pos: TilePos, event: &Event) -> Result<()> {
        self.get_mut(pos)?.events.remove(event);
        Ok(())
    }

    /// Drop every event whose subject is `subject`.
    pub fn remove_subject_events(&mut self, pos: TilePos, subject: &str) -> Result<()> {
        self.get_mut(pos)?
            .events
            .retain(|ev| ev.spo.subject != subject);
        Ok(())
    }

    /// Replace an event by its subject-only form.
    pub fn turn_event_idle(&mut self, pos: TilePos, event: &Event) -> Result<()> {
        let tile = self.get_mut(pos)?;
        tile.events.remove(event);
        tile.events.insert(Event::subject_only(event.spo.subject.clone()));
        Ok(())
    }
}

impl MazeAccess for Maze {
    fn tile(&self, pos: TilePos) -> Option<&Tile> {
        self.tiles.get(pos.y).and_then(|row| row.get(pos.x))
    }

    fn exists(&self, path: &Path) -> bool {
        self.address_tiles.contains_key(path)
    }
}
