use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

use super::{Movement, Persona};
use crate::error::{Error, Result};
use crate::maze::{Event, Maze, TilePos};
use crate::path::{parse_waiting_arg, Level, Mode, Path};

/// Candidate destination tiles considered when routing.
const TARGET_SAMPLE: usize = 4;

impl Persona {
    /// Route towards the activity address and take one step along the route.
    pub(super) fn execute(
        &mut self,
        maze: &Maze,
        others: &BTreeMap<String, Persona>,
        address: &Path,
    ) -> Result<Movement> {
        if address.has_mode(Mode::Random) && self.state.planned_path.is_empty() {
            self.state.activity.path_set = false;
        }

        if !self.state.activity.path_set {
            let here = self.state.position;
            let mut rng = rand::thread_rng();

            let mut targets = self.target_tiles(maze, others, address)?;
            targets.shuffle(&mut rng);
            targets.truncate(TARGET_SAMPLE);

            let mut free = Vec::with_capacity(targets.len());
            for pos in &targets {
                let occupied = maze.get(*pos)?.events.iter().any(|e| {
                    e.spo.subject == self.name || others.contains_key(&e.spo.subject)
                });
                if !occupied {
                    free.push(*pos);
                }
            }
            if !free.is_empty() {
                targets = free;
            }

            let mut best: Option<Vec<TilePos>> = None;
            let mut last_err = None;
            for target in targets {
                match maze.pathfind(here, target) {
                    Ok(route) => {
                        if best.as_ref().map_or(true, |b| route.len() < b.len()) {
                            best = Some(route);
                        }
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            let route = match (best, last_err) {
                (Some(route), _) => route,
                (None, Some(err)) => return Err(err),
                (None, None) => {
                    return Err(Error::Invariant(format!("no target tiles for {address}")))
                }
            };

            debug!(address = %address, length = route.len(), "route planned");
            self.state.planned_path = route.into_iter().skip(1).collect();
            self.state.activity.path_set = true;
        }

        let tile = self
            .state
            .planned_path
            .pop_front()
            .unwrap_or(self.state.position);

        let activity = &self.state.activity;
        Ok(Movement {
            tile,
            pronunciatio: activity.pronunciatio.clone(),
            event: Event::new(
                activity.spo.clone(),
                format!("{} @ {}", activity.description, activity.address),
            ),
        })
    }

    fn target_tiles(
        &self,
        maze: &Maze,
        others: &BTreeMap<String, Persona>,
        address: &Path,
    ) -> Result<Vec<TilePos>> {
        if address.has_mode(Mode::Persona) {
            let name = address.arg();
            let other = others
                .get(&name)
                .ok_or_else(|| Error::Invariant(format!("unknown persona {name} in {address}")))?;

            // Meet halfway.
            let route = maze.pathfind(self.state.position, other.position())?;
            if route.len() <= 2 {
                return Ok(route.into_iter().take(1).collect());
            }
            let mid = route.len() / 2;
            let near = maze.pathfind(self.state.position, route[mid])?;
            let far = maze.pathfind(self.state.position, route[mid + 1])?;
            return Ok(vec![if near.len() <= far.len() {
                route[mid]
            } else {
                route[mid + 1]
            }]);
        }

        if address.has_mode(Mode::Waiting) {
            let (x, y) = parse_waiting_arg(&address.arg())?;
            return Ok(vec![TilePos::new(x, y)]);
        }

        if address.has_mode(Mode::Random) {
            let arena = address.at(Level::Arena);
            let tiles = maze
                .tiles_for(&arena)
                .ok_or_else(|| Error::Invariant(format!("address {arena} not in the maze")))?;
            return Ok(tiles
                .choose(&mut rand::thread_rng())
                .copied()
                .into_iter()
                .collect());
        }

        maze.tiles_for(address)
            .map(<[TilePos]>::to_vec)
            .ok_or_else(|| Error::Invariant(format!("address {address} not in the maze")))
    }
}
