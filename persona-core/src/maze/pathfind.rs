//! Wavefront shortest paths over the collision grid.

use super::{Maze, TilePos};
use crate::error::{Error, Result};

/// Maximum wavefront expansions before giving up.
pub const MAX_WAVEFRONT_STEPS: u32 = 150;

impl Maze {
    /// Shortest 4-connected route from `start` to `end`, both included.
    ///
    /// Ties are broken by walking back from the end preferring north, west,
    /// south and then east.
    pub fn pathfind(&self, start: TilePos, end: TilePos) -> Result<Vec<TilePos>> {
        self.get(start)?;
        self.get(end)?;

        let blocked = |x: usize, y: usize| self.tiles[y][x].collision;
        let mut dist = vec![vec![0u32; self.width]; self.height];
        dist[start.y][start.x] = 1;

        let mut k = 0;
        while dist[end.y][end.x] == 0 && k < MAX_WAVEFRONT_STEPS {
            k += 1;
            for y in 0..self.height {
                for x in 0..self.width {
                    if dist[y][x] != k {
                        continue;
                    }
                    if y > 0 && dist[y - 1][x] == 0 && !blocked(x, y - 1) {
                        dist[y - 1][x] = k + 1;
                    }
                    if x > 0 && dist[y][x - 1] == 0 && !blocked(x - 1, y) {
                        dist[y][x - 1] = k + 1;
                    }
                    if y + 1 < self.height && dist[y + 1][x] == 0 && !blocked(x, y + 1) {
                        dist[y + 1][x] = k + 1;
                    }
                    if x + 1 < self.width && dist[y][x + 1] == 0 && !blocked(x + 1, y) {
                        dist[y][x + 1] = k + 1;
                    }
                }
            }
        }

        if dist[end.y][end.x] == 0 {
            return Err(Error::Pathfind {
                from: start,
                to: end,
            });
        }

        let (mut x, mut y) = (end.x, end.y);
        let mut k = dist[y][x];
        let mut path = Vec::with_capacity(k as usize);
        path.push(end);
        while k > 1 {
            if y > 0 && dist[y - 1][x] == k - 1 {
                y -= 1;
            } else if x > 0 && dist[y][x - 1] == k - 1 {
                x -= 1;
            } else if y + 1 < self.height && dist[y + 1][x] == k - 1 {
                y += 1;
            } else if x + 1 < self.width && dist[y][x + 1] == k - 1 {
                x += 1;
            } else {
                return Err(Error::Invariant(format!(
                    "wavefront has no predecessor at ({x}, {y})"
                )));
            }
            path.push(TilePos::new(x, y));
            k -= 1;
        }

        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maze::Tile;
    use crate::path::Path;

    fn open_grid(width: usize, height: usize, walls: &[(usize, usize)]) -> Maze {
        let tiles = (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| {
                        Tile::new(Path::parse("w:s:a").unwrap())
                            .with_collision(walls.contains(&(x, y)))
                    })
                    .collect()
            })
            .collect();
        Maze::new("grid", width, height, 32, tiles).unwrap()
    }

    #[test]
    fn test_same_tile() {
        let maze = open_grid(3, 3, &[]);
        let p = TilePos::new(1, 1);
        assert_eq!(maze.pathfind(p, p).unwrap(), vec![p]);
    }

    #[test]
    fn test_open_grid_is_manhattan() {
        let maze = open_grid(6, 5, &[]);
        let path = maze
            .pathfind(TilePos::new(0, 0), TilePos::new(5, 4))
            .unwrap();
        assert_eq!(path.len(), 5 + 4 + 1);
        for pair in path.windows(2) {
            let dx = pair[0].x.abs_diff(pair[1].x);
            let dy = pair[0].y.abs_diff(pair[1].y);
            assert_eq!(dx + dy, 1);
        }
    }

    #[test]
    fn test_unreachable() {
        let maze = open_grid(3, 3, &[(1, 0), (1, 1), (1, 2)]);
        let err = maze
            .pathfind(TilePos::new(0, 0), TilePos::new(2, 2))
            .unwrap_err();
        assert!(matches!(err, Error::Pathfind { .. }));
    }

    #[test]
    fn test_out_of_bounds() {
        let maze = open_grid(2, 2, &[]);
        assert!(maze.pathfind(TilePos::new(0, 0), TilePos::new(4, 0)).is_err());
    }
}
