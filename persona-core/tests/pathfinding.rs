//! Route finding over tile grids.

use persona_core::testing::grid_maze;
use persona_core::{Error, Maze, TilePos};

fn route(points: &[(usize, usize)]) -> Vec<TilePos> {
    points.iter().copied().map(TilePos::from).collect()
}

/// 8x13 fixture with a fixed wall layout.
fn golden_maze() -> Maze {
    grid_maze(&[
        "#############",
        "  #     #   #",
        "# #  ##   # #",
        "# #  ## # # #",
        "#       #   #",
        "### # ### # #",
        "#         #  ",
        "#############",
    ])
}

#[test]
fn test_golden_same_tile() {
    let maze = golden_maze();
    let start = TilePos::new(1, 0);
    assert_eq!(maze.pathfind(start, start).unwrap(), vec![start]);
}

#[test]
fn test_golden_route() {
    let maze = golden_maze();
    let path = maze.pathfind(TilePos::new(0, 1), TilePos::new(12, 6)).unwrap();

    let expected = route(&[
        (0, 1),
        (1, 1),
        (1, 2),
        (1, 3),
        (1, 4),
        (2, 4),
        (3, 4),
        (4, 4),
        (5, 4),
        (6, 4),
        (7, 4),
        (7, 3),
        (7, 2),
        (8, 2),
        (9, 2),
        (9, 3),
        (9, 4),
        (10, 4),
        (11, 4),
        (11, 5),
        (11, 6),
        (12, 6),
    ]);
    assert_eq!(path.len(), 22);
    assert_eq!(path, expected);
}

#[test]
fn test_route_steps_are_adjacent_and_open() {
    let maze = grid_maze(&[
        "          ",
        " ######## ",
        "        # ",
        " ###### # ",
        "          ",
    ]);

    let path = maze.pathfind(TilePos::new(0, 2), TilePos::new(9, 4)).unwrap();

    assert_eq!(path.first(), Some(&TilePos::new(0, 2)));
    assert_eq!(path.last(), Some(&TilePos::new(9, 4)));
    for pair in path.windows(2) {
        let dx = pair[0].x.abs_diff(pair[1].x);
        let dy = pair[0].y.abs_diff(pair[1].y);
        assert_eq!(dx + dy, 1, "{} -> {} is not a single step", pair[0], pair[1]);
    }
    for pos in &path {
        assert!(!maze.get(*pos).unwrap().collision, "{pos} is a wall");
    }
    assert_eq!(path.len(), 12);
}

#[test]
fn test_walled_off_target() {
    let maze = grid_maze(&["   #  ", "   #  ", "   #  "]);
    let err = maze.pathfind(TilePos::new(0, 0), TilePos::new(5, 2)).unwrap_err();
    assert!(matches!(
        err,
        Error::Pathfind { from, to } if from == TilePos::new(0, 0) && to == TilePos::new(5, 2)
    ));
}
