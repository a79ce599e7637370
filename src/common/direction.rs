//! Cardinal directions on the tile grid

use std::fmt;

/// One of the four grid directions.
///
/// Each direction carries the number of left (counter-clockwise) quarter
/// turns needed to reach it from `Up`, so composing two directions is a
/// single addition modulo four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    /// Number of left turns from `Up` (0..=3)
    pub fn left_turns(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Left => 1,
            Direction::Down => 2,
            Direction::Right => 3,
        }
    }

    /// Direction reached after `turns` left turns from `Up`
    pub fn from_left_turns(turns: u8) -> Self {
        match turns % 4 {
            0 => Direction::Up,
            1 => Direction::Left,
            2 => Direction::Down,
            _ => Direction::Right,
        }
    }

    pub fn rotate_left(self) -> Self {
        Self::from_left_turns(self.left_turns() + 1)
    }

    pub fn rotate_right(self) -> Self {
        Self::from_left_turns(self.left_turns() + 3)
    }

    /// Rotate `self` left by as many turns as `relative` is away from `Up`.
    ///
    /// Maps a heading expressed relative to a start direction onto the
    /// absolute frame, when `self` is that start direction.
    pub fn compose(self, relative: Direction) -> Self {
        Self::from_left_turns(self.left_turns() + relative.left_turns())
    }

    /// Unit tile step taken when moving one tile in this direction
    pub fn step(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Absolute heading in degrees (counter-clockwise, Right = 0)
    pub fn heading_degrees(self) -> f64 {
        match self {
            Direction::Up => 90.0,
            Direction::Down => -90.0,
            Direction::Right => 0.0,
            Direction::Left => 180.0,
        }
    }

    /// Cardinal direction closest to a heading in degrees
    pub fn nearest(heading_deg: f64) -> Self {
        let turns = (heading_deg.rem_euclid(360.0) / 90.0).round() as u8;
        // 0 quarter turns from Right is Right, 1 is Up, ...
        Direction::Right.compose(Self::from_left_turns(turns))
    }

    /// Compass letter, with Up as north
    pub fn as_cardinal(self) -> char {
        match self {
            Direction::Up => 'N',
            Direction::Down => 'S',
            Direction::Left => 'W',
            Direction::Right => 'E',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Direction::Up => "U",
            Direction::Down => "D",
            Direction::Left => "L",
            Direction::Right => "R",
        };
        f.write_str(letter)
    }
}
