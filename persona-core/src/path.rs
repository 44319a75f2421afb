//! Hierarchical world addresses.
//!
//! A [`Path`] names a place as `world:sector:arena:object`. Unset trailing
//! segments are empty strings. Special addresses reuse the same shape:
//!
//! - `<persona> Name` in the world segment targets another persona
//! - `<waiting> X: 3, Y: 7` in the world segment targets a coordinate
//! - `<spawn_loc> tag` in the world segment names a spawn location
//! - `<random>` as the object segment means any tile of the arena
//!
//! Sentinel detection is substring based across all segments, so a location
//! whose real name contains a sentinel token is misread as special.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Depth of a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    World,
    Sector,
    Arena,
    Object,
}

impl Level {
    /// All levels from the root down.
    pub const ALL: [Level; 4] = [Level::World, Level::Sector, Level::Arena, Level::Object];

    fn index(self) -> usize {
        self as usize
    }
}

/// Address modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Normal,
    Persona,
    Waiting,
    SpawnLoc,
    Random,
}

impl Mode {
    /// Sentinel token for this mode. Empty for [`Mode::Normal`].
    pub fn token(self) -> &'static str {
        match self {
            Mode::Normal => "",
            Mode::Persona => "<persona>",
            Mode::Waiting => "<waiting>",
            Mode::SpawnLoc => "<spawn_loc>",
            Mode::Random => "<random>",
        }
    }

    /// Modes carried as a prefix of the world segment.
    const PREFIXED: [Mode; 3] = [Mode::Waiting, Mode::Persona, Mode::SpawnLoc];
}

/// Format of the argument of a waiting address.
pub fn waiting_arg(x: usize, y: usize) -> String {
    format!("X: {x}, Y: {y}")
}

/// Parse the argument of a waiting address back into a coordinate.
pub fn parse_waiting_arg(arg: &str) -> Result<(usize, usize)> {
    let corrupt = || Error::Corruption(format!("malformed waiting argument: {arg:?}"));
    let (x, y) = arg.split_once(',').ok_or_else(corrupt)?;
    let x = x.trim().strip_prefix("X:").ok_or_else(corrupt)?;
    let y = y.trim().strip_prefix("Y:").ok_or_else(corrupt)?;
    let x = x.trim().parse().map_err(|_| corrupt())?;
    let y = y.trim().parse().map_err(|_| corrupt())?;
    Ok((x, y))
}

/// A four level address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: [String; 4],
}

impl Path {
    /// Parse a colon separated address of at most four parts.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 4 {
            return Err(Error::Corruption(format!(
                "address has {} parts, expected at most 4: {s:?}",
                parts.len()
            )));
        }

        let mut path = Path::default();
        for (slot, part) in path.segments.iter_mut().zip(parts) {
            *slot = part.to_string();
        }
        Ok(path)
    }

    /// Build a path from explicit segments.
    pub fn new(
        world: impl Into<String>,
        sector: impl Into<String>,
        arena: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            segments: [world.into(), sector.into(), arena.into(), object.into()],
        }
    }

    /// Build an address in the given mode.
    ///
    /// Normal parses `arg` as-is; random parses it and sets the object to
    /// `<random>`; the prefixed modes put `"<token> arg"` in front.
    pub fn special(mode: Mode, arg: &str) -> Result<Self> {
        match mode {
            Mode::Normal => Self::parse(arg),
            Mode::Random => Ok(Self::parse(arg)?.with(Level::Object, Mode::Random.token())),
            _ => Self::parse(&format!("{} {arg}", mode.token())),
        }
    }

    /// Copy with one segment replaced.
    pub fn with(&self, level: Level, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.segments[level.index()] = value.into();
        copy
    }

    pub fn world(&self) -> &str {
        &self.segments[0]
    }

    pub fn sector(&self) -> &str {
        &self.segments[1]
    }

    pub fn arena(&self) -> &str {
        &self.segments[2]
    }

    pub fn object(&self) -> &str {
        &self.segments[3]
    }

    /// Segment at a single level.
    pub fn get(&self, level: Level) -> &str {
        &self.segments[level.index()]
    }

    /// Keep segments down to and including `level`.
    pub fn at(&self, level: Level) -> Self {
        let mut out = Path::default();
        for l in Level::ALL.iter().take(level.index() + 1) {
            out.segments[l.index()] = self.segments[l.index()].clone();
        }
        out
    }

    /// Deepest populated level.
    pub fn level(&self) -> Level {
        if self.sector().is_empty() {
            Level::World
        } else if self.arena().is_empty() {
            Level::Sector
        } else if self.object().is_empty() {
            Level::Arena
        } else {
            Level::Object
        }
    }

    /// Name at the deepest populated level.
    pub fn base(&self) -> &str {
        self.segments
            .iter()
            .rev()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Every non-empty segment of `mask` equals the same segment here.
    pub fn matches(&self, mask: &Path) -> bool {
        self.segments
            .iter()
            .zip(mask.segments.iter())
            .all(|(mine, theirs)| theirs.is_empty() || mine == theirs)
    }

    /// Substring test across all segments.
    pub fn contains(&self, needle: &str) -> bool {
        self.segments.iter().any(|s| s.contains(needle))
    }

    /// Whether any segment carries the sentinel of `mode`.
    pub fn has_mode(&self, mode: Mode) -> bool {
        self.contains(mode.token())
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(String::is_empty)
    }

    pub fn is_object(&self) -> bool {
        !self.object().is_empty()
    }

    /// Argument of a prefixed special address.
    ///
    /// Taken from the rendered address so arguments containing `:` survive.
    pub fn arg(&self) -> String {
        let rendered = self.to_string();
        Mode::PREFIXED
            .iter()
            .find_map(|mode| rendered.strip_prefix(mode.token()))
            .map(|rest| rest.trim().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.world())?;
        for segment in &self.segments[1..] {
            if segment.is_empty() {
                break;
            }
            write!(f, ":{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Path> for String {
    fn from(p: Path) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let p = Path::parse("the Ville:Hobbs Cafe:cafe:counter").unwrap();
        assert_eq!(p.world(), "the Ville");
        assert_eq!(p.object(), "counter");
        assert_eq!(p.to_string(), "the Ville:Hobbs Cafe:cafe:counter");

        let short = Path::parse("the Ville:Hobbs Cafe").unwrap();
        assert_eq!(short.level(), Level::Sector);
        assert_eq!(short.to_string(), "the Ville:Hobbs Cafe");
    }

    #[test]
    fn test_parse_too_many_parts() {
        assert!(matches!(Path::parse("a:b:c:d:e"), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_base_and_at() {
        let p = Path::parse("w:s:a:o").unwrap();
        assert_eq!(p.base(), "o");
        assert_eq!(p.at(Level::Arena).to_string(), "w:s:a");
        assert_eq!(p.at(Level::World).base(), "w");
        assert_eq!(p.get(Level::Sector), "s");
    }

    #[test]
    fn test_matches_mask() {
        let p = Path::parse("w:s:a:o").unwrap();
        assert!(p.matches(&Path::parse("w:s:a").unwrap()));
        assert!(p.matches(&Path::new("", "s", "", "")));
        assert!(!p.matches(&Path::parse("w:other").unwrap()));
    }

    #[test]
    fn test_special_paths() {
        let persona = Path::special(Mode::Persona, "Maria Lopez").unwrap();
        assert!(persona.has_mode(Mode::Persona));
        assert_eq!(persona.arg(), "Maria Lopez");

        let waiting = Path::special(Mode::Waiting, &waiting_arg(4, 9)).unwrap();
        assert!(waiting.has_mode(Mode::Waiting));
        assert_eq!(parse_waiting_arg(&waiting.arg()).unwrap(), (4, 9));

        let random = Path::special(Mode::Random, "w:s:a").unwrap();
        assert!(random.has_mode(Mode::Random));
        assert_eq!(random.object(), Mode::Random.token());
        assert_eq!(random.to_string(), "w:s:a:<random>");
    }

    #[test]
    fn test_sentinel_substring_detection() {
        let odd = Path::parse("w:the <persona> lounge").unwrap();
        assert!(odd.has_mode(Mode::Persona));
        assert_eq!(odd.arg(), "");
    }

    #[test]
    fn test_bad_waiting_arg() {
        assert!(parse_waiting_arg("X: a, Y: 2").is_err());
        assert!(parse_waiting_arg("somewhere").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let p = Path::parse("w:s").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"w:s\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
