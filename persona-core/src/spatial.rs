//! Per-persona record of discovered locations.
//!
//! Stored as nested maps `world -> sector -> arena -> {objects}` and
//! serialized in that shape. Registration only ever adds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::path::{Level, Path};

type Arenas = BTreeMap<String, BTreeSet<String>>;
type Sectors = BTreeMap<String, Arenas>;

/// Tree of known locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpatialMemory {
    worlds: BTreeMap<String, Sectors>,
}

impl SpatialMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every populated prefix of `path`.
    pub fn register(&mut self, path: &Path) {
        if path.world().is_empty() {
            return;
        }
        let sectors = self.worlds.entry(path.world().to_string()).or_default();

        if path.sector().is_empty() {
            return;
        }
        let arenas = sectors.entry(path.sector().to_string()).or_default();

        if path.arena().is_empty() {
            return;
        }
        let objects = arenas.entry(path.arena().to_string()).or_default();

        if !path.object().is_empty() {
            objects.insert(path.object().to_string());
        }
    }

    /// Names known at `level` below the matching prefix of `path`.
    ///
    /// World level ignores `path`. A missing prefix yields nothing.
    pub fn known(&self, path: &Path, level: Level) -> Vec<String> {
        let names: Vec<&String> = match level {
            Level::World => self.worlds.keys().collect(),
            Level::Sector => self
                .worlds
                .get(path.world())
                .map(|s| s.keys().collect())
                .unwrap_or_default(),
            Level::Arena => self
                .worlds
                .get(path.world())
                .and_then(|s| s.get(path.sector()))
                .map(|a| a.keys().collect())
                .unwrap_or_default(),
            Level::Object => self
                .worlds
                .get(path.world())
                .and_then(|s| s.get(path.sector()))
                .and_then(|a| a.get(path.arena()))
                .map(|o| o.iter().collect())
                .unwrap_or_default(),
        };
        names.into_iter().cloned().collect()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn test_register_and_known() {
        let mut mem = SpatialMemory::new();
        mem.register(&p("ville:cafe:kitchen:stove"));
        mem.register(&p("ville:cafe:kitchen:sink"));
        mem.register(&p("ville:park"));

        assert_eq!(mem.known(&p("anything"), Level::World), vec!["ville"]);
        assert_eq!(mem.known(&p("ville"), Level::Sector), vec!["cafe", "park"]);
        assert_eq!(mem.known(&p("ville:cafe"), Level::Arena), vec!["kitchen"]);
        assert_eq!(
            mem.known(&p("ville:cafe:kitchen"), Level::Object),
            vec!["sink", "stove"]
        );
        assert!(mem.known(&p("ville:park"), Level::Arena).is_empty());
        assert!(mem.known(&p("nowhere"), Level::Sector).is_empty());
    }

    #[test]
    fn test_register_is_order_independent() {
        let paths = ["w:s1:a1:o1", "w:s1:a2", "w:s2:a3:o2", "w:s1:a1:o3"];
        let mut forward = SpatialMemory::new();
        let mut backward = SpatialMemory::new();
        for path in paths {
            forward.register(&p(path));
        }
        for path in paths.iter().rev() {
            backward.register(&p(path));
            backward.register(&p(path));
        }
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_serialized_shape() {
        let mut mem = SpatialMemory::new();
        mem.register(&p("w:s:a:o"));
        let json = serde_json::to_value(&mem).unwrap();
        assert_eq!(json, serde_json::json!({"w": {"s": {"a": ["o"]}}}));
    }
}
