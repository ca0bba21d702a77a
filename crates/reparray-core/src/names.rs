//! Readable identifier generation.
//!
//! Identifiers are two adjectives followed by a name (`QuietBraveFalcon`),
//! drawn from an owned, seedable generator so tests can reproduce them.

use std::fs;
use std::io;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::entry::EntryGuid;

/// Attempts at a collision-free name before falling back to a GUID string.
pub const UNIQUE_ATTEMPTS: usize = 16;

const DEFAULT_ADJECTIVES: &[&str] = &[
    "Amber", "Ancient", "Bold", "Brave", "Bright", "Calm", "Clever", "Crimson", "Daring",
    "Dusty", "Eager", "Fierce", "Gentle", "Golden", "Grim", "Hidden", "Hollow", "Idle",
    "Jolly", "Keen", "Lively", "Lucky", "Mighty", "Misty", "Noble", "Odd", "Pale", "Proud",
    "Quiet", "Rapid", "Rusty", "Silent", "Sly", "Stern", "Swift", "Tiny", "Vivid", "Wild",
    "Wise", "Young",
];

const DEFAULT_NAMES: &[&str] = &[
    "Badger", "Bear", "Crane", "Crow", "Falcon", "Ferret", "Fox", "Hare", "Hawk", "Heron",
    "Ibis", "Jackal", "Lynx", "Marten", "Mole", "Moose", "Newt", "Otter", "Owl", "Panther",
    "Raven", "Robin", "Salmon", "Seal", "Shrike", "Stag", "Stoat", "Swan", "Toad", "Viper",
    "Vole", "Walrus", "Weasel", "Wolf", "Wren", "Yak",
];

/// Seedable source of readable identifiers.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    adjectives: Vec<String>,
    names: Vec<String>,
    rng: StdRng,
}

impl NameGenerator {
    /// Generator over the built-in tables. `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_tables(
            DEFAULT_ADJECTIVES.iter().map(|s| s.to_string()).collect(),
            DEFAULT_NAMES.iter().map(|s| s.to_string()).collect(),
            seed,
        )
    }

    pub fn with_tables(adjectives: Vec<String>, names: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            adjectives,
            names,
            rng,
        }
    }

    /// Whether both tables have at least one word.
    pub fn has_tables(&self) -> bool {
        !self.adjectives.is_empty() && !self.names.is_empty()
    }

    /// Adjective + adjective + name, or `None` when a table is empty.
    pub fn generate(&mut self) -> Option<String> {
        if !self.has_tables() {
            return None;
        }
        let first = &self.adjectives[self.rng.gen_range(0..self.adjectives.len())];
        let second = &self.adjectives[self.rng.gen_range(0..self.adjectives.len())];
        let name = &self.names[self.rng.gen_range(0..self.names.len())];
        Some(format!("{first}{second}{name}"))
    }

    /// A name for which `taken` returns false.
    ///
    /// Gives up after [`UNIQUE_ATTEMPTS`] collisions and returns a fresh
    /// GUID string instead, which is unique by construction.
    pub fn unique(&mut self, taken: impl Fn(&str) -> bool) -> String {
        for _ in 0..UNIQUE_ATTEMPTS {
            match self.generate() {
                Some(name) if !taken(&name) => return name,
                Some(_) => continue,
                None => break,
            }
        }
        if self.has_tables() {
            warn!(attempts = UNIQUE_ATTEMPTS, "Name tables exhausted, falling back to guid");
        }
        EntryGuid::new().to_string()
    }

    /// Uniform index below `len`.
    pub fn pick(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.gen_range(0..len))
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Read one word per line, trimming whitespace and skipping blank lines.
pub fn load_table(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
