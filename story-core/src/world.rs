//! World state: accumulated facts about the fictional world.
//!
//! The whole world is embedded verbatim in every prompt, so values are
//! restricted to a small set of JSON-safe kinds and the map is capped at
//! [`WorldState::MAX_ENTRIES`] keys.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors from world state validation.
#[derive(Debug, Error)]
pub enum WorldStateError {
    #[error("world state has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("world state key must not be empty")]
    EmptyKey,

    #[error("world state value for '{key}' is not a finite number")]
    NonFiniteNumber { key: String },
}

/// A single world fact.
///
/// Serialized untagged, so the prompt sees plain JSON scalars and arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl WorldValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            WorldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WorldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for WorldValue {
    fn from(value: bool) -> Self {
        WorldValue::Bool(value)
    }
}

impl From<i64> for WorldValue {
    fn from(value: i64) -> Self {
        WorldValue::Integer(value)
    }
}

impl From<i32> for WorldValue {
    fn from(value: i32) -> Self {
        WorldValue::Integer(value.into())
    }
}

impl From<f64> for WorldValue {
    fn from(value: f64) -> Self {
        WorldValue::Number(value)
    }
}

impl From<&str> for WorldValue {
    fn from(value: &str) -> Self {
        WorldValue::Text(value.to_string())
    }
}

impl From<String> for WorldValue {
    fn from(value: String) -> Self {
        WorldValue::Text(value)
    }
}

impl From<Vec<String>> for WorldValue {
    fn from(value: Vec<String>) -> Self {
        WorldValue::List(value)
    }
}

/// Ordered mapping of world facts.
///
/// Keys are application-defined. A `BTreeMap` keeps serialization order
/// stable, which keeps prompts deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    entries: BTreeMap<String, WorldValue>,
}

impl WorldState {
    /// Maximum number of keys a world may hold.
    pub const MAX_ENTRIES: usize = 64;

    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// The world a story starts in when the caller supplies none.
    pub fn opening() -> Self {
        Self::new()
            .with("player_reputation", 0)
            .with("current_location", "Entrance to the Mysterious Cave")
            .with("unlocked_abilities", Vec::<String>::new())
            .with(ElapsedTime::DEFAULT_KEY, 0)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<WorldValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a fact, returning the previous value.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<WorldValue>,
    ) -> Option<WorldValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&WorldValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<WorldValue> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check that the world can be embedded in a prompt.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if self.entries.len() > Self::MAX_ENTRIES {
            return Err(WorldStateError::TooManyEntries {
                count: self.entries.len(),
                limit: Self::MAX_ENTRIES,
            });
        }

        for (key, value) in &self.entries {
            if key.is_empty() {
                return Err(WorldStateError::EmptyKey);
            }
            // serde_json would silently write these as null
            if let WorldValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(WorldStateError::NonFiniteNumber { key: key.clone() });
                }
            }
        }

        Ok(())
    }
}

impl<K: Into<String>, V: Into<WorldValue>> FromIterator<(K, V)> for WorldState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut world = WorldState::new();
        for (key, value) in iter {
            world.set(key, value);
        }
        world
    }
}

/// A deterministic per-turn update to the world.
///
/// Rules run once per turn, after the progress counter is incremented and
/// before the prompt is built, so the narrator sees their effect.
pub trait WorldRule: fmt::Debug + Send + Sync {
    fn apply(&self, world: &mut WorldState, progress: u32);
}

/// Advances an elapsed-time counter by a fixed amount each turn.
#[derive(Debug, Clone)]
pub struct ElapsedTime {
    pub key: String,
    pub minutes_per_turn: i64,
}

impl ElapsedTime {
    pub const DEFAULT_KEY: &'static str = "time_elapsed_minutes";
    pub const DEFAULT_MINUTES_PER_TURN: i64 = 5;
}

impl Default for ElapsedTime {
    fn default() -> Self {
        Self {
            key: Self::DEFAULT_KEY.to_string(),
            minutes_per_turn: Self::DEFAULT_MINUTES_PER_TURN,
        }
    }
}

impl WorldRule for ElapsedTime {
    fn apply(&self, world: &mut WorldState, _progress: u32) {
        // Missing or non-integer counters restart from zero.
        let elapsed = world
            .get(&self.key)
            .and_then(WorldValue::as_integer)
            .unwrap_or(0);
        world.set(self.key.clone(), elapsed.saturating_add(self.minutes_per_turn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_world() {
        let world = WorldState::opening();
        assert_eq!(world.len(), 4);
        assert_eq!(world.get("player_reputation"), Some(&WorldValue::Integer(0)));
        assert_eq!(
            world.get("current_location").and_then(WorldValue::as_text),
            Some("Entrance to the Mysterious Cave")
        );
        assert_eq!(world.get("unlocked_abilities"), Some(&WorldValue::List(vec![])));
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let world = WorldState::new()
            .with("b_flag", true)
            .with("a_count", 3)
            .with("c_items", vec!["lamp".to_string()]);

        let json = serde_json::to_string(&world).unwrap();
        assert_eq!(json, r#"{"a_count":3,"b_flag":true,"c_items":["lamp"]}"#);

        let back: WorldState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, world);
    }

    #[test]
    fn test_validate_rejects_non_finite_numbers() {
        let world = WorldState::new().with("danger", f64::NAN);
        assert!(matches!(
            world.validate(),
            Err(WorldStateError::NonFiniteNumber { ref key }) if key == "danger"
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_world() {
        let world: WorldState = (0..=WorldState::MAX_ENTRIES as i64)
            .map(|i| (format!("fact_{i}"), i))
            .collect();
        assert!(matches!(
            world.validate(),
            Err(WorldStateError::TooManyEntries { count: 65, limit: 64 })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let world = WorldState::new().with("", 1);
        assert!(matches!(world.validate(), Err(WorldStateError::EmptyKey)));
    }

    #[test]
    fn test_elapsed_time_rule() {
        let rule = ElapsedTime::default();
        let mut world = WorldState::opening();

        rule.apply(&mut world, 1);
        rule.apply(&mut world, 2);
        assert_eq!(world.get(ElapsedTime::DEFAULT_KEY), Some(&WorldValue::Integer(10)));
    }

    #[test]
    fn test_elapsed_time_restarts_non_integer_counter() {
        let rule = ElapsedTime {
            key: "clock".to_string(),
            minutes_per_turn: 15,
        };
        let mut world = WorldState::new().with("clock", "noon");

        rule.apply(&mut world, 1);
        assert_eq!(world.get("clock"), Some(&WorldValue::Integer(15)));
    }
}
