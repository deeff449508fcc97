//! Scenario loading: the JSON bundle a caller hands to the CLI or a test
//! to describe one full battle setup.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::definitions::{EnemySkillDefinitions, SkillDefinitions, StatusDefinitions};
use crate::prng::PrngPolicy;

/// A complete, self-contained battle setup: both rosters, every definition
/// table the engine might consult, and the seed/policy to run it with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub players: Vec<Actor>,
    pub enemies: Vec<Actor>,
    #[serde(default)]
    pub status_defs: StatusDefinitions,
    #[serde(default)]
    pub skill_defs: SkillDefinitions,
    #[serde(default)]
    pub enemy_skill_defs: EnemySkillDefinitions,
    pub seed: u64,
    #[serde(default)]
    pub fixed_median: bool,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(&path)?;
        let scenario: Scenario = serde_json::from_str(&content)?;
        Ok(scenario)
    }

    /// Parse a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let scenario: Scenario = serde_json::from_str(json)?;
        Ok(scenario)
    }

    pub fn policy(&self) -> PrngPolicy {
        PrngPolicy {
            fixed_median: self.fixed_median,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::actor;
    use crate::log::Side;

    #[test]
    fn round_trips_through_json() {
        let scenario = Scenario {
            players: vec![actor(Side::Player, 1, Some(1), "hero")],
            enemies: vec![actor(Side::Enemy, 1, None, "slime")],
            status_defs: StatusDefinitions::default(),
            skill_defs: SkillDefinitions::default(),
            enemy_skill_defs: EnemySkillDefinitions::default(),
            seed: 42,
            fixed_median: true,
        };
        let json = serde_json::to_string(&scenario).unwrap();
        let parsed = Scenario::from_json(&json).unwrap();
        assert_eq!(parsed.seed, 42);
        assert_eq!(parsed.players.len(), 1);
        assert!(parsed.policy().fixed_median);
    }

    #[test]
    fn loads_from_a_json_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(
            &path,
            r#"{"players": [], "enemies": [], "seed": 7}"#,
        )
        .unwrap();

        let scenario = Scenario::from_file(&path).unwrap();
        assert_eq!(scenario.seed, 7);
    }

    #[test]
    fn missing_definition_tables_default_to_empty() {
        let json = r#"{
            "players": [],
            "enemies": [],
            "seed": 1
        }"#;
        let scenario = Scenario::from_json(json).unwrap();
        assert!(scenario.status_defs.is_empty());
        assert!(scenario.skill_defs.is_empty());
        assert!(scenario.enemy_skill_defs.is_empty());
        assert!(!scenario.fixed_median);
    }
}
