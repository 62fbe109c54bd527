//! Level layout loading

use serde::Deserialize;
use std::path::Path;

use super::team::Team;
use super::world::Vec3;

/// Spawn point as authored in a layout file
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnPointDef {
    pub name: String,
    pub team: Team,
    pub location: Vec3,
}

/// Everything the session needs from a level at load time
#[derive(Debug, Clone, Deserialize)]
pub struct LevelLayout {
    pub name: String,
    pub spawn_points: Vec<SpawnPointDef>,
}

impl LevelLayout {
    /// Read a JSON layout from disk
    pub fn load(path: &Path) -> Result<Self, LevelError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LevelError> {
        let layout: LevelLayout = serde_json::from_str(raw)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Built-in arena: four spawns per team at opposite ends
    pub fn default_arena() -> Self {
        let mut spawn_points = Vec::with_capacity(8);
        for (team, x) in [(Team::Blue, -2000.0), (Team::Red, 2000.0)] {
            for i in 0..4 {
                spawn_points.push(SpawnPointDef {
                    name: format!("{:?}Spawn{}", team, i),
                    team,
                    location: Vec3::new(x, -600.0 + 400.0 * i as f32, 100.0),
                });
            }
        }

        Self {
            name: "default_arena".to_string(),
            spawn_points,
        }
    }

    fn validate(&self) -> Result<(), LevelError> {
        for team in [Team::Blue, Team::Red] {
            if !self.spawn_points.iter().any(|p| p.team == team) {
                return Err(LevelError::NoSpawnPoints(team));
            }
        }
        if let Some(bad) = self.spawn_points.iter().find(|p| !p.location.is_finite()) {
            return Err(LevelError::InvalidLocation(bad.name.clone()));
        }
        Ok(())
    }
}

/// Level loading errors
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("Failed to read level file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse level file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Level has no spawn points for team {0:?}")]
    NoSpawnPoints(Team),

    #[error("Spawn point {0} has a non-finite location")]
    InvalidLocation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_layout_in_file_order() {
        let raw = r#"{
            "name": "yard",
            "spawn_points": [
                {"name": "r0", "team": "red", "location": {"x": 1.0, "y": 0.0, "z": 0.0}},
                {"name": "b0", "team": "blue", "location": {"x": -1.0, "y": 0.0, "z": 0.0}},
                {"name": "b1", "team": "blue", "location": {"x": -2.0, "y": 0.0, "z": 0.0}}
            ]
        }"#;

        let layout = LevelLayout::from_json(raw).unwrap();
        let names: Vec<_> = layout.spawn_points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["r0", "b0", "b1"]);
    }

    #[test]
    fn rejects_layout_missing_a_team() {
        let raw = r#"{"name": "half", "spawn_points": [
            {"name": "b0", "team": "blue", "location": {"x": 0.0, "y": 0.0, "z": 0.0}}
        ]}"#;

        assert!(matches!(
            LevelLayout::from_json(raw),
            Err(LevelError::NoSpawnPoints(Team::Red))
        ));
    }

    #[test]
    fn default_arena_is_valid() {
        assert!(LevelLayout::default_arena().validate().is_ok());
    }
}
