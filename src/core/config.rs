/// Engine configuration — screen, timing, regions and dialogue sources, read
/// from RON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::macros::DEFAULT_MAX_DEPTH;
use crate::schema::geometry::Vector2D;
use crate::schema::region::ScreenRegion;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to assemble a dialogue world and the screen it plays on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Columns, rows.
    pub screen_size: Vector2D,
    /// Seconds each character waits before the next one appears.
    pub initial_tick: f64,
    pub tick_multiplier: f64,
    pub max_macro_depth: usize,
    /// Falls back to the `start_sentence` macro when unset.
    pub start_sentence: Option<String>,
    pub regions: BTreeMap<String, ScreenRegion>,
    /// StyleML source committed before the dialogue starts.
    pub predefined_macros: Option<String>,
    /// Like `predefined_macros`, read from a file relative to the config.
    pub predefined_macros_file: Option<PathBuf>,
    /// Directory of `.ron` dialogue modules, relative to the config.
    pub modules_root: Option<PathBuf>,
    /// Package the modules directory is mounted under.
    pub root_package: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let regions = BTreeMap::from([
            (
                "map".to_string(),
                ScreenRegion::new(Vector2D::new(25, 15), Vector2D::ZERO),
            ),
            (
                "speech".to_string(),
                ScreenRegion::new(Vector2D::new(25, 5), Vector2D::new(0, 15)),
            ),
        ]);
        Self {
            screen_size: Vector2D::new(25, 20),
            initial_tick: 0.07,
            tick_multiplier: 1.0,
            max_macro_depth: DEFAULT_MAX_DEPTH,
            start_sentence: None,
            regions,
            predefined_macros: None,
            predefined_macros_file: None,
            modules_root: None,
            root_package: String::new(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a configuration from a RON string. Missing fields take their
    /// defaults.
    pub fn parse_ron(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen_size.x <= 0 || self.screen_size.y <= 0 {
            return Err(ConfigError::Invalid(format!(
                "screen size {} must be positive",
                self.screen_size
            )));
        }
        if !(self.initial_tick >= 0.0 && self.tick_multiplier >= 0.0) {
            return Err(ConfigError::Invalid(
                "tick and tick multiplier must be non-negative".to_string(),
            ));
        }
        if self.max_macro_depth == 0 {
            return Err(ConfigError::Invalid("max_macro_depth must be at least 1".to_string()));
        }
        for (name, region) in &self.regions {
            if region.size.x <= 0 || region.size.y <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "region '{name}' has non-positive size {}",
                    region.size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::geometry::Cardinal;

    #[test]
    fn empty_config_takes_defaults() {
        let config = EngineConfig::parse_ron("()").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.regions["speech"].origin, Vector2D::new(0, 15));
    }

    #[test]
    fn regions_and_timing() {
        let config = EngineConfig::parse_ron(
            r#"(
                screen_size: (x: 40, y: 12),
                initial_tick: 0.05,
                start_sentence: Some("intro.hello"),
                regions: {
                    "side": (size: (x: 10, y: 12), origin: (x: 39, y: 0), row_grow: (x: 0, y: 1), col_grow: (x: -1, y: 0)),
                },
                modules_root: Some("modules"),
            )"#,
        )
        .unwrap();
        assert_eq!(config.screen_size, Vector2D::new(40, 12));
        assert_eq!(config.start_sentence.as_deref(), Some("intro.hello"));
        let side = config.regions["side"];
        assert_eq!(side.row_grow, Cardinal::South.vector());
        assert_eq!(side.col_grow, Cardinal::West.vector());
        assert!(!config.regions.contains_key("speech"));
        assert_eq!(config.tick_multiplier, 1.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::parse_ron("(screen_size: (x: 0, y: 3))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::parse_ron("(initial_tick: -1.0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(EngineConfig::parse_ron("(screen_size: 3)"), Err(ConfigError::Ron(_))));
    }

    #[test]
    fn load_resources_config() {
        let path = PathBuf::from("resources/config.ron");
        let config = EngineConfig::load_from_ron(&path).unwrap();
        assert!(config.regions.contains_key("speech"));
        assert!(config.modules_root.is_some());
    }
}
