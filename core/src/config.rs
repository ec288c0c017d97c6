//! Match configuration shared by the world and its adapters.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const TURN_DURATION_RANGE: RangeInclusive<f32> = 10.0..=300.0;
const DRAW_TURN_RANGE: RangeInclusive<u32> = 5..=50;
const FIELD_DIMENSION_RANGE: RangeInclusive<u32> = 10..=100;
const UNITS_PER_TYPE_RANGE: RangeInclusive<u32> = 1..=10;
const UNIT_STAT_RANGE: RangeInclusive<u32> = 1..=20;
const ACTION_RATE_RANGE: RangeInclusive<u32> = 1..=20;
const TOLERANCE_RANGE: RangeInclusive<f32> = 0.1..=5.0;
const OBSTACLE_RATIO_RANGE: RangeInclusive<f32> = 0.0..=0.5;

/// Errors reported when a configuration value falls outside its legal range.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A floating point setting lies outside its permitted interval.
    #[error("{field} must lie within {min}..={max}, got {value}")]
    SecondsOutOfRange {
        /// Name of the offending setting.
        field: &'static str,
        /// Value provided by the configuration.
        value: f32,
        /// Smallest accepted value.
        min: f32,
        /// Largest accepted value.
        max: f32,
    },
    /// An integral setting lies outside its permitted interval.
    #[error("{field} must lie within {min}..={max}, got {value}")]
    CountOutOfRange {
        /// Name of the offending setting.
        field: &'static str,
        /// Value provided by the configuration.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// The spawn columns cannot hold the requested number of units.
    #[error("{units_per_type} units per type do not fit a field of height {height}")]
    SpawnColumnOverflow {
        /// Requested units per archetype.
        units_per_type: u32,
        /// Configured field height.
        height: u32,
    },
}

/// Tunable parameters of a match. Missing fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seconds available to the active player each turn.
    pub turn_duration_secs: f32,
    /// Round at which draw resolution begins.
    pub draw_turn: u32,
    /// Field width in cells.
    pub field_width: u32,
    /// Field height in cells.
    pub field_height: u32,
    /// Units spawned per archetype and player.
    pub units_per_type: u32,
    /// Movement budget of ranged units.
    pub ranged_speed: u32,
    /// Attack reach of ranged units.
    pub ranged_attack_range: u32,
    /// Movement budget of melee units.
    pub melee_speed: u32,
    /// Attack reach of melee units.
    pub melee_attack_range: u32,
    /// Enables path and speed validation for move requests.
    pub validate_movement: bool,
    /// Enables sightline validation for attack requests.
    pub validate_line_of_sight: bool,
    /// Enables action-rate and claimed-time checks.
    pub anti_cheat_enabled: bool,
    /// Ceiling for actions per player within the trailing second.
    pub max_actions_per_second: u32,
    /// Slack granted to claimed travel times, in seconds.
    pub time_validation_tolerance_secs: f32,
    /// Enables the stalemate-breaking infinite speed rule.
    pub infinite_speed_rule_enabled: bool,
    /// Seed used for obstacle placement.
    pub field_seed: u64,
    /// Fraction of the field targeted for obstacles.
    pub obstacle_ratio: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_duration_secs: 60.0,
            draw_turn: 15,
            field_width: 20,
            field_height: 20,
            units_per_type: 2,
            ranged_speed: 2,
            ranged_attack_range: 4,
            melee_speed: 4,
            melee_attack_range: 1,
            validate_movement: true,
            validate_line_of_sight: true,
            anti_cheat_enabled: true,
            max_actions_per_second: 5,
            time_validation_tolerance_secs: 0.5,
            infinite_speed_rule_enabled: true,
            field_seed: 0,
            obstacle_ratio: 0.15,
        }
    }
}

impl GameConfig {
    /// Verifies that every setting lies within its legal interval.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered, in declaration order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_seconds(
            "turn_duration_secs",
            self.turn_duration_secs,
            TURN_DURATION_RANGE,
        )?;
        check_count("draw_turn", self.draw_turn, DRAW_TURN_RANGE)?;
        check_count("field_width", self.field_width, FIELD_DIMENSION_RANGE)?;
        check_count("field_height", self.field_height, FIELD_DIMENSION_RANGE)?;
        check_count("units_per_type", self.units_per_type, UNITS_PER_TYPE_RANGE)?;
        check_count("ranged_speed", self.ranged_speed, UNIT_STAT_RANGE)?;
        check_count(
            "ranged_attack_range",
            self.ranged_attack_range,
            UNIT_STAT_RANGE,
        )?;
        check_count("melee_speed", self.melee_speed, UNIT_STAT_RANGE)?;
        check_count(
            "melee_attack_range",
            self.melee_attack_range,
            UNIT_STAT_RANGE,
        )?;
        check_count(
            "max_actions_per_second",
            self.max_actions_per_second,
            ACTION_RATE_RANGE,
        )?;
        check_seconds(
            "time_validation_tolerance_secs",
            self.time_validation_tolerance_secs,
            TOLERANCE_RANGE,
        )?;
        check_seconds("obstacle_ratio", self.obstacle_ratio, OBSTACLE_RATIO_RANGE)?;

        if self.units_per_type + 2 > self.field_height {
            return Err(ConfigError::SpawnColumnOverflow {
                units_per_type: self.units_per_type,
                height: self.field_height,
            });
        }

        Ok(())
    }
}

fn check_seconds(
    field: &'static str,
    value: f32,
    range: RangeInclusive<f32>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::SecondsOutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn check_count(
    field: &'static str,
    value: u32,
    range: RangeInclusive<u32>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::CountOutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, GameConfig};

    #[test]
    fn defaults_are_valid() {
        assert_eq!(GameConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: GameConfig =
            toml::from_str("field_width = 30\nmelee_speed = 6\n").expect("parse toml");
        assert_eq!(config.field_width, 30);
        assert_eq!(config.melee_speed, 6);
        assert_eq!(config.field_height, 20);
        assert_eq!(config.draw_turn, 15);
    }

    #[test]
    fn out_of_range_turn_duration_is_rejected() {
        let config = GameConfig {
            turn_duration_secs: 5.0,
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SecondsOutOfRange {
                field: "turn_duration_secs",
                ..
            })
        ));
    }

    #[test]
    fn oversized_field_is_rejected() {
        let config = GameConfig {
            field_width: 101,
            ..GameConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CountOutOfRange {
                field: "field_width",
                value: 101,
                min: 10,
                max: 100,
            })
        );
    }

    #[test]
    fn spawn_columns_must_fit_field_height() {
        let config = GameConfig {
            field_height: 10,
            units_per_type: 9,
            ..GameConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SpawnColumnOverflow {
                units_per_type: 9,
                height: 10,
            })
        );
    }
}
