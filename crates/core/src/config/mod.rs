use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for a play session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub playback: PlaybackConfig,
    pub view: ViewConfig,
    pub input: InputConfig,
    pub audio: AudioConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            view: ViewConfig::default(),
            input: InputConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Scheduler window sizes, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Distance ahead of the critical line at which objects appear.
    pub look_ahead: f64,
    /// Distance behind the critical line at which objects disappear.
    pub look_behind: f64,
    /// Silence played before the first object when a session starts.
    pub lead_in: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            look_ahead: 0.75,
            look_behind: 0.0,
            lead_in: 2.0,
        }
    }
}

/// Camera and viewport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Fraction of viewport height, from the bottom, at which the critical
    /// line is drawn.
    pub crit_screen_y: f32,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Hue in degrees of the left and right laser colours.
    pub laser_hues: [u16; 2],
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            crit_screen_y: 0.1,
            field_of_view: 60.0,
            viewport_width: 1280.0,
            viewport_height: 720.0,
            laser_hues: [200, 330],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Added to the clock position before judging, in milliseconds.
    pub offset_ms: i32,
    pub auto_play: AutoPlay,
}

/// Which lane groups are played automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoPlay {
    pub buttons: bool,
    pub lasers: bool,
}

impl AutoPlay {
    pub const NONE: AutoPlay = AutoPlay {
        buttons: false,
        lasers: false,
    };
    pub const BUTTONS_AND_LASERS: AutoPlay = AutoPlay {
        buttons: true,
        lasers: true,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub track_volume: f32,
    pub slam_volume: f32,
    /// Gain applied to the laser filter until the chart sets its own.
    pub laser_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            track_volume: 0.8,
            slam_volume: 1.0,
            laser_gain: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            GameConfig::from_json_str(r#"{ "playback": { "look_ahead": 1.5 } }"#).unwrap();

        assert_eq!(config.playback.look_ahead, 1.5);
        assert_eq!(config.playback.look_behind, 0.0);
        assert_eq!(config.view.field_of_view, 60.0);
        assert_eq!(config.input.auto_play, AutoPlay::NONE);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = GameConfig::from_json_str("{ playback: ").unwrap_err();
        assert!(matches!(err, crate::HighwayError::Json(_)));
    }
}
