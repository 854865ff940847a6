use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Global time dilation applied to every tick delta.
    #[serde(default = "TaskConfig::default_time_scale")]
    pub time_scale: f64,
    #[serde(default)]
    pub live: LiveTaskConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

impl TaskConfig {
    fn default_time_scale() -> f64 {
        0.125
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("time_scale", self.time_scale)?;
        self.live.validate()?;
        self.replay.validate()
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            time_scale: Self::default_time_scale(),
            live: LiveTaskConfig::default(),
            replay: ReplayConfig::default(),
        }
    }
}

/// Parameters of the simulated (live) task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveTaskConfig {
    pub stim_azimuth_deg: f32,
    pub quiescent_range_s: (f64, f64),
    pub iti_correct_s: f64,
    pub iti_error_s: f64,
    /// Probability of a correct trial, per difficulty level.
    pub percent_correct_levels: Vec<f64>,
    /// Maximum reaction time, per difficulty level.
    pub reaction_time_levels_s: Vec<f64>,
    /// The wheel phase ends once the stimulus leaves this azimuth band.
    pub stim_position_triggers_deg: [f32; 2],
    pub level: usize,
    pub wheel_step_deg: f32,
    pub stim_on_window_s: f64,
    pub feedback_window_s: f64,
    pub stimulus_scale: f32,
}

impl Default for LiveTaskConfig {
    fn default() -> Self {
        Self {
            stim_azimuth_deg: 25.0,
            quiescent_range_s: (0.2, 0.5),
            iti_correct_s: 0.6,
            iti_error_s: 0.6,
            percent_correct_levels: vec![0.5, 0.75, 0.9],
            reaction_time_levels_s: vec![5.0, 0.5, 0.25],
            stim_position_triggers_deg: [0.0, 45.0],
            level: 1,
            wheel_step_deg: 10.0,
            stim_on_window_s: 1.0,
            feedback_window_s: 1.0,
            stimulus_scale: 5.0,
        }
    }
}

impl LiveTaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = self.quiescent_range_s;
        if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
            return Err(ConfigError::Range {
                name: "quiescent_range_s",
                min,
                max,
            });
        }
        non_negative("iti_correct_s", self.iti_correct_s)?;
        non_negative("iti_error_s", self.iti_error_s)?;
        non_negative("stim_on_window_s", self.stim_on_window_s)?;
        non_negative("feedback_window_s", self.feedback_window_s)?;
        for &p in &self.percent_correct_levels {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Probability {
                    name: "percent_correct_levels",
                    value: p,
                });
            }
        }
        for &rt in &self.reaction_time_levels_s {
            non_negative("reaction_time_levels_s", rt)?;
        }
        self.check_level(self.level)
    }

    /// The level must index both per-level tables.
    pub fn check_level(&self, level: usize) -> Result<(), ConfigError> {
        if level >= self.percent_correct_levels.len() {
            return Err(ConfigError::LevelOutOfRange {
                level,
                table: "percent_correct_levels",
                len: self.percent_correct_levels.len(),
            });
        }
        if level >= self.reaction_time_levels_s.len() {
            return Err(ConfigError::LevelOutOfRange {
                level,
                table: "reaction_time_levels_s",
                len: self.reaction_time_levels_s.len(),
            });
        }
        Ok(())
    }
}

/// Parameters of the recorded-session replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub stim_azimuth_deg: f32,
    /// Stimuli freeze once they leave [min, max] on their own side.
    pub stim_bounds_deg: (f32, f32),
    /// Wheel position units (radians of a 196 mm wheel) to stimulus degrees.
    pub wheel_mm_to_deg: f32,
    pub video_fps: f64,
    pub paw_fps: f64,
    pub feedback_destroy_delay_s: f64,
    /// Video channel whose start offset aligns video and paw frames.
    pub reference_video_channel: String,
    pub paw_scale: f32,
    pub stimulus_scale: f32,
    /// Probe coordinates arrive in micrometres.
    pub coordinate_scale: f32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            stim_azimuth_deg: 20.0,
            stim_bounds_deg: (0.0, 40.0),
            wheel_mm_to_deg: (196.0 / 2.0) / std::f32::consts::PI * 4.0,
            video_fps: 30.15,
            paw_fps: 60.12,
            feedback_destroy_delay_s: 1.0,
            reference_video_channel: "left".to_string(),
            paw_scale: 5.0,
            stimulus_scale: 5.0,
            coordinate_scale: 1000.0,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("video_fps", self.video_fps)?;
        positive("paw_fps", self.paw_fps)?;
        positive("coordinate_scale", self.coordinate_scale as f64)?;
        non_negative("feedback_destroy_delay_s", self.feedback_destroy_delay_s)?;
        let (min, max) = self.stim_bounds_deg;
        if !(min.is_finite() && max.is_finite() && min <= max) {
            return Err(ConfigError::Range {
                name: "stim_bounds_deg",
                min: min as f64,
                max: max as f64,
            });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(TaskConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = TaskConfig::from_json(r#"{ "time_scale": 1.0, "live": { "level": 2 } }"#).unwrap();
        assert_eq!(cfg.time_scale, 1.0);
        assert_eq!(cfg.live.level, 2);
        assert_eq!(cfg.live.stim_azimuth_deg, 25.0);
        assert_eq!(cfg.replay, ReplayConfig::default());
    }

    #[test]
    fn level_outside_tables_is_rejected() {
        let live = LiveTaskConfig {
            level: 3,
            ..Default::default()
        };
        assert!(matches!(
            live.validate(),
            Err(ConfigError::LevelOutOfRange { level: 3, .. })
        ));
    }

    #[test]
    fn mismatched_level_tables_are_rejected() {
        let live = LiveTaskConfig {
            level: 2,
            reaction_time_levels_s: vec![5.0, 0.5],
            ..Default::default()
        };
        assert!(matches!(
            live.check_level(2),
            Err(ConfigError::LevelOutOfRange {
                table: "reaction_time_levels_s",
                ..
            })
        ));
    }

    #[test]
    fn bad_probability_and_range() {
        let live = LiveTaskConfig {
            percent_correct_levels: vec![0.5, 1.5, 0.9],
            ..Default::default()
        };
        assert!(matches!(live.validate(), Err(ConfigError::Probability { .. })));

        let live = LiveTaskConfig {
            quiescent_range_s: (0.5, 0.2),
            ..Default::default()
        };
        assert!(matches!(live.validate(), Err(ConfigError::Range { .. })));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let replay = ReplayConfig {
            video_fps: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            replay.validate(),
            Err(ConfigError::NotPositive { name: "video_fps", .. })
        ));
    }
}
