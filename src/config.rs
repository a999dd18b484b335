//! Viewer configuration, loaded from JSON with defaults for every field.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::camera::CameraSettings;
use crate::color::Color;
use crate::pose::POSITION_SCALE;
use crate::post_processing::OutlineSettings;
use crate::sampler::{PoseSampler, SamplingWindow, DEFAULT_STEPS};
use crate::throttle::{RateLimiter, DEFAULT_INTERVAL_MS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Poses requested per update.
    pub sampler_steps: usize,
    pub window: SamplingWindow,
    /// Minimum milliseconds between published frame snapshots.
    pub ui_throttle_ms: f64,
    /// Engine units per scene unit.
    pub position_scale: f64,
    /// Length of each triad axis, scene units.
    pub triad_size: f32,
    pub camera: CameraSettings,
    pub damping_factor: f32,
    pub outline: OutlineSettings,
    pub foreground: Color,
    pub background: Color,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            sampler_steps: DEFAULT_STEPS,
            window: SamplingWindow::default(),
            ui_throttle_ms: DEFAULT_INTERVAL_MS,
            position_scale: POSITION_SCALE,
            triad_size: 5.0,
            camera: CameraSettings::default(),
            damping_factor: 0.04,
            outline: OutlineSettings::default(),
            foreground: Color::new(0.9, 0.9, 0.9, 1.0),
            background: Color::new(0.01, 0.01, 0.015, 1.0),
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse viewer config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.position_scale.is_finite() && self.position_scale > 0.0,
            "position_scale must be positive, got {}",
            self.position_scale
        );
        ensure!(self.sampler_steps >= 1, "sampler_steps must be at least 1");
        ensure!(
            self.ui_throttle_ms >= 0.0,
            "ui_throttle_ms must not be negative, got {}",
            self.ui_throttle_ms
        );
        ensure!(
            self.damping_factor > 0.0 && self.damping_factor <= 1.0,
            "damping_factor must be in (0, 1], got {}",
            self.damping_factor
        );
        ensure!(self.triad_size > 0.0, "triad_size must be positive, got {}", self.triad_size);
        if let SamplingWindow::Trailing { seconds } = self.window {
            ensure!(seconds >= 0.0, "trailing window must not be negative, got {}", seconds);
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Load from `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn sampler(&self) -> PoseSampler {
        PoseSampler {
            steps: self.sampler_steps,
            window: self.window,
            scale: self.position_scale,
        }
    }

    pub fn throttle(&self) -> RateLimiter {
        RateLimiter::new(self.ui_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = ViewerConfig::from_json(
            r##"{
                "sampler_steps": 20,
                "window": { "policy": "trailing", "seconds": 600.0 },
                "foreground": "#ff0000",
                "outline": { "edge_strength": 3.0 }
            }"##,
        )
        .unwrap();

        assert_eq!(config.sampler_steps, 20);
        assert_eq!(config.window, SamplingWindow::Trailing { seconds: 600.0 });
        assert_eq!(config.foreground, Color::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(config.outline.edge_strength, 3.0);
        assert_eq!(config.outline.edge_thickness, 0.1);
        assert_eq!(config.ui_throttle_ms, 100.0);
        assert_eq!(config.camera.fov, 50.0);
    }

    #[test]
    fn test_sampler_from_config() {
        let config = ViewerConfig::default();
        let sampler = config.sampler();
        assert_eq!(sampler.steps, 100);
        assert_eq!(sampler.scale, 1000.0);
        assert_eq!(config.throttle().interval_ms(), 100.0);
    }

    #[test]
    fn test_bad_colour_rejected() {
        assert!(ViewerConfig::from_json(r#"{ "foreground": "red" }"#).is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for json in [
            r#"{ "position_scale": 0.0 }"#,
            r#"{ "position_scale": -1000.0 }"#,
            r#"{ "sampler_steps": 0 }"#,
            r#"{ "ui_throttle_ms": -1.0 }"#,
            r#"{ "damping_factor": 0.0 }"#,
            r#"{ "damping_factor": 1.5 }"#,
            r#"{ "triad_size": 0.0 }"#,
            r#"{ "window": { "policy": "trailing", "seconds": -5.0 } }"#,
        ] {
            assert!(ViewerConfig::from_json(json).is_err(), "accepted {}", json);
        }

        let edge = ViewerConfig::from_json(r#"{ "ui_throttle_ms": 0.0, "damping_factor": 1.0, "sampler_steps": 1 }"#);
        assert!(edge.is_ok());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ViewerConfig::default().validate().is_ok());
        assert!(ViewerConfig::from_json("{}").is_ok());
    }
}
