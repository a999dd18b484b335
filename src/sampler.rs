//! Reduces a frame's pose range around the current simulated time to a
//! single current pose.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, FrameEngine, TimeRange};
use crate::pose::{ScenePose, POSITION_SCALE};

pub const DEFAULT_STEPS: usize = 100;

/// Simulated time arrives in hours.
pub fn hours_to_seconds(hours: f64) -> f64 {
    hours * 60.0 * 60.0
}

/// Which interval is requested for a given simulated time `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SamplingWindow {
    /// `[-t, t]`: grows with elapsed simulated time and ends at `t`.
    Elapsed,
    /// `[t - seconds, t]`.
    Trailing { seconds: f64 },
}

impl Default for SamplingWindow {
    fn default() -> Self {
        SamplingWindow::Elapsed
    }
}

impl SamplingWindow {
    pub fn bounds(&self, t: f64) -> (f64, f64) {
        match *self {
            SamplingWindow::Elapsed => (-t, t),
            SamplingWindow::Trailing { seconds } => (t - seconds, t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSampler {
    pub steps: usize,
    pub window: SamplingWindow,
    pub scale: f64,
}

impl Default for PoseSampler {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            window: SamplingWindow::default(),
            scale: POSITION_SCALE,
        }
    }
}

impl PoseSampler {
    pub fn range_for(&self, t: f64) -> TimeRange {
        let (start, end) = self.window.bounds(t);
        TimeRange::new(start, end, self.steps)
    }

    /// Fetch the range for `t` seconds and keep the last sample, in scene
    /// units. `Ok(None)` when the engine has no samples for the range.
    pub async fn sample(
        &self,
        engine: &dyn FrameEngine,
        id: &str,
        t: f64,
    ) -> Result<Option<ScenePose>, EngineError> {
        let range = self.range_for(t);
        let samples = engine.pose_range(id, range).await?;
        log::trace!(
            "{}: {} samples over [{}, {}]",
            id,
            samples.len(),
            range.start,
            range.end
        );
        Ok(samples.last().map(|s| s.into_scene(self.scale)))
    }
}
