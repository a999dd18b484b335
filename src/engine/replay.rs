//! Frame engine answering from a recorded pose track file.
//!
//! A recording lists every frame the engine knows about with a timestamped
//! pose track. Frames still have to be created before they are served, and
//! the same rules a live engine applies to creation are checked here.

use std::cell::RefCell;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::{ready, CreateFrame, EngineError, EngineFuture, FrameEngine, RootVector, TimeRange};
use crate::pose::{FrameKind, FrameRecord, PoseSample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    /// Seconds.
    pub t: f64,
    pub position: [f64; 3],
    #[serde(alias = "rotation")]
    pub orientation: [f64; 4],
}

impl TrackSample {
    fn pose(&self) -> PoseSample {
        PoseSample::new(self.position, self.orientation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticSite {
    pub latitude_rad: f64,
    pub longitude_rad: f64,
    pub altitude_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub id: String,
    pub name: String,
    pub kind: FrameKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub epoch_seconds: f64,
    #[serde(default)]
    pub site: Option<GeodeticSite>,
    pub track: Vec<TrackSample>,
}

impl RecordedFrame {
    /// Pose at `t`, interpolated between the surrounding samples and held
    /// constant outside the recorded span.
    pub fn pose_at(&self, t: f64) -> PoseSample {
        let i = self.track.partition_point(|s| s.t <= t);
        let before = i.checked_sub(1).and_then(|j| self.track.get(j));
        match (before, self.track.get(i)) {
            (Some(a), Some(b)) => {
                let span = b.t - a.t;
                let f = if span > 0.0 { (t - a.t) / span } else { 0.0 };
                let position = DVec3::from_array(a.position).lerp(DVec3::from_array(b.position), f);
                let orientation =
                    DQuat::from_array(a.orientation).slerp(DQuat::from_array(b.orientation), f);
                PoseSample::new(position.to_array(), orientation.to_array())
            }
            (Some(a), None) => a.pose(),
            (None, Some(b)) => b.pose(),
            (None, None) => PoseSample::identity(),
        }
    }

    /// The request that creates this frame in an engine.
    pub fn create_request(&self) -> CreateFrame {
        let id = self.id.clone();
        let parent_id = self.parent_id.clone().unwrap_or_default();
        match self.kind {
            FrameKind::Inertial => CreateFrame::Inertial { id },
            FrameKind::Fixed => CreateFrame::Fixed {
                id,
                parent_id,
                epoch_seconds: self.epoch_seconds,
            },
            FrameKind::Topocentric => {
                let site = self.site.unwrap_or(GeodeticSite {
                    latitude_rad: 0.0,
                    longitude_rad: 0.0,
                    altitude_km: 0.0,
                });
                CreateFrame::Topocentric {
                    id,
                    parent_id,
                    latitude_rad: site.latitude_rad,
                    longitude_rad: site.longitude_rad,
                    altitude_km: site.altitude_km,
                }
            }
        }
    }
}

/// A body drawn alongside the frames, in engine units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBody {
    pub name: String,
    pub position: [f64; 3],
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub frames: Vec<RecordedFrame>,
    #[serde(default)]
    pub bodies: Vec<RecordedBody>,
}

impl Recording {
    pub fn from_json(json: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(json).context("Failed to parse recording")?;
        recording.validate()?;
        Ok(recording)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid recording {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.frames.is_empty(), "recording contains no frames");
        for (i, frame) in self.frames.iter().enumerate() {
            ensure!(
                !self.frames[..i].iter().any(|f| f.id == frame.id),
                "frame '{}' appears twice",
                frame.id
            );
            ensure!(!frame.track.is_empty(), "frame '{}' has an empty track", frame.id);
            ensure!(
                frame.track.windows(2).all(|w| w[0].t <= w[1].t),
                "frame '{}' track is not in ascending time order",
                frame.id
            );
            match frame.kind {
                FrameKind::Inertial => ensure!(
                    frame.parent_id.is_none(),
                    "inertial frame '{}' cannot have a parent",
                    frame.id
                ),
                FrameKind::Fixed | FrameKind::Topocentric => ensure!(
                    frame.parent_id.is_some(),
                    "frame '{}' needs a parent",
                    frame.id
                ),
            }
        }
        Ok(())
    }

    pub fn frame(&self, id: &str) -> Option<&RecordedFrame> {
        self.frames.iter().find(|f| f.id == id)
    }

    /// Creation requests for every frame, in file order.
    pub fn create_requests(&self) -> Vec<CreateFrame> {
        self.frames.iter().map(RecordedFrame::create_request).collect()
    }

    /// Latest sample time over all tracks.
    pub fn duration_seconds(&self) -> f64 {
        self.frames
            .iter()
            .filter_map(|f| f.track.last())
            .map(|s| s.t)
            .fold(0.0, f64::max)
    }
}

pub struct ReplayEngine {
    recording: Recording,
    created: RefCell<Vec<String>>,
}

impl ReplayEngine {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            created: RefCell::new(Vec::new()),
        }
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    fn is_created(&self, id: &str) -> bool {
        self.created.borrow().iter().any(|c| c == id)
    }

    fn created_frame(&self, id: &str) -> Result<&RecordedFrame, EngineError> {
        if !self.is_created(id) {
            return Err(not_found(id));
        }
        self.recording.frame(id).ok_or_else(|| not_found(id))
    }

    fn create(&self, request: &CreateFrame) -> Result<(), EngineError> {
        let id = request.id();
        let recorded = self
            .recording
            .frame(id)
            .ok_or_else(|| EngineError::Rejected(format!("Frame '{}' is not in the recording", id)))?;
        if recorded.kind != request.kind() {
            return Err(EngineError::Rejected(format!(
                "Frame '{}' is recorded as {}, not {}",
                id,
                recorded.kind.label(),
                request.kind().label()
            )));
        }
        if let Some(parent) = request.parent_id() {
            if !self.is_created(parent) {
                return Err(not_found(parent));
            }
        }
        if !self.is_created(id) {
            self.created.borrow_mut().push(id.to_string());
        }
        log::debug!("replay: created {} frame '{}'", recorded.kind.label(), id);
        Ok(())
    }

    fn record_at(&self, frame: &RecordedFrame, t: f64) -> FrameRecord {
        FrameRecord {
            id: frame.id.clone(),
            name: frame.name.clone(),
            parent_id: frame.parent_id.clone(),
            pose: frame.pose_at(t),
        }
    }
}

fn not_found(id: &str) -> EngineError {
    EngineError::Rejected(format!("Frame '{}' not found", id))
}

impl FrameEngine for ReplayEngine {
    fn create_frame<'a>(&'a self, request: &'a CreateFrame) -> EngineFuture<'a, ()> {
        ready(self.create(request))
    }

    fn frame<'a>(&'a self, id: &'a str, t: f64) -> EngineFuture<'a, FrameRecord> {
        ready(self.created_frame(id).map(|f| self.record_at(f, t)))
    }

    fn frames(&self, t: f64) -> EngineFuture<'_, Vec<FrameRecord>> {
        let created = self.created.borrow();
        let records = created
            .iter()
            .filter_map(|id| self.recording.frame(id))
            .map(|f| self.record_at(f, t))
            .collect();
        ready(Ok(records))
    }

    fn pose_range<'a>(&'a self, id: &'a str, range: TimeRange) -> EngineFuture<'a, Vec<PoseSample>> {
        ready(self.created_frame(id).map(|f| {
            range
                .sample_times()
                .into_iter()
                .map(|t| f.pose_at(t))
                .collect()
        }))
    }

    fn to_root<'a>(&'a self, frame_id: &'a str, v: [f64; 3], t: f64) -> EngineFuture<'a, RootVector> {
        ready(self.created_frame(frame_id).map(|f| {
            let pose = f.pose_at(t);
            let rotation = DQuat::from_array(pose.orientation);
            let position = rotation * DVec3::from_array(v) + DVec3::from_array(pose.position);
            RootVector {
                position: position.to_array(),
                orientation: pose.orientation,
            }
        }))
    }
}
