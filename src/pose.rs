//! Pose and frame record types exchanged with the frame engine.
//!
//! Engine data arrives in engine units (`PoseSample`, `FrameRecord`) and is
//! converted to scene units (`ScenePose`, `FrameSnapshot`) exactly once, by
//! consuming the engine value. Nothing converts back.

use serde::{Deserialize, Serialize};

/// Divisor applied to engine positions before they are used for rendering.
pub const POSITION_SCALE: f64 = 1000.0;

/// A position and orientation at one instant, in engine units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub position: [f64; 3],
    /// Unit quaternion in x, y, z, w order. Trusted from the engine.
    #[serde(alias = "rotation")]
    pub orientation: [f64; 4],
}

impl PoseSample {
    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> Self {
        Self { position, orientation }
    }

    pub fn identity() -> Self {
        Self::new([0.0; 3], [0.0, 0.0, 0.0, 1.0])
    }

    /// Convert to scene units by dividing the position by `scale`.
    pub fn into_scene(self, scale: f64) -> ScenePose {
        let [x, y, z] = self.position;
        ScenePose {
            position: [x / scale, y / scale, z / scale],
            orientation: self.orientation,
        }
    }
}

/// A pose in scene units, ready to be written to a transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenePose {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
}

impl ScenePose {
    pub fn translation(&self) -> glam::Vec3 {
        let [x, y, z] = self.position;
        glam::Vec3::new(x as f32, y as f32, z as f32)
    }

    pub fn rotation(&self) -> glam::Quat {
        let [x, y, z, w] = self.orientation;
        glam::Quat::from_xyzw(x as f32, y as f32, z as f32, w as f32)
    }
}

/// The kind of frame, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Inertial root (ECI).
    Inertial,
    /// Body-fixed child rotating with its parent body (ECEF).
    Fixed,
    /// Topocentric child at a geodetic site (SEZ).
    Topocentric,
}

impl FrameKind {
    pub const ALL: [FrameKind; 3] = [FrameKind::Inertial, FrameKind::Fixed, FrameKind::Topocentric];

    pub fn label(&self) -> &'static str {
        match self {
            FrameKind::Inertial => "ECI",
            FrameKind::Fixed => "ECEF",
            FrameKind::Topocentric => "SEZ",
        }
    }
}

/// Engine-owned description of a frame at some instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub pose: PoseSample,
}

impl FrameRecord {
    pub fn into_snapshot(self, scale: f64) -> FrameSnapshot {
        FrameSnapshot {
            id: self.id,
            name: self.name,
            parent_id: self.parent_id,
            pose: self.pose.into_scene(scale),
        }
    }
}

/// Read-only copy of a frame record in scene units, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub pose: ScenePose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_applied_once() {
        let raw = PoseSample::new([1000.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        let pose = raw.into_scene(POSITION_SCALE);
        assert_eq!(pose.position, [1.0, 0.0, 0.0]);
        assert_eq!(pose.translation(), glam::Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(pose.orientation, raw.orientation);
    }

    #[test]
    fn test_record_accepts_engine_field_names() {
        let json = r#"{
            "id": "ecef",
            "name": "ECEF",
            "parent_id": "eci",
            "pose": { "position": [2000.0, 0.0, -1000.0], "rotation": [0.0, 0.0, 0.0, 1.0] }
        }"#;
        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.parent_id.as_deref(), Some("eci"));
        let snapshot = record.into_snapshot(POSITION_SCALE);
        assert_eq!(snapshot.pose.position, [2.0, 0.0, -1.0]);
    }

    #[test]
    fn test_root_record_without_parent() {
        let json = r#"{ "id": "eci", "name": "ECI", "parent_id": null,
            "pose": { "position": [0.0, 0.0, 0.0], "orientation": [0.0, 0.0, 0.0, 1.0] } }"#;
        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert!(record.parent_id.is_none());
        assert_eq!(record.pose, PoseSample::identity());
    }

    #[test]
    fn test_frame_kind_labels() {
        let labels: Vec<_> = FrameKind::ALL.iter().map(|k| k.label()).collect();
        assert_eq!(labels, ["ECI", "ECEF", "SEZ"]);
    }
}
