//! Perspective camera used by the scene runtime.
//!
//! The world is Z-up. The camera keeps the point it looks at so orbit
//! controls and fit-to-bounds can move it around that point.

use glam::{Mat4, Vec3};

use crate::scene_graph::Bounds;

// ============================================================================
// Camera Settings
// ============================================================================

/// Static camera parameters, loaded from the viewer config.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    /// Extra distance factor used when fitting the camera to the scene.
    pub fit_padding: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 50.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 5.0, 0.0],
            fit_padding: 1.2,
        }
    }
}

// ============================================================================
// Perspective Camera
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    fit_padding: f32,
}

impl PerspectiveCamera {
    pub fn new(settings: &CameraSettings, aspect: f32) -> Self {
        Self {
            position: Vec3::from_array(settings.position),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov: settings.fov,
            aspect,
            near: settings.near,
            far: settings.far,
            fit_padding: settings.fit_padding,
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    /// Compute the view matrix from camera parameters.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Place the camera so `bounds` fits in view, looking down from +Y at
    /// the centre. Returns the centre.
    pub fn fit_to_bounds(&mut self, bounds: &Bounds) -> Vec3 {
        let center = bounds.center();
        let radius = bounds.size().length() * 0.5;
        let half_fov = self.fov.to_radians() / 2.0;
        let distance = radius / half_fov.sin();

        self.position = center + Vec3::Y * distance * self.fit_padding;
        self.near = 0.1;
        // a degenerate scene still needs a far plane past the near plane
        self.far = (distance * 100.0).max(self.near * 2.0);
        self.target = center;
        center
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(&CameraSettings::default(), 1.0)
    }
}
