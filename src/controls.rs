//! Damped orbit controls around a target point, Z up.
//!
//! Input accumulates into pending deltas. Each `update` applies a
//! `damping_factor` share of them to the camera and decays the rest, so the
//! camera glides to a stop after input ends.

use glam::Vec3;

use crate::camera::PerspectiveCamera;

const MIN_POLAR: f32 = 1e-4;
const MIN_DISTANCE: f32 = 1e-3;
const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Vec3,
    pub damping_factor: f32,
    /// Radians per pixel of drag, scaled by viewport height.
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    azimuth_delta: f32,
    polar_delta: f32,
    scale: f32,
    pan_offset: Vec3,
}

impl OrbitControls {
    pub fn new(damping_factor: f32) -> Self {
        Self {
            target: Vec3::ZERO,
            damping_factor,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            azimuth_delta: 0.0,
            polar_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.azimuth_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.polar_delta -= angle;
    }

    /// `factor > 1` moves away from the target.
    pub fn dolly(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.scale *= factor;
        }
    }

    pub fn pan(&mut self, offset: Vec3) {
        self.pan_offset += offset;
    }

    /// Mouse drag in pixels over a viewport of `height` pixels.
    pub fn handle_drag(&mut self, dx: f32, dy: f32, height: f32) {
        let height = height.max(1.0);
        self.rotate_left(std::f32::consts::TAU * dx / height * self.rotate_speed);
        self.rotate_up(std::f32::consts::TAU * dy / height * self.rotate_speed);
    }

    /// Secondary-button drag: move target and camera in the view plane.
    pub fn handle_pan(&mut self, camera: &PerspectiveCamera, dx: f32, dy: f32, height: f32) {
        let offset = camera.position - self.target;
        let distance = offset.length() * (camera.fov.to_radians() / 2.0).tan();
        let forward = (-offset).normalize_or_zero();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward);
        let height = height.max(1.0);
        self.pan(right * (-2.0 * dx * distance / height) + up * (2.0 * dy * distance / height));
    }

    /// Wheel delta in lines; positive scrolls towards the target.
    pub fn handle_wheel(&mut self, lines: f32) {
        let step = 0.95f32.powf(self.zoom_speed * lines.abs());
        if lines > 0.0 {
            self.dolly(step);
        } else if lines < 0.0 {
            self.dolly(1.0 / step);
        }
    }

    /// Apply pending motion to `camera`. Returns true if it moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let radius = offset.length().max(MIN_DISTANCE);

        // spherical coordinates about Z
        let mut azimuth = offset.y.atan2(offset.x);
        let mut polar = (offset.z / radius).clamp(-1.0, 1.0).acos();

        azimuth += self.azimuth_delta * self.damping_factor;
        polar += self.polar_delta * self.damping_factor;
        polar = polar.clamp(MIN_POLAR, std::f32::consts::PI - MIN_POLAR);

        let radius = (radius * self.scale).max(MIN_DISTANCE);
        self.target += self.pan_offset * self.damping_factor;

        let new_offset = Vec3::new(
            radius * polar.sin() * azimuth.cos(),
            radius * polar.sin() * azimuth.sin(),
            radius * polar.cos(),
        );
        let previous = camera.position;
        camera.position = self.target + new_offset;
        camera.look_at(self.target);

        let decay = 1.0 - self.damping_factor;
        self.azimuth_delta *= decay;
        self.polar_delta *= decay;
        self.pan_offset *= decay;
        self.scale = 1.0;

        camera.position.distance_squared(previous) > EPSILON
    }

    pub fn is_settled(&self) -> bool {
        self.azimuth_delta.abs() < EPSILON
            && self.polar_delta.abs() < EPSILON
            && self.pan_offset.length_squared() < EPSILON
    }
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::new(0.04)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side_camera() -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::default();
        camera.position = Vec3::new(10.0, 0.0, 0.0);
        camera
    }

    #[test]
    fn test_idle_update_keeps_camera() {
        let mut camera = side_camera();
        let mut controls = OrbitControls::default();
        assert!(!controls.update(&mut camera));
        assert!((camera.position - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_rotation_converges() {
        let mut camera = side_camera();
        let mut controls = OrbitControls::default();
        controls.rotate_left(-1.0);

        for _ in 0..2000 {
            controls.update(&mut camera);
        }
        assert!(controls.is_settled());

        // total applied rotation is the full delta
        let azimuth = camera.position.y.atan2(camera.position.x);
        assert!((azimuth - 1.0).abs() < 1e-3);
        assert!((camera.position.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_damping_applies_share() {
        let mut camera = side_camera();
        let mut controls = OrbitControls::new(0.5);
        controls.rotate_left(-1.0);
        controls.update(&mut camera);
        let azimuth = camera.position.y.atan2(camera.position.x);
        assert!((azimuth - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_polar_clamped() {
        let mut camera = side_camera();
        let mut controls = OrbitControls::new(1.0);
        controls.rotate_up(10.0);
        controls.update(&mut camera);
        // stops just short of the pole instead of flipping over it
        assert!(camera.position.z > 9.9);
        let horizontal = camera.position.truncate().length();
        assert!(horizontal > 0.0);
    }

    #[test]
    fn test_dolly_and_target() {
        let mut camera = side_camera();
        let mut controls = OrbitControls::new(1.0);
        controls.dolly(0.5);
        controls.update(&mut camera);
        assert!((camera.position.length() - 5.0).abs() < 1e-4);
        assert_eq!(camera.target, Vec3::ZERO);

        controls.set_target(Vec3::new(0.0, 0.0, 1.0));
        controls.update(&mut camera);
        assert_eq!(camera.target, Vec3::new(0.0, 0.0, 1.0));
    }
}
