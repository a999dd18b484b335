//! A physical body drawn as three great circles around an invisible sphere.
//!
//! The sphere is never visible in the colour pass; it exists so the body has
//! a solid shape to outline and to centre the camera on.

use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};

use crate::color::Color;
use crate::scene_graph::{EntityId, LineLoop, SceneGraph, Sphere, Transform};

#[derive(Debug, Clone, PartialEq)]
pub struct BodyMarker {
    name: String,
    position: Vec3,
    radius: f32,
    circles: [EntityId; 3],
    sphere: EntityId,
}

impl BodyMarker {
    pub fn new(
        scene: &mut SceneGraph,
        name: impl Into<String>,
        position: Vec3,
        radius: f32,
        color: Color,
    ) -> Self {
        let rotations = [
            Quat::IDENTITY,                  // XY
            Quat::from_rotation_x(FRAC_PI_2), // XZ
            Quat::from_rotation_y(FRAC_PI_2), // YZ
        ];
        let circles = rotations.map(|rotation| {
            scene.spawn(
                Box::new(LineLoop::circle(radius, color)),
                Transform::from_position_rotation(position, rotation),
            )
        });
        let sphere = scene.spawn(
            Box::new(Sphere {
                radius,
                color: color.with_alpha(0.0),
            }),
            Transform::from_position(position),
        );

        Self {
            name: name.into(),
            position,
            radius,
            circles,
            sphere,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// The sphere used for outlines and camera centring.
    pub fn selection_entity(&self) -> EntityId {
        self.sphere
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.circles.iter().copied().chain(std::iter::once(self.sphere))
    }

    pub fn dispose(&self, scene: &mut SceneGraph) {
        for id in self.entities() {
            scene.destroy(id);
        }
    }
}
