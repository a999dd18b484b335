//! Scene graph holding the markers drawn by the viewer.
//!
//! Entities are renderables with a transform and a visibility flag. Kinds of
//! renderable differ only through the [`Renderable`] trait; colour changes
//! go through the optional [`Recolor`] capability rather than by inspecting
//! concrete types.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use crate::color::Color;
use crate::gpu::mesh::{self, Geometry};

/// Unique identifier for scene entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Transform component for scene entities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Bounds { min: p, max: p },
                Some(b) => Bounds {
                    min: b.min.min(p),
                    max: b.max.max(p),
                },
            })
        })
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Bounds of the eight corners after transformation.
    pub fn transformed(&self, matrix: &Mat4) -> Bounds {
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            matrix.transform_point3(corner)
        });
        // eight corners, never empty
        Bounds::from_points(corners).unwrap_or(*self)
    }
}

/// Something that can take the theme colour.
pub trait Recolor {
    fn set_color(&mut self, color: Color);
}

pub trait Renderable: std::fmt::Debug {
    fn geometry(&self) -> Geometry;

    /// Tint multiplied with the vertex colours. Alpha 0 is never drawn in
    /// the colour pass.
    fn color(&self) -> Color;

    fn as_recolor(&mut self) -> Option<&mut dyn Recolor> {
        None
    }
}

/// Oriented axis triad. The per-axis vertex colours are multiplied by
/// `tint`, which follows the theme.
#[derive(Debug, Clone, PartialEq)]
pub struct Triad {
    pub size: f32,
    pub tint: Color,
}

impl Triad {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            tint: Color::WHITE,
        }
    }
}

impl Renderable for Triad {
    fn geometry(&self) -> Geometry {
        mesh::create_triad_geometry(self.size)
    }

    fn color(&self) -> Color {
        self.tint
    }

    fn as_recolor(&mut self) -> Option<&mut dyn Recolor> {
        Some(self)
    }
}

impl Recolor for Triad {
    fn set_color(&mut self, color: Color) {
        self.tint = color;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineLoop {
    pub radius: f32,
    pub segments: u16,
    pub color: Color,
}

impl LineLoop {
    pub fn circle(radius: f32, color: Color) -> Self {
        Self {
            radius,
            segments: 128,
            color,
        }
    }
}

impl Renderable for LineLoop {
    fn geometry(&self) -> Geometry {
        mesh::create_circle_geometry(self.radius, self.segments)
    }

    fn color(&self) -> Color {
        self.color
    }

    fn as_recolor(&mut self) -> Option<&mut dyn Recolor> {
        Some(self)
    }
}

impl Recolor for LineLoop {
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

/// Solid sphere. A fully transparent sphere is invisible in the colour pass
/// but still takes part in selection outlines.
#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub radius: f32,
    pub color: Color,
}

impl Renderable for Sphere {
    fn geometry(&self) -> Geometry {
        mesh::create_sphere_geometry(self.radius, 64, 128)
    }

    fn color(&self) -> Color {
        self.color
    }

    fn as_recolor(&mut self) -> Option<&mut dyn Recolor> {
        Some(self)
    }
}

impl Recolor for Sphere {
    fn set_color(&mut self, color: Color) {
        // keep transparency, only the hue follows the theme
        self.color = color.with_alpha(self.color.a);
    }
}

#[derive(Debug)]
pub struct SceneNode {
    pub renderable: Box<dyn Renderable>,
    pub transform: Transform,
    pub visible: bool,
    local_bounds: Option<Bounds>,
}

impl SceneNode {
    pub fn world_bounds(&self) -> Option<Bounds> {
        self.local_bounds
            .map(|b| b.transformed(&self.transform.matrix()))
    }
}

/// The scene graph - owns every entity that is drawn.
#[derive(Debug)]
pub struct SceneGraph {
    entities: HashMap<EntityId, SceneNode>,
    /// Draw order.
    order: Vec<EntityId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
        }
    }

    fn new_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a renderable to the scene and return its ID.
    pub fn spawn(&mut self, renderable: Box<dyn Renderable>, transform: Transform) -> EntityId {
        let id = self.new_id();
        let local_bounds = Bounds::from_points(renderable.geometry().positions());
        self.entities.insert(
            id,
            SceneNode {
                renderable,
                transform,
                visible: true,
                local_bounds,
            },
        );
        self.order.push(id);
        id
    }

    /// Remove an entity. Returns false if it did not exist.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        self.order.retain(|&e| e != id);
        self.entities.remove(&id).is_some()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneNode> {
        self.entities.get(&id)
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Option<&mut Transform> {
        self.entities.get_mut(&id).map(|n| &mut n.transform)
    }

    /// Returns false if the entity does not exist.
    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> bool {
        match self.entities.get_mut(&id) {
            Some(node) => {
                node.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, id: EntityId) -> bool {
        self.entities.get(&id).map_or(false, |n| n.visible)
    }

    /// All entities in draw order.
    pub fn nodes(&self) -> impl Iterator<Item = (EntityId, &SceneNode)> {
        self.order
            .iter()
            .filter_map(|&id| self.entities.get(&id).map(|n| (id, n)))
    }

    /// Union of every entity's world bounds, hidden ones included.
    pub fn world_bounds(&self) -> Option<Bounds> {
        self.nodes()
            .filter_map(|(_, n)| n.world_bounds())
            .reduce(|a, b| a.union(&b))
    }

    /// Give every recolourable entity `color`. Returns how many changed.
    pub fn recolor_all(&mut self, color: Color) -> usize {
        let mut count = 0;
        for node in self.entities.values_mut() {
            if let Some(target) = node.renderable.as_recolor() {
                target.set_color(color);
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_destroy() {
        let mut scene = SceneGraph::new();
        let id = scene.spawn(Box::new(Triad::new(5.0)), Transform::default());

        assert!(scene.exists(id));
        assert!(scene.is_visible(id));
        assert_eq!(scene.len(), 1);

        assert!(scene.destroy(id));
        assert!(!scene.exists(id));
        assert!(!scene.destroy(id));
        assert_eq!(scene.nodes().count(), 0);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn(Box::new(Triad::new(1.0)), Transform::default());
        scene.destroy(a);
        let b = scene.spawn(Box::new(Triad::new(1.0)), Transform::default());
        assert_ne!(a, b);
    }

    #[test]
    fn test_world_bounds_follow_transform() {
        let mut scene = SceneGraph::new();
        assert!(scene.world_bounds().is_none());

        let id = scene.spawn(
            Box::new(Triad::new(5.0)),
            Transform::from_position(Vec3::new(10.0, 0.0, 0.0)),
        );
        let bounds = scene.world_bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(15.0, 5.0, 5.0));

        *scene.transform_mut(id).unwrap() = Transform::from_position(Vec3::ZERO);
        assert_eq!(scene.world_bounds().unwrap().max, Vec3::splat(5.0));
    }

    #[test]
    fn test_recolor_reaches_every_renderable() {
        let mut scene = SceneGraph::new();
        let triad = scene.spawn(Box::new(Triad::new(1.0)), Transform::default());
        let circle = scene.spawn(
            Box::new(LineLoop::circle(2.0, Color::WHITE)),
            Transform::default(),
        );
        let sphere = scene.spawn(
            Box::new(Sphere {
                radius: 2.0,
                color: Color::TRANSPARENT,
            }),
            Transform::default(),
        );

        let red = Color::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(scene.recolor_all(red), 3);

        // triad vertex colours are tinted, not replaced
        assert_eq!(scene.get(triad).unwrap().renderable.color(), red);
        assert_eq!(
            scene.get(triad).unwrap().renderable.geometry(),
            Triad::new(1.0).geometry()
        );
        assert_eq!(scene.get(circle).unwrap().renderable.color(), red);
        // sphere keeps its transparency
        assert_eq!(scene.get(sphere).unwrap().renderable.color(), red.with_alpha(0.0));
    }
}
