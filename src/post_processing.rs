//! Composer and outline pass state.
//!
//! The composer runs the scene pass followed by an outline pass that draws
//! an edge around selected entities. This module holds the CPU-side state;
//! `gpu::composer` owns the textures and pipelines that follow it.

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::scene_graph::EntityId;

/// Outline parameters, loaded from the viewer config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettings {
    pub edge_strength: f32,
    pub edge_glow: f32,
    pub edge_thickness: f32,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            edge_strength: 1.2,
            edge_glow: 0.0,
            edge_thickness: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlinePass {
    pub enabled: bool,
    pub edge_strength: f32,
    pub edge_glow: f32,
    pub edge_thickness: f32,
    pub visible_edge_color: Color,
    resolution: (u32, u32),
    selected: Vec<EntityId>,
}

impl OutlinePass {
    pub fn new(settings: &OutlineSettings, color: Color, resolution: (u32, u32)) -> Self {
        Self {
            enabled: true,
            edge_strength: settings.edge_strength,
            edge_glow: settings.edge_glow,
            edge_thickness: settings.edge_thickness,
            visible_edge_color: color,
            resolution,
            selected: Vec::new(),
        }
    }

    /// Add an entity to the outlined set. Returns false if already selected.
    pub fn select(&mut self, id: EntityId) -> bool {
        if self.selected.contains(&id) {
            return false;
        }
        self.selected.push(id);
        true
    }

    pub fn deselect(&mut self, id: EntityId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|&e| e != id);
        self.selected.len() != before
    }

    pub fn selected(&self) -> &[EntityId] {
        &self.selected
    }

    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selected.contains(&id)
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = (width, height);
    }

    /// True when there is something to outline.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.selected.is_empty()
    }
}

/// Scene pass followed by the outline pass, sized to the render target.
#[derive(Debug, Clone, PartialEq)]
pub struct Composer {
    size: (u32, u32),
    outline: OutlinePass,
}

impl Composer {
    pub fn new(width: u32, height: u32, outline: &OutlineSettings, edge_color: Color) -> Self {
        Self {
            size: (width, height),
            outline: OutlinePass::new(outline, edge_color, (width, height)),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn outline(&self) -> &OutlinePass {
        &self.outline
    }

    pub fn outline_mut(&mut self) -> &mut OutlinePass {
        &mut self.outline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_defaults() {
        let composer = Composer::new(640, 480, &OutlineSettings::default(), Color::WHITE);
        let outline = composer.outline();
        assert_eq!(outline.edge_strength, 1.2);
        assert_eq!(outline.edge_glow, 0.0);
        assert_eq!(outline.edge_thickness, 0.1);
        assert_eq!(outline.resolution(), (640, 480));
        assert!(!outline.is_active());
    }

    #[test]
    fn test_selection() {
        let mut outline = OutlinePass::new(&OutlineSettings::default(), Color::WHITE, (1, 1));
        assert!(outline.select(EntityId(3)));
        assert!(!outline.select(EntityId(3)));
        assert_eq!(outline.selected(), &[EntityId(3)]);
        assert!(outline.is_active());

        assert!(outline.deselect(EntityId(3)));
        assert!(!outline.deselect(EntityId(3)));
        assert!(!outline.is_active());
    }

    #[test]
    fn test_composer_size_independent_of_outline() {
        let mut composer = Composer::new(10, 10, &OutlineSettings::default(), Color::WHITE);
        composer.set_size(20, 30);
        assert_eq!(composer.size(), (20, 30));
        // the runtime keeps these in step, the composer does not
        assert_eq!(composer.outline().resolution(), (10, 10));
    }
}
