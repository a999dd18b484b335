//! Application context: simulated time, frames and bodies, and the single
//! per-tick entry point.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use crate::body::BodyMarker;
use crate::color::Color;
use crate::config::ViewerConfig;
use crate::engine::{CreateFrame, EngineError, FrameEngine};
use crate::marker::{FrameMarker, MarkerSettings, PickerOption, PreparedFrame};
use crate::runtime::{DisplaySize, RenderBackend, SceneRuntime, Updatable};
use crate::scene_graph::EntityId;
use crate::status::StatusTable;

pub struct AppContext<B> {
    engine: Rc<dyn FrameEngine>,
    runtime: SceneRuntime<B>,
    settings: MarkerSettings,
    position_scale: f64,
    sim_hours: f64,
    frames: Vec<Rc<RefCell<FrameMarker>>>,
    bodies: Vec<BodyMarker>,
}

impl<B: RenderBackend> AppContext<B> {
    pub fn new(engine: Rc<dyn FrameEngine>, backend: B, config: &ViewerConfig) -> Self {
        Self {
            engine,
            runtime: SceneRuntime::new(backend, config),
            settings: MarkerSettings::from_config(config),
            position_scale: config.position_scale,
            sim_hours: 0.0,
            frames: Vec::new(),
            bodies: Vec::new(),
        }
    }

    pub fn engine(&self) -> Rc<dyn FrameEngine> {
        self.engine.clone()
    }

    pub fn position_scale(&self) -> f64 {
        self.position_scale
    }

    pub fn sim_hours(&self) -> f64 {
        self.sim_hours
    }

    pub fn set_sim_time(&mut self, hours: f64) {
        self.sim_hours = hours;
    }

    /// Run one tick at the current simulated time.
    pub fn advance(&mut self, display: DisplaySize, now_ms: f64) -> bool {
        self.runtime.tick(display, self.sim_hours, now_ms)
    }

    /// Create a frame in the engine and show it.
    pub async fn add_frame(&mut self, request: &CreateFrame) -> Result<Rc<RefCell<FrameMarker>>, EngineError> {
        let prepared =
            PreparedFrame::fetch(self.engine.clone(), request, self.sim_hours, self.position_scale).await?;
        Ok(self.adopt_frame(prepared))
    }

    /// Show a frame that was already created and placed. A marker with the
    /// same id is replaced.
    pub fn adopt_frame(&mut self, prepared: PreparedFrame) -> Rc<RefCell<FrameMarker>> {
        let id = prepared.snapshot().id.clone();
        if self.remove_frame(&id) {
            log::info!("Replacing marker for frame '{}'", id);
        }
        let marker = Rc::new(RefCell::new(prepared.spawn(self.runtime.scene_mut(), &self.settings)));
        self.runtime.register(marker.clone());
        self.frames.push(marker.clone());
        marker
    }

    /// Stop ticking the marker, then remove it from the scene.
    pub fn remove_frame(&mut self, id: &str) -> bool {
        let Some(index) = self.frames.iter().position(|m| m.borrow().id() == id) else {
            return false;
        };
        let marker = self.frames.remove(index);
        let updatable: Rc<dyn Updatable> = marker.clone();
        self.runtime.deregister(&updatable);
        marker.borrow_mut().dispose(self.runtime.scene_mut());
        true
    }

    /// Flip a frame's triad. Returns the new visibility, or `None` for an
    /// unknown id.
    pub fn toggle_axes(&mut self, id: &str) -> Option<bool> {
        let marker = self.frame(id)?;
        let visible = marker.borrow_mut().toggle_axes(self.runtime.scene_mut());
        Some(visible)
    }

    pub fn frame(&self, id: &str) -> Option<Rc<RefCell<FrameMarker>>> {
        self.frames.iter().find(|m| m.borrow().id() == id).cloned()
    }

    pub fn frames(&self) -> &[Rc<RefCell<FrameMarker>>] {
        &self.frames
    }

    pub fn frame_options(&self) -> Vec<PickerOption> {
        self.frames.iter().map(|m| m.borrow().to_option()).collect()
    }

    /// Add a body given in engine units and outline it. Returns the entity
    /// used for its outline.
    pub fn add_body(&mut self, name: &str, position: [f64; 3], radius: f64) -> EntityId {
        let scale = self.position_scale;
        let center = Vec3::new(
            (position[0] / scale) as f32,
            (position[1] / scale) as f32,
            (position[2] / scale) as f32,
        );
        let foreground = self.runtime.foreground();
        let body = BodyMarker::new(
            self.runtime.scene_mut(),
            name,
            center,
            (radius / scale) as f32,
            foreground,
        );
        self.runtime.register_body(&body);
        log::info!("Added body '{}' radius {:.3}", name, body.radius());
        let selection = body.selection_entity();
        self.bodies.push(body);
        selection
    }

    pub fn bodies(&self) -> &[BodyMarker] {
        &self.bodies
    }

    pub fn center_on_body(&mut self, name: &str) -> bool {
        match self.bodies.iter().find(|b| b.name() == name) {
            Some(body) => self.runtime.center_camera_on_body(body),
            None => false,
        }
    }

    pub fn fit_camera(&mut self) -> bool {
        self.runtime.fit_camera_to_bounds()
    }

    pub fn refresh_colors(&mut self, foreground: Color) {
        self.runtime.refresh_colors(foreground);
    }

    pub fn status_table(&self) -> StatusTable {
        let markers: Vec<_> = self.frames.iter().map(|m| m.borrow()).collect();
        StatusTable::from_markers(markers.iter().map(|m| &**m))
    }

    pub fn runtime(&self) -> &SceneRuntime<B> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut SceneRuntime<B> {
        &mut self.runtime
    }
}
