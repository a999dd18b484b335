//! Per-tick scene runtime: controls, updatables, composite render, resize.

use std::rc::Rc;

use crate::body::BodyMarker;
use crate::camera::PerspectiveCamera;
use crate::color::Color;
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::post_processing::Composer;
use crate::scene_graph::SceneGraph;

/// Size of the element the scene is displayed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub css_width: f64,
    pub css_height: f64,
    pub pixel_ratio: f64,
}

impl DisplaySize {
    pub fn new(css_width: f64, css_height: f64, pixel_ratio: f64) -> Self {
        Self {
            css_width,
            css_height,
            pixel_ratio,
        }
    }

    /// A display whose CSS size already is the pixel size.
    pub fn physical(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64, 1.0)
    }

    /// Pixel size of the backing surface.
    pub fn backing_size(&self) -> (u32, u32) {
        let scale = |css: f64| (css * self.pixel_ratio).floor().max(0.0) as u32;
        (scale(self.css_width), scale(self.css_height))
    }
}

/// Where frames are drawn: a window surface, a canvas or an offscreen target.
pub trait RenderBackend {
    fn surface_size(&self) -> (u32, u32);

    fn set_size(&mut self, width: u32, height: u32);

    fn render(
        &mut self,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
        composer: &Composer,
    ) -> anyhow::Result<()>;
}

/// What an updatable may see and touch during a tick.
pub struct TickContext<'a> {
    pub camera: &'a PerspectiveCamera,
    pub scene: &'a mut SceneGraph,
    /// Simulated time, hours.
    pub sim_hours: f64,
    /// Wall clock, milliseconds.
    pub now_ms: f64,
}

/// Anything ticked once per frame before rendering.
pub trait Updatable {
    fn update(&self, ctx: &mut TickContext<'_>);
}

pub struct SceneRuntime<B> {
    backend: B,
    scene: SceneGraph,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    composer: Composer,
    updatables: Vec<Rc<dyn Updatable>>,
    foreground: Color,
    background: Color,
}

fn same_updatable(a: &Rc<dyn Updatable>, b: &Rc<dyn Updatable>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

impl<B: RenderBackend> SceneRuntime<B> {
    pub fn new(backend: B, config: &ViewerConfig) -> Self {
        let (width, height) = backend.surface_size();
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Self {
            backend,
            scene: SceneGraph::new(),
            camera: PerspectiveCamera::new(&config.camera, aspect),
            controls: OrbitControls::new(config.damping_factor),
            composer: Composer::new(width, height, &config.outline, config.foreground),
            updatables: Vec::new(),
            foreground: config.foreground,
            background: config.background,
        }
    }

    /// One frame: controls, updatables, render, then resize check.
    /// Returns true if the surface was resized.
    pub fn tick(&mut self, display: DisplaySize, sim_hours: f64, now_ms: f64) -> bool {
        self.controls.update(&mut self.camera);

        let mut ctx = TickContext {
            camera: &self.camera,
            scene: &mut self.scene,
            sim_hours,
            now_ms,
        };
        for updatable in &self.updatables {
            updatable.update(&mut ctx);
        }

        if let Err(e) = self.backend.render(&self.scene, &self.camera, &self.composer) {
            log::warn!("Render failed: {:#}", e);
        }

        self.resize_to_display_size(display)
    }

    /// Bring backend, composer and outline resolution to the display's
    /// backing size. Returns true if anything changed.
    pub fn resize_to_display_size(&mut self, display: DisplaySize) -> bool {
        let (width, height) = display.backing_size();
        if width == 0 || height == 0 {
            return false;
        }
        if (width, height) == self.backend.surface_size() {
            return false;
        }

        log::debug!("Resizing to {}x{}", width, height);
        self.backend.set_size(width, height);
        self.composer.set_size(width, height);
        self.composer.outline_mut().set_resolution(width, height);
        self.camera.set_aspect(width as f32 / height as f32);
        true
    }

    /// Frame the whole scene. Returns false for an empty scene.
    pub fn fit_camera_to_bounds(&mut self) -> bool {
        let Some(bounds) = self.scene.world_bounds() else {
            return false;
        };
        let center = self.camera.fit_to_bounds(&bounds);
        self.controls.set_target(center);
        true
    }

    /// Apply a new theme foreground to the outline and every recolourable
    /// entity.
    pub fn refresh_colors(&mut self, foreground: Color) {
        self.foreground = foreground;
        self.composer.outline_mut().visible_edge_color = foreground;
        let count = self.scene.recolor_all(foreground);
        log::debug!("Recoloured {} entities", count);
    }

    pub fn register(&mut self, updatable: Rc<dyn Updatable>) {
        if !self.updatables.iter().any(|u| same_updatable(u, &updatable)) {
            self.updatables.push(updatable);
        }
    }

    pub fn deregister(&mut self, updatable: &Rc<dyn Updatable>) -> bool {
        let before = self.updatables.len();
        self.updatables.retain(|u| !same_updatable(u, updatable));
        self.updatables.len() != before
    }

    pub fn updatable_count(&self) -> usize {
        self.updatables.len()
    }

    /// Outline the body's selection sphere.
    pub fn register_body(&mut self, body: &BodyMarker) {
        self.composer.outline_mut().select(body.selection_entity());
    }

    pub fn center_camera_on_body(&mut self, body: &BodyMarker) -> bool {
        let Some(bounds) = self
            .scene
            .get(body.selection_entity())
            .and_then(|node| node.world_bounds())
        else {
            return false;
        };
        let center = bounds.center();
        self.camera.look_at(center);
        self.controls.set_target(center);
        true
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut PerspectiveCamera {
        &mut self.camera
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    /// Camera and controls together, for input handling.
    pub fn camera_and_controls(&mut self) -> (&PerspectiveCamera, &mut OrbitControls) {
        (&self.camera, &mut self.controls)
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn foreground(&self) -> Color {
        self.foreground
    }

    pub fn background(&self) -> Color {
        self.background
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use crate::scene_graph::{Transform, Triad};

    #[derive(Default)]
    struct FakeBackend {
        size: (u32, u32),
        renders: usize,
        fail: bool,
    }

    impl RenderBackend for FakeBackend {
        fn surface_size(&self) -> (u32, u32) {
            self.size
        }

        fn set_size(&mut self, width: u32, height: u32) {
            self.size = (width, height);
        }

        fn render(&mut self, _: &SceneGraph, _: &PerspectiveCamera, _: &Composer) -> anyhow::Result<()> {
            self.renders += 1;
            if self.fail {
                anyhow::bail!("device lost");
            }
            Ok(())
        }
    }

    fn runtime() -> SceneRuntime<FakeBackend> {
        let backend = FakeBackend {
            size: (300, 150),
            ..Default::default()
        };
        SceneRuntime::new(backend, &ViewerConfig::default())
    }

    /// Records the order in which it was ticked.
    struct TickRecorder {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        seen_hours: Cell<f64>,
    }

    impl Updatable for TickRecorder {
        fn update(&self, ctx: &mut TickContext<'_>) {
            self.log.borrow_mut().push(self.name);
            self.seen_hours.set(ctx.sim_hours);
        }
    }

    #[test]
    fn test_backing_size_floors() {
        let display = DisplaySize::new(300.5, 150.0, 1.5);
        assert_eq!(display.backing_size(), (450, 225));
    }

    #[test]
    fn test_updatables_ticked_in_order() {
        let mut runtime = runtime();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a: Rc<dyn Updatable> = Rc::new(TickRecorder {
            name: "a",
            log: log.clone(),
            seen_hours: Cell::new(0.0),
        });
        let b = Rc::new(TickRecorder {
            name: "b",
            log: log.clone(),
            seen_hours: Cell::new(0.0),
        });
        runtime.register(a.clone());
        runtime.register(b.clone());
        runtime.register(a.clone());
        assert_eq!(runtime.updatable_count(), 2);

        runtime.tick(DisplaySize::physical(300, 150), 2.5, 0.0);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(b.seen_hours.get(), 2.5);

        assert!(runtime.deregister(&a));
        runtime.tick(DisplaySize::physical(300, 150), 2.5, 16.0);
        assert_eq!(*log.borrow(), vec!["a", "b", "b"]);
    }

    #[test]
    fn test_render_error_does_not_escape_tick() {
        let mut runtime = runtime();
        runtime.backend_mut().fail = true;
        runtime.tick(DisplaySize::physical(300, 150), 0.0, 0.0);
        runtime.tick(DisplaySize::physical(300, 150), 0.0, 16.0);
        assert_eq!(runtime.backend().renders, 2);
    }

    #[test]
    fn test_zero_size_display_ignored() {
        let mut runtime = runtime();
        assert!(!runtime.tick(DisplaySize::physical(0, 0), 0.0, 0.0));
        assert_eq!(runtime.backend().surface_size(), (300, 150));
    }

    #[test]
    fn test_fit_camera_sets_controls_target() {
        let mut runtime = runtime();
        assert!(!runtime.fit_camera_to_bounds());

        runtime.scene_mut().spawn(
            Box::new(Triad::new(2.0)),
            Transform::from_position(glam::Vec3::new(4.0, 0.0, 0.0)),
        );
        assert!(runtime.fit_camera_to_bounds());
        let center = glam::Vec3::new(5.0, 1.0, 1.0);
        assert_eq!(runtime.camera().target, center);

        // controls keep looking at the fitted centre
        runtime.tick(DisplaySize::physical(300, 150), 0.0, 0.0);
        assert_eq!(runtime.camera().target, center);
        assert!(runtime.camera().position.y > center.y);
    }
}
