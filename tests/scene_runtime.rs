use std::cell::RefCell;
use std::rc::Rc;

use framescope::camera::PerspectiveCamera;
use framescope::color::Color;
use framescope::config::ViewerConfig;
use framescope::context::AppContext;
use framescope::engine::{CreateFrame, FrameEngine, MockEngine, Recording, ReplayEngine};
use framescope::post_processing::Composer;
use framescope::runtime::{DisplaySize, RenderBackend, TickContext, Updatable};
use framescope::scene_graph::SceneGraph;

/// (backend size, composer size, outline resolution) seen at each render.
type RenderLog = Rc<RefCell<Vec<((u32, u32), (u32, u32), (u32, u32))>>>;

/// Records what the runtime asked of it.
#[derive(Default)]
struct RecordingBackend {
    size: (u32, u32),
    frames: RenderLog,
}

impl RenderBackend for RecordingBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn render(&mut self, _: &SceneGraph, _: &PerspectiveCamera, composer: &Composer) -> anyhow::Result<()> {
        self.frames
            .borrow_mut()
            .push((self.size, composer.size(), composer.outline().resolution()));
        Ok(())
    }
}

fn context(engine: Rc<dyn FrameEngine>) -> (AppContext<RecordingBackend>, RenderLog) {
    let frames = Rc::new(RefCell::new(Vec::new()));
    let backend = RecordingBackend {
        size: (300, 150),
        frames: frames.clone(),
    };
    (AppContext::new(engine, backend, &ViewerConfig::default()), frames)
}

#[test]
fn test_resize_updates_everything_in_one_tick() {
    let (mut ctx, frames) = context(Rc::new(MockEngine::new()));
    let resized = ctx.advance(DisplaySize::new(640.0, 360.0, 2.0), 0.0);
    assert!(resized);
    // that tick rendered before it resized
    assert_eq!(frames.borrow().len(), 1);
    assert_eq!(frames.borrow()[0], ((300, 150), (300, 150), (300, 150)));

    let runtime = ctx.runtime();
    assert_eq!(runtime.backend().surface_size(), (1280, 720));
    assert_eq!(runtime.composer().size(), (1280, 720));
    assert_eq!(runtime.composer().outline().resolution(), (1280, 720));
    assert!((runtime.camera().aspect - 1280.0 / 720.0).abs() < 1e-6);

    // the next render sees one coherent size
    assert!(!ctx.advance(DisplaySize::new(640.0, 360.0, 2.0), 16.0));
    let last = *frames.borrow().last().unwrap();
    assert_eq!(last, ((1280, 720), (1280, 720), (1280, 720)));
}

/// Captures the camera position each updatable pass sees.
struct CameraRecorder(RefCell<Vec<glam::Vec3>>);

impl Updatable for CameraRecorder {
    fn update(&self, ctx: &mut TickContext<'_>) {
        self.0.borrow_mut().push(ctx.camera.position);
    }
}

#[test]
fn test_controls_move_camera_before_updatables_run() {
    let (mut ctx, _) = context(Rc::new(MockEngine::new()));
    let seen = Rc::new(CameraRecorder(RefCell::new(Vec::new())));
    ctx.runtime_mut().register(seen.clone());

    let before = ctx.runtime().camera().position;
    ctx.runtime_mut().controls_mut().rotate_left(1.0);
    ctx.advance(DisplaySize::physical(300, 150), 0.0);

    let after = ctx.runtime().camera().position;
    let observed = seen.0.borrow()[0];
    assert!(before.distance(after) > 1e-4);
    assert_eq!(observed, after);
}

#[test]
fn test_context_frame_lifecycle() {
    let engine = Rc::new(MockEngine::new());
    let (mut ctx, _) = context(engine.clone());

    pollster::block_on(ctx.add_frame(&CreateFrame::Inertial { id: "eci".into() })).unwrap();
    let request = CreateFrame::Fixed {
        id: "ecef".into(),
        parent_id: "eci".into(),
        epoch_seconds: 0.0,
    };
    pollster::block_on(ctx.add_frame(&request)).unwrap();
    assert_eq!(ctx.frames().len(), 2);
    assert_eq!(ctx.runtime().updatable_count(), 2);
    assert_eq!(ctx.runtime().scene().len(), 2);

    let options = ctx.frame_options();
    assert_eq!(options[1].value, "ecef");

    engine.set_velocity("ecef", [1000.0, 0.0, 0.0]);
    ctx.set_sim_time(1.0);
    ctx.advance(DisplaySize::physical(300, 150), 0.0);
    let marker = ctx.frame("ecef").unwrap();
    assert!((marker.borrow().position()[0] - 3600.0).abs() < 1e-9);

    assert_eq!(ctx.toggle_axes("ecef"), Some(false));
    assert_eq!(ctx.toggle_axes("missing"), None);

    assert!(ctx.remove_frame("ecef"));
    assert!(marker.borrow().is_disposed());
    assert_eq!(ctx.runtime().updatable_count(), 1);
    assert_eq!(ctx.runtime().scene().len(), 1);
    assert!(!ctx.remove_frame("ecef"));
}

#[test]
fn test_failed_frame_leaves_context_untouched() {
    let (mut ctx, _) = context(Rc::new(MockEngine::new()));
    let orphan = CreateFrame::Topocentric {
        id: "station".into(),
        parent_id: "ecef".into(),
        latitude_rad: 0.6,
        longitude_rad: 0.2,
        altitude_km: 0.35,
    };
    let err = pollster::block_on(ctx.add_frame(&orphan)).unwrap_err();
    assert!(err.is_rejected());
    assert!(ctx.frames().is_empty());
    assert!(ctx.runtime().scene().is_empty());
    assert_eq!(ctx.runtime().updatable_count(), 0);
}

#[test]
fn test_bodies_are_outlined_and_recoloured() {
    let (mut ctx, _) = context(Rc::new(MockEngine::new()));
    let sphere = ctx.add_body("Earth", [10_000.0, 0.0, 0.0], 6371.0);

    let outline = ctx.runtime().composer().outline();
    assert!(outline.is_selected(sphere));
    assert!(outline.is_active());

    assert!(ctx.center_on_body("Earth"));
    let target = ctx.runtime().camera().target;
    assert!((target.x - 10.0).abs() < 1e-4);
    assert!(!ctx.center_on_body("Mars"));

    let red = Color::new(1.0, 0.0, 0.0, 1.0);
    ctx.refresh_colors(red);
    let node = ctx.runtime().scene().get(sphere).unwrap();
    assert_eq!(node.renderable.color(), red.with_alpha(0.0));
    assert_eq!(ctx.runtime().composer().outline().visible_edge_color, red);
}

#[test]
fn test_demo_recording_replays() {
    let json = include_str!("../demos/ground_station.json");
    let recording = Recording::from_json(json).unwrap();
    let engine: Rc<dyn FrameEngine> = Rc::new(ReplayEngine::new(recording.clone()));
    let (mut ctx, _) = context(engine);

    for request in recording.create_requests() {
        pollster::block_on(ctx.add_frame(&request)).unwrap();
    }
    for body in &recording.bodies {
        ctx.add_body(&body.name, body.position, body.radius);
    }
    assert_eq!(ctx.frames().len(), 3);
    assert!(ctx.fit_camera());

    ctx.set_sim_time(6.0);
    ctx.advance(DisplaySize::physical(300, 150), 0.0);

    let station = ctx.frame("station").unwrap();
    let position = station.borrow().position();
    let radius = (position[0].powi(2) + position[1].powi(2) + position[2].powi(2)).sqrt();
    // station stays on the surface, in scene units
    assert!((radius - 6.37135).abs() < 1e-3, "radius {}", radius);

    let table = ctx.status_table();
    assert_eq!(table.rows().len(), 3);
    assert!(table.to_string().contains("Ground Station"));
}
