//! Native window playing a recording in real time.
//!
//! Left drag orbits, right drag pans, the wheel zooms. Keys: `f` fits the
//! camera to the scene, `a` toggles every triad, `1`-`9` toggle one frame,
//! `space` pauses, `s` prints the frame table, `c` centres on the first body.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, Event, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::config::ViewerConfig;
use crate::context::AppContext;
use crate::engine::{FrameEngine, Recording, ReplayEngine};
use crate::gpu::target::SurfaceBackend;
use crate::runtime::DisplaySize;

#[derive(Debug, Default, Clone, Copy)]
struct DragState {
    orbit: bool,
    pan: bool,
    last: Option<PhysicalPosition<f64>>,
}

/// Wall clock driving simulated time.
struct SimClock {
    started: Instant,
    last: Instant,
    hours_per_second: f64,
    paused: bool,
}

impl SimClock {
    fn new(hours_per_second: f64) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            hours_per_second,
            paused: false,
        }
    }

    /// Advance and return (elapsed sim hours since the last call, wall ms).
    fn tick(&mut self) -> (f64, f64) {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        let hours = if self.paused { 0.0 } else { dt * self.hours_per_second };
        let now_ms = now.duration_since(self.started).as_secs_f64() * 1000.0;
        (hours, now_ms)
    }
}

pub fn run(recording: Recording, config: ViewerConfig, hours_per_second: f64) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("framescope")
            .build(&event_loop)
            .context("Failed to create window")?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("Failed to create surface")?;
    let size = window.inner_size();
    let backend = pollster::block_on(SurfaceBackend::new(
        &instance,
        surface,
        size.width,
        size.height,
        config.background,
    ))?;

    let engine: Rc<dyn FrameEngine> = Rc::new(ReplayEngine::new(recording.clone()));
    let mut ctx = AppContext::new(engine, backend, &config);
    let added = pollster::block_on(crate::cli::populate(&mut ctx, &recording));
    log::info!("{} of {} frames created", added, recording.frames.len());
    ctx.fit_camera();

    let mut clock = SimClock::new(hours_per_second);
    let mut drag = DragState::default();

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::RedrawRequested => {
                let (hours, now_ms) = clock.tick();
                ctx.set_sim_time(ctx.sim_hours() + hours);
                let size = window.inner_size();
                ctx.advance(DisplaySize::physical(size.width, size.height), now_ms);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state == ElementState::Pressed;
                match button {
                    MouseButton::Left => drag.orbit = pressed,
                    MouseButton::Right | MouseButton::Middle => drag.pan = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(last) = drag.last {
                    let dx = (position.x - last.x) as f32;
                    let dy = (position.y - last.y) as f32;
                    let height = window.inner_size().height as f32;
                    let (camera, controls) = ctx.runtime_mut().camera_and_controls();
                    if drag.orbit {
                        controls.handle_drag(dx, dy, height);
                    } else if drag.pan {
                        controls.handle_pan(camera, dx, dy, height);
                    }
                }
                drag.last = Some(position);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 40.0) as f32,
                };
                ctx.runtime_mut().controls_mut().handle_wheel(lines);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => handle_key(&mut ctx, &mut clock, logical_key.as_ref()),
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}

fn handle_key(ctx: &mut AppContext<SurfaceBackend>, clock: &mut SimClock, key: Key<&str>) {
    match key {
        Key::Named(NamedKey::Space) => {
            clock.paused = !clock.paused;
            log::info!("{}", if clock.paused { "Paused" } else { "Playing" });
        }
        Key::Character("f") => {
            ctx.fit_camera();
        }
        Key::Character("a") => {
            let ids: Vec<String> = ctx.frames().iter().map(|m| m.borrow().id().to_string()).collect();
            for id in ids {
                ctx.toggle_axes(&id);
            }
        }
        Key::Character("s") => print!("{}", ctx.status_table()),
        Key::Character("c") => {
            let first = ctx.bodies().first().map(|b| b.name().to_string());
            if let Some(name) = first {
                ctx.center_on_body(&name);
            }
        }
        Key::Character(digit) => {
            let index = digit.parse::<usize>().ok().filter(|d| *d > 0);
            let id = index
                .and_then(|d| ctx.frames().get(d - 1))
                .map(|m| m.borrow().id().to_string());
            if let Some(id) = id {
                if let Some(visible) = ctx.toggle_axes(&id) {
                    log::info!("Frame '{}' axes {}", id, if visible { "shown" } else { "hidden" });
                }
            }
        }
        _ => {}
    }
}
