use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::HtmlCanvasElement;

use crate::color::Color;
use crate::config::ViewerConfig;
use crate::context::AppContext;
use crate::engine::{CreateFrame, EngineError, FrameEngine, InvokeError, IpcEngine, Transport};
use crate::engine::ipc::InvokeFuture;
use crate::gpu::target::SurfaceBackend;
use crate::marker::PreparedFrame;
use crate::runtime::DisplaySize;
use crate::sampler::hours_to_seconds;

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_error_message(err: &JsValue) -> String {
    if let Some(message) = err.as_string() {
        return message;
    }
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    js_sys::JSON::stringify(err)
        .ok()
        .and_then(|s| s.as_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn engine_error(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_json_value(value: &JsValue) -> Result<Value, String> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text = js_sys::JSON::stringify(value)
        .map_err(|e| js_error_message(&e))?
        .as_string()
        .unwrap_or_default();
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

/// Host-provided `invoke(command, args) -> Promise` function.
///
/// A promise rejection is the engine refusing the command; a synchronous
/// throw or an unreadable response means the command never got through.
pub struct JsInvokeTransport {
    invoke: js_sys::Function,
}

impl Transport for JsInvokeTransport {
    fn invoke<'a>(&'a self, command: &'a str, args: Value) -> InvokeFuture<'a> {
        Box::pin(async move {
            let args = js_sys::JSON::parse(&args.to_string())
                .map_err(|e| InvokeError::Transport(js_error_message(&e)))?;
            let result = self
                .invoke
                .call2(&JsValue::NULL, &JsValue::from_str(command), &args)
                .map_err(|e| InvokeError::Transport(js_error_message(&e)))?;
            let value = JsFuture::from(js_sys::Promise::resolve(&result))
                .await
                .map_err(|e| InvokeError::Command(js_error_message(&e)))?;
            to_json_value(&value).map_err(InvokeError::Transport)
        })
    }
}

struct ViewState {
    ctx: AppContext<SurfaceBackend>,
    canvas: HtmlCanvasElement,
}

#[wasm_bindgen]
pub struct FrameView {
    inner: Rc<RefCell<ViewState>>,
}

#[wasm_bindgen]
impl FrameView {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<FrameView, JsValue> {
        Err(JsValue::from_str("Use the create_frame_view async constructor"))
    }

    /// One tick: controls, markers, render, resize. Call from
    /// requestAnimationFrame with the canvas CSS size.
    pub fn render(&self, css_width: f64, css_height: f64, pixel_ratio: f64, now_ms: f64) -> bool {
        let Ok(mut state) = self.inner.try_borrow_mut() else {
            log::debug!("Frame view busy, skipping render");
            return false;
        };
        let display = DisplaySize::new(css_width, css_height, pixel_ratio);
        let (width, height) = display.backing_size();
        if width > 0 && height > 0 && (state.canvas.width(), state.canvas.height()) != (width, height) {
            state.canvas.set_width(width);
            state.canvas.set_height(height);
        }
        state.ctx.advance(display, now_ms)
    }

    pub fn set_sim_time(&self, hours: f64) {
        self.inner.borrow_mut().ctx.set_sim_time(hours);
    }

    pub fn sim_time(&self) -> f64 {
        self.inner.borrow().ctx.sim_hours()
    }

    /// Create a frame from a JSON request such as
    /// `{"kind":"fixed","id":"ecef","parent_id":"eci","epoch_seconds":0}`.
    /// Resolves to the frame's picker option.
    pub fn add_frame(&self, request_json: String) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let request: CreateFrame = serde_json::from_str(&request_json)
                .map_err(|e| JsValue::from_str(&format!("Invalid frame request: {}", e)))?;

            // the engine call must not hold the view borrowed
            let (engine, sim_hours, scale) = {
                let state = inner.borrow();
                (state.ctx.engine(), state.ctx.sim_hours(), state.ctx.position_scale())
            };
            let prepared = PreparedFrame::fetch(engine, &request, sim_hours, scale)
                .await
                .map_err(engine_error)?;

            let mut state = inner
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("Frame view busy"))?;
            let marker = state.ctx.adopt_frame(prepared);
            let option = marker.borrow().to_option();
            serde_json::to_string(&option)
                .map(|json| JsValue::from_str(&json))
                .map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    pub fn remove_frame(&self, id: &str) -> bool {
        self.inner.borrow_mut().ctx.remove_frame(id)
    }

    /// New triad visibility, or undefined for an unknown frame.
    pub fn toggle_axes(&self, id: &str) -> Option<bool> {
        self.inner.borrow_mut().ctx.toggle_axes(id)
    }

    pub fn frame_options_json(&self) -> String {
        let options = self.inner.borrow().ctx.frame_options();
        serde_json::to_string(&options).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn status_json(&self) -> String {
        self.inner
            .borrow()
            .ctx
            .status_table()
            .to_json()
            .unwrap_or_else(|_| "[]".to_string())
    }

    /// Add a body given in engine units.
    pub fn add_body(&self, name: &str, x: f64, y: f64, z: f64, radius: f64) {
        self.inner.borrow_mut().ctx.add_body(name, [x, y, z], radius);
    }

    pub fn center_on_body(&self, name: &str) -> bool {
        self.inner.borrow_mut().ctx.center_on_body(name)
    }

    pub fn fit_camera(&self) -> bool {
        self.inner.borrow_mut().ctx.fit_camera()
    }

    /// Apply a theme foreground given as `#rrggbb` or `#rrggbbaa`.
    pub fn set_foreground(&self, hex: &str) -> Result<(), JsValue> {
        let color = Color::parse_hex(hex).map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.inner.borrow_mut().ctx.refresh_colors(color);
        Ok(())
    }

    pub fn orbit(&self, dx: f32, dy: f32, height: f32) {
        let mut state = self.inner.borrow_mut();
        state.ctx.runtime_mut().controls_mut().handle_drag(dx, dy, height);
    }

    pub fn pan(&self, dx: f32, dy: f32, height: f32) {
        let mut state = self.inner.borrow_mut();
        let (camera, controls) = state.ctx.runtime_mut().camera_and_controls();
        controls.handle_pan(camera, dx, dy, height);
    }

    pub fn zoom(&self, lines: f32) {
        self.inner.borrow_mut().ctx.runtime_mut().controls_mut().handle_wheel(lines);
    }

    /// Express a vector given in `frame_id` in the root frame at the current
    /// simulated time. Resolves to `{position, orientation}` JSON.
    pub fn frame_to_root(&self, frame_id: String, x: f64, y: f64, z: f64) -> js_sys::Promise {
        let (engine, t) = {
            let state = self.inner.borrow();
            (state.ctx.engine(), hours_to_seconds(state.ctx.sim_hours()))
        };
        future_to_promise(async move {
            let root = engine.to_root(&frame_id, [x, y, z], t).await.map_err(engine_error)?;
            let json = serde_json::json!({
                "position": root.position,
                "orientation": root.orientation,
            });
            Ok(JsValue::from_str(&json.to_string()))
        })
    }
}

/// Build a view on `canvas` whose engine is reached through `invoke`.
/// `config_json` may be empty for defaults.
#[wasm_bindgen]
pub async fn create_frame_view(
    canvas: HtmlCanvasElement,
    invoke: js_sys::Function,
    config_json: Option<String>,
) -> Result<FrameView, JsValue> {
    init_panic_hook();

    let config = match config_json.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(json) => ViewerConfig::from_json(json).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?,
        None => ViewerConfig::default(),
    };

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
        flags: wgpu::InstanceFlags::default(),
        gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
    });

    let target = wgpu::SurfaceTarget::Canvas(canvas.clone());
    let surface = instance
        .create_surface(target)
        .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {}", e)))?;

    let backend = SurfaceBackend::new(&instance, surface, canvas.width(), canvas.height(), config.background)
        .await
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;

    let engine: Rc<dyn FrameEngine> = Rc::new(IpcEngine::new(JsInvokeTransport { invoke }));
    let ctx = AppContext::new(engine, backend, &config);
    log::info!("Frame view ready ({}x{})", canvas.width(), canvas.height());

    Ok(FrameView {
        inner: Rc::new(RefCell::new(ViewState { ctx, canvas })),
    })
}
