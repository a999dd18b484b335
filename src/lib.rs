pub mod body;
pub mod camera;
pub mod color;
pub mod config;
pub mod context;
pub mod controls;
pub mod engine;
pub mod gpu;
pub mod marker;
pub mod pose;
pub mod post_processing;
pub mod runtime;
pub mod sampler;
pub mod scene_graph;
pub mod status;
pub mod throttle;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;
#[cfg(not(target_arch = "wasm32"))]
pub mod viewer;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
