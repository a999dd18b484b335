pub mod composer;
pub mod mesh;
pub mod pipeline;
pub mod renderer;
pub mod target;
