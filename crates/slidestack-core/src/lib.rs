pub mod error;
pub mod consts;
pub mod geometry;
pub mod image;
pub mod landmarks;
pub mod transform;
pub mod offsets;
pub mod memory;
pub mod vision;
pub mod compositor;
pub mod io;
pub mod pipeline;
