pub mod image_io;
pub mod project;
pub mod tiff_stack;
