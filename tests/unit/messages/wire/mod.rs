pub mod length_prefix;
pub mod partial_io;
