// Conversion adapter: reads the catcher's raw record layout plus its
// metadata container and writes standard UVH5.

mod convert;
mod geometry;
mod meta;
mod raw;
mod uvh5;

pub use convert::UvConverter;
pub use meta::{write_metadata, RawMetadata};
pub use raw::CorrVis;
pub use uvh5::check_file;
