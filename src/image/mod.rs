//! Card image types and generators.

mod generator;
pub mod providers;
mod types;

pub use generator::CardGenerator;
pub use types::{
    GeneratedCard, GenerationMetadata, GenerationRequest, ImageFile, ImageFormat,
    MAX_IMAGE_BYTES,
};
