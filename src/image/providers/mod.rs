//! Card generation backends.

mod gemini;

pub use gemini::{GeminiCardGenerator, GeminiCardGeneratorBuilder, GeminiModel, DEFAULT_BASE_URL};
