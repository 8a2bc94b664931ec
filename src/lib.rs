#![warn(missing_docs)]
//! cardgen - personalized birthday cards from a photo and a name.
//!
//! A photo and a name go in; the photo is sent to a Gemini image model with a
//! fixed birthday-card instruction, and the first image in the reply comes
//! back as a [`GeneratedCard`].
//!
//! # Quick Start
//!
//! ```no_run
//! use cardgen::{GeminiCardGenerator, ImageFormat};
//!
//! #[tokio::main]
//! async fn main() -> cardgen::Result<()> {
//!     let generator = GeminiCardGenerator::builder().build()?;
//!     let photo = std::fs::read("ada.jpg")?;
//!     let data_url = generator
//!         .generate_card(&photo, ImageFormat::Jpeg.mime_type(), "Ada")
//!         .await?;
//!     println!("{data_url}");
//!     Ok(())
//! }
//! ```
//!
//! # Driving a form
//!
//! [`FormController`] holds the form state (name, photo, preview, result,
//! loading flag, error), validates input and allows one generation in flight
//! at a time. Front ends subscribe to state changes:
//!
//! ```no_run
//! use cardgen::{FormController, GeminiCardGenerator, ImageFile};
//!
//! #[tokio::main]
//! async fn main() -> cardgen::Result<()> {
//!     let form = FormController::new(GeminiCardGenerator::builder().build()?);
//!     let mut changes = form.subscribe();
//!     tokio::spawn(async move {
//!         while changes.changed().await.is_ok() {
//!             println!("loading: {}", changes.borrow_and_update().is_loading);
//!         }
//!     });
//!
//!     form.set_name("Ada Lovelace");
//!     form.select_image(ImageFile::from_path("ada.jpg")?)?;
//!     form.submit().await?;
//!     form.download(".")?;
//!     Ok(())
//! }
//! ```

mod controller;
mod error;
pub mod image;
pub mod prompt;

pub use controller::{FormController, SubmitOutcome, UiState};
pub use error::{CardGenError, Result, ValidationError};
pub use image::providers::{GeminiCardGenerator, GeminiCardGeneratorBuilder, GeminiModel};
pub use image::{
    CardGenerator, GeneratedCard, GenerationMetadata, GenerationRequest, ImageFile, ImageFormat,
    MAX_IMAGE_BYTES,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::controller::{FormController, SubmitOutcome, UiState};
    pub use crate::error::{CardGenError, Result};
    pub use crate::image::providers::GeminiCardGenerator;
    pub use crate::image::{CardGenerator, GeneratedCard, GenerationRequest, ImageFile};
}
