//! Card generator trait.

use crate::error::Result;
use crate::image::types::{GeneratedCard, GenerationRequest};
use async_trait::async_trait;

/// Trait for backends that turn a photo and a name into a birthday card.
///
/// Implementations perform exactly one upstream call per `generate` and never
/// retry.
#[async_trait]
pub trait CardGenerator: Send + Sync {
    /// Generates a card from the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCard>;

    /// Returns the name of this generator for display.
    fn name(&self) -> &str;

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
impl<T: CardGenerator + ?Sized> CardGenerator for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCard> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn health_check(&self) -> Result<()> {
        (**self).health_check().await
    }
}
