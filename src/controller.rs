//! Form controller: input state, validation and single-flight submission.
//!
//! The controller owns one [`UiState`] record. Every mutation goes through a
//! [`tokio::sync::watch`] channel, so front ends re-render by subscribing
//! instead of polling.

use crate::error::{Result, ValidationError};
use crate::image::{CardGenerator, GeneratedCard, GenerationRequest, ImageFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Message recorded when an in-flight submission is dropped before it resolves.
const CANCELLED_MESSAGE: &str = "Card generation was cancelled.";

/// Observable form state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// Trimmed subject name.
    pub name: String,
    /// Accepted photo.
    pub selected_image: Option<Arc<ImageFile>>,
    /// Data URL of the accepted photo, for display only.
    pub preview_url: Option<String>,
    /// Most recent card. Replaced, never mutated, on regeneration.
    pub result: Option<Arc<GeneratedCard>>,
    /// True while a generation is in flight.
    pub is_loading: bool,
    /// User-facing error message.
    pub error: Option<String>,
}

impl UiState {
    /// Whether the generate action should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.is_loading && !self.name.is_empty() && self.selected_image.is_some()
    }
}

/// How a call to [`FormController::submit`] resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A new card was generated.
    Generated(Arc<GeneratedCard>),
    /// Another submission was already in flight; nothing was sent.
    AlreadyInFlight,
}

enum Begin {
    Busy,
    Invalid(ValidationError),
    Ready(GenerationRequest),
}

/// Clears the loading flag if a submission is dropped mid-flight.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<UiState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("card generation dropped before completion");
            self.state.send_modify(|s| {
                s.is_loading = false;
                s.error = Some(CANCELLED_MESSAGE.to_string());
            });
        }
    }
}

/// Drives one card form against a [`CardGenerator`].
pub struct FormController<G> {
    generator: G,
    state: watch::Sender<UiState>,
}

impl<G: CardGenerator> FormController<G> {
    /// Creates a controller with empty form state.
    pub fn new(generator: G) -> Self {
        let (state, _) = watch::channel(UiState::default());
        Self { generator, state }
    }

    /// Returns the underlying generator.
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.subscribe()
    }

    /// Stores the trimmed name.
    pub fn set_name(&self, value: &str) {
        let name = value.trim();
        self.state.send_if_modified(|s| {
            if s.name == name {
                return false;
            }
            s.name = name.to_string();
            true
        });
    }

    /// Accepts a photo, or records an error and leaves the selection alone.
    pub fn select_image(&self, file: ImageFile) -> Result<()> {
        if let Err(err) = file.check_size() {
            tracing::debug!(size = file.size(), "rejected oversized photo");
            self.state.send_modify(|s| s.error = Some(err.to_string()));
            return Err(err.into());
        }

        let preview = file.to_data_url();
        tracing::debug!(file = %file.file_name, size = file.size(), "photo selected");
        self.state.send_modify(|s| {
            s.selected_image = Some(Arc::new(file));
            s.preview_url = Some(preview);
            s.error = None;
        });
        Ok(())
    }

    /// Clears the error message.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Generates a card from the current name and photo.
    ///
    /// At most one submission is in flight per controller; a call made while
    /// another is pending returns [`SubmitOutcome::AlreadyInFlight`] without
    /// contacting the generator. Failures are returned and also recorded in
    /// [`UiState::error`].
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let mut begin = Begin::Busy;
        self.state.send_if_modified(|s| {
            if s.is_loading {
                return false;
            }
            match build_request(s) {
                Ok(request) => {
                    s.is_loading = true;
                    s.error = None;
                    s.result = None;
                    begin = Begin::Ready(request);
                }
                Err(err) => {
                    s.error = Some(err.to_string());
                    begin = Begin::Invalid(err);
                }
            }
            true
        });

        let request = match begin {
            Begin::Busy => {
                tracing::debug!("submit ignored, generation already in flight");
                return Ok(SubmitOutcome::AlreadyInFlight);
            }
            Begin::Invalid(err) => return Err(err.into()),
            Begin::Ready(request) => request,
        };

        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };
        tracing::debug!(
            generator = self.generator.name(),
            name = request.subject_name(),
            "generating card"
        );
        let outcome = self.generator.generate(&request).await.map(Arc::new);
        guard.armed = false;

        self.state.send_modify(|s| {
            s.is_loading = false;
            match &outcome {
                Ok(card) => s.result = Some(Arc::clone(card)),
                Err(err) => s.error = Some(err.to_string()),
            }
        });

        match outcome {
            Ok(card) => {
                tracing::info!(bytes = card.size(), mime_type = %card.mime_type, "card generated");
                Ok(SubmitOutcome::Generated(card))
            }
            Err(err) => {
                tracing::warn!("card generation failed: {err}");
                Err(err)
            }
        }
    }

    /// Saves the current card into `dir`.
    ///
    /// Returns `Ok(None)` without touching the filesystem when there is no
    /// card yet.
    pub fn download(&self, dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let Some(card) = self.state.borrow().result.clone() else {
            return Ok(None);
        };

        match card.save_to_dir(dir) {
            Ok(path) => {
                tracing::debug!(path = %path.display(), "card saved");
                Ok(Some(path))
            }
            Err(err) => {
                self.state.send_modify(|s| s.error = Some(err.to_string()));
                Err(err)
            }
        }
    }
}

fn build_request(s: &UiState) -> std::result::Result<GenerationRequest, ValidationError> {
    if s.name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let image = s.selected_image.as_ref().ok_or(ValidationError::MissingImage)?;
    GenerationRequest::from_file(&s.name, image)
}
