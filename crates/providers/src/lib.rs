//! Annotation provider abstractions.
//!
//! An [`Annotator`] turns raw image bytes into an ordered list of labels.
//! Concrete backends live in submodules.

use thiserror::Error;

pub mod auth;
pub mod noop;
pub mod vision;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid credential: {0}")]
    Credential(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// A single detected keyword with its relevance score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub description: String,
    pub score: f32,
}

impl Label {
    pub fn new(description: impl Into<String>, score: f32) -> Self {
        Self {
            description: description.into(),
            score,
        }
    }
}

#[async_trait::async_trait]
pub trait Annotator: Send + Sync {
    /// Labels for one image, in the order the backend returned them.
    async fn annotate(&self, image: &[u8]) -> Result<Vec<Label>, ProviderError>;
}
