use crate::{Annotator, Label, ProviderError};

/// Returns no labels for any image.
#[derive(Debug, Default)]
pub struct NoopAnnotator;

#[async_trait::async_trait]
impl Annotator for NoopAnnotator {
    async fn annotate(&self, _image: &[u8]) -> Result<Vec<Label>, ProviderError> {
        Ok(Vec::new())
    }
}
