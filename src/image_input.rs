//! Image input seam.
//!
//! A photo sent during the dialogue is handed to an [`ImageReader`]. Text it
//! returns is treated as if the user had typed it at the current step. When
//! it returns nothing, the dialogue acknowledges the photo and restarts at
//! manual weight entry.

use async_trait::async_trait;

/// A photo as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    /// Transport file id
    pub reference: String,
}

#[async_trait]
pub trait ImageReader: Send + Sync {
    /// Extract a value typed into the photo (a scale display, a note), if any
    async fn read_value(&self, image: &ImageRef) -> anyhow::Result<Option<String>>;
}

/// Reader that never extracts anything
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualEntryFallback;

#[async_trait]
impl ImageReader for ManualEntryFallback {
    async fn read_value(&self, _image: &ImageRef) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
