//! Upload validation and image decoding
//!
//! Keeps byte-level concerns (which field arrived, which format the bytes
//! are in) out of the inference path. Nothing here touches the filesystem.

use crate::{
    error::{Result, SegLabelError},
    types::{CanonicalImage, UploadedFile},
};
use image::DynamicImage;
use tracing::{debug, warn};

/// Message returned when the request has no `file` field
pub const NO_FILE_UPLOADED: &str = "No file uploaded";

/// Message returned when the `file` field has an empty filename
pub const NO_SELECTED_FILE: &str = "No selected file";

/// Service turning uploads into canonical RGB images
pub struct ImageIngestion;

impl ImageIngestion {
    /// Check that an upload is present and names a file
    ///
    /// # Errors
    /// - `MissingInput("No file uploaded")` when `upload` is `None`
    /// - `MissingInput("No selected file")` when the filename is empty
    pub fn validate(upload: Option<UploadedFile>) -> Result<UploadedFile> {
        let Some(upload) = upload else {
            warn!("No file part in the request");
            return Err(SegLabelError::missing_input(NO_FILE_UPLOADED));
        };

        if upload.has_empty_filename() {
            warn!("No selected file");
            return Err(SegLabelError::missing_input(NO_SELECTED_FILE));
        }

        Ok(upload)
    }

    /// Decode an upload into a 3-channel RGB image
    ///
    /// The format is sniffed from the bytes, so the filename extension is
    /// irrelevant. Alpha and extra channels are dropped; grayscale is expanded.
    ///
    /// # Errors
    /// - `Decode` for empty, corrupt or unsupported payloads
    pub fn decode(upload: &UploadedFile) -> Result<CanonicalImage> {
        let image = Self::load_from_bytes(&upload.data)?;
        debug!(
            filename = upload.filename.as_deref().unwrap_or_default(),
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Decoded upload"
        );
        CanonicalImage::new(image.into_rgb8())
    }

    /// Validate then decode, the full ingestion step of a request
    ///
    /// # Errors
    /// - See [`ImageIngestion::validate`] and [`ImageIngestion::decode`]
    pub fn ingest(upload: Option<UploadedFile>) -> Result<CanonicalImage> {
        let upload = Self::validate(upload)?;
        Self::decode(&upload)
    }

    /// Decode raw bytes with content-based format detection
    ///
    /// # Errors
    /// - `Decode` when the bytes are not a supported image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(SegLabelError::decode("empty payload"));
        }
        image::load_from_memory(bytes).map_err(|e| SegLabelError::decode(e.to_string()))
    }
}
