//! Core types flowing through the detection pipeline

use crate::error::{Result, SegLabelError};
use image::RgbImage;
use serde::{Serialize, Serializer};

/// Integer identifier of a semantic class
pub type ClassId = u32;

/// A file received in the `file` field of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as sent by the client (may be empty)
    pub filename: Option<String>,

    /// Raw payload bytes
    pub data: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(filename: Option<String>, data: Vec<u8>) -> Self {
        Self { filename, data }
    }

    /// Whether the client left the filename empty ("no file selected")
    #[must_use]
    pub fn has_empty_filename(&self) -> bool {
        self.filename.as_deref().map_or(true, str::is_empty)
    }
}

/// Decoded 8-bit RGB image handed to the segmentation model
#[derive(Debug, Clone)]
pub struct CanonicalImage {
    image: RgbImage,
}

impl CanonicalImage {
    /// Wrap an RGB buffer, rejecting empty images
    ///
    /// # Errors
    /// - Width or height is zero
    pub fn new(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SegLabelError::decode(format!(
                "image has empty dimensions {width}x{height}"
            )));
        }
        Ok(Self { image })
    }

    /// Image dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Number of color channels, always 3
    #[must_use]
    pub fn channels(&self) -> usize {
        3
    }

    #[must_use]
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub fn into_rgb(self) -> RgbImage {
        self.image
    }
}

/// Per-position class ids emitted by the segmentation model
///
/// Stored row-major; `data.len() == width * height` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMap {
    data: Vec<ClassId>,
    dimensions: (usize, usize),
}

impl SegmentationMap {
    /// Create a map from row-major class ids
    ///
    /// # Errors
    /// - `data` length does not match `width * height`
    pub fn new(data: Vec<ClassId>, dimensions: (usize, usize)) -> Result<Self> {
        let (width, height) = dimensions;
        if data.len() != width * height {
            return Err(SegLabelError::inference(format!(
                "segmentation map has {} entries, expected {width}x{height}",
                data.len()
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Map filled with a single class id
    #[must_use]
    pub fn filled(class_id: ClassId, dimensions: (usize, usize)) -> Self {
        Self {
            data: vec![class_id; dimensions.0 * dimensions.1],
            dimensions,
        }
    }

    /// Map dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    #[must_use]
    pub fn class_ids(&self) -> &[ClassId] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of label aggregation for one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionResult {
    /// Dominant non-background label name
    Label(String),
    /// Only background was found
    None,
}

impl DetectionResult {
    /// String sent to clients; the sentinel renders as `"None"`
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Label(name) => name,
            Self::None => "None",
        }
    }
}

impl std::fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DetectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploaded_file_filename() {
        assert!(UploadedFile::new(Some(String::new()), vec![1]).has_empty_filename());
        assert!(UploadedFile::new(None, vec![1]).has_empty_filename());
        assert!(!UploadedFile::new(Some("shirt.jpg".into()), vec![]).has_empty_filename());
    }

    #[test]
    fn test_canonical_image_rejects_empty() {
        assert!(CanonicalImage::new(RgbImage::new(0, 10)).is_err());
        assert!(CanonicalImage::new(RgbImage::new(10, 0)).is_err());

        let image = CanonicalImage::new(RgbImage::new(4, 3)).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.channels(), 3);
    }

    #[test]
    fn test_segmentation_map_length_check() {
        assert!(SegmentationMap::new(vec![0; 6], (3, 2)).is_ok());
        let err = SegmentationMap::new(vec![0; 5], (3, 2)).unwrap_err();
        assert!(matches!(err, SegLabelError::Inference(_)));
    }

    #[test]
    fn test_detection_result_rendering() {
        assert_eq!(DetectionResult::None.to_string(), "None");
        assert_eq!(DetectionResult::Label("Pants".into()).as_str(), "Pants");
        assert_eq!(
            serde_json::to_string(&DetectionResult::Label("Hat".into())).unwrap(),
            "\"Hat\""
        );
        assert_eq!(serde_json::to_string(&DetectionResult::None).unwrap(), "\"None\"");
    }
}
