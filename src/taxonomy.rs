//! Class id to label name mapping
//!
//! The built-in table matches the 18 classes of the SegFormer B2 clothes
//! model. A model directory may ship its own `id2label` table in
//! `config.json`, which then replaces the built-in names.

use crate::error::{Result, SegLabelError};
use crate::types::ClassId;
use std::collections::BTreeMap;

/// Class id reserved for background pixels
pub const BACKGROUND_ID: ClassId = 0;

/// Built-in label names, indexed by class id
pub const CLOTHES_LABELS: [&str; 18] = [
    "Background",
    "Hat",
    "Hair",
    "Sunglasses",
    "Upper-clothes",
    "Skirt",
    "Pants",
    "Dress",
    "Belt",
    "Left-shoe",
    "Right-shoe",
    "Face",
    "Left-leg",
    "Right-leg",
    "Left-arm",
    "Right-arm",
    "Bag",
    "Scarf",
];

/// Immutable mapping from class id to human-readable name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTaxonomy {
    labels: BTreeMap<ClassId, String>,
}

impl LabelTaxonomy {
    /// The 18-class clothes taxonomy
    #[must_use]
    pub fn clothes() -> Self {
        let labels = CLOTHES_LABELS
            .iter()
            .enumerate()
            .map(|(id, name)| (id as ClassId, (*name).to_string()))
            .collect();
        Self { labels }
    }

    /// Build a taxonomy from a HuggingFace `config.json` document
    ///
    /// # Errors
    /// - `id2label` missing or not an object
    /// - A key that is not a non-negative integer, or a non-string value
    pub fn from_hf_config(config: &serde_json::Value) -> Result<Self> {
        let id2label = config
            .get("id2label")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| SegLabelError::model("config.json has no id2label object"))?;

        let mut labels = BTreeMap::new();
        for (key, value) in id2label {
            let id: ClassId = key
                .parse()
                .map_err(|_| SegLabelError::model(format!("invalid class id '{key}' in id2label")))?;
            let name = value
                .as_str()
                .ok_or_else(|| SegLabelError::model(format!("label for class {id} is not a string")))?;
            labels.insert(id, name.to_string());
        }

        if labels.is_empty() {
            return Err(SegLabelError::model("id2label is empty"));
        }

        Ok(Self { labels })
    }

    /// Look up the name of a class id
    #[must_use]
    pub fn name(&self, id: ClassId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Name of a class id, falling back to `LABEL_<id>` for unnamed classes
    #[must_use]
    pub fn display_name(&self, id: ClassId) -> String {
        self.name(id)
            .map_or_else(|| format!("LABEL_{id}"), str::to_string)
    }

    /// Number of named classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelTaxonomy {
    fn default() -> Self {
        Self::clothes()
    }
}
