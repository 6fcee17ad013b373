//! Dominant-label selection over a segmentation map

use crate::{
    taxonomy::{LabelTaxonomy, BACKGROUND_ID},
    types::{ClassId, DetectionResult, SegmentationMap},
};
use std::collections::BTreeMap;
use tracing::info;

/// Class id to pixel count for a single map
pub type LabelCountTable = BTreeMap<ClassId, usize>;

/// Picks the most frequent non-background class of a segmentation map
#[derive(Debug, Clone, Default)]
pub struct LabelAggregator {
    taxonomy: LabelTaxonomy,
}

impl LabelAggregator {
    #[must_use]
    pub fn new(taxonomy: LabelTaxonomy) -> Self {
        Self { taxonomy }
    }

    #[must_use]
    pub fn taxonomy(&self) -> &LabelTaxonomy {
        &self.taxonomy
    }

    /// Count occurrences of every class id in one pass
    #[must_use]
    pub fn count_labels(map: &SegmentationMap) -> LabelCountTable {
        let mut counts = LabelCountTable::new();
        for id in map.class_ids() {
            *counts.entry(*id).or_insert(0) += 1;
        }
        counts
    }

    /// Name of the most frequent non-background class, or `None`
    ///
    /// Ties resolve to the smallest class id.
    #[must_use]
    pub fn aggregate(&self, map: &SegmentationMap) -> DetectionResult {
        let mut counts = Self::count_labels(map);
        counts.remove(&BACKGROUND_ID);

        // BTreeMap iterates ids ascending, so keep the first maximum seen
        let winner = counts
            .iter()
            .fold(None::<(ClassId, usize)>, |best, (&id, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((id, count)),
            });

        match winner {
            Some((id, count)) => {
                let name = self.taxonomy.display_name(id);
                info!(class_id = id, pixels = count, label = %name, "Most detected label (after background)");
                DetectionResult::Label(name)
            },
            None => {
                info!("No label detected after background");
                DetectionResult::None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_from_counts(counts: &[(ClassId, usize)]) -> SegmentationMap {
        let data: Vec<ClassId> = counts
            .iter()
            .flat_map(|(id, n)| std::iter::repeat(*id).take(*n))
            .collect();
        let len = data.len();
        SegmentationMap::new(data, (len, 1)).unwrap()
    }

    #[test]
    fn test_all_background_is_none() {
        let aggregator = LabelAggregator::default();
        let map = SegmentationMap::filled(BACKGROUND_ID, (16, 16));
        assert_eq!(aggregator.aggregate(&map), DetectionResult::None);
        assert_eq!(aggregator.aggregate(&map).as_str(), "None");
    }

    #[test]
    fn test_single_class_present() {
        let aggregator = LabelAggregator::default();
        let map = map_from_counts(&[(0, 500), (16, 1)]);
        assert_eq!(aggregator.aggregate(&map), DetectionResult::Label("Bag".into()));
    }

    #[test]
    fn test_background_count_does_not_matter() {
        let aggregator = LabelAggregator::default();
        let map = map_from_counts(&[(0, 70), (4, 20), (6, 10)]);
        assert_eq!(
            aggregator.aggregate(&map),
            DetectionResult::Label("Upper-clothes".into())
        );

        let map = map_from_counts(&[(0, 9000), (6, 11), (4, 10)]);
        assert_eq!(aggregator.aggregate(&map), DetectionResult::Label("Pants".into()));
    }

    #[test]
    fn test_tie_prefers_smallest_id() {
        let aggregator = LabelAggregator::default();
        let map = map_from_counts(&[(7, 5), (3, 5), (0, 100)]);
        assert_eq!(
            aggregator.aggregate(&map),
            DetectionResult::Label("Sunglasses".into())
        );
    }

    #[test]
    fn test_deterministic() {
        let aggregator = LabelAggregator::default();
        let map = map_from_counts(&[(2, 3), (5, 3), (9, 1)]);
        assert_eq!(aggregator.aggregate(&map), aggregator.aggregate(&map));
    }

    #[test]
    fn test_unknown_id_falls_back() {
        let aggregator = LabelAggregator::default();
        let map = map_from_counts(&[(0, 1), (25, 4)]);
        assert_eq!(
            aggregator.aggregate(&map),
            DetectionResult::Label("LABEL_25".into())
        );
    }

    #[test]
    fn test_count_labels() {
        let map = map_from_counts(&[(0, 3), (4, 2), (6, 1)]);
        let counts = LabelAggregator::count_labels(&map);
        assert_eq!(counts.get(&0), Some(&3));
        assert_eq!(counts.get(&4), Some(&2));
        assert_eq!(counts.get(&6), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), map.len());
    }
}
