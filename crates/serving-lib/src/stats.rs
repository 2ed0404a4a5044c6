//! Rolling feature statistics for drift monitoring
//!
//! Keeps the last N observed feature mappings per model (FIFO eviction)
//! and recomputes per-feature mean and population standard deviation
//! after every append.

use crate::models::FeatureMap;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Default number of feature mappings retained per model
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Statistics of one feature over the buffered window
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStatistics {
    pub feature: String,
    pub mean: f64,
    /// `None` when fewer than two values are present
    pub stddev: Option<f64>,
    pub count: usize,
}

/// Per-model rolling window of recently observed feature mappings
#[derive(Debug)]
pub struct FeatureStatisticsBuffer {
    capacity: usize,
    windows: DashMap<String, VecDeque<FeatureMap>>,
}

impl Default for FeatureStatisticsBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl FeatureStatisticsBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            windows: DashMap::new(),
        }
    }

    /// Append a feature mapping and recompute statistics for the model.
    ///
    /// Append, eviction and recomputation happen under the model's entry
    /// lock, so the window never exceeds capacity and the returned
    /// statistics describe exactly the window after this append.
    pub fn push(&self, model_name: &str, features: FeatureMap) -> Vec<FeatureStatistics> {
        self.push_with(model_name, features, |_| {})
    }

    /// Like [`push`](Self::push), but runs `publish` on the fresh
    /// statistics before the entry lock is released
    pub fn push_with<F>(&self, model_name: &str, features: FeatureMap, publish: F) -> Vec<FeatureStatistics>
    where
        F: FnOnce(&[FeatureStatistics]),
    {
        let mut window = self.windows.entry(model_name.to_string()).or_default();
        window.push_back(features);
        while window.len() > self.capacity {
            window.pop_front();
        }
        let stats = compute_feature_statistics(window.make_contiguous());
        publish(&stats);
        stats
    }

    /// Number of buffered mappings for a model
    pub fn len(&self, model_name: &str) -> usize {
        self.windows.get(model_name).map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, model_name: &str) -> bool {
        self.len(model_name) == 0
    }

    /// Copy of the buffered mappings for a model, oldest first
    pub fn snapshot(&self, model_name: &str) -> Vec<FeatureMap> {
        self.windows
            .get(model_name)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current statistics for a model without modifying the window
    pub fn statistics(&self, model_name: &str) -> Vec<FeatureStatistics> {
        self.windows
            .get(model_name)
            .map(|w| {
                let entries: Vec<FeatureMap> = w.iter().cloned().collect();
                compute_feature_statistics(&entries)
            })
            .unwrap_or_default()
    }

    /// Model names with a non-empty window
    pub fn models(&self) -> Vec<String> {
        self.windows.iter().map(|e| e.key().clone()).collect()
    }
}

/// Compute mean and population standard deviation per feature.
///
/// Features are those of the most recent entry. Each feature's values are
/// gathered from every entry that has a numeric value for it; entries
/// without the feature are skipped, not imputed.
pub fn compute_feature_statistics(entries: &[FeatureMap]) -> Vec<FeatureStatistics> {
    let latest = match entries.last() {
        Some(latest) => latest,
        None => return Vec::new(),
    };

    latest
        .keys()
        .filter_map(|feature| {
            let values: Vec<f64> = entries
                .iter()
                .filter_map(|entry| entry.get(feature).and_then(|v| v.as_f64()))
                .collect();
            if values.is_empty() {
                return None;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let stddev = if values.len() >= 2 {
                let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                Some(variance.sqrt())
            } else {
                None
            };
            Some(FeatureStatistics {
                feature: feature.to_string(),
                mean,
                stddev,
                count: values.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_empty_buffer_has_no_statistics() {
        assert!(compute_feature_statistics(&[]).is_empty());
        let buffer = FeatureStatisticsBuffer::default();
        assert!(buffer.statistics("m").is_empty());
        assert!(buffer.is_empty("m"));
    }

    #[test]
    fn test_mean_and_population_stddev() {
        let entries = vec![
            features(&[("feature1", 1.0), ("feature2", 2.0)]),
            features(&[("feature1", 2.0), ("feature2", 3.0)]),
            features(&[("feature1", 3.0), ("feature2", 4.0)]),
        ];
        let stats = compute_feature_statistics(&entries);
        assert_eq!(stats.len(), 2);

        assert_eq!(stats[0].feature, "feature1");
        assert!((stats[0].mean - 2.0).abs() < 1e-12);
        // population variance of [1,2,3] is 2/3
        let expected = (2.0f64 / 3.0).sqrt();
        assert!((stats[0].stddev.unwrap() - expected).abs() < 1e-12);

        assert!((stats[1].mean - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_value_has_mean_but_no_stddev() {
        let entries = vec![
            features(&[("a", 1.0)]),
            features(&[("a", 3.0), ("b", 10.0)]),
        ];
        let stats = compute_feature_statistics(&entries);
        let b = stats.iter().find(|s| s.feature == "b").unwrap();
        assert_eq!(b.mean, 10.0);
        assert_eq!(b.stddev, None);
        assert_eq!(b.count, 1);

        let a = stats.iter().find(|s| s.feature == "a").unwrap();
        assert_eq!(a.mean, 2.0);
        assert_eq!(a.stddev, Some(1.0));
    }

    #[test]
    fn test_features_follow_latest_entry() {
        let entries = vec![features(&[("old", 1.0)]), features(&[("new", 2.0)])];
        let stats = compute_feature_statistics(&entries);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].feature, "new");
    }

    #[test]
    fn test_text_values_are_skipped() {
        let mut entry = features(&[("x", 4.0)]);
        entry.insert("color", "red");
        let stats = compute_feature_statistics(&[entry]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].feature, "x");
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let buffer = FeatureStatisticsBuffer::new(100);
        for i in 0..150 {
            buffer.push("iris", features(&[("i", i as f64)]));
        }
        assert_eq!(buffer.len("iris"), 100);

        let window = buffer.snapshot("iris");
        let first = window.first().unwrap().get("i").unwrap().as_f64().unwrap();
        let last = window.last().unwrap().get("i").unwrap().as_f64().unwrap();
        assert_eq!(first, 50.0);
        assert_eq!(last, 149.0);
    }

    #[test]
    fn test_windows_are_per_model() {
        let buffer = FeatureStatisticsBuffer::new(3);
        buffer.push("a", features(&[("x", 1.0)]));
        buffer.push("b", features(&[("x", 5.0)]));
        assert_eq!(buffer.len("a"), 1);
        assert_eq!(buffer.len("b"), 1);
        let mut models = buffer.models();
        models.sort();
        assert_eq!(models, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_push_with_publishes_under_lock() {
        let buffer = FeatureStatisticsBuffer::new(10);
        let mut seen = Vec::new();
        buffer.push_with("m", features(&[("x", 2.0)]), |stats| {
            seen = stats.to_vec();
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mean, 2.0);
    }

    #[test]
    fn test_concurrent_pushes_respect_capacity() {
        let buffer = Arc::new(FeatureStatisticsBuffer::new(100));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        buffer.push("shared", features(&[("v", (t * 100 + i) as f64)]));
                        assert!(buffer.len("shared") <= 100);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.len("shared"), 100);
    }
}
