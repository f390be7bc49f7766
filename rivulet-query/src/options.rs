//! Engine configuration.

use std::time::Duration;

/// Tunables for plan construction and execution.
///
/// Construct with `EngineOptions::default()` and adjust with the
/// `with_*` builders.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Input rows per bound-join batch.
    pub bound_join_batch_size: usize,
    /// Maximum committed entries in the BGP cache.
    pub cache_max_entries: usize,
    /// Maximum age of a committed cache entry.
    pub cache_max_age: Duration,
    /// Always use the index-nested-loop path, even against graphs
    /// advertising bulk union support.
    pub force_index_join: bool,
    /// Depth bound for transitive property-path walks; `None` bounds
    /// only by the visited set.
    pub max_path_depth: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            bound_join_batch_size: 15,
            cache_max_entries: 500,
            cache_max_age: Duration::from_secs(20 * 60),
            force_index_join: false,
            max_path_depth: None,
        }
    }
}

impl EngineOptions {
    pub fn with_bound_join_batch_size(mut self, size: usize) -> Self {
        self.bound_join_batch_size = size.max(1);
        self
    }

    pub fn with_cache_max_entries(mut self, entries: usize) -> Self {
        self.cache_max_entries = entries;
        self
    }

    pub fn with_cache_max_age(mut self, age: Duration) -> Self {
        self.cache_max_age = age;
        self
    }

    pub fn with_force_index_join(mut self, force: bool) -> Self {
        self.force_index_join = force;
        self
    }

    pub fn with_max_path_depth(mut self, depth: Option<usize>) -> Self {
        self.max_path_depth = depth;
        self
    }
}
