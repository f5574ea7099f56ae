pub mod sample_map;
pub mod sample_store;

// Re-export key types from the index module
pub use sample_map::{FlatKey, InlineKey, MapStatistics, SampleKey, SampleMap};
pub use sample_store::{MatchedSample, SampleStore};
