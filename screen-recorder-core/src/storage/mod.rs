pub mod metadata;
pub mod segment_store;
