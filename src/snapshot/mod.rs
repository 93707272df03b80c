pub mod dedup;
pub mod normalizer;

pub use dedup::should_insert;
pub use normalizer::normalize;
