pub mod aggregator;
pub mod derived;
pub mod query;

pub use aggregator::aggregate;
pub use derived::derive;
pub use query::{bars_query, derived_query};
