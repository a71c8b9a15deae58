// Sharding topology: the epoch schedule and the per-shard endpoint layout
// derived from it.

pub mod schedule;
pub mod structure;

pub use schedule::*;
pub use structure::*;
