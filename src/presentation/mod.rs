//! Presentation helpers shared by every consumer of cached queries.

pub mod query_state;
