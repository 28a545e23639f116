//! Query cache and invalidation.
//!
//! - **Keys**: hierarchical [`QueryKey`]s built by the functions in [`keys`]
//! - **Invalidation**: [`InvalidationHelper`] expands a request through the
//!   static dependency table and forwards each key to a [`QueryInvalidator`]
//! - **Dispatch**: [`InvalidationTrigger`] runs invalidations inline or defers
//!   them to a queue consumer, per [`InvalidationMode`]
//! - **Storage**: [`QueryClient`] holds fetched results in an LRU store
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 512
//! invalidation_mode = "await"
//! ```

mod client;
mod config;
mod consumer;
mod events;
mod invalidation;
pub mod keys;
mod lock;
mod planner;
mod store;
mod trigger;

pub use client::{QueryClient, QueryError, QueryEvent, QuerySnapshot};
pub use config::{CacheConfig, InvalidationMode, QueryPolicy};
pub use consumer::{ConsumeReport, InvalidationConsumer};
pub use events::{Epoch, EventQueue, InvalidationEvent};
pub use invalidation::{
    CacheError, InvalidationHelper, InvalidationRequest, InvalidationScope, QueryInvalidator,
    related_types,
};
pub use keys::{DataType, KeyPart, QueryKey};
pub use planner::InvalidationPlan;
pub use store::{CachedQuery, QueryStore};
pub use trigger::InvalidationTrigger;
