//! Meal planning and nutrition tracking core.
//!
//! Writes go through mutation hooks that invalidate exactly the cached queries
//! they affect. Reads go through query hooks backed by an in-process cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
