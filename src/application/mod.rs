//! Application services, query hooks and mutation hooks.

pub mod error;
pub mod ingredients;
pub mod meals;
pub mod mutations;
pub mod operation;
pub mod plans;
pub mod progress;
pub mod queries;
pub mod repos;
