mod error;
mod rows;
mod store;
mod unit_of_work;

pub use error::*;
pub use store::*;
pub use unit_of_work::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
