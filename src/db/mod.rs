//! Database module: row models and SQL repositories.
//!
//! - `model`: row structs decoded by `sqlx` and their conversion into domain entities.
//! - `repo`: SQL-only functions. Functions ending in `_tx` run inside a caller's
//!   transaction so write paths can compose several statements atomically.

pub mod model;
pub mod repo;

pub use repo::*;
