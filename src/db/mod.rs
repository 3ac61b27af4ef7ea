//! SQLite implementation of the library store.
pub mod core;
mod library;
mod schema;

pub use self::core::Database;
