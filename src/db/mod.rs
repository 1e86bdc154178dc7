pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repository;
pub mod store;

pub use connection::{Database, DatabaseConnection};
pub use store::{CatalogStore, SqliteCatalogStore};
