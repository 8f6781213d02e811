//! PostgreSQL persistence

pub mod postgres;
pub mod schema;

pub use postgres::PgStore;
