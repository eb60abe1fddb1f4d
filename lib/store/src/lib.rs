//! Postgres persistence for the chatflow automation platform.
//!
//! Repositories implement the engine's `FlowStore` and `ContactStore`
//! traits on top of sqlx. Migrations are embedded; the worker runs them on
//! startup.

pub mod contact;
pub mod error;
pub mod flow;

pub use contact::ContactRepository;
pub use error::RepositoryError;
pub use flow::FlowRepository;

/// Embedded database migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
