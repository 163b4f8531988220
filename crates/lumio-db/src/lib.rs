//! Lumio DB Library
//!
//! Job store and media catalog. Each has an async trait, a PostgreSQL
//! implementation and an in-memory implementation used by tests and
//! single-process deployments.

pub mod db;

pub use db::{
    connect, run_migrations, JobStore, MediaCatalog, MemoryJobStore, MemoryMediaCatalog,
    PgJobStore, PgMediaCatalog,
};
