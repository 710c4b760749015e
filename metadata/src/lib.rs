//! Metadata store of floe: PostgreSQL persistence for table descriptors,
//! partition statistics, snapshot history, maintenance tasks and settings.
//!
//! This crate owns the relational schema and every parameterized statement
//! touching it. Services in `floe-maintenance` compose these operations; the
//! HTTP layer never talks to the database directly.

pub mod metadata_connection;
pub mod partition;
pub mod snapshot;
pub mod sql_metadata_db;
pub mod sql_migration;
pub mod sql_partitions;
pub mod sql_settings;
pub mod sql_snapshots;
pub mod sql_tables;
pub mod sql_task_queue;
pub mod table_descriptor;
pub mod task;
pub mod time;
