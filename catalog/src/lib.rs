//! Catalog gateway of floe: a read-only view over the external Iceberg
//! catalog.
//!
//! The gateway enumerates tables, describes schemas and partition specs,
//! lists snapshots, and streams data files with their partition tuples. It is
//! also where partition transforms are recognized; a spec using a transform
//! this control plane cannot navigate is rejected permanently.

pub mod error;
pub mod gateway;
pub mod rest;
pub mod transform;
pub mod types;
