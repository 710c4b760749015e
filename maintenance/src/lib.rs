//! Maintenance services of floe: the refresh pipeline projecting catalog
//! state into the metadata store, the planner expanding user requests into
//! queued tasks, the worker loop executing them against the lakehouse
//! engine, and the periodic full refresh.

pub mod limiter;
pub mod periodic;
pub mod planner;
pub mod refresh;
pub mod settings;
pub mod worker;
