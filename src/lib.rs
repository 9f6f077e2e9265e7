//! News source discovery and article pipeline orchestration.
//!
//! The engine discovers article URLs from registered sources (feeds
//! and section fronts), stores them as per-dataset candidate links,
//! moves accepted articles through a compare-and-set pipeline state
//! machine, and keeps the backlog healthy with a periodic housekeeping
//! sweep. All outbound HTTP is routed through a configurable proxy
//! provider.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod housekeeping;
pub mod models;
pub mod pipeline;
pub mod proxy;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod telemetry;
