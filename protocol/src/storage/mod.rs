//! # Storage
//!
//! Durable gateway state. Bincode on disk, JSON only at the API edge.

pub mod db;

pub use db::{ConduitDB, DbError, DbResult};
