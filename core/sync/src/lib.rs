//! Lenda sync engine.
//!
//! This module provides:
//! - The ordered full-synchronization pipeline over a `RemoteSource`
//! - Lazy backfill of loans referenced by stored transactions
//! - Resolution of notification-to-entity relation records

pub mod engine;
pub mod relations;

pub use engine::{SyncEngine, SyncReport};
pub use relations::resolve_notification_relations;
