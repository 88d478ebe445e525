//! Remote marketplace API client for Lenda.
//!
//! This module provides:
//! - The narrow `RemoteSource` request interface the sync engine consumes
//! - Password-grant bearer authentication with automatic refresh
//! - Header-driven pagination and request pacing

pub mod auth;
pub mod client;
pub mod source;

pub use auth::{Credentials, TokenManager, Tokens};
pub use client::ApiClient;
pub use source::RemoteSource;
