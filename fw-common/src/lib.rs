//! # Forest Watch Common Library
//!
//! Shared code for the Forest Watch services including:
//! - Error type shared by configuration and utilities
//! - Configuration loading and root folder resolution
//! - Date and quarter helpers for imagery selection
//! - Job event types and the EventBus
//! - Server-Sent Events helpers

pub mod config;
pub mod dates;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
