//! # Process Score Common Library
//!
//! Shared code for the process score service:
//! - Error taxonomy (validation, not-found, state, authorization)
//! - Score tiers, appeal statuses and score row models
//! - Database initialization and migrations
//! - Configuration loading and root folder resolution
//! - Attachment URL signing
//! - Time and UUID helpers

pub mod config;
pub mod db;
pub mod error;
pub mod signing;
pub mod time;
pub mod uuid_utils;

pub use db::models::{AppealStatus, ScoreTier};
pub use error::{Error, Result};
