//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the tree sync client:
//! - Logging and tracing setup
//! - Configuration (builder, validation, persisted `config.json`)
//! - Event bus for reconciliation progress
//!
//! ## Overview
//!
//! Nothing here knows how files are compared or moved. The crate fixes the
//! conventions the rest of the workspace relies on: how logs are filtered and
//! formatted, which settings exist and what their defaults are, and how
//! progress is broadcast to interested hosts.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
