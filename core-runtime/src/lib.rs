//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the catalog core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate holds the ambient pieces every other crate leans on. It sets
//! the logging conventions, validates the configuration a host supplies, and
//! carries the broadcast channel paged lists report their progress on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
