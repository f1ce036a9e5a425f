//! Core domain + application logic for SweepBot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! `ChatPort` trait implemented in the adapter crate.

pub mod admin_cache;
pub mod config;
pub mod domain;
pub mod durations;
pub mod errors;
pub mod logging;
pub mod policy;
pub mod ports;
pub mod rate;
pub mod rights;
pub mod scheduler;
pub mod store;

pub use errors::{Error, Result};
