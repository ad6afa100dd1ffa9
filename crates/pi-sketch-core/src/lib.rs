//! Core types, config, errors, and the settle-once primitive for pi-sketch.

pub mod config;
pub mod error;
pub mod host;
pub mod session;
pub mod settle;
