//! Sketch session server.
//!
//! A loopback-only HTTP server that serves the drawing page, accepts exactly
//! one terminal request from it (`/submit` or `/cancel`), and exposes that
//! outcome as a value that resolves once.

mod routes;
pub mod server;

pub use server::{ServerOptions, SessionServer, SKETCH_PATH};
