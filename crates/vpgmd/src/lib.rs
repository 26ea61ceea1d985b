//! vPGM daemon library - exposes modules for testing.

pub mod routes;
pub mod server;

pub use server::{app, AppState};
