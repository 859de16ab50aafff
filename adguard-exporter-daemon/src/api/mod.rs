//! HTTP surface of the exporter.

mod server;

pub use server::{router, serve, AppState};
