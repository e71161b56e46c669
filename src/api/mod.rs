//! JSON HTTP API over the repository, graph aggregator and image store.

mod handlers;
mod http;
mod input;

pub use http::{ApiServer, AppState};
