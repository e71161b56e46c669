pub mod config;
pub mod error;
pub mod db;
pub mod store;
pub mod graph;
pub mod images;
pub mod api;

pub use config::Config;
pub use error::{RelgraphError, Result};
pub use graph::{GraphAggregator, GraphMetrics, GraphSnapshot};
pub use images::ImageStore;
pub use store::Store;
