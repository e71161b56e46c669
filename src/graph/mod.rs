//! Graph aggregation: persons and relationships in, visualization snapshot out.
//!
//! Pure transformation; nothing here touches storage. Visual constants come
//! from [`GraphConfig`](crate::config::GraphConfig).

mod aggregate;
mod metrics;

pub use aggregate::{humanize_kind, GraphAggregator};
pub use metrics::{GraphMetrics, GroupStats, MostConnected};

use serde::Serialize;

/// Node fill: a plain color, or border/background for image nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeColor {
    Solid(String),
    Framed { border: String, background: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Dot,
    Image,
}

/// One person as the visualization layer draws it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: i64,
    pub label: String,
    pub color: NodeColor,
    pub size: u32,
    #[serde(rename = "grupo")]
    pub group: String,
    pub shape: NodeShape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub border_width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_width_selected: Option<u32>,
    /// Initial coordinates; only present when the person has a stored position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    pub physics: bool,
}

/// One relationship as the visualization layer draws it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: i64,
    pub from: i64,
    pub to: i64,
    /// Line thickness, equal to the relationship strength.
    pub width: i64,
    pub color: String,
    pub label: String,
    /// Hover tooltip (HTML).
    pub title: String,
}

/// Per-request graph: nodes, edges and the metrics derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metrics: GraphMetrics,
}
