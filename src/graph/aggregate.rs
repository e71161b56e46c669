use crate::config::GraphConfig;
use crate::store::{Person, RelationshipWithNames};

use super::{GraphEdge, GraphMetrics, GraphNode, GraphSnapshot, NodeColor, NodeShape};

const IMAGE_BACKGROUND: &str = "white";
const IMAGE_BORDER_WIDTH: u32 = 3;
const IMAGE_BORDER_WIDTH_SELECTED: u32 = 5;
const DOT_BORDER_WIDTH: u32 = 2;
const EMPTY_CONTEXT: &str = "Sin contexto";

/// Builds [`GraphSnapshot`]s from repository records.
#[derive(Debug, Clone, Default)]
pub struct GraphAggregator {
    config: GraphConfig,
}

impl GraphAggregator {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    /// Map every person to a node and every relationship to an edge, keeping
    /// input order, and compute the summary metrics over the result.
    pub fn build(&self, persons: &[Person], relationships: &[RelationshipWithNames]) -> GraphSnapshot {
        let nodes: Vec<GraphNode> = persons.iter().map(|p| self.node_for(p)).collect();
        let edges: Vec<GraphEdge> = relationships.iter().map(|r| self.edge_for(r)).collect();
        let metrics = GraphMetrics::compute(&nodes, &edges, self.config.strong_threshold);

        GraphSnapshot { nodes, edges, metrics }
    }

    pub fn node_for(&self, person: &Person) -> GraphNode {
        let base_size = if person.is_root {
            self.config.root_node_size
        } else {
            self.config.node_size
        };
        let (x, y) = match person.position() {
            Some((x, y)) => (Some(x), Some(y)),
            None => (None, None),
        };

        let mut node = GraphNode {
            id: person.id,
            label: person.name.clone(),
            color: NodeColor::Solid(person.color.clone()),
            size: base_size,
            group: person.group.clone(),
            shape: NodeShape::Dot,
            image: None,
            border_width: DOT_BORDER_WIDTH,
            border_width_selected: None,
            x,
            y,
            // stored positions are a starting point; the layout may still move them
            physics: true,
        };

        if let Some(image) = person.image_url.as_deref().filter(|s| !s.is_empty()) {
            node.shape = NodeShape::Image;
            node.image = Some(image.to_string());
            node.size = self.config.image_node_size;
            node.border_width = IMAGE_BORDER_WIDTH;
            node.border_width_selected = Some(IMAGE_BORDER_WIDTH_SELECTED);
            node.color = NodeColor::Framed {
                border: person.color.clone(),
                background: IMAGE_BACKGROUND.to_string(),
            };
        }

        node
    }

    pub fn edge_for(&self, rel: &RelationshipWithNames) -> GraphEdge {
        let r = &rel.relationship;
        let label = humanize_kind(&r.kind);
        let context = if r.context.is_empty() {
            EMPTY_CONTEXT
        } else {
            r.context.as_str()
        };
        let title = format!(
            "<b>{} ↔ {}</b><br>Tipo: {}<br>Fortaleza: {}/10<br>Contexto: {}",
            escape_html(&rel.persona1_name),
            escape_html(&rel.persona2_name),
            escape_html(&label),
            r.strength,
            escape_html(context)
        );

        GraphEdge {
            id: r.id,
            from: r.persona1_id,
            to: r.persona2_id,
            width: r.strength,
            color: self.edge_color(r.strength).to_string(),
            label,
            title,
        }
    }

    /// Color tier for a strength: strong at or above `strong_threshold`,
    /// medium at or above `medium_threshold`, weak below.
    pub fn edge_color(&self, strength: i64) -> &str {
        if strength >= self.config.strong_threshold {
            &self.config.strong_color
        } else if strength >= self.config.medium_threshold {
            &self.config.medium_color
        } else {
            &self.config.weak_color
        }
    }
}

/// `"colaboracion_estrecha"` -> `"Colaboracion Estrecha"`.
///
/// Underscores become spaces; each run of letters starts uppercase and
/// continues lowercase.
pub fn humanize_kind(kind: &str) -> String {
    let mut out = String::with_capacity(kind.len());
    let mut prev_alpha = false;
    for c in kind.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Tooltips are rendered as HTML; user text must not open tags.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Relationship;
    use serde_json::json;

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
            icon: "user".to_string(),
            group: "contactos".to_string(),
            color: "#3b82f6".to_string(),
            description: String::new(),
            x: None,
            y: None,
            image_url: None,
            is_root: false,
            created_at: None,
        }
    }

    fn edge(id: i64, from: i64, to: i64, strength: i64) -> RelationshipWithNames {
        RelationshipWithNames {
            relationship: Relationship {
                id,
                persona1_id: from,
                persona2_id: to,
                kind: "colaboracion_estrecha".to_string(),
                strength,
                context: String::new(),
                created_at: None,
            },
            persona1_name: format!("P{}", from),
            persona2_name: format!("P{}", to),
        }
    }

    #[test]
    fn test_empty_input_gives_empty_snapshot() {
        let snapshot = GraphAggregator::default().build(&[], &[]);
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.edges.is_empty());
        assert_eq!(snapshot.metrics.density, 0.0);
        assert!(snapshot.metrics.most_connected.is_none());

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["nodes"], json!([]));
        assert_eq!(value["edges"], json!([]));
        assert_eq!(value["metrics"]["density"], json!(0.0));
    }

    #[test]
    fn test_plain_node_attributes() {
        let node = GraphAggregator::default().node_for(&person(1, "Ana"));
        assert_eq!(node.label, "Ana");
        assert_eq!(node.size, 30);
        assert_eq!(node.shape, NodeShape::Dot);
        assert_eq!(node.border_width, 2);
        assert_eq!(node.color, NodeColor::Solid("#3b82f6".to_string()));
        assert!(node.physics);
        assert!(node.x.is_none() && node.y.is_none());

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["shape"], "dot");
        assert_eq!(value["grupo"], "contactos");
        assert_eq!(value["borderWidth"], 2);
        assert!(value.get("image").is_none());
        assert!(value.get("x").is_none());
    }

    #[test]
    fn test_root_node_is_larger() {
        let mut root = person(1, "Usuario Principal");
        root.is_root = true;
        let aggregator = GraphAggregator::default();
        assert_eq!(aggregator.node_for(&root).size, 50);

        // the name alone does not make a node primary
        assert_eq!(aggregator.node_for(&person(2, "Usuario Principal 2")).size, 30);
    }

    #[test]
    fn test_image_node_attributes() {
        let mut p = person(3, "Marta");
        p.color = "#f59e0b".to_string();
        p.image_url = Some("static/images/users/user_3_deadbeef.png".to_string());
        let node = GraphAggregator::default().node_for(&p);

        assert_eq!(node.shape, NodeShape::Image);
        assert_eq!(node.size, 80);
        assert_eq!(node.border_width, 3);
        assert_eq!(node.border_width_selected, Some(5));

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["image"], "static/images/users/user_3_deadbeef.png");
        assert_eq!(value["color"], json!({"border": "#f59e0b", "background": "white"}));
        assert_eq!(value["borderWidthSelected"], 5);
    }

    #[test]
    fn test_positioned_node_keeps_coordinates() {
        let mut p = person(4, "Pedro");
        p.x = Some(120.5);
        p.y = Some(-40.0);
        let node = GraphAggregator::default().node_for(&p);
        assert_eq!(node.x, Some(120.5));
        assert_eq!(node.y, Some(-40.0));
        assert!(node.physics);

        // half a position is no position
        p.y = None;
        let node = GraphAggregator::default().node_for(&p);
        assert!(node.x.is_none());
    }

    #[test]
    fn test_edge_color_tiers() {
        let aggregator = GraphAggregator::default();
        assert_eq!(aggregator.edge_color(10), "#10b981");
        assert_eq!(aggregator.edge_color(8), "#10b981");
        assert_eq!(aggregator.edge_color(7), "#f59e0b");
        assert_eq!(aggregator.edge_color(6), "#f59e0b");
        assert_eq!(aggregator.edge_color(5), "#6b7280");
        assert_eq!(aggregator.edge_color(1), "#6b7280");
    }

    #[test]
    fn test_edge_color_tiers_follow_config() {
        let aggregator = GraphAggregator::new(GraphConfig {
            strong_threshold: 9,
            medium_threshold: 3,
            strong_color: "red".to_string(),
            ..GraphConfig::default()
        });
        assert_eq!(aggregator.edge_color(9), "red");
        assert_eq!(aggregator.edge_color(8), "#f59e0b");
        assert_eq!(aggregator.edge_color(2), "#6b7280");
    }

    #[test]
    fn test_edge_attributes_and_tooltip() {
        let mut rel = edge(7, 1, 2, 8);
        rel.persona1_name = "Ana".to_string();
        rel.persona2_name = "Luis".to_string();
        let e = GraphAggregator::default().edge_for(&rel);

        assert_eq!((e.from, e.to, e.width), (1, 2, 8));
        assert_eq!(e.label, "Colaboracion Estrecha");
        assert_eq!(
            e.title,
            "<b>Ana ↔ Luis</b><br>Tipo: Colaboracion Estrecha<br>Fortaleza: 8/10<br>Contexto: Sin contexto"
        );

        rel.relationship.context = "Proyecto Alfa".to_string();
        let e = GraphAggregator::default().edge_for(&rel);
        assert!(e.title.ends_with("Contexto: Proyecto Alfa"));
    }

    #[test]
    fn test_whitespace_context_is_kept() {
        let mut rel = edge(7, 1, 2, 8);
        rel.relationship.context = "   ".to_string();
        let e = GraphAggregator::default().edge_for(&rel);
        assert!(e.title.ends_with("Contexto:    "));
    }

    #[test]
    fn test_tooltip_escapes_user_text() {
        let mut rel = edge(7, 1, 2, 8);
        rel.persona1_name = "<script>x</script>".to_string();
        rel.persona2_name = "Tom & Jerry".to_string();
        rel.relationship.context = "a<b>c".to_string();
        let e = GraphAggregator::default().edge_for(&rel);

        assert!(e.title.starts_with("<b>&lt;script&gt;x&lt;/script&gt; ↔ Tom &amp; Jerry</b>"));
        assert!(e.title.ends_with("Contexto: a&lt;b&gt;c"));
        assert!(!e.title.contains("<script>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("plain"), "plain");
        assert_eq!(escape_html("a&b<c>d"), "a&amp;b&lt;c&gt;d");
    }

    #[test]
    fn test_humanize_kind() {
        assert_eq!(humanize_kind("profesional"), "Profesional");
        assert_eq!(humanize_kind("supervision_directa"), "Supervision Directa");
        assert_eq!(humanize_kind("RELACION_externa"), "Relacion Externa");
        assert_eq!(humanize_kind("nivel2b"), "Nivel2B");
        assert_eq!(humanize_kind(""), "");
    }

    #[test]
    fn test_build_preserves_input_order() {
        let persons = vec![person(2, "Ana"), person(1, "Luis")];
        let rels = vec![edge(9, 1, 2, 5), edge(8, 2, 1, 5)];
        let snapshot = GraphAggregator::default().build(&persons, &rels);

        let node_ids: Vec<_> = snapshot.nodes.iter().map(|n| n.id).collect();
        let edge_ids: Vec<_> = snapshot.edges.iter().map(|e| e.id).collect();
        assert_eq!(node_ids, vec![2, 1]);
        assert_eq!(edge_ids, vec![9, 8]);
    }
}
