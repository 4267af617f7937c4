/*!
Provenance graph over audit records.

Every event becomes a node with edges to the physical-state, reported-state and
network-attempt values it carried. Value nodes are shared between events that
carry the same value. Each event also gets one badge node per alert, or a
single compliance node when it raised none.
*/

use std::collections::HashMap;
use std::fmt::Write;

use crate::record::{AuditRecord, Violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Event,
    PhysicalState,
    ReportedState,
    NetworkAttempt,
    Alert(Violation),
    Compliant,
}

impl NodeKind {
    pub fn color(&self) -> &'static str {
        match self {
            NodeKind::Event => "#3b82f6",
            NodeKind::PhysicalState => "#0f766e",
            NodeKind::ReportedState => "#fbbf24",
            NodeKind::NetworkAttempt => "#fb923c",
            NodeKind::Alert(violation) => violation_color(*violation),
            NodeKind::Compliant => COMPLIANT_COLOR,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            NodeKind::Alert(_) | NodeKind::Compliant => "box",
            _ => "ellipse",
        }
    }
}

pub const COMPLIANT_COLOR: &str = "#10b981";

pub fn violation_color(violation: Violation) -> &'static str {
    match violation {
        Violation::Spoofing => "#ef4444",
        Violation::Masking => "#f59e0b",
        Violation::TlsViolation => "#7c3aed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProvenanceGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    index: HashMap<String, usize>,
}

impl ProvenanceGraph {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        let mut graph = Self::default();
        for record in records {
            graph.add_record(record);
        }
        graph
    }

    /// Event nodes are keyed by device and `event_id`, since ids are only
    /// monotonic per source
    pub fn add_record(&mut self, record: &AuditRecord) {
        let key = format!("{}#{}", record.device, record.event_id);
        let event = self.node(
            format!("event:{}", key),
            format!("Event_{} ({})", record.event_id, record.device),
            NodeKind::Event,
        );

        let physical = format!("physical={}", record.actual_state);
        let physical = self.node(physical.clone(), physical, NodeKind::PhysicalState);
        let reported = format!("reported={}", record.reported_state);
        let reported = self.node(reported.clone(), reported, NodeKind::ReportedState);
        let network = format!("net={}", record.network_attempt);
        let network = self.node(network.clone(), network, NodeKind::NetworkAttempt);

        for to in [physical, reported, network] {
            self.edge(event, to);
        }

        if record.is_compliant() {
            let ok = self.node(format!("ok:{}", key), "OK".to_string(), NodeKind::Compliant);
            self.edge(event, ok);
        } else {
            for violation in record.alerts.iter() {
                let badge = self.node(
                    format!("{}:{}", violation, key),
                    violation.as_str().to_uppercase(),
                    NodeKind::Alert(violation),
                );
                self.edge(event, badge);
            }
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Render as a Graphviz digraph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph provenance {\n  rankdir=LR;\n  node [style=filled, fontname=\"Arial\"];\n");
        for (i, node) in self.nodes.iter().enumerate() {
            let _ = writeln!(
                out,
                "  n{} [label=\"{}\", fillcolor=\"{}\", shape={}];",
                i,
                escape_dot(&node.label),
                node.kind.color(),
                node.kind.shape()
            );
        }
        for edge in &self.edges {
            let _ = writeln!(out, "  n{} -> n{};", edge.from, edge.to);
        }
        out.push_str("}\n");
        out
    }

    fn node(&mut self, id: String, label: String, kind: NodeKind) -> usize {
        if let Some(&existing) = self.index.get(&id) {
            return existing;
        }
        let idx = self.nodes.len();
        self.index.insert(id.clone(), idx);
        self.nodes.push(GraphNode { id, label, kind });
        idx
    }

    fn edge(&mut self, from: usize, to: usize) {
        self.edges.push(GraphEdge { from, to });
    }
}

/// Quote-safe DOT label text. Line breaks become `\n` escapes and other
/// control characters are dropped.
fn escape_dot(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AlertSet;

    fn record(event_id: u64, device: &str, actual: &str, reported: &str, alerts: &[Violation]) -> AuditRecord {
        AuditRecord {
            time_tee: 0.0,
            event_id,
            device: device.to_string(),
            actual_state: actual.to_string(),
            reported_state: reported.to_string(),
            network_attempt: "https://api.secure-server.com/upload".to_string(),
            alerts: alerts.iter().copied().collect::<AlertSet>(),
        }
    }

    #[test]
    fn test_one_node_per_event_and_shared_values() {
        let records = vec![
            record(1, "camera_1", "camera_on", "camera_off", &[Violation::Spoofing]),
            record(1, "camera_2", "camera_on", "camera_on", &[]),
            record(2, "camera_1", "camera_off", "camera_off", &[]),
        ];
        let graph = ProvenanceGraph::from_records(&records);

        assert_eq!(graph.nodes_of_kind(NodeKind::Event).count(), 3);
        assert_eq!(graph.nodes_of_kind(NodeKind::PhysicalState).count(), 2);
        assert_eq!(graph.nodes_of_kind(NodeKind::NetworkAttempt).count(), 1);
        assert_eq!(graph.nodes_of_kind(NodeKind::Compliant).count(), 2);
        assert_eq!(graph.nodes_of_kind(NodeKind::Alert(Violation::Spoofing)).count(), 1);
        // three value edges per event plus one badge each
        assert_eq!(graph.edges().len(), 12);
    }

    #[test]
    fn test_multiple_badges() {
        let records = vec![record(
            5,
            "camera_1",
            "camera_on",
            "camera_off",
            &[Violation::Spoofing, Violation::Masking, Violation::TlsViolation],
        )];
        let graph = ProvenanceGraph::from_records(&records);
        assert_eq!(graph.nodes_of_kind(NodeKind::Compliant).count(), 0);
        assert_eq!(graph.edges().len(), 6);
    }

    #[test]
    fn test_dot_escapes_labels() {
        let mut r = record(1, "camera_1", "on", "on", &[]);
        r.network_attempt = "http://a\"b".to_string();
        let dot = ProvenanceGraph::from_records(&[r]).to_dot();
        assert!(dot.starts_with("digraph provenance {"));
        assert!(dot.contains("net=http://a\\\"b"));
        assert!(dot.contains("n0 -> n1;"));
    }

    #[test]
    fn test_dot_escapes_control_characters() {
        let mut r = record(1, "camera_1", "on", "on", &[]);
        r.network_attempt = "http://a\nb\r\u{7}c\\d".to_string();
        let dot = ProvenanceGraph::from_records(&[r]).to_dot();

        assert!(dot.contains("net=http://a\\nbc\\\\d"));
        // one statement per line, nothing broken across lines
        assert!(dot.lines().all(|l| l == "}" || l.ends_with('{') || l.ends_with(';')));
    }
}
