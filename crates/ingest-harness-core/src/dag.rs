//! Transformation graph definition and validation.
//!
//! A [`DagDefinition`] is the only artifact the engine parses from the
//! outside world. It is validated once per run with [`DagDefinition::validate`],
//! which produces a [`ValidatedDag`]: the same graph plus a topological
//! order, adjacency lists, and the parsed configuration of every
//! transformer and destination node. Execution never re-checks structure.
//!
//! # Format
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "src",   "kind": "source" },
//!     { "id": "chunk", "kind": "transformer", "config": { "type": "chunk", "max_tokens": 256 } },
//!     { "id": "embed", "kind": "transformer", "config": { "type": "embed" } },
//!     { "id": "out",   "kind": "destination", "config": { "destination": "sqlite:vectors" } }
//!   ],
//!   "edges": [
//!     { "from": "src", "to": "chunk" },
//!     { "from": "chunk", "to": "embed" },
//!     { "from": "embed", "to": "out" }
//!   ]
//! }
//! ```
//!
//! # Rules
//!
//! - node ids are unique and non-empty; edges reference known nodes
//! - the graph is acyclic (Kahn's algorithm)
//! - `source` nodes have in-degree 0
//! - `destination` nodes have in-degree ≥ 1 and out-degree 0
//! - every non-source node is reachable from exactly one source node
//! - every transformer leads to at least one destination
//! - transformer and destination configs parse into their typed form

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{Result, SyncError};

/// Role of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Transformer,
    Destination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
}

/// Serialized transformation graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DagDefinition {
    pub nodes: Vec<DagNode>,
    #[serde(default)]
    pub edges: Vec<DagEdge>,
}

/// Whether a transformer emits exactly one artifact per input or any number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// Closed set of transformer variants, selected by the `type` tag of a
/// transformer node's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerSpec {
    /// Replace the artifact text with the named payload fields joined by
    /// `separator`. Missing fields are skipped.
    ExtractText {
        fields: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Split text on paragraph boundaries into chunks of at most
    /// `max_tokens` (approximate) tokens.
    Chunk {
        max_tokens: usize,
        #[serde(default)]
        overlap_tokens: usize,
    },
    /// Attach an embedding vector to every artifact.
    Embed {
        #[serde(default)]
        model: Option<String>,
    },
    /// Merge static key/value pairs into artifact metadata.
    Annotate { metadata: Map<String, Value> },
}

fn default_separator() -> String {
    "\n\n".to_string()
}

impl TransformerSpec {
    pub fn name(&self) -> &'static str {
        match self {
            TransformerSpec::ExtractText { .. } => "extract_text",
            TransformerSpec::Chunk { .. } => "chunk",
            TransformerSpec::Embed { .. } => "embed",
            TransformerSpec::Annotate { .. } => "annotate",
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            TransformerSpec::Chunk { .. } => Cardinality::OneToMany,
            _ => Cardinality::OneToOne,
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        match self {
            TransformerSpec::ExtractText { fields, .. } if fields.is_empty() => {
                Err("extract_text requires at least one field".to_string())
            }
            TransformerSpec::Chunk {
                max_tokens,
                overlap_tokens,
            } => {
                if *max_tokens == 0 {
                    Err("chunk.max_tokens must be > 0".to_string())
                } else if overlap_tokens >= max_tokens {
                    Err("chunk.overlap_tokens must be < max_tokens".to_string())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DestinationNodeConfig {
    destination: String,
}

#[derive(Debug, Default, Deserialize)]
struct SourceNodeConfig {
    #[serde(default)]
    source: Option<String>,
}

impl DagDefinition {
    /// Parse a DAG from its JSON form. Parse failures are `InvalidDag`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidDag(format!("parse error: {e}")))
    }

    /// Validate structure and node configs, producing an execution plan.
    pub fn validate(&self) -> Result<ValidatedDag> {
        let invalid = |msg: String| SyncError::InvalidDag(msg);

        if self.nodes.is_empty() {
            return Err(invalid("graph has no nodes".into()));
        }

        let mut kinds: HashMap<&str, NodeKind> = HashMap::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(invalid("node id must not be empty".into()));
            }
            if kinds.insert(node.id.as_str(), node.kind).is_some() {
                return Err(invalid(format!("duplicate node id '{}'", node.id)));
            }
        }

        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut parents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &self.nodes {
            children.insert(node.id.clone(), Vec::new());
            parents.insert(node.id.clone(), Vec::new());
        }

        let mut seen_edges = HashSet::new();
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !kinds.contains_key(end.as_str()) {
                    return Err(invalid(format!("edge references unknown node '{end}'")));
                }
            }
            if edge.from == edge.to {
                return Err(invalid(format!("cycle detected at node '{}'", edge.from)));
            }
            if !seen_edges.insert((edge.from.as_str(), edge.to.as_str())) {
                return Err(invalid(format!(
                    "duplicate edge '{}' -> '{}'",
                    edge.from, edge.to
                )));
            }
            children
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            parents
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }

        let order = topological_order(&self.nodes, &children, &parents)?;

        let mut sources = Vec::new();
        for node in &self.nodes {
            let in_deg = parents[&node.id].len();
            let out_deg = children[&node.id].len();
            match node.kind {
                NodeKind::Source => {
                    if in_deg != 0 {
                        return Err(invalid(format!(
                            "source node '{}' must not have incoming edges",
                            node.id
                        )));
                    }
                    sources.push(node.id.clone());
                }
                NodeKind::Destination => {
                    if in_deg == 0 {
                        return Err(invalid(format!(
                            "destination node '{}' has no incoming edges",
                            node.id
                        )));
                    }
                    if out_deg != 0 {
                        return Err(invalid(format!(
                            "destination node '{}' must not have outgoing edges",
                            node.id
                        )));
                    }
                }
                NodeKind::Transformer => {}
            }
        }
        if sources.is_empty() {
            return Err(invalid("graph has no source node".into()));
        }
        if !kinds.values().any(|k| *k == NodeKind::Destination) {
            return Err(invalid("graph has no destination node".into()));
        }

        // Every non-source node must belong to exactly one source's subgraph.
        let mut owner: HashMap<String, String> = HashMap::new();
        let mut reachable: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for source in &sources {
            let reached = reachable_from(source, &children);
            for node in &reached {
                if node == source {
                    continue;
                }
                if let Some(other) = owner.insert(node.clone(), source.clone()) {
                    return Err(invalid(format!(
                        "node '{node}' is reachable from both '{other}' and '{source}'"
                    )));
                }
            }
            reachable.insert(source.clone(), reached);
        }
        for node in &self.nodes {
            if node.kind != NodeKind::Source && !owner.contains_key(&node.id) {
                return Err(invalid(format!(
                    "node '{}' is not reachable from any source",
                    node.id
                )));
            }
        }

        let mut transformers = BTreeMap::new();
        let mut destinations = BTreeMap::new();
        let mut source_bindings = BTreeMap::new();
        for node in &self.nodes {
            match node.kind {
                NodeKind::Transformer => {
                    let spec: TransformerSpec = serde_json::from_value(node.config.clone())
                        .map_err(|e| {
                            invalid(format!("transformer '{}' has invalid config: {e}", node.id))
                        })?;
                    spec.check()
                        .map_err(|e| invalid(format!("transformer '{}': {e}", node.id)))?;
                    if !leads_to_destination(&node.id, &children, &kinds) {
                        return Err(invalid(format!(
                            "transformer '{}' does not lead to any destination",
                            node.id
                        )));
                    }
                    transformers.insert(node.id.clone(), spec);
                }
                NodeKind::Destination => {
                    let cfg: DestinationNodeConfig = serde_json::from_value(node.config.clone())
                        .map_err(|e| {
                            invalid(format!("destination '{}' has invalid config: {e}", node.id))
                        })?;
                    if cfg.destination.trim().is_empty() {
                        return Err(invalid(format!(
                            "destination '{}' has an empty destination label",
                            node.id
                        )));
                    }
                    destinations.insert(node.id.clone(), cfg.destination);
                }
                NodeKind::Source => {
                    let cfg: SourceNodeConfig = if node.config.is_null() {
                        SourceNodeConfig::default()
                    } else {
                        serde_json::from_value(node.config.clone()).map_err(|e| {
                            invalid(format!("source '{}' has invalid config: {e}", node.id))
                        })?
                    };
                    source_bindings.insert(node.id.clone(), cfg.source);
                }
            }
        }

        Ok(ValidatedDag {
            order,
            children,
            parents,
            reachable,
            transformers,
            destinations,
            source_bindings,
        })
    }
}

fn topological_order(
    nodes: &[DagNode],
    children: &BTreeMap<String, Vec<String>>,
    parents: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = parents
        .iter()
        .map(|(id, p)| (id.as_str(), p.len()))
        .collect();
    // Seed in declaration order so the resulting order is stable.
    let mut queue: VecDeque<&str> = nodes
        .iter()
        .filter(|n| in_degree[n.id.as_str()] == 0)
        .map(|n| n.id.as_str())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for child in &children[id] {
            if let Some(d) = in_degree.get_mut(child.as_str()) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(child.as_str());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        stuck.sort_unstable();
        return Err(SyncError::InvalidDag(format!(
            "cycle detected among nodes: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

fn reachable_from(start: &str, children: &BTreeMap<String, Vec<String>>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = children.get(&id) {
            stack.extend(next.iter().cloned());
        }
    }
    seen
}

fn leads_to_destination(
    start: &str,
    children: &BTreeMap<String, Vec<String>>,
    kinds: &HashMap<&str, NodeKind>,
) -> bool {
    reachable_from(start, children)
        .iter()
        .any(|id| kinds.get(id.as_str()) == Some(&NodeKind::Destination))
}

/// A DAG that passed validation, with everything the executor needs
/// precomputed.
#[derive(Debug, Clone)]
pub struct ValidatedDag {
    order: Vec<String>,
    children: BTreeMap<String, Vec<String>>,
    parents: BTreeMap<String, Vec<String>>,
    reachable: BTreeMap<String, BTreeSet<String>>,
    transformers: BTreeMap<String, TransformerSpec>,
    destinations: BTreeMap<String, String>,
    source_bindings: BTreeMap<String, Option<String>>,
}

impl ValidatedDag {
    /// All node ids in topological order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Source node ids, in topological order.
    pub fn source_nodes(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| self.source_bindings.contains_key(*id))
            .map(String::as_str)
    }

    /// Source nodes an entity from `source_id` enters at. Nodes without an
    /// explicit `source` binding accept entities from any source.
    pub fn entry_nodes(&self, source_id: &str) -> Vec<&str> {
        self.source_nodes()
            .filter(|id| match self.source_bindings.get(*id) {
                Some(Some(bound)) => bound == source_id,
                _ => true,
            })
            .collect()
    }

    /// Nodes reachable from `source_node` (inclusive), in topological order.
    pub fn plan_for(&self, source_node: &str) -> Vec<&str> {
        match self.reachable.get(source_node) {
            Some(set) => self
                .order
                .iter()
                .filter(|id| set.contains(*id))
                .map(String::as_str)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn parents(&self, node: &str) -> &[String] {
        self.parents.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, node: &str) -> &[String] {
        self.children.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parsed config for a transformer node.
    pub fn transformer(&self, node: &str) -> Option<&TransformerSpec> {
        self.transformers.get(node)
    }

    pub fn transformers(&self) -> impl Iterator<Item = (&str, &TransformerSpec)> {
        self.transformers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Destination label targeted by a destination node.
    pub fn destination(&self, node: &str) -> Option<&str> {
        self.destinations.get(node).map(String::as_str)
    }

    /// Distinct destination labels referenced by the graph.
    pub fn destination_labels(&self) -> BTreeSet<&str> {
        self.destinations.values().map(String::as_str).collect()
    }

    /// Root-to-destination routes, rendered as node id chains. Used for
    /// display.
    pub fn routes(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        for source in self.source_nodes() {
            let mut stack = vec![vec![source.to_string()]];
            while let Some(path) = stack.pop() {
                let last = path.last().map(String::as_str).unwrap_or_default();
                let next = self.children(last);
                if next.is_empty() {
                    out.push(path);
                    continue;
                }
                for child in next.iter().rev() {
                    let mut p = path.clone();
                    p.push(child.clone());
                    stack.push(p);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dag(value: Value) -> DagDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn linear() -> DagDefinition {
        dag(json!({
            "nodes": [
                {"id": "src", "kind": "source"},
                {"id": "chunk", "kind": "transformer", "config": {"type": "chunk", "max_tokens": 50}},
                {"id": "embed", "kind": "transformer", "config": {"type": "embed"}},
                {"id": "out", "kind": "destination", "config": {"destination": "d1"}}
            ],
            "edges": [
                {"from": "src", "to": "chunk"},
                {"from": "chunk", "to": "embed"},
                {"from": "embed", "to": "out"}
            ]
        }))
    }

    fn expect_invalid(def: DagDefinition, needle: &str) {
        match def.validate() {
            Err(SyncError::InvalidDag(msg)) => {
                assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
            }
            other => panic!("expected InvalidDag, got {other:?}"),
        }
    }

    #[test]
    fn test_linear_dag_validates() {
        let v = linear().validate().unwrap();
        assert_eq!(v.order(), &["src", "chunk", "embed", "out"]);
        assert_eq!(v.destination("out"), Some("d1"));
        assert_eq!(
            v.transformer("chunk").map(|t| t.cardinality()),
            Some(Cardinality::OneToMany)
        );
        assert_eq!(v.routes(), vec![vec!["src", "chunk", "embed", "out"]]);
    }

    #[test]
    fn test_cycle_rejected() {
        let def = dag(json!({
            "nodes": [
                {"id": "src", "kind": "source"},
                {"id": "a", "kind": "transformer", "config": {"type": "embed"}},
                {"id": "b", "kind": "transformer", "config": {"type": "embed"}},
                {"id": "out", "kind": "destination", "config": {"destination": "d1"}}
            ],
            "edges": [
                {"from": "src", "to": "a"},
                {"from": "a", "to": "b"},
                {"from": "b", "to": "a"},
                {"from": "b", "to": "out"}
            ]
        }));
        expect_invalid(def, "cycle");
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut def = linear();
        def.edges.push(DagEdge {
            from: "embed".into(),
            to: "embed".into(),
        });
        expect_invalid(def, "cycle");
    }

    #[test]
    fn test_destination_with_outgoing_edge_rejected() {
        let mut def = linear();
        def.nodes.push(DagNode {
            id: "extra".into(),
            kind: NodeKind::Destination,
            config: json!({"destination": "d2"}),
        });
        def.edges.push(DagEdge {
            from: "out".into(),
            to: "extra".into(),
        });
        expect_invalid(def, "outgoing");
    }

    #[test]
    fn test_source_with_incoming_edge_rejected() {
        let mut def = linear();
        def.edges.push(DagEdge {
            from: "chunk".into(),
            to: "src".into(),
        });
        // src now sits on a cycle; either message is a rejection
        assert!(matches!(def.validate(), Err(SyncError::InvalidDag(_))));
    }

    #[test]
    fn test_node_shared_by_two_sources_rejected() {
        let def = dag(json!({
            "nodes": [
                {"id": "s1", "kind": "source"},
                {"id": "s2", "kind": "source"},
                {"id": "out", "kind": "destination", "config": {"destination": "d1"}}
            ],
            "edges": [
                {"from": "s1", "to": "out"},
                {"from": "s2", "to": "out"}
            ]
        }));
        expect_invalid(def, "reachable from both");
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let mut def = linear();
        def.nodes.push(DagNode {
            id: "orphan".into(),
            kind: NodeKind::Transformer,
            config: json!({"type": "embed"}),
        });
        def.edges.push(DagEdge {
            from: "orphan".into(),
            to: "out".into(),
        });
        expect_invalid(def, "not reachable");
    }

    #[test]
    fn test_dead_end_transformer_rejected() {
        let mut def = linear();
        def.nodes.push(DagNode {
            id: "dangling".into(),
            kind: NodeKind::Transformer,
            config: json!({"type": "embed"}),
        });
        def.edges.push(DagEdge {
            from: "src".into(),
            to: "dangling".into(),
        });
        expect_invalid(def, "does not lead");
    }

    #[test]
    fn test_bad_transformer_config_rejected() {
        let mut def = linear();
        def.nodes[1].config = json!({"type": "chunk"});
        expect_invalid(def, "invalid config");

        let mut def = linear();
        def.nodes[1].config = json!({"type": "teleport"});
        expect_invalid(def, "invalid config");

        let mut def = linear();
        def.nodes[1].config = json!({"type": "chunk", "max_tokens": 0});
        expect_invalid(def, "max_tokens");
    }

    #[test]
    fn test_destination_requires_label() {
        let mut def = linear();
        def.nodes[3].config = json!({});
        expect_invalid(def, "invalid config");
    }

    #[test]
    fn test_unknown_edge_endpoint_rejected() {
        let mut def = linear();
        def.edges.push(DagEdge {
            from: "src".into(),
            to: "ghost".into(),
        });
        expect_invalid(def, "unknown node");
    }

    #[test]
    fn test_fan_out_to_two_destinations() {
        let def = dag(json!({
            "nodes": [
                {"id": "src", "kind": "source"},
                {"id": "chunk", "kind": "transformer", "config": {"type": "chunk", "max_tokens": 50}},
                {"id": "d1", "kind": "destination", "config": {"destination": "one"}},
                {"id": "d2", "kind": "destination", "config": {"destination": "two"}}
            ],
            "edges": [
                {"from": "src", "to": "chunk"},
                {"from": "chunk", "to": "d1"},
                {"from": "src", "to": "d2"}
            ]
        }));
        let v = def.validate().unwrap();
        assert_eq!(v.destination_labels().len(), 2);
        assert_eq!(v.routes().len(), 2);
        assert_eq!(v.plan_for("src").len(), 4);
    }

    #[test]
    fn test_entry_nodes_respect_binding() {
        let def = dag(json!({
            "nodes": [
                {"id": "a", "kind": "source", "config": {"source": "filesystem:docs"}},
                {"id": "b", "kind": "source", "config": {"source": "filesystem:other"}},
                {"id": "o1", "kind": "destination", "config": {"destination": "d"}},
                {"id": "o2", "kind": "destination", "config": {"destination": "d"}}
            ],
            "edges": [{"from": "a", "to": "o1"}, {"from": "b", "to": "o2"}]
        }));
        let v = def.validate().unwrap();
        assert_eq!(v.entry_nodes("filesystem:docs"), vec!["a"]);
    }

    #[test]
    fn test_from_json_parse_error_is_invalid_dag() {
        assert!(matches!(
            DagDefinition::from_json("{not json"),
            Err(SyncError::InvalidDag(_))
        ));
    }
}
