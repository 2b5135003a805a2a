//! Point lookups and single-hop traversal over a materialized graph.
//!
//! Every operation is one request against one [`PropertyGraph`] snapshot;
//! nothing is cached between requests. Caller ids travel as bound values.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use yata_core::{
    value_key, Direction, EdgeRecord, NeighborCountResponse, NeighborsResponse, NodeRecord,
    NodeResponse, TypeName,
};
use yata_engine::{EdgeAnchor, EdgeMatch, MatchedEdge, Predicate, QueryEngine, Select};

use crate::error::{GraphError, Result};
use crate::materialize::PropertyGraph;
use crate::partition::EdgePartition;
use crate::registry::NodeType;

/// One directional sub-query: an edge partition and the endpoint the
/// queried node sits at.
struct Hop<'a> {
    partition: &'a EdgePartition,
    anchor: EdgeAnchor,
}

impl<'a> Hop<'a> {
    fn neighbor_type(&self) -> &'a TypeName {
        match self.anchor {
            EdgeAnchor::Source => &self.partition.end_type,
            EdgeAnchor::Target => &self.partition.start_type,
        }
    }

    /// Self-loops on this hop were already seen by the outgoing pass over
    /// the same partition.
    fn repeats_self_loops(&self, direction: Direction) -> bool {
        direction == Direction::Both
            && self.anchor == EdgeAnchor::Target
            && self.partition.start_type == self.partition.end_type
    }
}

/// Answers node, neighbor, and neighbor-count requests.
#[derive(Clone)]
pub struct TraversalService {
    pub(crate) engine: Arc<dyn QueryEngine>,
    pub(crate) graph: Arc<PropertyGraph>,
}

impl TraversalService {
    pub fn new(engine: Arc<dyn QueryEngine>, graph: Arc<PropertyGraph>) -> Self {
        Self { engine, graph }
    }

    pub fn graph(&self) -> &PropertyGraph {
        &self.graph
    }

    /// Resolve a caller-supplied type name.
    pub(crate) fn node_type(&self, type_name: &str) -> Result<&NodeType> {
        self.graph
            .registry
            .resolve(type_name)
            .map_err(|_| GraphError::InvalidType(type_name.to_string()))
    }

    /// Directional sub-queries for `node_type`, outgoing first.
    fn hops<'a>(&'a self, node_type: &'a TypeName, direction: Direction) -> Vec<Hop<'a>> {
        let mut hops = Vec::new();
        if direction.includes_out() {
            hops.extend(self.graph.outgoing(node_type).map(|partition| Hop {
                partition,
                anchor: EdgeAnchor::Source,
            }));
        }
        if direction.includes_in() {
            hops.extend(self.graph.incoming(node_type).map(|partition| Hop {
                partition,
                anchor: EdgeAnchor::Target,
            }));
        }
        hops
    }

    fn edge_match(&self, hop: &Hop<'_>, id: &str) -> EdgeMatch {
        EdgeMatch {
            graph: self.graph.name().to_string(),
            label: hop.partition.label.clone(),
            anchor: hop.anchor,
            value: Value::String(id.to_string()),
        }
    }

    // ── GetNode ──────────────────────────────────────────────────

    /// Look up one node by type and id.
    pub async fn get_node(&self, type_name: &str, id: &str) -> Result<NodeResponse> {
        let node_type = self.node_type(type_name)?;

        let query = Select::from(&node_type.partition)
            .filter(Predicate::eq(&node_type.id_field, Value::String(id.to_string())))
            .page(0, 2);
        let mut rows = self.engine.select(&query).await?;

        match rows.len() {
            0 => Ok(NodeResponse::default()),
            1 => {
                let row = rows.remove(0);
                Ok(NodeResponse::found(NodeRecord::from_row(
                    row,
                    &node_type.name,
                    &node_type.id_field,
                    node_type.display_field.as_deref(),
                )))
            }
            _ => Err(GraphError::Integrity(format!(
                "id {id} matches more than one row in {}",
                node_type.partition
            ))),
        }
    }

    // ── GetNeighbors ─────────────────────────────────────────────

    /// Direct neighbors of a node and every edge connecting them.
    pub async fn get_neighbors(
        &self,
        type_name: &str,
        id: &str,
        direction: Direction,
    ) -> Result<NeighborsResponse> {
        let node_type = self.node_type(type_name)?;
        let hops = self.hops(&node_type.name, direction);

        let mut edges = Vec::new();
        let mut neighbors: Vec<(&TypeName, String)> = Vec::new();
        let mut seen: HashSet<(&TypeName, String)> = HashSet::new();
        let mut edge_ids = EdgeIds::new(self.graph.edge_id_field.as_deref());

        for hop in &hops {
            let matched = self.engine.match_edges(&self.edge_match(hop, id)).await?;
            let self_loops_seen = hop.repeats_self_loops(direction);

            for edge in matched {
                let source = value_key(&edge.source);
                let target = value_key(&edge.target);
                // Already reported by the outgoing pass over the same partition.
                if self_loops_seen && source.as_deref() == Some(id) {
                    continue;
                }

                let neighbor = match hop.anchor {
                    EdgeAnchor::Source => target,
                    EdgeAnchor::Target => source,
                };
                if let Some(key) = neighbor.filter(|k| k != id) {
                    let entry = (hop.neighbor_type(), key);
                    if seen.insert(entry.clone()) {
                        neighbors.push(entry);
                    }
                }

                edges.push(edge_ids.record(&hop.partition.label, edge));
            }
        }

        let nodes = self.hydrate(&neighbors).await?;
        tracing::debug!(
            node_type = %node_type.name,
            id,
            %direction,
            nodes = nodes.len(),
            edges = edges.len(),
            "Neighbors fetched"
        );
        Ok(NeighborsResponse { nodes, edges })
    }

    /// Fetch full rows for `neighbors` with one lookup per type, returned in
    /// discovery order.
    async fn hydrate(&self, neighbors: &[(&TypeName, String)]) -> Result<Vec<NodeRecord>> {
        let mut by_type: BTreeMap<&TypeName, Vec<Value>> = BTreeMap::new();
        for (node_type, key) in neighbors {
            by_type
                .entry(*node_type)
                .or_default()
                .push(Value::String(key.clone()));
        }

        let mut hydrated: HashMap<(&TypeName, String), NodeRecord> = HashMap::new();
        for (type_name, keys) in by_type {
            let node_type = self.graph.registry.get(type_name.as_str()).ok_or_else(|| {
                GraphError::Integrity(format!("edge partitions reference unknown type {type_name}"))
            })?;

            let query = Select::from(&node_type.partition)
                .filter(Predicate::is_in(&node_type.id_field, keys));
            for row in self.engine.select(&query).await? {
                let record = NodeRecord::from_row(
                    row,
                    &node_type.name,
                    &node_type.id_field,
                    node_type.display_field.as_deref(),
                );
                let Some(key) = record.key() else { continue };
                if hydrated.insert((type_name, key.clone()), record).is_some() {
                    return Err(GraphError::Integrity(format!(
                        "id {key} matches more than one row in {}",
                        node_type.partition
                    )));
                }
            }
        }

        neighbors
            .iter()
            .map(|(node_type, key)| {
                hydrated
                    .remove(&(*node_type, key.clone()))
                    .ok_or_else(|| {
                        GraphError::Integrity(format!("{node_type} {key} is referenced by an edge but missing"))
                    })
            })
            .collect()
    }

    // ── GetNeighborCounts ────────────────────────────────────────

    /// Number of connecting edges per neighbor type, without hydration.
    pub async fn get_neighbor_counts(
        &self,
        type_name: &str,
        id: &str,
        direction: Direction,
    ) -> Result<NeighborCountResponse> {
        let node_type = self.node_type(type_name)?;

        let mut response = NeighborCountResponse::default();
        for hop in self.hops(&node_type.name, direction) {
            let mut count = self.engine.count_edges(&self.edge_match(&hop, id)).await?;
            if count > 0 && hop.repeats_self_loops(direction) {
                count = count.saturating_sub(self.self_loops(hop.partition, id).await?);
            }
            if count == 0 {
                continue;
            }
            *response
                .details
                .entry(hop.neighbor_type().to_string())
                .or_insert(0) += count;
            response.count += count;
        }
        Ok(response)
    }

    /// Rows of `partition` whose both endpoints are `id`.
    async fn self_loops(&self, partition: &EdgePartition, id: &str) -> Result<u64> {
        let key = Value::String(id.to_string());
        let query = Select::from(&partition.name)
            .filter(Predicate::eq(&partition.source_key, key.clone()))
            .filter(Predicate::eq(&partition.destination_key, key))
            .project(&[partition.source_key.as_str()]);
        Ok(self.engine.select(&query).await?.len() as u64)
    }
}

/// Edge id assignment within one response.
///
/// Native ids are used when the relationship table has an id column.
/// Otherwise ids are UUIDv5 over label, source and target; parallel edges
/// between the same pair get an occurrence suffix.
pub(crate) struct EdgeIds<'a> {
    id_field: Option<&'a str>,
    occurrences: HashMap<String, usize>,
}

impl<'a> EdgeIds<'a> {
    pub(crate) fn new(id_field: Option<&'a str>) -> Self {
        Self {
            id_field,
            occurrences: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, label: &str, mut edge: MatchedEdge) -> EdgeRecord {
        let native = self
            .id_field
            .and_then(|field| edge.properties.remove(field))
            .as_ref()
            .and_then(value_key);

        let id = native.unwrap_or_else(|| self.synthesize(label, &edge.source, &edge.target));
        EdgeRecord {
            id,
            edge_type: label.to_string(),
            source: edge.source,
            target: edge.target,
            properties: edge.properties,
        }
    }

    fn synthesize(&mut self, label: &str, source: &Value, target: &Value) -> String {
        let base = format!(
            "{label}:{}:{}",
            value_key(source).unwrap_or_default(),
            value_key(target).unwrap_or_default()
        );
        let seen = self.occurrences.entry(base.clone()).or_insert(0);
        *seen += 1;
        let name = if *seen == 1 {
            base
        } else {
            format!("{base}:{seen}")
        };
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }
}
