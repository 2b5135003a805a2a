//! Schema introspection, node and edge search, and graph statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use yata_core::{is_identifier, EdgeRecord, NodeRecord, Row, SearchResponse};
use yata_engine::{ColumnInfo, MatchedEdge, Predicate, Select};

use crate::enrich::EnrichmentReport;
use crate::error::{GraphError, Result};
use crate::partition::EdgePartition;
use crate::registry::NodeType;
use crate::traversal::{EdgeIds, TraversalService};

pub const DEFAULT_SEARCH_LIMIT: usize = 25;
pub const MAX_SEARCH_LIMIT: usize = 1000;
pub const NODES_TABLE: &str = "nodes";
pub const EDGES_TABLE: &str = "edges";

// ── Schema ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct NodeSchema {
    pub node_type: String,
    pub partition: String,
    pub id_field: String,
    pub display_field: Option<String>,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSchema {
    pub label: String,
    pub partition: String,
    pub start_type: String,
    pub end_type: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphSchema {
    pub graph: String,
    pub nodes: Vec<NodeSchema>,
    pub edges: Vec<EdgeSchema>,
}

// ── Search ───────────────────────────────────────────────────────

/// Search criteria. Without `display_name` or `filters` nothing matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    /// `nodes` (default), `edges`, or one edge label or partition name.
    pub table: Option<String>,
    /// Restrict to one node type, or on edges to partitions touching it.
    pub node_type: Option<String>,
    pub display_name: Option<String>,
    /// Case-insensitive substring match on `display_name`.
    #[serde(default)]
    pub fuzzy: bool,
    /// Column equality filters.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl SearchRequest {
    pub fn has_criteria(&self) -> bool {
        self.display_name.is_some() || !self.filters.is_empty()
    }

    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTable {
    Nodes,
    Edges,
}

impl std::fmt::Display for SearchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nodes => write!(f, "{NODES_TABLE}"),
            Self::Edges => write!(f, "{EDGES_TABLE}"),
        }
    }
}

/// Search hits. Both variants serialize as `{count, results}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Nodes(SearchResponse<NodeRecord>),
    Edges(SearchResponse<EdgeRecord>),
}

impl SearchResults {
    pub fn empty(table: SearchTable) -> Self {
        match table {
            SearchTable::Nodes => Self::Nodes(SearchResponse::default()),
            SearchTable::Edges => Self::Edges(SearchResponse::default()),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Nodes(r) => r.count,
            Self::Edges(r) => r.count,
        }
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        match self {
            Self::Nodes(r) => &r.results,
            Self::Edges(_) => &[],
        }
    }

    pub fn edges(&self) -> &[EdgeRecord] {
        match self {
            Self::Nodes(_) => &[],
            Self::Edges(r) => &r.results,
        }
    }
}

/// A partition one search runs against.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Node(&'a NodeType),
    Edge(&'a EdgePartition),
}

impl<'a> Scope<'a> {
    fn name(&self) -> &'a str {
        match *self {
            Self::Node(t) => t.name.as_str(),
            Self::Edge(p) => &p.label,
        }
    }

    fn partition(&self) -> &'a str {
        match *self {
            Self::Node(t) => &t.partition,
            Self::Edge(p) => &p.name,
        }
    }

    fn display_field(&self) -> Option<&'a str> {
        match *self {
            Self::Node(t) => t.display_field.as_deref(),
            Self::Edge(_) => None,
        }
    }
}

fn has_column(columns: &[ColumnInfo], column: &str) -> bool {
    columns.iter().any(|c| c.name == column)
}

/// An edge partition row split into endpoints and properties.
fn matched_edge(partition: &EdgePartition, mut row: Row) -> MatchedEdge {
    let source = row.remove(&partition.source_key).unwrap_or(Value::Null);
    let target = row.remove(&partition.destination_key).unwrap_or(Value::Null);
    MatchedEdge {
        source,
        target,
        properties: row,
    }
}

// ── Stats ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub graph: String,
    pub fingerprint: String,
    /// Rows per node type, counted live.
    pub vertex_rows: BTreeMap<String, u64>,
    /// Rows per edge label, counted live.
    pub edge_rows: BTreeMap<String, u64>,
    pub typed_relationships: u64,
    pub enrichment: EnrichmentReport,
}

impl GraphStats {
    /// Reasons the graph is not fit to serve; empty when it is.
    pub fn problems(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .vertex_rows
            .iter()
            .filter(|(_, rows)| **rows == 0)
            .map(|(node_type, _)| format!("vertex partition for {node_type} is empty"))
            .collect();
        if self.edge_rows.values().sum::<u64>() == 0 {
            problems.push("graph has no edges".to_string());
        }
        problems
    }
}

impl TraversalService {
    /// Columns of every vertex and edge partition.
    pub async fn get_schema(&self) -> Result<GraphSchema> {
        let graph = self.graph();

        let mut nodes = Vec::with_capacity(graph.registry.len());
        for node_type in graph.registry.iter() {
            nodes.push(NodeSchema {
                node_type: node_type.name.to_string(),
                partition: node_type.partition.clone(),
                id_field: node_type.id_field.clone(),
                display_field: node_type.display_field.clone(),
                columns: self.engine.describe_partition(&node_type.partition).await?,
            });
        }

        let mut edges = Vec::with_capacity(graph.edge_partitions.len());
        for partition in &graph.edge_partitions {
            edges.push(EdgeSchema {
                label: partition.label.clone(),
                partition: partition.name.clone(),
                start_type: partition.start_type.to_string(),
                end_type: partition.end_type.to_string(),
                columns: self.engine.describe_partition(&partition.name).await?,
            });
        }

        Ok(GraphSchema {
            graph: graph.name().to_string(),
            nodes,
            edges,
        })
    }

    /// Find nodes or edges by display name and column filters.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let (table, scopes) = self.search_scopes(request)?;
        if !request.has_criteria() || scopes.is_empty() {
            return Ok(SearchResults::empty(table));
        }

        let planned = self.plan_search(table, scopes, request).await?;
        let limit = request.effective_limit();
        let window = request.offset.saturating_add(limit);

        let mut hits = Vec::new();
        for (scope, query) in planned {
            for row in self.engine.select(&query.page(0, window)).await? {
                hits.push((scope, row));
            }
            if hits.len() >= window {
                break;
            }
        }

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut edge_ids = EdgeIds::new(self.graph().edge_id_field.as_deref());
        for (scope, row) in hits.into_iter().skip(request.offset).take(limit) {
            match scope {
                Scope::Node(node_type) => nodes.push(NodeRecord::from_row(
                    row,
                    &node_type.name,
                    &node_type.id_field,
                    node_type.display_field.as_deref(),
                )),
                Scope::Edge(partition) => {
                    edges.push(edge_ids.record(&partition.label, matched_edge(partition, row)))
                }
            }
        }

        Ok(match table {
            SearchTable::Nodes => SearchResults::Nodes(SearchResponse::new(nodes)),
            SearchTable::Edges => SearchResults::Edges(SearchResponse::new(edges)),
        })
    }

    /// The partitions a request searches, in registry order.
    fn search_scopes(&self, request: &SearchRequest) -> Result<(SearchTable, Vec<Scope<'_>>)> {
        let graph = self.graph();
        let node_type = request
            .node_type
            .as_deref()
            .map(|name| self.node_type(name))
            .transpose()?;
        let table = request.table.as_deref().map(str::trim).unwrap_or(NODES_TABLE);

        if table.eq_ignore_ascii_case(NODES_TABLE) {
            let scopes = match node_type {
                Some(node_type) => vec![Scope::Node(node_type)],
                None => graph.registry.iter().map(Scope::Node).collect(),
            };
            return Ok((SearchTable::Nodes, scopes));
        }

        if table.eq_ignore_ascii_case(EDGES_TABLE) {
            let scopes = graph
                .edge_partitions
                .iter()
                .filter(|p| {
                    node_type.map_or(true, |t| p.start_type == t.name || p.end_type == t.name)
                })
                .map(Scope::Edge)
                .collect();
            return Ok((SearchTable::Edges, scopes));
        }

        graph
            .edge_partitions
            .iter()
            .find(|p| p.label.eq_ignore_ascii_case(table) || p.name.eq_ignore_ascii_case(table))
            .map(|p| (SearchTable::Edges, vec![Scope::Edge(p)]))
            .ok_or_else(|| GraphError::InvalidTable(table.to_string()))
    }

    /// One select per searchable scope.
    ///
    /// A criterion no scope can satisfy is an error. Scopes lacking a
    /// column that another scope has are skipped.
    async fn plan_search<'a>(
        &self,
        table: SearchTable,
        scopes: Vec<Scope<'a>>,
        request: &SearchRequest,
    ) -> Result<Vec<(Scope<'a>, Select)>> {
        let mut described = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let columns = self.engine.describe_partition(scope.partition()).await?;
            described.push((scope, columns));
        }

        let invalid = |column: &str| GraphError::InvalidColumn {
            table: match described.as_slice() {
                [(only, _)] => only.name().to_string(),
                _ => table.to_string(),
            },
            column: column.to_string(),
        };
        if request.display_name.is_some()
            && described.iter().all(|(scope, _)| scope.display_field().is_none())
        {
            return Err(invalid("display_name"));
        }
        for column in request.filters.keys() {
            let known = is_identifier(column)
                && described.iter().any(|(_, columns)| has_column(columns, column));
            if !known {
                return Err(invalid(column));
            }
        }

        let mut planned = Vec::with_capacity(described.len());
        for (scope, columns) in described {
            if request.filters.keys().any(|c| !has_column(&columns, c)) {
                continue;
            }
            let mut query = Select::from(scope.partition());
            if let Some(name) = &request.display_name {
                let Some(display_field) = scope.display_field() else {
                    continue;
                };
                query = query.filter(if request.fuzzy {
                    Predicate::contains(display_field, name)
                } else {
                    Predicate::eq(display_field, Value::String(name.clone()))
                });
            }
            for (column, value) in &request.filters {
                query = query.filter(Predicate::eq(column, value.clone()));
            }
            planned.push((scope, query));
        }
        Ok(planned)
    }

    /// Live row counts plus build diagnostics.
    pub async fn stats(&self) -> Result<GraphStats> {
        let graph = self.graph();

        let mut vertex_rows = BTreeMap::new();
        for node_type in graph.registry.iter() {
            let rows = self.engine.count_rows(&node_type.partition).await?;
            vertex_rows.insert(node_type.name.to_string(), rows);
        }

        let mut edge_rows = BTreeMap::new();
        for partition in &graph.edge_partitions {
            let rows = self.engine.count_rows(&partition.name).await?;
            edge_rows.insert(partition.label.clone(), rows);
        }

        Ok(GraphStats {
            graph: graph.name().to_string(),
            fingerprint: graph.fingerprint.clone(),
            vertex_rows,
            edge_rows,
            typed_relationships: self.engine.count_rows(&graph.typed_table).await?,
            enrichment: graph.report.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_defaults() {
        let request: SearchRequest = serde_json::from_str(r#"{"display_name": "Officer"}"#).unwrap();
        assert!(request.has_criteria());
        assert!(!request.fuzzy);
        assert_eq!(request.effective_limit(), DEFAULT_SEARCH_LIMIT);

        let huge = SearchRequest {
            limit: Some(50_000),
            ..Default::default()
        };
        assert!(!huge.has_criteria());
        assert_eq!(huge.effective_limit(), MAX_SEARCH_LIMIT);
    }

    #[test]
    fn test_stats_problems() {
        let mut stats = GraphStats {
            graph: "g".to_string(),
            fingerprint: String::new(),
            vertex_rows: BTreeMap::from([("officer".to_string(), 2), ("entity".to_string(), 0)]),
            edge_rows: BTreeMap::new(),
            typed_relationships: 0,
            enrichment: EnrichmentReport::default(),
        };
        assert_eq!(stats.problems().len(), 2);

        stats.vertex_rows.insert("entity".to_string(), 1);
        stats.edge_rows.insert("related_to_officer_entity".to_string(), 1);
        assert!(stats.problems().is_empty());
    }
}
