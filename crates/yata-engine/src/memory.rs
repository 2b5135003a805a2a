//! In-memory query engine.
//!
//! Partitions are row vectors behind a `parking_lot::RwLock`; a registered
//! property graph keeps its own `Arc` to every edge partition plus
//! source/target key indexes, so replacing a partition later never changes
//! a graph that is already being served.
//!
//! Scans are linear. Edge matches are hash lookups.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use yata_core::{value_key, Row};

use crate::csv_source::{column_names, infer_columns, read_csv};
use crate::engine::QueryEngine;
use crate::error::{EngineError, Result};
use crate::query::{
    ColumnInfo, EdgeAnchor, EdgeMatch, GraphDefinition, MatchedEdge, PartitionSource, Predicate,
    Select,
};

/// In-process partitions and property graphs. Clone is cheap (inner Arc).
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    graphs: RwLock<HashMap<String, Arc<MaterializedGraph>>>,
}

struct Table {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl Table {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }
}

struct MaterializedGraph {
    edges: HashMap<String, EdgeIndex>,
}

struct EdgeIndex {
    table: Arc<Table>,
    source_key: String,
    destination_key: String,
    by_source: HashMap<String, Vec<usize>>,
    by_target: HashMap<String, Vec<usize>>,
}

impl EdgeIndex {
    fn positions(&self, anchor: EdgeAnchor, key: &str) -> &[usize] {
        let index = match anchor {
            EdgeAnchor::Source => &self.by_source,
            EdgeAnchor::Target => &self.by_target,
        };
        index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.inner
            .tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownPartition(name.to_string()))
    }

    fn edge_index<'g>(
        graph: &'g MaterializedGraph,
        pattern: &EdgeMatch,
    ) -> Result<&'g EdgeIndex> {
        graph
            .edges
            .get(&pattern.label)
            .ok_or_else(|| EngineError::UnknownLabel {
                graph: pattern.graph.clone(),
                label: pattern.label.clone(),
            })
    }

    fn graph(&self, name: &str) -> Result<Arc<MaterializedGraph>> {
        self.inner
            .graphs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownGraph(name.to_string()))
    }
}

fn require_column(table: &Table, partition: &str, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(EngineError::UnknownColumn {
            partition: partition.to_string(),
            column: column.to_string(),
        })
    }
}

fn row_key(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(value_key)
}

/// Compiled form of a predicate, with bound values reduced to keys.
enum Filter<'a> {
    Eq(&'a str, Option<String>),
    In(&'a str, HashSet<String>),
    Contains(&'a str, String),
}

impl<'a> Filter<'a> {
    fn compile(predicate: &'a Predicate) -> Self {
        match predicate {
            Predicate::Eq { column, value } => Self::Eq(column, value_key(value)),
            Predicate::In { column, values } => {
                Self::In(column, values.iter().filter_map(value_key).collect())
            }
            Predicate::Contains { column, needle } => Self::Contains(column, needle.to_lowercase()),
        }
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(column, key) => key.is_some() && row_key(row, column) == *key,
            Self::In(column, keys) => row_key(row, column).is_some_and(|k| keys.contains(&k)),
            Self::Contains(column, needle) => {
                row_key(row, column).is_some_and(|k| k.to_lowercase().contains(needle.as_str()))
            }
        }
    }
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn register_partition(&self, name: &str, source: PartitionSource) -> Result<u64> {
        if !yata_core::is_identifier(name) {
            return Err(EngineError::InvalidIdentifier(name.to_string()));
        }

        let (columns, rows) = match source {
            PartitionSource::Csv { path } => tokio::task::spawn_blocking(move || read_csv(&path))
                .await
                .map_err(|e| EngineError::Task(e.to_string()))??,
            PartitionSource::Rows(rows) => {
                let names = column_names(&rows);
                (infer_columns(&names, &rows), rows)
            }
        };

        let count = rows.len() as u64;
        self.inner
            .tables
            .write()
            .insert(name.to_string(), Arc::new(Table { columns, rows }));

        tracing::debug!(partition = name, rows = count, "Partition registered");
        Ok(count)
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.inner.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn describe_partition(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.table(name)?.columns.clone())
    }

    async fn count_rows(&self, name: &str) -> Result<u64> {
        Ok(self.table(name)?.rows.len() as u64)
    }

    async fn select(&self, query: &Select) -> Result<Vec<Row>> {
        query.validate()?;
        let table = self.table(&query.partition)?;

        for predicate in &query.predicates {
            require_column(&table, &query.partition, predicate.column())?;
        }
        for column in query.columns.iter().flatten() {
            require_column(&table, &query.partition, column)?;
        }

        let filters: Vec<Filter<'_>> = query.predicates.iter().map(Filter::compile).collect();
        let limit = query.limit.unwrap_or(usize::MAX);

        let rows = table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .skip(query.offset)
            .take(limit)
            .map(|row| match &query.columns {
                Some(columns) => columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect(),
                None => row.clone(),
            })
            .collect();

        Ok(rows)
    }

    async fn create_property_graph(&self, definition: &GraphDefinition) -> Result<()> {
        definition.validate()?;

        // label → set of vertex keys
        let mut vertex_keys: HashMap<&str, HashSet<String>> = HashMap::new();
        for vertex in &definition.vertices {
            let table = self.table(&vertex.partition)?;
            require_column(&table, &vertex.partition, &vertex.key)?;
            let keys = table
                .rows
                .iter()
                .filter_map(|row| row_key(row, &vertex.key))
                .collect();
            if vertex_keys.insert(vertex.label.as_str(), keys).is_some() {
                return Err(EngineError::DuplicateLabel(vertex.label.clone()));
            }
        }

        let mut edges = HashMap::with_capacity(definition.edges.len());
        for edge in &definition.edges {
            let table = self.table(&edge.partition)?;
            require_column(&table, &edge.partition, &edge.source_key)?;
            require_column(&table, &edge.partition, &edge.destination_key)?;

            let unknown_label = |label: &str| EngineError::UnknownLabel {
                graph: definition.name.clone(),
                label: label.to_string(),
            };
            let sources = vertex_keys
                .get(edge.source_label.as_str())
                .ok_or_else(|| unknown_label(&edge.source_label))?;
            let targets = vertex_keys
                .get(edge.destination_label.as_str())
                .ok_or_else(|| unknown_label(&edge.destination_label))?;

            let mut by_source: HashMap<String, Vec<usize>> = HashMap::new();
            let mut by_target: HashMap<String, Vec<usize>> = HashMap::new();
            for (position, row) in table.rows.iter().enumerate() {
                let source = checked_key(row, &edge.label, &edge.source_key, sources)?;
                let target = checked_key(row, &edge.label, &edge.destination_key, targets)?;
                by_source.entry(source).or_default().push(position);
                by_target.entry(target).or_default().push(position);
            }

            let index = EdgeIndex {
                table,
                source_key: edge.source_key.clone(),
                destination_key: edge.destination_key.clone(),
                by_source,
                by_target,
            };
            if edges.insert(edge.label.clone(), index).is_some() {
                return Err(EngineError::DuplicateLabel(edge.label.clone()));
            }
        }

        self.inner.graphs.write().insert(
            definition.name.clone(),
            Arc::new(MaterializedGraph { edges }),
        );

        tracing::debug!(
            graph = %definition.name,
            vertex_tables = definition.vertices.len(),
            edge_tables = definition.edges.len(),
            "Property graph registered"
        );
        Ok(())
    }

    async fn match_edges(&self, pattern: &EdgeMatch) -> Result<Vec<MatchedEdge>> {
        pattern.validate()?;
        let graph = self.graph(&pattern.graph)?;
        let index = Self::edge_index(&graph, pattern)?;

        let Some(key) = value_key(&pattern.value) else {
            return Ok(Vec::new());
        };

        let matched = index
            .positions(pattern.anchor, &key)
            .iter()
            .map(|&position| {
                let mut properties = index.table.rows[position].clone();
                let source = properties.remove(&index.source_key).unwrap_or(Value::Null);
                let target = properties
                    .remove(&index.destination_key)
                    .unwrap_or(Value::Null);
                MatchedEdge {
                    source,
                    target,
                    properties,
                }
            })
            .collect();

        Ok(matched)
    }

    async fn count_edges(&self, pattern: &EdgeMatch) -> Result<u64> {
        pattern.validate()?;
        let graph = self.graph(&pattern.graph)?;
        let index = Self::edge_index(&graph, pattern)?;

        Ok(value_key(&pattern.value)
            .map(|key| index.positions(pattern.anchor, &key).len() as u64)
            .unwrap_or(0))
    }
}

/// The key of `row[column]`, which must reference an existing vertex.
fn checked_key(
    row: &Row,
    label: &str,
    column: &str,
    vertices: &HashSet<String>,
) -> Result<String> {
    match row_key(row, column) {
        Some(key) if vertices.contains(&key) => Ok(key),
        other => Err(EngineError::ReferentialViolation {
            label: label.to_string(),
            column: column.to_string(),
            value: other.unwrap_or_else(|| "null".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{EdgeTable, VertexTable};
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(m) => m,
                _ => panic!("row must be an object"),
            })
            .collect()
    }

    async fn seeded() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .register_partition(
                "officers",
                PartitionSource::Rows(rows(vec![
                    json!({"node_id": 1, "name": "Officer A"}),
                    json!({"node_id": 2, "name": "Officer B"}),
                ])),
            )
            .await
            .unwrap();
        engine
            .register_partition(
                "entities",
                PartitionSource::Rows(rows(vec![
                    json!({"node_id": 10, "name": "Entity X"}),
                    json!({"node_id": 11, "name": "Entity Y"}),
                ])),
            )
            .await
            .unwrap();
        engine
            .register_partition(
                "rel_officer_entity",
                PartitionSource::Rows(rows(vec![
                    json!({"start": 1, "end": 10, "link": "director of"}),
                    json!({"start": 1, "end": 11, "link": "shareholder of"}),
                    json!({"start": 2, "end": 10, "link": "director of"}),
                ])),
            )
            .await
            .unwrap();
        engine
    }

    fn definition() -> GraphDefinition {
        GraphDefinition {
            name: "g".to_string(),
            vertices: vec![
                VertexTable {
                    partition: "officers".to_string(),
                    label: "officer".to_string(),
                    key: "node_id".to_string(),
                },
                VertexTable {
                    partition: "entities".to_string(),
                    label: "entity".to_string(),
                    key: "node_id".to_string(),
                },
            ],
            edges: vec![EdgeTable {
                partition: "rel_officer_entity".to_string(),
                label: "related_to_officer_entity".to_string(),
                source_key: "start".to_string(),
                source_label: "officer".to_string(),
                destination_key: "end".to_string(),
                destination_label: "entity".to_string(),
            }],
        }
    }

    fn pattern(anchor: EdgeAnchor, value: Value) -> EdgeMatch {
        EdgeMatch {
            graph: "g".to_string(),
            label: "related_to_officer_entity".to_string(),
            anchor,
            value,
        }
    }

    #[tokio::test]
    async fn test_select_with_bound_string_id() {
        let engine = seeded().await;
        let found = engine
            .select(&Select::from("officers").filter(Predicate::eq("node_id", json!("2"))))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], json!("Officer B"));
    }

    #[tokio::test]
    async fn test_select_in_contains_projection_and_paging() {
        let engine = seeded().await;

        let both = engine
            .select(
                &Select::from("officers")
                    .filter(Predicate::is_in("node_id", vec![json!(1), json!("2"), json!(99)])),
            )
            .await
            .unwrap();
        assert_eq!(both.len(), 2);

        let fuzzy = engine
            .select(
                &Select::from("entities")
                    .filter(Predicate::contains("name", "entity"))
                    .project(&["node_id"])
                    .page(1, 10),
            )
            .await
            .unwrap();
        assert_eq!(fuzzy.len(), 1);
        assert_eq!(fuzzy[0].len(), 1);
        assert_eq!(fuzzy[0]["node_id"], json!(11));
    }

    #[tokio::test]
    async fn test_select_unknown_partition_and_column() {
        let engine = seeded().await;
        let err = engine.select(&Select::from("nope")).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownPartition(_)));

        let err = engine
            .select(&Select::from("officers").filter(Predicate::eq("age", json!(3))))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_name() {
        let engine = MemoryEngine::new();
        let err = engine
            .register_partition("bad name", PartitionSource::Rows(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_list_describe_count() {
        let engine = seeded().await;
        assert_eq!(
            engine.list_partitions().await.unwrap(),
            vec!["entities", "officers", "rel_officer_entity"]
        );
        assert_eq!(engine.count_rows("rel_officer_entity").await.unwrap(), 3);
        let columns = engine.describe_partition("officers").await.unwrap();
        assert!(columns.iter().any(|c| c.name == "node_id"));
    }

    #[tokio::test]
    async fn test_graph_match_both_anchors() {
        let engine = seeded().await;
        engine.create_property_graph(&definition()).await.unwrap();

        let out = engine
            .match_edges(&pattern(EdgeAnchor::Source, json!("1")))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, json!(1));
        assert_eq!(out[0].target, json!(10));
        assert_eq!(out[0].properties["link"], json!("director of"));
        assert!(!out[0].properties.contains_key("start"));

        let incoming = engine
            .match_edges(&pattern(EdgeAnchor::Target, json!(10)))
            .await
            .unwrap();
        let sources: Vec<_> = incoming.iter().map(|e| e.source.clone()).collect();
        assert_eq!(sources, vec![json!(1), json!(2)]);

        assert_eq!(
            engine
                .count_edges(&pattern(EdgeAnchor::Target, json!(11)))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            engine
                .count_edges(&pattern(EdgeAnchor::Source, Value::Null))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_graph_enforces_referential_constraint() {
        let engine = seeded().await;
        engine
            .register_partition(
                "rel_officer_entity",
                PartitionSource::Rows(rows(vec![json!({"start": 1, "end": 999})])),
            )
            .await
            .unwrap();

        let err = engine.create_property_graph(&definition()).await.unwrap_err();
        match err {
            EngineError::ReferentialViolation { column, value, .. } => {
                assert_eq!(column, "end");
                assert_eq!(value, "999");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_graph_rejects_unknown_label() {
        let engine = seeded().await;
        let mut def = definition();
        def.edges[0].destination_label = "address".to_string();
        let err = engine.create_property_graph(&def).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownLabel { .. }));
    }

    #[tokio::test]
    async fn test_graph_snapshot_survives_partition_replacement() {
        let engine = seeded().await;
        engine.create_property_graph(&definition()).await.unwrap();
        engine
            .register_partition("rel_officer_entity", PartitionSource::Rows(Vec::new()))
            .await
            .unwrap();

        let out = engine
            .match_edges(&pattern(EdgeAnchor::Source, json!(1)))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_match_unknown_graph_and_label() {
        let engine = seeded().await;
        let err = engine
            .match_edges(&pattern(EdgeAnchor::Source, json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownGraph(_)));

        engine.create_property_graph(&definition()).await.unwrap();
        let mut p = pattern(EdgeAnchor::Source, json!(1));
        p.label = "related_to_entity_officer".to_string();
        let err = engine.match_edges(&p).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownLabel { .. }));
    }
}
