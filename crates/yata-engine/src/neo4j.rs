//! Neo4j-backed query engine.
//!
//! Partition rows become nodes labelled with the partition name (plus a
//! `_row` ordinal for stable ordering); a property graph becomes one
//! relationship type per edge label between vertex partition nodes.
//! Only validated identifiers are interpolated into Cypher, always inside
//! backticks; every value is a bound parameter. Id comparisons go through
//! `toString()` so they follow the same key rule as the memory engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString,
    BoltType, ConfigBuilder, Graph, Query,
};
use parking_lot::RwLock;
use serde_json::Value;

use yata_core::{is_identifier, value_key, Neo4jSettings, Row};

use crate::csv_source::{column_names, infer_columns, read_csv};
use crate::engine::QueryEngine;
use crate::error::{EngineError, Result};
use crate::query::{
    ColumnInfo, ColumnType, EdgeAnchor, EdgeMatch, EdgeTable, GraphDefinition, MatchedEdge,
    PartitionSource, Predicate, Select,
};

const BATCH_SIZE: usize = 1000;
const ROW_ORDINAL: &str = "_row";

/// Thread-safe Neo4j engine with connection pooling. Clone is cheap.
#[derive(Clone)]
pub struct Neo4jEngine {
    graph: Graph,
    definitions: Arc<RwLock<HashMap<String, GraphDefinition>>>,
}

impl Neo4jEngine {
    /// Connect to Neo4j with the given settings.
    pub async fn connect(settings: &Neo4jSettings) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(&settings.uri)
            .user(&settings.user)
            .password(&settings.password)
            .max_connections(settings.max_connections as usize)
            .fetch_size(settings.fetch_size);
        if let Some(db) = &settings.database {
            builder = builder.db(db.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        tracing::info!(uri = %settings.uri, "Connected to Neo4j");
        Ok(Self {
            graph,
            definitions: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn run(&self, q: Query) -> Result<()> {
        self.graph.run(q).await?;
        Ok(())
    }

    async fn query_rows(&self, q: Query) -> Result<Vec<neo4rs::Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn query_count(&self, q: Query) -> Result<u64> {
        let mut stream = self.graph.execute(q).await?;
        match stream.next().await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0).max(0) as u64),
            None => Ok(0),
        }
    }

    async fn catalog_entry(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        let q = query(
            "MATCH (p:YataPartition {name: $name})
             RETURN p.columns AS columns, p.types AS types",
        )
        .param("name", name.to_string());

        let mut stream = self.graph.execute(q).await?;
        let Some(row) = stream.next().await? else {
            return Err(EngineError::UnknownPartition(name.to_string()));
        };
        let columns: Vec<String> = row.get("columns").unwrap_or_default();
        let types: Vec<String> = row.get("types").unwrap_or_default();
        Ok(columns
            .into_iter()
            .zip(types)
            .map(|(name, t)| ColumnInfo {
                name,
                data_type: parse_column_type(&t),
            })
            .collect())
    }

    fn definition(&self, pattern: &EdgeMatch) -> Result<(GraphDefinition, EdgeTable)> {
        let definitions = self.definitions.read();
        let definition = definitions
            .get(&pattern.graph)
            .ok_or_else(|| EngineError::UnknownGraph(pattern.graph.clone()))?;
        let edge = definition
            .edge(&pattern.label)
            .ok_or_else(|| EngineError::UnknownLabel {
                graph: pattern.graph.clone(),
                label: pattern.label.clone(),
            })?;
        Ok((definition.clone(), edge.clone()))
    }

    /// Cypher fragment and parameters shared by edge matches and counts.
    fn edge_pattern(&self, pattern: &EdgeMatch, tail: &str) -> Result<Option<Query>> {
        pattern.validate()?;
        let (definition, edge) = self.definition(pattern)?;
        let source = vertex_partition(&definition, &edge.source_label)?;
        let target = vertex_partition(&definition, &edge.destination_label)?;

        let Some(key) = value_key(&pattern.value) else {
            return Ok(None);
        };
        let anchor = match pattern.anchor {
            EdgeAnchor::Source => "toString(a[$sk]) = $key",
            EdgeAnchor::Target => "toString(b[$dk]) = $key",
        };
        let cypher = format!(
            "MATCH (a:`{}`)-[r:`{}`]->(b:`{}`) WHERE {anchor} {tail}",
            source.0, edge.label, target.0
        );
        Ok(Some(
            query(&cypher)
                .param("sk", source.1)
                .param("dk", target.1)
                .param("key", key),
        ))
    }
}

/// `(partition, key)` of the vertex table carrying `label`.
fn vertex_partition(definition: &GraphDefinition, label: &str) -> Result<(String, String)> {
    definition
        .vertex(label)
        .map(|v| (v.partition.clone(), v.key.clone()))
        .ok_or_else(|| EngineError::UnknownLabel {
            graph: definition.name.clone(),
            label: label.to_string(),
        })
}

fn parse_column_type(s: &str) -> ColumnType {
    match s {
        "BIGINT" => ColumnType::Bigint,
        "DOUBLE" => ColumnType::Double,
        "BOOLEAN" => ColumnType::Boolean,
        _ => ColumnType::Varchar,
    }
}

fn column_type_name(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Bigint => "BIGINT",
        ColumnType::Double => "DOUBLE",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Varchar => "VARCHAR",
    }
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => {
            let mut list = BoltList::with_capacity(items.len());
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => BoltType::Map(to_bolt_map(map)),
    }
}

fn to_bolt_map(row: &Row) -> BoltMap {
    let mut map = BoltMap::with_capacity(row.len());
    for (k, v) in row {
        if !v.is_null() {
            map.put(BoltString::new(k), to_bolt(v));
        }
    }
    map
}

fn decode_row(row: &neo4rs::Row, column: &str) -> Result<Row> {
    match row.get::<Value>(column) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EngineError::Decode(format!(
            "expected a map in column {column}, got {other}"
        ))),
        Err(e) => Err(EngineError::Decode(format!(
            "failed to decode column {column}: {e}"
        ))),
    }
}

#[async_trait]
impl QueryEngine for Neo4jEngine {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    async fn register_partition(&self, name: &str, source: PartitionSource) -> Result<u64> {
        if !is_identifier(name) {
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

        self.run(query(&format!("MATCH (n:`{name}`) DETACH DELETE n")))
            .await?;

        let create = format!("UNWIND $rows AS row CREATE (n:`{name}`) SET n = row");
        for (batch_index, batch) in rows.chunks(BATCH_SIZE).enumerate() {
            let mut list = BoltList::with_capacity(batch.len());
            for (offset, row) in batch.iter().enumerate() {
                let mut map = to_bolt_map(row);
                let ordinal = (batch_index * BATCH_SIZE + offset) as i64;
                map.put(
                    BoltString::new(ROW_ORDINAL),
                    BoltType::Integer(BoltInteger::new(ordinal)),
                );
                list.push(BoltType::Map(map));
            }
            self.run(query(&create).param("rows", BoltType::List(list)))
                .await?;
        }

        let count = rows.len() as u64;
        let q = query(
            "MERGE (p:YataPartition {name: $name})
             SET p.columns = $columns, p.types = $types, p.rows = $rows",
        )
        .param("name", name.to_string())
        .param(
            "columns",
            columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>(),
        )
        .param(
            "types",
            columns
                .iter()
                .map(|c| column_type_name(c.data_type).to_string())
                .collect::<Vec<_>>(),
        )
        .param("rows", count as i64);
        self.run(q).await?;

        tracing::debug!(partition = name, rows = count, "Partition loaded into Neo4j");
        Ok(count)
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let rows = self
            .query_rows(query(
                "MATCH (p:YataPartition) RETURN p.name AS name ORDER BY name",
            ))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<String>("name").ok())
            .collect())
    }

    async fn describe_partition(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        self.catalog_entry(name).await
    }

    async fn count_rows(&self, name: &str) -> Result<u64> {
        self.catalog_entry(name).await?;
        self.query_count(query(&format!("MATCH (n:`{name}`) RETURN count(n) AS cnt")))
            .await
    }

    async fn select(&self, select: &Select) -> Result<Vec<Row>> {
        select.validate()?;
        let columns = self.catalog_entry(&select.partition).await?;
        let known = |column: &str| columns.iter().any(|c| c.name == column);
        for column in select
            .predicates
            .iter()
            .map(Predicate::column)
            .chain(select.columns.iter().flatten().map(String::as_str))
        {
            if !known(column) {
                return Err(EngineError::UnknownColumn {
                    partition: select.partition.clone(),
                    column: column.to_string(),
                });
            }
        }

        let mut clauses = Vec::with_capacity(select.predicates.len());
        let mut params: Vec<(String, BoltType)> = Vec::new();
        for (i, predicate) in select.predicates.iter().enumerate() {
            params.push((
                format!("c{i}"),
                BoltType::String(BoltString::new(predicate.column())),
            ));
            match predicate {
                Predicate::Eq { value, .. } => {
                    let Some(key) = value_key(value) else {
                        return Ok(Vec::new());
                    };
                    clauses.push(format!("toString(n[$c{i}]) = $v{i}"));
                    params.push((format!("v{i}"), BoltType::String(BoltString::new(&key))));
                }
                Predicate::In { values, .. } => {
                    let mut list = BoltList::with_capacity(values.len());
                    for key in values.iter().filter_map(value_key) {
                        list.push(BoltType::String(BoltString::new(&key)));
                    }
                    clauses.push(format!("toString(n[$c{i}]) IN $v{i}"));
                    params.push((format!("v{i}"), BoltType::List(list)));
                }
                Predicate::Contains { needle, .. } => {
                    clauses.push(format!("toLower(toString(n[$c{i}])) CONTAINS $v{i}"));
                    params.push((
                        format!("v{i}"),
                        BoltType::String(BoltString::new(&needle.to_lowercase())),
                    ));
                }
            }
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let cypher = format!(
            "MATCH (n:`{}`) {filter}
             RETURN properties(n) AS row
             ORDER BY n.{ROW_ORDINAL}
             SKIP $offset LIMIT $limit",
            select.partition
        );

        let mut q = query(&cypher)
            .param("offset", select.offset as i64)
            .param("limit", select.limit.map(|l| l as i64).unwrap_or(i64::MAX));
        for (key, value) in params {
            q = q.param(&key, value);
        }

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut decoded = decode_row(row, "row")?;
            decoded.remove(ROW_ORDINAL);
            let projected = match &select.columns {
                Some(cols) => cols
                    .iter()
                    .map(|c| (c.clone(), decoded.remove(c).unwrap_or(Value::Null)))
                    .collect(),
                None => {
                    // Neo4j drops null properties; restore them from the catalog.
                    for column in &columns {
                        decoded.entry(column.name.clone()).or_insert(Value::Null);
                    }
                    decoded
                }
            };
            results.push(projected);
        }
        Ok(results)
    }

    async fn create_property_graph(&self, definition: &GraphDefinition) -> Result<()> {
        definition.validate()?;

        for edge in &definition.edges {
            let source = vertex_partition(definition, &edge.source_label)?;
            let target = vertex_partition(definition, &edge.destination_label)?;

            for (column, vertex) in [(&edge.source_key, &source), (&edge.destination_key, &target)]
            {
                let check = format!(
                    "MATCH (e:`{}`)
                     WHERE NOT EXISTS {{
                       MATCH (v:`{}`) WHERE toString(v[$vk]) = toString(e[$ek])
                     }}
                     RETURN toString(e[$ek]) AS missing LIMIT 1",
                    edge.partition, vertex.0
                );
                let q = query(&check)
                    .param("vk", vertex.1.clone())
                    .param("ek", column.clone());
                if let Some(row) = self.query_rows(q).await?.first() {
                    return Err(EngineError::ReferentialViolation {
                        label: edge.label.clone(),
                        column: column.clone(),
                        value: row
                            .get::<String>("missing")
                            .unwrap_or_else(|_| "null".to_string()),
                    });
                }
            }

            self.run(query(&format!(
                "MATCH ()-[r:`{}`]->() DELETE r",
                edge.label
            )))
            .await?;

            let create = format!(
                "MATCH (e:`{}`)
                 MATCH (a:`{}`) WHERE toString(a[$sk]) = toString(e[$esk])
                 MATCH (b:`{}`) WHERE toString(b[$dk]) = toString(e[$edk])
                 CREATE (a)-[r:`{}`]->(b)
                 SET r = properties(e)",
                edge.partition, source.0, target.0, edge.label
            );
            let q = query(&create)
                .param("sk", source.1.clone())
                .param("dk", target.1.clone())
                .param("esk", edge.source_key.clone())
                .param("edk", edge.destination_key.clone());
            self.run(q).await?;
        }

        self.definitions
            .write()
            .insert(definition.name.clone(), definition.clone());

        tracing::info!(
            graph = %definition.name,
            edge_tables = definition.edges.len(),
            "Property graph materialized in Neo4j"
        );
        Ok(())
    }

    async fn match_edges(&self, pattern: &EdgeMatch) -> Result<Vec<MatchedEdge>> {
        let Some(q) = self.edge_pattern(
            pattern,
            "RETURN a[$sk] AS source, b[$dk] AS target, properties(r) AS props ORDER BY r._row",
        )?
        else {
            return Ok(Vec::new());
        };
        let (_, edge) = self.definition(pattern)?;

        let rows = self.query_rows(q).await?;
        let mut matched = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut properties = decode_row(row, "props")?;
            properties.remove(ROW_ORDINAL);
            properties.remove(&edge.source_key);
            properties.remove(&edge.destination_key);
            matched.push(MatchedEdge {
                source: row.get::<Value>("source").unwrap_or(Value::Null),
                target: row.get::<Value>("target").unwrap_or(Value::Null),
                properties,
            });
        }
        Ok(matched)
    }

    async fn count_edges(&self, pattern: &EdgeMatch) -> Result<u64> {
        match self.edge_pattern(pattern, "RETURN count(r) AS cnt")? {
            Some(q) => self.query_count(q).await,
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_names_round_trip() {
        for t in [
            ColumnType::Bigint,
            ColumnType::Double,
            ColumnType::Boolean,
            ColumnType::Varchar,
        ] {
            assert_eq!(parse_column_type(column_type_name(t)), t);
        }
    }

    #[test]
    fn test_to_bolt_drops_null_map_entries() {
        let Value::Object(row) = json!({"a": 1, "b": null, "c": "x"}) else {
            unreachable!()
        };
        let map = to_bolt_map(&row);
        assert_eq!(map.value.len(), 2);
    }

    #[tokio::test]
    #[ignore = "requires live Neo4j"]
    async fn test_register_and_select() {
        let Ok(engine) = Neo4jEngine::connect(&Neo4jSettings::default()).await else {
            eprintln!("Skipping: Neo4j not available");
            return;
        };
        let Value::Object(row) = json!({"node_id": 1, "name": "Officer A"}) else {
            unreachable!()
        };
        engine
            .register_partition("yata_test_officers", PartitionSource::Rows(vec![row]))
            .await
            .unwrap();
        let rows = engine
            .select(&Select::from("yata_test_officers").filter(Predicate::eq("node_id", json!("1"))))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Officer A"));
    }
}
