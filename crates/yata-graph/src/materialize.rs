//! The build pipeline.
//!
//! Orchestrates: register vertex partitions → read relationships → index
//! vertex ids → enrich → write typed collection → partition edges →
//! register the property graph → fingerprint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use yata_core::{GraphSourceConfig, TypeName};
use yata_engine::{GraphDefinition, PartitionSource, QueryEngine, Select};

use crate::builder::GraphBuilder;
use crate::enrich::{EnrichmentReport, RawRelationship, RelationshipEnricher};
use crate::error::{GraphError, Result};
use crate::partition::{EdgePartition, EdgePartitioner};
use crate::registry::{MembershipIndex, TypeRegistry};

/// A materialized, registered property graph. Read-only once built.
#[derive(Debug, Clone)]
pub struct PropertyGraph {
    pub definition: GraphDefinition,
    pub registry: TypeRegistry,
    pub edge_partitions: Vec<EdgePartition>,
    /// Native edge id column, if the relationship table has one.
    pub edge_id_field: Option<String>,
    /// Partition holding the enriched relationship collection.
    pub typed_table: String,
    /// Row count per node type.
    pub vertex_rows: BTreeMap<String, u64>,
    pub report: EnrichmentReport,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

impl PropertyGraph {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Edge partitions whose start endpoint has type `node_type`.
    pub fn outgoing<'a>(
        &'a self,
        node_type: &'a TypeName,
    ) -> impl Iterator<Item = &'a EdgePartition> + 'a {
        self.edge_partitions
            .iter()
            .filter(move |p| &p.start_type == node_type)
    }

    /// Edge partitions whose end endpoint has type `node_type`.
    pub fn incoming<'a>(
        &'a self,
        node_type: &'a TypeName,
    ) -> impl Iterator<Item = &'a EdgePartition> + 'a {
        self.edge_partitions
            .iter()
            .filter(move |p| &p.end_type == node_type)
    }

    pub fn edge_rows(&self) -> u64 {
        self.edge_partitions.iter().map(|p| p.rows).sum()
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            graph: self.name().to_string(),
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
            node_types: self.registry.iter().map(|t| t.name.to_string()).collect(),
            edge_labels: self.edge_partitions.iter().map(|p| p.label.clone()).collect(),
            vertex_rows: self.vertex_rows.clone(),
            edge_rows: self.edge_rows(),
            enrichment: self.report.clone(),
        }
    }
}

/// What `build` reports.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub graph: String,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub node_types: Vec<String>,
    pub edge_labels: Vec<String>,
    pub vertex_rows: BTreeMap<String, u64>,
    pub edge_rows: u64,
    pub enrichment: EnrichmentReport,
}

/// Hashable view of a graph: everything that identifies it except the
/// build time.
#[derive(Serialize)]
struct HashableGraph<'a> {
    definition: &'a GraphDefinition,
    vertex_rows: &'a BTreeMap<String, u64>,
    edge_rows: Vec<(&'a str, u64)>,
}

/// BLAKE3 digest of the graph definition and its row counts.
///
/// Two builds from unchanged sources produce the same fingerprint.
pub fn fingerprint(
    definition: &GraphDefinition,
    vertex_rows: &BTreeMap<String, u64>,
    edge_partitions: &[EdgePartition],
) -> Result<String> {
    let hashable = HashableGraph {
        definition,
        vertex_rows,
        edge_rows: edge_partitions
            .iter()
            .map(|p| (p.name.as_str(), p.rows))
            .collect(),
    };
    let json = serde_json::to_vec(&hashable)
        .map_err(|e| GraphError::GraphDefinition(format!("cannot serialize definition: {e}")))?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

/// Build the property graph described by `config` inside `engine`.
///
/// Nothing is served from `engine` until this returns; a failure leaves
/// partitions behind but never a registered graph that references them.
pub async fn materialize(
    engine: &dyn QueryEngine,
    config: &GraphSourceConfig,
) -> Result<PropertyGraph> {
    let start = std::time::Instant::now();
    config.validate()?;
    let registry = TypeRegistry::from_config(config)?;
    let rels = &config.relationships;

    // Vertex partitions.
    let mut vertex_rows = BTreeMap::new();
    for node in &config.nodes {
        let rows = engine
            .register_partition(
                &node.table,
                PartitionSource::Csv {
                    path: node.path.clone(),
                },
            )
            .await?;
        let node_type = registry.resolve(&node.node_type)?;
        tracing::info!(node_type = %node_type.name, partition = %node.table, rows, "Vertex partition registered");
        vertex_rows.insert(node_type.name.to_string(), rows);
    }

    // Raw relationships.
    let raw_count = engine
        .register_partition(
            &rels.table,
            PartitionSource::Csv {
                path: rels.path.clone(),
            },
        )
        .await?;
    let columns = engine.describe_partition(&rels.table).await?;
    for field in [&rels.start_field, &rels.end_field] {
        if raw_count > 0 && !columns.iter().any(|c| &c.name == field) {
            return Err(GraphError::GraphDefinition(format!(
                "relationship table {} has no column {field}",
                rels.table
            )));
        }
    }
    let raws: Vec<RawRelationship> = engine
        .select(&Select::from(&rels.table))
        .await?
        .into_iter()
        .map(|row| RawRelationship::from_row(row, &rels.start_field, &rels.end_field))
        .collect();
    tracing::info!(partition = %rels.table, rows = raws.len(), "Relationships read");

    // Enrichment.
    let index = MembershipIndex::build(&registry, engine).await?;
    let (enriched, report) = RelationshipEnricher::new(&index).enrich(raws);
    let typed_rows = enriched
        .iter()
        .map(|rel| rel.to_row(&rels.start_field, &rels.end_field))
        .collect();
    engine
        .register_partition(&rels.typed_table, PartitionSource::Rows(typed_rows))
        .await?;
    tracing::info!(
        partition = %rels.typed_table,
        enriched = report.enriched,
        unresolved = report.unresolved,
        ambiguous = report.ambiguous,
        "Relationships enriched"
    );

    // Edge partitions and the graph itself.
    let edge_partitions = EdgePartitioner::new(&registry, &rels.start_field, &rels.end_field)
        .partition(engine, &enriched)
        .await?;
    let definition = GraphBuilder::new(&config.name)
        .build(engine, &registry, &edge_partitions)
        .await?;
    let fingerprint = fingerprint(&definition, &vertex_rows, &edge_partitions)?;

    tracing::info!(
        graph = %definition.name,
        engine = engine.name(),
        edge_partitions = edge_partitions.len(),
        fingerprint = %fingerprint,
        duration_ms = start.elapsed().as_millis() as u64,
        "Graph materialized"
    );

    Ok(PropertyGraph {
        definition,
        registry,
        edge_partitions,
        edge_id_field: rels.id_field.clone(),
        typed_table: rels.typed_table.clone(),
        vertex_rows,
        report,
        fingerprint,
        built_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use yata_core::{NodeSourceConfig, RelationshipSourceConfig};
    use yata_engine::MemoryEngine;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn config(dir: &Path) -> GraphSourceConfig {
        GraphSourceConfig::new(
            "icij_graph",
            RelationshipSourceConfig::new(dir.join("relationships.csv")),
        )
        .with_node(
            NodeSourceConfig::new("nodes_officers", dir.join("officers.csv"), "officer")
                .with_display_field("name"),
        )
        .with_node(
            NodeSourceConfig::new("nodes_entities", dir.join("entities.csv"), "entity")
                .with_display_field("name"),
        )
    }

    fn seed(dir: &Path) {
        write(dir, "officers.csv", "node_id,name\n12000001,Officer A\n12000002,Officer B\n");
        write(dir, "entities.csv", "node_id,name\n11000001,Entity X\n");
        write(
            dir,
            "relationships.csv",
            "node_id_start,node_id_end,rel_type\n12000001,11000001,officer_of\n12000002,11000001,officer_of\n12000003,11000001,officer_of\n",
        );
    }

    #[tokio::test]
    async fn test_materialize() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let engine = MemoryEngine::new();

        let graph = materialize(&engine, &config(dir.path())).await.unwrap();
        assert_eq!(graph.name(), "icij_graph");
        assert_eq!(graph.vertex_rows["officer"], 2);
        assert_eq!(graph.edge_partitions.len(), 1);
        assert_eq!(graph.edge_partitions[0].label, "related_to_officer_entity");
        assert_eq!(graph.edge_rows(), 2);
        assert_eq!(graph.report.raw, 3);
        assert_eq!(graph.report.unresolved, 1);
        assert_eq!(graph.fingerprint.len(), 64);

        let officer = TypeName::new("officer").unwrap();
        assert_eq!(graph.outgoing(&officer).count(), 1);
        assert_eq!(graph.incoming(&officer).count(), 0);

        let typed = engine.count_rows("relationships_typed").await.unwrap();
        assert_eq!(typed, 2);
    }

    #[tokio::test]
    async fn test_materialize_without_edges_fails() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        write(dir.path(), "relationships.csv", "node_id_start,node_id_end\n1,2\n");
        let engine = MemoryEngine::new();

        let err = materialize(&engine, &config(dir.path())).await.unwrap_err();
        assert!(matches!(err, GraphError::GraphDefinition(_)));
    }

    #[tokio::test]
    async fn test_materialize_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::new();

        let err = materialize(&engine, &config(dir.path())).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::Engine(yata_engine::EngineError::SourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fingerprint_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let first = materialize(&MemoryEngine::new(), &config(dir.path())).await.unwrap();
        let second = materialize(&MemoryEngine::new(), &config(dir.path())).await.unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.definition, second.definition);

        write(dir.path(), "entities.csv", "node_id,name\n11000001,Entity X\n11000002,Entity Y\n");
        let third = materialize(&MemoryEngine::new(), &config(dir.path())).await.unwrap();
        assert_ne!(first.fingerprint, third.fingerprint);
    }
}
