//! Relationship enrichment: attaching endpoint types to untyped relationships.
//!
//! Endpoint ids are looked up in a [`MembershipIndex`]. A relationship whose
//! endpoints do not resolve to exactly one type each is dropped and counted
//! in the [`EnrichmentReport`]; it never reaches an edge partition.

use serde::Serialize;
use serde_json::Value;

use yata_core::{value_key, Row, TypeName};

use crate::registry::{Membership, MembershipIndex};

/// Column holding the start endpoint's type in the typed collection.
pub const START_TYPE_COLUMN: &str = "start_type";
/// Column holding the end endpoint's type in the typed collection.
pub const END_TYPE_COLUMN: &str = "end_type";

/// Collision ids kept in the report; the count is always exact.
const COLLISION_SAMPLE: usize = 20;

/// One row of the relationship table: endpoints plus any other columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRelationship {
    pub start_id: Value,
    pub end_id: Value,
    pub properties: Row,
}

impl RawRelationship {
    pub fn from_row(mut row: Row, start_field: &str, end_field: &str) -> Self {
        Self {
            start_id: row.remove(start_field).unwrap_or(Value::Null),
            end_id: row.remove(end_field).unwrap_or(Value::Null),
            properties: row,
        }
    }

    /// The row as stored in an edge partition.
    pub fn to_row(&self, start_field: &str, end_field: &str) -> Row {
        let mut row = Row::new();
        row.insert(start_field.to_string(), self.start_id.clone());
        row.insert(end_field.to_string(), self.end_id.clone());
        for (k, v) in &self.properties {
            row.entry(k.clone()).or_insert_with(|| v.clone());
        }
        row
    }
}

/// A relationship whose endpoints each resolved to exactly one type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRelationship {
    pub raw: RawRelationship,
    pub start_type: TypeName,
    pub end_type: TypeName,
}

impl EnrichedRelationship {
    /// The row as stored in the typed relationship collection.
    pub fn to_row(&self, start_field: &str, end_field: &str) -> Row {
        let mut row = self.raw.to_row(start_field, end_field);
        row.insert(
            START_TYPE_COLUMN.to_string(),
            Value::String(self.start_type.to_string()),
        );
        row.insert(
            END_TYPE_COLUMN.to_string(),
            Value::String(self.end_type.to_string()),
        );
        row
    }
}

/// Counts from one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Rows read from the relationship table.
    pub raw: usize,
    /// Rows that resolved to a type pair.
    pub enriched: usize,
    /// Dropped: an endpoint matched no vertex partition.
    pub unresolved: usize,
    /// Dropped: an endpoint matched several vertex partitions.
    pub ambiguous: usize,
    /// Ids present in more than one vertex partition.
    pub collision_count: usize,
    /// The first few colliding ids, sorted.
    pub collisions: Vec<String>,
}

impl EnrichmentReport {
    pub fn dropped(&self) -> usize {
        self.unresolved + self.ambiguous
    }
}

enum Resolution {
    Typed(TypeName),
    Unresolved,
    Ambiguous,
}

/// Attaches `start_type`/`end_type` to relationships.
pub struct RelationshipEnricher<'a> {
    index: &'a MembershipIndex,
}

impl<'a> RelationshipEnricher<'a> {
    pub fn new(index: &'a MembershipIndex) -> Self {
        Self { index }
    }

    fn resolve(&self, id: &Value) -> Resolution {
        match self.index.lookup(id) {
            Membership::Unique(t) => Resolution::Typed(t.clone()),
            Membership::Missing => Resolution::Unresolved,
            Membership::Ambiguous(_) => Resolution::Ambiguous,
        }
    }

    pub fn enrich(&self, raws: Vec<RawRelationship>) -> (Vec<EnrichedRelationship>, EnrichmentReport) {
        let collisions = self.index.collisions();
        let mut report = EnrichmentReport {
            raw: raws.len(),
            collision_count: collisions.len(),
            collisions: collisions
                .into_iter()
                .take(COLLISION_SAMPLE)
                .map(|(id, _)| id)
                .collect(),
            ..Default::default()
        };

        let mut enriched = Vec::with_capacity(raws.len());
        for raw in raws {
            match (self.resolve(&raw.start_id), self.resolve(&raw.end_id)) {
                (Resolution::Typed(start_type), Resolution::Typed(end_type)) => {
                    enriched.push(EnrichedRelationship {
                        raw,
                        start_type,
                        end_type,
                    });
                }
                (Resolution::Ambiguous, _) | (_, Resolution::Ambiguous) => {
                    tracing::debug!(
                        start = ?value_key(&raw.start_id),
                        end = ?value_key(&raw.end_id),
                        "Relationship endpoint belongs to several node types"
                    );
                    report.ambiguous += 1;
                }
                _ => {
                    tracing::debug!(
                        start = ?value_key(&raw.start_id),
                        end = ?value_key(&raw.end_id),
                        "Relationship endpoint matches no node"
                    );
                    report.unresolved += 1;
                }
            }
        }
        report.enriched = enriched.len();

        if report.collision_count > 0 {
            tracing::warn!(
                count = report.collision_count,
                sample = ?report.collisions,
                "Node ids shared by several node types"
            );
        }
        if report.dropped() > 0 {
            tracing::warn!(
                unresolved = report.unresolved,
                ambiguous = report.ambiguous,
                "Relationships dropped during enrichment"
            );
        }

        (enriched, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yata_engine::{MemoryEngine, PartitionSource, QueryEngine};

    use crate::registry::TypeRegistry;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    async fn index() -> MembershipIndex {
        let mut registry = TypeRegistry::new();
        registry.register("officer", "nodes_officers", "node_id", None).unwrap();
        registry.register("entity", "nodes_entities", "node_id", None).unwrap();

        let engine = MemoryEngine::new();
        engine
            .register_partition(
                "nodes_officers",
                PartitionSource::Rows(vec![row(json!({"node_id": 1})), row(json!({"node_id": 7}))]),
            )
            .await
            .unwrap();
        engine
            .register_partition(
                "nodes_entities",
                PartitionSource::Rows(vec![row(json!({"node_id": 2})), row(json!({"node_id": 7}))]),
            )
            .await
            .unwrap();
        MembershipIndex::build(&registry, &engine).await.unwrap()
    }

    fn raw(start: Value, end: Value) -> RawRelationship {
        RawRelationship::from_row(
            row(json!({"node_id_start": start, "node_id_end": end, "rel_type": "officer_of"})),
            "node_id_start",
            "node_id_end",
        )
    }

    #[test]
    fn test_raw_relationship_from_row() {
        let rel = raw(json!(1), json!("2"));
        assert_eq!(rel.start_id, json!(1));
        assert_eq!(rel.end_id, json!("2"));
        assert_eq!(rel.properties.len(), 1);

        let back = rel.to_row("node_id_start", "node_id_end");
        assert_eq!(back["node_id_start"], json!(1));
        assert_eq!(back["rel_type"], json!("officer_of"));
    }

    #[tokio::test]
    async fn test_enrich_attaches_types() {
        let index = index().await;
        let enricher = RelationshipEnricher::new(&index);

        let (enriched, report) = enricher.enrich(vec![raw(json!(1), json!("2"))]);
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].start_type.as_str(), "officer");
        assert_eq!(enriched[0].end_type.as_str(), "entity");
        assert_eq!(report.enriched, 1);
        assert_eq!(report.dropped(), 0);

        let typed = enriched[0].to_row("node_id_start", "node_id_end");
        assert_eq!(typed[START_TYPE_COLUMN], json!("officer"));
        assert_eq!(typed[END_TYPE_COLUMN], json!("entity"));
    }

    #[tokio::test]
    async fn test_enrich_drops_unresolved_and_ambiguous() {
        let index = index().await;
        let enricher = RelationshipEnricher::new(&index);

        let (enriched, report) = enricher.enrich(vec![
            raw(json!(1), json!(2)),
            raw(json!(1), json!(99)),
            raw(Value::Null, json!(2)),
            raw(json!(7), json!(2)),
        ]);

        assert_eq!(enriched.len(), 1);
        assert_eq!(
            report,
            EnrichmentReport {
                raw: 4,
                enriched: 1,
                unresolved: 2,
                ambiguous: 1,
                collision_count: 1,
                collisions: vec!["7".to_string()],
            }
        );
    }
}
