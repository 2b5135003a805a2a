//! Node type registry and id membership.
//!
//! Every node type is backed by one vertex partition. Ids are assumed
//! disjoint across partitions; [`MembershipIndex`] reports the ids for
//! which that assumption does not hold.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use yata_core::{value_key, GraphSourceConfig, TypeName};
use yata_engine::{Predicate, QueryEngine, Select};

use crate::error::{GraphError, Result};

/// A registered node type and the partition that backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeType {
    pub name: TypeName,
    pub partition: String,
    pub id_field: String,
    pub display_field: Option<String>,
}

/// Node types by normalized name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<TypeName, NodeType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One type per configured node source.
    pub fn from_config(config: &GraphSourceConfig) -> Result<Self> {
        let mut registry = Self::new();
        for node in &config.nodes {
            registry.register(
                &node.node_type,
                &node.table,
                &node.id_field,
                node.display_field.as_deref(),
            )?;
        }
        Ok(registry)
    }

    /// Register a node type. Names are case-insensitive.
    pub fn register(
        &mut self,
        name: &str,
        partition: &str,
        id_field: &str,
        display_field: Option<&str>,
    ) -> Result<&NodeType> {
        let name = TypeName::new(name)?;
        if self.types.contains_key(&name) {
            return Err(GraphError::DuplicateType(name.to_string()));
        }

        tracing::debug!(node_type = %name, partition, "Node type registered");
        let entry = self.types.entry(name.clone()).or_insert(NodeType {
            name,
            partition: partition.to_string(),
            id_field: id_field.to_string(),
            display_field: display_field.map(str::to_string),
        });
        Ok(entry)
    }

    /// Look up a type by name, ignoring case and surrounding whitespace.
    pub fn resolve(&self, name: &str) -> Result<&NodeType> {
        TypeName::new(name)
            .ok()
            .and_then(|n| self.types.get(&n))
            .ok_or_else(|| GraphError::UnknownType(name.to_string()))
    }

    /// Exact lookup of an already-normalized name.
    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered types, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The single type whose partition contains `id`.
    ///
    /// Zero or several owners are both reported as
    /// [`GraphError::AmbiguousMembership`].
    pub async fn membership(&self, engine: &dyn QueryEngine, id: &Value) -> Result<&NodeType> {
        let mut owners = Vec::new();
        for node_type in self.types.values() {
            let query = Select::from(&node_type.partition)
                .filter(Predicate::eq(&node_type.id_field, id.clone()))
                .project(&[node_type.id_field.as_str()])
                .page(0, 1);
            if !engine.select(&query).await?.is_empty() {
                owners.push(node_type);
            }
        }

        match owners.as_slice() {
            [single] => Ok(*single),
            _ => Err(GraphError::AmbiguousMembership {
                id: value_key(id).unwrap_or_else(|| id.to_string()),
                candidates: owners.iter().map(|t| t.name.to_string()).collect(),
            }),
        }
    }
}

// ── Membership Index ──────────────────────────────────────────────

/// Outcome of looking an id up in a [`MembershipIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership<'a> {
    Unique(&'a TypeName),
    Missing,
    Ambiguous(&'a [TypeName]),
}

/// Id key → owning types, built with one scan per vertex partition.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    owners: HashMap<String, Vec<TypeName>>,
}

impl MembershipIndex {
    pub async fn build(registry: &TypeRegistry, engine: &dyn QueryEngine) -> Result<Self> {
        let mut owners: HashMap<String, Vec<TypeName>> = HashMap::new();

        for node_type in registry.iter() {
            let query =
                Select::from(&node_type.partition).project(&[node_type.id_field.as_str()]);
            let rows = engine.select(&query).await?;

            for row in &rows {
                let Some(key) = row.get(&node_type.id_field).and_then(value_key) else {
                    continue;
                };
                let entry = owners.entry(key).or_default();
                if !entry.contains(&node_type.name) {
                    entry.push(node_type.name.clone());
                }
            }
            tracing::debug!(node_type = %node_type.name, ids = rows.len(), "Vertex ids indexed");
        }

        Ok(Self { owners })
    }

    pub fn lookup(&self, id: &Value) -> Membership<'_> {
        match value_key(id).and_then(|key| self.owners.get(&key)) {
            None => Membership::Missing,
            Some(types) if types.len() == 1 => Membership::Unique(&types[0]),
            Some(types) => Membership::Ambiguous(types.as_slice()),
        }
    }

    /// Ids present in more than one vertex partition, sorted.
    pub fn collisions(&self) -> Vec<(String, Vec<TypeName>)> {
        let mut found: Vec<_> = self
            .owners
            .iter()
            .filter(|(_, types)| types.len() > 1)
            .map(|(key, types)| (key.clone(), types.clone()))
            .collect();
        found.sort();
        found
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yata_core::Row;
    use yata_engine::{MemoryEngine, PartitionSource};

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(m) => m,
                _ => unreachable!(),
            })
            .collect()
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register("Officer", "nodes_officers", "node_id", Some("name"))
            .unwrap();
        registry
            .register("entity", "nodes_entities", "node_id", Some("name"))
            .unwrap();
        registry
    }

    async fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .register_partition(
                "nodes_officers",
                PartitionSource::Rows(rows(vec![
                    json!({"node_id": 12000001, "name": "Officer A"}),
                    json!({"node_id": 555, "name": "Twin"}),
                ])),
            )
            .await
            .unwrap();
        engine
            .register_partition(
                "nodes_entities",
                PartitionSource::Rows(rows(vec![
                    json!({"node_id": 11000001, "name": "Entity X"}),
                    json!({"node_id": "555", "name": "Twin"}),
                ])),
            )
            .await
            .unwrap();
        engine
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("OFFICER").unwrap().partition, "nodes_officers");
        assert_eq!(registry.resolve(" entity ").unwrap().name.as_str(), "entity");
        assert!(registry.contains("officer"));
        assert!(!registry.contains("Officer"));
    }

    #[test]
    fn test_duplicate_type() {
        let mut registry = registry();
        let err = registry
            .register("ENTITY", "other", "node_id", None)
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateType(name) if name == "entity"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = registry();
        assert!(matches!(registry.resolve("ship"), Err(GraphError::UnknownType(_))));
        assert!(matches!(registry.resolve("bad name"), Err(GraphError::UnknownType(_))));
    }

    #[test]
    fn test_iter_is_ordered_by_name() {
        let names: Vec<_> = registry().iter().map(|t| t.name.to_string()).collect();
        assert_eq!(names, vec!["entity", "officer"]);
    }

    #[tokio::test]
    async fn test_membership() {
        let registry = registry();
        let engine = engine().await;

        let owner = registry.membership(&engine, &json!("12000001")).await.unwrap();
        assert_eq!(owner.name.as_str(), "officer");

        let missing = registry.membership(&engine, &json!(1)).await.unwrap_err();
        assert!(
            matches!(missing, GraphError::AmbiguousMembership { ref candidates, .. } if candidates.is_empty())
        );

        let twin = registry.membership(&engine, &json!(555)).await.unwrap_err();
        assert!(
            matches!(twin, GraphError::AmbiguousMembership { ref candidates, .. } if candidates.len() == 2)
        );
    }

    #[tokio::test]
    async fn test_membership_index() {
        let registry = registry();
        let engine = engine().await;
        let index = MembershipIndex::build(&registry, &engine).await.unwrap();

        assert_eq!(index.len(), 3);
        assert!(matches!(
            index.lookup(&json!("11000001")),
            Membership::Unique(t) if t.as_str() == "entity"
        ));
        assert_eq!(index.lookup(&json!(42)), Membership::Missing);
        assert_eq!(index.lookup(&Value::Null), Membership::Missing);
        assert!(matches!(index.lookup(&json!(555)), Membership::Ambiguous(types) if types.len() == 2));

        let collisions = index.collisions();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].0, "555");
    }
}
