//! Source configuration for the yata graph.
//!
//! Loaded from (in priority order):
//! 1. Environment variables (`YATA__` prefix, `__` separator)
//! 2. Config file (`yata.toml`, or any format the `config` crate detects)
//! 3. Defaults

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CoreError;
use crate::types::{is_identifier, TypeName};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct YataConfig {
    pub graph: GraphSourceConfig,

    #[serde(default)]
    pub neo4j: Neo4jSettings,
}

/// The tabular sources a property graph is materialized from.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSourceConfig {
    /// Name the property graph is registered under.
    #[serde(default = "default_graph_name")]
    pub name: String,

    /// Which query engine hosts the partitions.
    #[serde(default)]
    pub engine: EngineKind,

    /// One vertex partition per node type.
    #[serde(default)]
    pub nodes: Vec<NodeSourceConfig>,

    /// The untyped relationship table.
    pub relationships: RelationshipSourceConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Memory,
    Neo4j,
}

/// A vertex partition backing one node type.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSourceConfig {
    /// Partition name inside the query engine.
    pub table: String,

    /// Path to the tabular source file.
    pub path: PathBuf,

    /// Node type name (case-insensitive, stored lowercase).
    pub node_type: String,

    /// Column holding the node id.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Column used as the human-readable name.
    pub display_field: Option<String>,
}

/// The relationship table: one row per edge, no type information.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipSourceConfig {
    #[serde(default = "default_relationships_table")]
    pub table: String,

    pub path: PathBuf,

    #[serde(default = "default_start_field")]
    pub start_field: String,

    #[serde(default = "default_end_field")]
    pub end_field: String,

    /// Native edge id column, if the data carries one.
    pub id_field: Option<String>,

    /// Partition name for the enriched (typed) relationship collection.
    #[serde(default = "default_typed_table")]
    pub typed_table: String,
}

/// Connection settings for the Neo4j engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Target database; a separate database per graph generation keeps
    /// reloads isolated.
    pub database: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_graph_name() -> String {
    "yata_graph".to_string()
}

fn default_id_field() -> String {
    "node_id".to_string()
}

fn default_relationships_table() -> String {
    "relationships".to_string()
}

fn default_start_field() -> String {
    "node_id_start".to_string()
}

fn default_end_field() -> String {
    "node_id_end".to_string()
}

fn default_typed_table() -> String {
    "relationships_typed".to_string()
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: String::new(),
            database: None,
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl RelationshipSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            table: default_relationships_table(),
            path: path.into(),
            start_field: default_start_field(),
            end_field: default_end_field(),
            id_field: None,
            typed_table: default_typed_table(),
        }
    }
}

impl NodeSourceConfig {
    pub fn new(table: &str, path: impl Into<PathBuf>, node_type: &str) -> Self {
        Self {
            table: table.to_string(),
            path: path.into(),
            node_type: node_type.to_string(),
            id_field: default_id_field(),
            display_field: None,
        }
    }

    pub fn with_display_field(mut self, field: &str) -> Self {
        self.display_field = Some(field.to_string());
        self
    }
}

impl YataConfig {
    /// Load configuration from `{file_prefix}.{toml,yaml,json,...}` and the
    /// environment, resolve relative source paths against the file's
    /// directory, and validate the result.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("YATA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: YataConfig = cfg.try_deserialize()?;

        if let Some(base) = Path::new(file_prefix).parent() {
            loaded.graph.resolve_paths(base);
        }
        loaded.graph.validate()?;

        tracing::debug!(
            graph = %loaded.graph.name,
            node_sources = loaded.graph.nodes.len(),
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

impl GraphSourceConfig {
    pub fn new(name: &str, relationships: RelationshipSourceConfig) -> Self {
        Self {
            name: name.to_string(),
            engine: EngineKind::default(),
            nodes: Vec::new(),
            relationships,
        }
    }

    pub fn with_node(mut self, node: NodeSourceConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Make relative source paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for node in &mut self.nodes {
            if node.path.is_relative() {
                node.path = base.join(&node.path);
            }
        }
        if self.relationships.path.is_relative() {
            self.relationships.path = base.join(&self.relationships.path);
        }
    }

    /// Structural checks that do not need any data.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.nodes.is_empty() {
            return Err(CoreError::Config(
                "at least one node source is required".to_string(),
            ));
        }
        check_identifier(&self.name)?;

        let mut types = HashSet::new();
        let mut tables = HashSet::new();
        for node in &self.nodes {
            let name = TypeName::new(&node.node_type)?;
            if !types.insert(name.clone()) {
                return Err(CoreError::Config(format!(
                    "node type {name} is configured more than once"
                )));
            }
            check_identifier(&node.table)?;
            check_identifier(&node.id_field)?;
            if let Some(display) = &node.display_field {
                check_identifier(display)?;
            }
            if !tables.insert(node.table.as_str()) {
                return Err(CoreError::Config(format!(
                    "table {} is used by more than one source",
                    node.table
                )));
            }
        }

        let rel = &self.relationships;
        for ident in [&rel.table, &rel.start_field, &rel.end_field, &rel.typed_table] {
            check_identifier(ident)?;
        }
        if let Some(id_field) = &rel.id_field {
            check_identifier(id_field)?;
        }
        if tables.contains(rel.table.as_str()) || tables.contains(rel.typed_table.as_str()) {
            return Err(CoreError::Config(
                "relationship tables must not reuse a node table name".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_identifier(s: &str) -> Result<(), CoreError> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(s.to_string()))
    }
}
