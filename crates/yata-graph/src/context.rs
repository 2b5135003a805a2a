//! The published graph and its engine, passed explicitly to every request.
//!
//! A [`GraphSnapshot`] pairs an engine with the graph materialized inside
//! it. Readers clone the current snapshot `Arc` and keep using it for the
//! whole request; a reload builds a complete new snapshot first and swaps
//! it in under the lock, so a reader sees either the old graph or the new
//! one.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use yata_core::GraphSourceConfig;
use yata_engine::QueryEngine;

use crate::error::Result;
use crate::materialize::{materialize, PropertyGraph};
use crate::traversal::TraversalService;

pub struct GraphSnapshot {
    pub engine: Arc<dyn QueryEngine>,
    pub graph: Arc<PropertyGraph>,
}

impl GraphSnapshot {
    pub fn traversal(&self) -> TraversalService {
        TraversalService::new(Arc::clone(&self.engine), Arc::clone(&self.graph))
    }
}

pub struct GraphContext {
    config: GraphSourceConfig,
    current: RwLock<Arc<GraphSnapshot>>,
    rebuild: Mutex<()>,
}

impl GraphContext {
    /// Materialize the configured graph into `engine` and publish it.
    pub async fn init(engine: Arc<dyn QueryEngine>, config: GraphSourceConfig) -> Result<Self> {
        let graph = materialize(engine.as_ref(), &config).await?;
        tracing::info!(graph = %graph.name(), engine = engine.name(), "Graph context ready");

        Ok(Self {
            config,
            current: RwLock::new(Arc::new(GraphSnapshot {
                engine,
                graph: Arc::new(graph),
            })),
            rebuild: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &GraphSourceConfig {
        &self.config
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// A traversal service bound to the current snapshot.
    pub fn traversal(&self) -> TraversalService {
        self.snapshot().traversal()
    }

    /// Rebuild the graph from the configured sources into `engine` and
    /// publish it.
    ///
    /// `engine` must be a fresh engine (or a separate database): the old
    /// snapshot keeps serving from its own engine until the swap. Reloads
    /// run one at a time; on failure the old snapshot stays published.
    pub async fn reload(&self, engine: Arc<dyn QueryEngine>) -> Result<Arc<GraphSnapshot>> {
        let _guard = self.rebuild.lock().await;

        let graph = materialize(engine.as_ref(), &self.config).await?;
        let next = Arc::new(GraphSnapshot {
            engine,
            graph: Arc::new(graph),
        });

        let previous = std::mem::replace(&mut *self.current.write(), Arc::clone(&next));
        tracing::info!(
            graph = %next.graph.name(),
            previous = %previous.graph.fingerprint,
            current = %next.graph.fingerprint,
            "Graph reloaded"
        );
        Ok(next)
    }

    /// Release the current engine's resources.
    pub async fn shutdown(&self) -> Result<()> {
        let snapshot = self.snapshot();
        snapshot.engine.shutdown().await?;
        Ok(())
    }
}
