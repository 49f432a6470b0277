//! In-memory block graph with JSON snapshots.
//!
//! [`MemoryGraph`] keeps nodes and edges in creation order behind a mutex, so
//! merges are atomic per identifier. The whole graph can be written to and
//! restored from a JSON snapshot, which lets successive runs accumulate into
//! one graph file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{BlockEdge, BlockNode};
use crate::storage::{GraphStore, write_atomic};

/// Serializable form of the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<BlockNode>,
    pub edges: Vec<BlockEdge>,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: Vec<BlockNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<BlockEdge>,
    edge_keys: HashSet<(String, String)>,
}

impl GraphState {
    fn insert_node(&mut self, node: BlockNode) -> bool {
        if self.node_index.contains_key(&node.identifier) {
            return false;
        }
        self.node_index
            .insert(node.identifier.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    fn insert_edge(&mut self, edge: BlockEdge) -> bool {
        if !self
            .edge_keys
            .insert((edge.parent.clone(), edge.child.clone()))
        {
            return false;
        }
        self.edges.push(edge);
        true
    }
}

/// Thread-safe in-memory [`GraphStore`].
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from a snapshot, dropping duplicate nodes and edges.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut state = GraphState::default();
        for node in snapshot.nodes {
            state.insert_node(node);
        }
        for edge in snapshot.edges {
            state.insert_edge(edge);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Load a snapshot file, starting empty if it doesn't exist.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)?;
                log::info!(
                    "Loaded graph snapshot from {} ({} nodes, {} edges)",
                    path.display(),
                    snapshot.nodes.len(),
                    snapshot.edges.len()
                );
                Ok(Self::from_snapshot(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No graph snapshot at {}, starting empty", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write the current graph to a snapshot file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(path, &bytes).await?;
        log::info!(
            "Graph snapshot saved to {} ({} nodes, {} edges)",
            path.display(),
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.lock();
        GraphSnapshot {
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
        }
    }

    pub fn node(&self, identifier: &str) -> Option<BlockNode> {
        let state = self.lock();
        state
            .node_index
            .get(identifier)
            .map(|&i| state.nodes[i].clone())
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// Edges leaving `parent`, in creation order.
    pub fn children(&self, parent: &str) -> Vec<BlockEdge> {
        self.lock()
            .edges
            .iter()
            .filter(|e| e.parent == parent)
            .cloned()
            .collect()
    }

    /// Number of nodes per semantic type; untyped nodes count as "unknown".
    pub fn count_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.lock().nodes {
            let kind = node.kind.clone().unwrap_or_else(|| "unknown".to_string());
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn merge_node(&self, node: &BlockNode) -> Result<bool> {
        Ok(self.lock().insert_node(node.clone()))
    }

    async fn merge_edge(&self, parent: &Cid, child: &Cid, index: usize) -> Result<()> {
        let mut state = self.lock();
        let parent = parent.to_string();
        let child = child.to_string();

        for end in [&parent, &child] {
            if !state.node_index.contains_key(end) {
                return Err(AppError::graph(format!(
                    "cannot merge edge {parent} -> {child}: node {end} not found"
                )));
            }
        }

        state.insert_edge(BlockEdge {
            parent,
            child,
            index,
        });
        Ok(())
    }

    async fn set_node_type(&self, cid: &Cid, kind: &str) -> Result<()> {
        let mut state = self.lock();
        let Some(&i) = state.node_index.get(&cid.to_string()) else {
            log::debug!("set_node_type: no node for {cid}");
            return Ok(());
        };
        let node = &mut state.nodes[i];
        if node.kind.is_none() {
            node.kind = Some(kind.to_string());
        }
        Ok(())
    }
}
