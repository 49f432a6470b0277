// src/services/walker.rs

//! Recursive merkle-DAG traversal.
//!
//! [`DagWalker::download`] merges a node for a CID, links it to its parent and,
//! for nodes seen for the first time, either schedules a leaf download or
//! resolves the block and recurses into its unique children. A node that
//! already existed ends the branch, which keeps shared sub-DAGs from being
//! walked twice and makes repeated roots idempotent.
//!
//! Traversal is sequential and depth first; the only concurrency is the leaf
//! jobs handed to the [`JobScheduler`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cid::Cid;
use futures::future::{BoxFuture, FutureExt};

use crate::error::{AppError, Result};
use crate::models::block::{self, TYPE_RAW};
use crate::models::{BlockNode, ErrorPolicy, unique_children};
use crate::services::resolver::{ContentResolver, Descriptor, ResolvedNode};
use crate::services::scheduler::JobScheduler;
use crate::storage::{BlobStore, GraphStore};

/// Collaborators shared by every traversal of a run.
#[derive(Clone)]
pub struct CrawlContext {
    pub graph: Arc<dyn GraphStore>,
    pub resolver: Arc<dyn ContentResolver>,
    pub blobs: Arc<BlobStore>,
    pub jobs: Arc<JobScheduler>,
}

/// Counters describing what a walker has done so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub nodes_created: usize,
    pub nodes_existing: usize,
    pub edges_merged: usize,
    pub leaves_scheduled: usize,
    pub timeouts: usize,
    pub skipped_branches: usize,
}

#[derive(Debug, Default)]
struct Counters {
    nodes_created: AtomicUsize,
    nodes_existing: AtomicUsize,
    edges_merged: AtomicUsize,
    leaves_scheduled: AtomicUsize,
    timeouts: AtomicUsize,
    skipped_branches: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Service walking DAGs into the graph store and blob store.
pub struct DagWalker {
    ctx: CrawlContext,
    timeout: Duration,
    policy: ErrorPolicy,
    counters: Counters,
}

impl DagWalker {
    /// Create a walker with a per-call resolver timeout and error policy.
    pub fn new(ctx: CrawlContext, timeout: Duration, policy: ErrorPolicy) -> Self {
        Self {
            ctx,
            timeout,
            policy,
            counters: Counters::default(),
        }
    }

    pub fn jobs(&self) -> &Arc<JobScheduler> {
        &self.ctx.jobs
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn stats(&self) -> WalkStats {
        let c = &self.counters;
        WalkStats {
            nodes_created: c.nodes_created.load(Ordering::Relaxed),
            nodes_existing: c.nodes_existing.load(Ordering::Relaxed),
            edges_merged: c.edges_merged.load(Ordering::Relaxed),
            leaves_scheduled: c.leaves_scheduled.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            skipped_branches: c.skipped_branches.load(Ordering::Relaxed),
        }
    }

    /// Download the DAG rooted at `cid`.
    ///
    /// `index` is the position of `cid` among the unique children of `parent`
    /// and is ignored for roots. Timeouts abandon the affected branch and are
    /// not errors; other failures are returned, or skipped per child branch
    /// under [`ErrorPolicy::Skip`].
    pub fn download<'a>(
        &'a self,
        cid: Cid,
        index: usize,
        parent: Option<Cid>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            log::debug!("Download {cid}");

            let created = self.ctx.graph.merge_node(&BlockNode::new(&cid)).await?;
            if created {
                bump(&self.counters.nodes_created);
                log::info!("Node added: {cid}");
            } else {
                bump(&self.counters.nodes_existing);
            }

            if let Some(parent) = parent {
                self.ctx.graph.merge_edge(&parent, &cid, index).await?;
                bump(&self.counters.edges_merged);
                log::debug!("Edge added: {parent} has {cid}");
            }

            if !created {
                return Ok(());
            }

            if block::is_raw(&cid) {
                self.ctx.graph.set_node_type(&cid, TYPE_RAW).await?;
                return self.schedule_fetch(cid).await;
            }

            let resolved = match self.resolve(&cid).await {
                Ok(resolved) => resolved,
                Err(e) if e.is_timeout() => {
                    bump(&self.counters.timeouts);
                    log::warn!("Timeout for CID {cid}. Skip!");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            if let Some(descriptor) = &resolved.descriptor {
                self.ctx.graph.set_node_type(&cid, &descriptor.kind).await?;
            }

            // Policy: a block with links is a DAG, otherwise its inline data is the leaf.
            let children = unique_children(&resolved.links);
            if !children.is_empty() {
                for (i, child) in children.into_iter().enumerate() {
                    if let Err(e) = self.download(child, i, Some(cid)).await {
                        self.handle_branch_error(&child, e)?;
                    }
                }
            } else if let Some(data) = resolved
                .descriptor
                .as_ref()
                .and_then(Descriptor::inline_data)
            {
                self.schedule_store(cid, data.to_vec()).await?;
            }

            Ok(())
        }
        .boxed()
    }

    async fn resolve(&self, cid: &Cid) -> Result<ResolvedNode> {
        tokio::time::timeout(self.timeout, self.ctx.resolver.resolve(cid))
            .await
            .map_err(|_| AppError::timeout(format!("resolving {cid}")))?
    }

    async fn schedule_fetch(&self, cid: Cid) -> Result<()> {
        let blobs = Arc::clone(&self.ctx.blobs);
        let resolver = Arc::clone(&self.ctx.resolver);
        let timeout = self.timeout;

        self.ctx
            .jobs
            .submit(async move {
                blobs
                    .fetch_and_store(resolver.as_ref(), &cid, timeout)
                    .await
                    .map(|_| ())
            })
            .await?;
        bump(&self.counters.leaves_scheduled);
        Ok(())
    }

    async fn schedule_store(&self, cid: Cid, data: Vec<u8>) -> Result<()> {
        let blobs = Arc::clone(&self.ctx.blobs);

        self.ctx
            .jobs
            .submit(async move { blobs.store_inline(&cid, &data).await.map(|_| ()) })
            .await?;
        bump(&self.counters.leaves_scheduled);
        Ok(())
    }

    fn handle_branch_error(&self, child: &Cid, error: AppError) -> Result<()> {
        match self.policy {
            ErrorPolicy::Abort => Err(error),
            ErrorPolicy::Skip => {
                bump(&self.counters.skipped_branches);
                log::error!("Skipping branch {child}: {error}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Link;
    use crate::storage::MemoryGraph;
    use crate::testing::{
        DIRECTORY_CID, FILE_CID, MockResolver, OTHER_RAW_CID, RAW_CID, YET_ANOTHER_RAW_CID,
        dag_cid, parse, raw_cid, structured,
    };
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        graph: Arc<MemoryGraph>,
        resolver: Arc<MockResolver>,
        blobs: Arc<BlobStore>,
        walker: DagWalker,
    }

    impl Harness {
        async fn new(resolver: MockResolver) -> Self {
            Self::with(resolver, Duration::from_secs(5), ErrorPolicy::Abort).await
        }

        async fn with(resolver: MockResolver, timeout: Duration, policy: ErrorPolicy) -> Self {
            let tmp = TempDir::new().unwrap();
            let graph = Arc::new(MemoryGraph::new());
            let resolver = Arc::new(resolver);
            let blobs = Arc::new(BlobStore::open(tmp.path().join("data")).await.unwrap());
            let ctx = CrawlContext {
                graph: graph.clone(),
                resolver: resolver.clone(),
                blobs: blobs.clone(),
                jobs: Arc::new(JobScheduler::new(1)),
            };
            Self {
                _tmp: tmp,
                graph,
                resolver,
                blobs,
                walker: DagWalker::new(ctx, timeout, policy),
            }
        }

        fn child_ids(&self, parent: &Cid) -> Vec<(String, usize)> {
            self.graph
                .children(&parent.to_string())
                .into_iter()
                .map(|e| (e.child, e.index))
                .collect()
        }

        fn kind(&self, cid: &Cid) -> Option<String> {
            self.graph.node(&cid.to_string()).and_then(|n| n.kind)
        }
    }

    #[tokio::test]
    async fn test_raw_root_creates_node_and_file() {
        let h = Harness::new(MockResolver::fixtures()).await;
        let raw = parse(RAW_CID);

        h.walker.download(raw, 0, None).await.unwrap();
        let report = h.walker.jobs().drain().await;
        assert!(report.failures.is_empty());

        let node = h.graph.node(RAW_CID).unwrap();
        assert_eq!(node.codec, "raw");
        assert_eq!(node.kind.as_deref(), Some("raw"));
        assert_eq!(
            h.blobs.read(&raw).await.unwrap(),
            Some(vec![0x00, 0xFF, 0x00, 0xFF])
        );
    }

    #[tokio::test]
    async fn test_repeated_root_is_idempotent() {
        let h = Harness::new(MockResolver::fixtures()).await;
        let raw = parse(RAW_CID);

        h.walker.download(raw, 0, None).await.unwrap();
        h.walker.download(raw, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(h.graph.node_count(), 1);
        assert_eq!(h.graph.edge_count(), 0);
        assert_eq!(h.resolver.fetch_calls(), 1);
        assert_eq!(h.blobs.count().await.unwrap(), 1);

        let stats = h.walker.stats();
        assert_eq!(stats.nodes_created, 1);
        assert_eq!(stats.nodes_existing, 1);
    }

    #[tokio::test]
    async fn test_file_with_duplicate_links() {
        let h = Harness::new(MockResolver::fixtures()).await;
        let file = parse(FILE_CID);

        h.walker.download(file, 0, None).await.unwrap();
        let report = h.walker.jobs().drain().await;
        assert_eq!(report.completed, 2);

        let node = h.graph.node(FILE_CID).unwrap();
        assert_eq!(node.codec, "dag-pb");
        assert_eq!(node.kind.as_deref(), Some("structured"));

        assert_eq!(
            h.child_ids(&file),
            vec![(RAW_CID.to_string(), 0), (OTHER_RAW_CID.to_string(), 1)]
        );
        assert_eq!(h.graph.node_count(), 3);
        assert_eq!(h.resolver.resolve_calls(), 1);
        assert_eq!(h.resolver.fetch_calls(), 2);

        assert_eq!(
            h.blobs.read(&parse(RAW_CID)).await.unwrap(),
            Some(vec![0x00, 0xFF, 0x00, 0xFF])
        );
        assert_eq!(
            h.blobs.read(&parse(OTHER_RAW_CID)).await.unwrap(),
            Some(vec![0xFF, 0xFF, 0xFF, 0xFF])
        );
    }

    #[tokio::test]
    async fn test_directory_with_file_and_raw() {
        let h = Harness::new(MockResolver::fixtures()).await;
        let dir = parse(DIRECTORY_CID);
        let file = parse(FILE_CID);

        h.walker.download(dir, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(
            h.child_ids(&dir),
            vec![
                (FILE_CID.to_string(), 0),
                (YET_ANOTHER_RAW_CID.to_string(), 1)
            ]
        );
        assert_eq!(h.child_ids(&file).len(), 2);
        assert_eq!(h.graph.node_count(), 5);
        assert_eq!(h.graph.edge_count(), 4);
        assert_eq!(h.blobs.count().await.unwrap(), 3);

        let yet = h.graph.node(YET_ANOTHER_RAW_CID).unwrap();
        assert_eq!(yet.codec, "raw");
    }

    #[tokio::test]
    async fn test_edges_follow_depth_first_order() {
        let h = Harness::new(MockResolver::fixtures()).await;

        h.walker.download(parse(DIRECTORY_CID), 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        let order: Vec<(String, String)> = h
            .graph
            .snapshot()
            .edges
            .into_iter()
            .map(|e| (e.parent, e.child))
            .collect();
        assert_eq!(
            order,
            vec![
                (DIRECTORY_CID.to_string(), FILE_CID.to_string()),
                (FILE_CID.to_string(), RAW_CID.to_string()),
                (FILE_CID.to_string(), OTHER_RAW_CID.to_string()),
                (DIRECTORY_CID.to_string(), YET_ANOTHER_RAW_CID.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_rewalking_directory_adds_nothing() {
        let h = Harness::new(MockResolver::fixtures()).await;
        let dir = parse(DIRECTORY_CID);

        h.walker.download(dir, 0, None).await.unwrap();
        h.walker.download(dir, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(h.graph.node_count(), 5);
        assert_eq!(h.graph.edge_count(), 4);
        assert_eq!(h.resolver.resolve_calls(), 2);
        assert_eq!(h.resolver.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_shared_subdag_is_expanded_once() {
        let (root, left, right, leaf) = (dag_cid(1), dag_cid(2), dag_cid(3), raw_cid(9));
        let resolver = MockResolver::new()
            .with_node(root, structured(&[left, right]))
            .with_node(left, structured(&[leaf]))
            .with_node(right, structured(&[leaf]))
            .with_bytes(leaf, b"leaf".to_vec());
        let h = Harness::new(resolver).await;

        h.walker.download(root, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(h.graph.node_count(), 4);
        assert_eq!(h.child_ids(&left), vec![(leaf.to_string(), 0)]);
        assert_eq!(h.child_ids(&right), vec![(leaf.to_string(), 0)]);
        assert_eq!(h.resolver.resolve_calls(), 3);
        assert_eq!(h.resolver.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_stop_siblings() {
        let (parent, slow, sibling) = (dag_cid(1), dag_cid(2), raw_cid(3));
        let resolver = MockResolver::new()
            .with_node(parent, structured(&[slow, sibling]))
            .with_resolve_timeout(slow)
            .with_bytes(sibling, b"ok".to_vec());
        let h = Harness::new(resolver).await;

        h.walker.download(parent, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(
            h.child_ids(&parent),
            vec![(slow.to_string(), 0), (sibling.to_string(), 1)]
        );
        assert!(h.kind(&slow).is_none());
        assert_eq!(h.kind(&sibling).as_deref(), Some("raw"));
        assert_eq!(h.blobs.read(&sibling).await.unwrap(), Some(b"ok".to_vec()));
        assert_eq!(h.walker.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_slow_resolver_hits_time_bound() {
        let root = dag_cid(1);
        let resolver = MockResolver::new()
            .with_node(root, structured(&[raw_cid(2)]))
            .with_delay(Duration::from_secs(30));
        let h = Harness::with(resolver, Duration::from_millis(20), ErrorPolicy::Abort).await;

        h.walker.download(root, 0, None).await.unwrap();

        assert_eq!(h.graph.node_count(), 1);
        assert!(h.kind(&root).is_none());
        assert_eq!(h.walker.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_resolve_error_aborts_by_default() {
        let (parent, broken) = (dag_cid(1), dag_cid(2));
        let resolver = MockResolver::new().with_node(parent, structured(&[broken, raw_cid(3)]));
        let h = Harness::new(resolver).await;

        let result = h.walker.download(parent, 0, None).await;
        assert!(matches!(result, Err(AppError::Resolve { .. })));
        // Traversal stopped before the second child
        assert_eq!(h.graph.children(&parent.to_string()).len(), 1);
    }

    #[tokio::test]
    async fn test_skip_policy_continues_with_siblings() {
        let (parent, broken, sibling) = (dag_cid(1), dag_cid(2), raw_cid(3));
        let resolver = MockResolver::new()
            .with_node(parent, structured(&[broken, sibling]))
            .with_bytes(sibling, b"fine".to_vec());
        let h = Harness::with(resolver, Duration::from_secs(5), ErrorPolicy::Skip).await;

        h.walker.download(parent, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(h.graph.children(&parent.to_string()).len(), 2);
        assert_eq!(h.blobs.read(&sibling).await.unwrap(), Some(b"fine".to_vec()));
        assert_eq!(h.walker.stats().skipped_branches, 1);
    }

    #[tokio::test]
    async fn test_inline_data_is_stored_without_fetch() {
        let file = dag_cid(1);
        let resolver = MockResolver::new().with_node(
            file,
            ResolvedNode {
                descriptor: Some(Descriptor::new("file").with_data(b"inline".to_vec())),
                links: Vec::new(),
            },
        );
        let h = Harness::new(resolver).await;

        h.walker.download(file, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert_eq!(h.kind(&file).as_deref(), Some("file"));
        assert_eq!(h.blobs.read(&file).await.unwrap(), Some(b"inline".to_vec()));
        assert_eq!(h.resolver.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_structured_node_schedules_nothing() {
        let dir = dag_cid(1);
        let resolver = MockResolver::new().with_node(
            dir,
            ResolvedNode {
                descriptor: Some(Descriptor::new("directory")),
                links: Vec::new(),
            },
        );
        let h = Harness::new(resolver).await;

        h.walker.download(dir, 0, None).await.unwrap();
        let report = h.walker.jobs().drain().await;

        assert_eq!(report.completed, 0);
        assert_eq!(h.kind(&dir).as_deref(), Some("directory"));
        assert_eq!(h.walker.stats().leaves_scheduled, 0);
    }

    #[tokio::test]
    async fn test_links_without_descriptor_leave_type_unset() {
        let root = dag_cid(1);
        let leaf = raw_cid(2);
        let resolver = MockResolver::new()
            .with_node(
                root,
                ResolvedNode {
                    descriptor: None,
                    links: vec![Link::new(leaf)],
                },
            )
            .with_bytes(leaf, vec![1]);
        let h = Harness::new(resolver).await;

        h.walker.download(root, 0, None).await.unwrap();
        h.walker.jobs().drain().await;

        assert!(h.kind(&root).is_none());
        assert_eq!(h.graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_leaf_fetch_surfaces_in_report() {
        // Raw CID unknown to the resolver
        let h = Harness::new(MockResolver::new()).await;

        h.walker.download(raw_cid(1), 0, None).await.unwrap();
        let report = h.walker.jobs().drain().await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(h.blobs.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_leaf_timeout_is_not_a_failure() {
        let raw = raw_cid(1);
        let h = Harness::new(MockResolver::new().with_fetch_timeout(raw)).await;

        h.walker.download(raw, 0, None).await.unwrap();
        let report = h.walker.jobs().drain().await;

        assert!(report.failures.is_empty());
        assert_eq!(report.completed, 1);
        assert!(!h.blobs.exists(&raw).await.unwrap());
    }
}
