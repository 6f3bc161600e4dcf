//! Asynchronous cache maintenance.
//!
//! Request handlers never write to the cache inline; they enqueue a
//! job here and move on. The worker applies each job exactly once,
//! logs failures, and never retries. A lost job costs at most one
//! cached read or a batch of pending views.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::{PostsWriteRepo, RepoError};
use crate::cache::{CacheError, CacheStore, PostSnapshot, SnapshotError, post_key, view_key};

const METRIC_VIEW_FLUSH: &str = "foglio_view_flush_total";
const METRIC_JOB_FAILURE: &str = "foglio_cache_job_failure_total";

/// A single unit of cache maintenance.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheJob {
    /// Write a fresh hash for a post that missed the cache and count
    /// the view that triggered the miss.
    PopulatePost { snapshot: PostSnapshot },
    /// Count one view against a cached post.
    RecordView { post_id: Uuid },
    /// Drop the cached hash after an update. The pending view counter
    /// survives so buffered views still reach the database.
    InvalidatePost { post_id: Uuid },
    /// Drop the cached hash and the view counter after a delete.
    PurgePost { post_id: Uuid },
}

impl CacheJob {
    fn kind(&self) -> &'static str {
        match self {
            Self::PopulatePost { .. } => "populate_post",
            Self::RecordView { .. } => "record_view",
            Self::InvalidatePost { .. } => "invalidate_post",
            Self::PurgePost { .. } => "purge_post",
        }
    }

    fn post_id(&self) -> Uuid {
        match self {
            Self::PopulatePost { snapshot } => snapshot.id,
            Self::RecordView { post_id }
            | Self::InvalidatePost { post_id }
            | Self::PurgePost { post_id } => *post_id,
        }
    }
}

#[derive(Debug, Error)]
enum JobError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Cloneable submission handle shared by the services.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<CacheJob>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CacheJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a job without waiting on it. A closed channel drops the
    /// job and logs it.
    pub fn submit(&self, job: CacheJob) {
        debug!(job = job.kind(), post_id = %job.post_id(), "cache job enqueued");
        if self.tx.send(job).is_err() {
            warn!("cache worker is gone, job dropped");
        }
    }
}

/// Applies cache jobs one at a time in submission order.
pub struct CacheWorker {
    rx: mpsc::UnboundedReceiver<CacheJob>,
    store: Arc<dyn CacheStore>,
    posts: Arc<dyn PostsWriteRepo>,
    ttl_secs: u64,
    flush_threshold: i64,
}

impl CacheWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<CacheJob>,
        store: Arc<dyn CacheStore>,
        posts: Arc<dyn PostsWriteRepo>,
        ttl_secs: u64,
        flush_threshold: i64,
    ) -> Self {
        Self {
            rx,
            store,
            posts,
            ttl_secs,
            flush_threshold,
        }
    }

    /// Process jobs until every submission handle is gone.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            self.process(job).await;
        }
        info!("cache worker stopped");
    }

    /// Process everything queued so far without blocking.
    ///
    /// Lets tests run the worker to quiescence deterministically.
    pub async fn drain(&mut self) {
        while let Ok(job) = self.rx.try_recv() {
            self.process(job).await;
        }
    }

    async fn process(&self, job: CacheJob) {
        let kind = job.kind();
        let post_id = job.post_id();
        if let Err(err) = self.handle(job).await {
            counter!(METRIC_JOB_FAILURE).increment(1);
            warn!(job = kind, post_id = %post_id, error = %err, "cache job failed");
        }
    }

    async fn handle(&self, job: CacheJob) -> Result<(), JobError> {
        match job {
            CacheJob::PopulatePost { snapshot } => self.populate(snapshot).await,
            CacheJob::RecordView { post_id } => self.record_view(post_id).await,
            CacheJob::InvalidatePost { post_id } => {
                self.store.delete(&[post_key(post_id)]).await?;
                Ok(())
            }
            CacheJob::PurgePost { post_id } => {
                self.store
                    .delete(&[post_key(post_id), view_key(post_id)])
                    .await?;
                Ok(())
            }
        }
    }

    async fn populate(&self, snapshot: PostSnapshot) -> Result<(), JobError> {
        let id = snapshot.id;
        let fields = snapshot.to_fields()?;
        self.store
            .hash_set_all(&post_key(id), &fields, self.ttl_secs)
            .await?;
        self.store
            .counter_set(&view_key(id), 0, self.ttl_secs)
            .await?;
        // The read that missed is still a view.
        self.store.counter_incr(&view_key(id)).await?;
        Ok(())
    }

    async fn record_view(&self, post_id: Uuid) -> Result<(), JobError> {
        let pending = self.store.counter_incr(&view_key(post_id)).await?;
        if pending <= 0 || pending % self.flush_threshold != 0 {
            return Ok(());
        }

        // Persist first; a failed flush leaves the counter intact so
        // the views are not silently lost.
        self.posts
            .add_view_count(post_id, self.flush_threshold)
            .await?;
        self.store
            .counter_set(&view_key(post_id), 0, self.ttl_secs)
            .await?;
        self.store
            .hash_incr(&post_key(post_id), "view_count", self.flush_threshold)
            .await?;

        counter!(METRIC_VIEW_FLUSH).increment(1);
        info!(post_id = %post_id, amount = self.flush_threshold, "flushed pending views");
        Ok(())
    }
}
