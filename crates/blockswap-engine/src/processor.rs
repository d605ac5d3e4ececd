//! Serving one wantlist: batching, cancellation, fetching and responding.
//!
//! ```text
//! receive -> decode -> classify batch 0 -> spawn ┐
//!                      classify batch 1 -> spawn ├─> fetch -> push -> complete_batch -> finalize
//!                      ...                       ┘
//! ```
//!
//! Batches are classified in order on the handler task, so cancellations are
//! recorded before any later fetch is dispatched. Fetching then runs on
//! spawned tasks bounded by a process-wide semaphore, and batches may finish
//! in any order. A peer may stop writing after its wantlist and still read
//! every response.

use std::collections::HashSet;
use std::sync::Arc;

use blockswap_backend::BlockSource;
use blockswap_core::Metrics;
use blockswap_core::metrics::names;
use blockswap_protocol::address::storage_key;
use blockswap_protocol::{
    Entry, Message, ProtocolVersion, ResponseElement, WantType, block_response, have_response,
};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::ProcessorConfig;
use crate::connection::Connection;
use crate::context::ProcessingContext;

/// An entry that survived classification, with its storage key.
#[derive(Debug, Clone)]
struct Job {
    key: String,
    entry: Entry,
}

/// Answers wantlists from a [`BlockSource`].
#[derive(Debug)]
pub struct WantlistProcessor {
    config: ProcessorConfig,
    source: Arc<dyn BlockSource>,
    metrics: Arc<dyn Metrics>,
    permits: Arc<Semaphore>,
}

impl WantlistProcessor {
    /// Create a processor. The fetch concurrency limit is shared by every
    /// request this processor serves.
    pub fn new(
        config: ProcessorConfig,
        source: Arc<dyn BlockSource>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.processing_concurrency.max(1)));
        Self {
            config,
            source,
            metrics,
            permits,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Metrics sink shared with the listener.
    #[must_use]
    pub fn metrics(&self) -> &Arc<dyn Metrics> {
        &self.metrics
    }

    /// Serve one request on `connection` and return once it is finalized.
    ///
    /// Unreadable or undecodable input closes the connection without a
    /// response.
    pub async fn handle(&self, connection: Arc<dyn Connection>, version: ProtocolVersion) {
        let payload = match connection.receive().await {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                error!(error = %e, %version, "failed to read inbound message");
                self.metrics.increase(names::INVALID_MESSAGES, 1);
                connection.close().await;
                return;
            }
            None => {
                debug!(%version, "peer closed before sending a wantlist");
                connection.close().await;
                return;
            }
        };

        let message = match Message::decode(payload, version) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, %version, "invalid inbound message");
                self.metrics.increase(names::INVALID_MESSAGES, 1);
                connection.close().await;
                return;
            }
        };
        if message.rejected > 0 {
            warn!(rejected = message.rejected, "dropped entries with invalid CIDs");
            self.metrics
                .increase(names::BLOCKS_ERROR, message.rejected as u64);
        }

        let context = self
            .process(message.wantlist.entries, connection, version)
            .await;
        context.finished().await;
    }

    /// Dispatch `entries` in batches and return the request's context.
    ///
    /// The returned context finalizes by itself once every batch is done or
    /// the peer goes away.
    pub async fn process(
        &self,
        entries: Vec<Entry>,
        connection: Arc<dyn Connection>,
        version: ProtocolVersion,
    ) -> Arc<ProcessingContext> {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = entries.len().div_ceil(batch_size);
        let context = Arc::new(ProcessingContext::new(
            connection,
            version,
            Arc::clone(&self.metrics),
            self.config.max_message_size,
            entries.len(),
            total_batches,
        ));
        debug!(entries = entries.len(), total_batches, %version, "processing wantlist");

        if total_batches == 0 {
            context.finalize().await;
            return context;
        }

        watch_inbound(Arc::clone(&context));

        for (index, batch) in entries.chunks(batch_size).enumerate() {
            let jobs = self.classify(&context, batch);
            let context = Arc::clone(&context);
            let source = Arc::clone(&self.source);
            let metrics = Arc::clone(&self.metrics);
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = permits.acquire_owned().await;
                if context.is_active() && !jobs.is_empty() {
                    debug!(batch = index, jobs = jobs.len(), "fetching batch");
                    join_all(
                        jobs.into_iter()
                            .map(|job| respond(&context, source.as_ref(), metrics.as_ref(), job)),
                    )
                    .await;
                }
                context.complete_batch().await;
            });
        }

        context
    }

    /// Record this batch's cancellations and keep the entries to fetch.
    ///
    /// A cancel wins over a want for the same key anywhere in the batch. A
    /// want clears a cancellation left by an earlier batch.
    fn classify(&self, context: &ProcessingContext, batch: &[Entry]) -> Vec<Job> {
        let mut canceled = HashSet::new();
        for entry in batch.iter().filter(|e| e.cancel) {
            let key = storage_key(&entry.cid);
            context.record_cancel(&key, entry.want_type);
            canceled.insert(key);
        }

        let version = context.version();
        let mut jobs = Vec::with_capacity(batch.len());
        for entry in batch.iter().filter(|e| !e.cancel) {
            let key = storage_key(&entry.cid);
            if canceled.contains(&key) {
                debug!(cid = %entry.cid, "want canceled in the same batch");
                self.metrics.increase(names::BLOCKS_CANCELED, 1);
                continue;
            }
            if entry.want_type == WantType::Have && !version.supports_presences() {
                error!(cid = %entry.cid, %version, "unsupported wantlist entry");
                self.metrics.increase(names::BLOCKS_ERROR, 1);
                continue;
            }
            context.clear_cancel(&key);
            jobs.push(Job {
                key,
                entry: entry.clone(),
            });
        }
        jobs
    }
}

/// Fetch one job and push its response, unless canceled meanwhile.
async fn respond(
    context: &ProcessingContext,
    source: &dyn BlockSource,
    metrics: &dyn Metrics,
    job: Job,
) {
    if !context.is_active() {
        return;
    }
    let version = context.version();
    let element: Option<ResponseElement> = match job.entry.want_type {
        WantType::Block => match source.fetch_data(&job.key).await {
            Ok(data) => block_response(&job.entry, data, version),
            Err(e) => {
                error!(key = %job.key, error = %e, "failed to fetch block data");
                metrics.increase(names::BLOCKS_ERROR, 1);
                return;
            }
        },
        WantType::Have => match source.fetch_info(&job.key).await {
            Ok(info) => have_response(&job.entry, info.is_some(), version),
            Err(e) => {
                error!(key = %job.key, error = %e, "failed to fetch block info");
                metrics.increase(names::BLOCKS_ERROR, 1);
                return;
            }
        },
    };

    let Some(element) = element else {
        return;
    };
    if context.is_canceled(&job.key, job.entry.want_type) {
        debug!(key = %job.key, "dropping result canceled by peer");
        metrics.increase(names::BLOCKS_CANCELED, 1);
        return;
    }
    context.push(element).await;
}

/// Finalize the request early when the inbound stream fails. A clean end
/// of input is a half-close: responses keep flowing until the last batch.
fn watch_inbound(context: Arc<ProcessingContext>) {
    let done = context.done_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = done.cancelled() => return,
                next = context.connection().receive() => match next {
                    Some(Ok(extra)) => {
                        debug!(size = extra.len(), "ignoring additional inbound message");
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "inbound stream failed");
                        context.finalize().await;
                        return;
                    }
                    None => {
                        debug!("peer finished writing, still serving responses");
                        return;
                    }
                },
            }
        }
    });
}
