//! Per-request processing state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;

use blockswap_core::Metrics;
use blockswap_core::metrics::names;
use blockswap_protocol::{Message, OutgoingMessageBuilder, ProtocolVersion, ResponseElement, WantType};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::connection::Connection;

/// Life cycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Batches are being served.
    Ok,
    /// A write failed; remaining batches do no work.
    Error,
    /// The request was finalized.
    End,
}

impl RequestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Error,
            _ => Self::End,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::End => 2,
        }
    }
}

/// State shared by every task serving one wantlist.
///
/// Owns the response builder, the cancellation record and the batch
/// counters. [`ProcessingContext::finalize`] runs its effects once no matter
/// how many times or from where it is called.
pub struct ProcessingContext {
    connection: Arc<dyn Connection>,
    version: ProtocolVersion,
    metrics: Arc<dyn Metrics>,
    state: AtomicU8,
    builder: Mutex<OutgoingMessageBuilder>,
    canceled: DashMap<String, WantType>,
    entries: usize,
    total_batches: usize,
    completed_batches: AtomicUsize,
    finalized: AtomicBool,
    done: CancellationToken,
    started: Instant,
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("version", &self.version)
            .field("state", &self.state())
            .field("entries", &self.entries)
            .field("total_batches", &self.total_batches)
            .field("completed_batches", &self.completed_batches())
            .finish_non_exhaustive()
    }
}

impl ProcessingContext {
    /// Start a request of `entries` entries split into `total_batches`.
    pub fn new(
        connection: Arc<dyn Connection>,
        version: ProtocolVersion,
        metrics: Arc<dyn Metrics>,
        max_message_size: usize,
        entries: usize,
        total_batches: usize,
    ) -> Self {
        metrics.increase(names::PENDING_ENTRIES, entries as u64);
        Self {
            connection,
            version,
            metrics,
            state: AtomicU8::new(RequestState::Ok.as_u8()),
            builder: Mutex::new(OutgoingMessageBuilder::new(max_message_size)),
            canceled: DashMap::new(),
            entries,
            total_batches,
            completed_batches: AtomicUsize::new(0),
            finalized: AtomicBool::new(false),
            done: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    /// Negotiated protocol revision.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The connection responses are written to.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        RequestState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether batches should still fetch and respond.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == RequestState::Ok
    }

    /// Batches finished so far.
    #[must_use]
    pub fn completed_batches(&self) -> usize {
        self.completed_batches.load(Ordering::Acquire)
    }

    /// Remember that the peer canceled `key`.
    pub fn record_cancel(&self, key: &str, want_type: WantType) {
        self.canceled.insert(key.to_owned(), want_type);
    }

    /// Forget an earlier cancellation because `key` is wanted again.
    pub fn clear_cancel(&self, key: &str) {
        self.canceled.remove(key);
    }

    /// Whether a result for `key` and `want_type` must be withheld.
    #[must_use]
    pub fn is_canceled(&self, key: &str, want_type: WantType) -> bool {
        self.canceled.get(key).is_some_and(|t| *t == want_type)
    }

    /// Append an element to the pending message, sending the pending message
    /// first if the element does not fit.
    pub async fn push(&self, element: ResponseElement) {
        if !self.is_active() {
            return;
        }
        let mut builder = self.builder.lock().await;
        if builder.add(element.clone()) {
            return;
        }
        if builder.is_empty() {
            error!(max_size = builder.max_size(), "response element exceeds max message size");
            self.metrics.increase(names::BLOCKS_ERROR, 1);
            return;
        }

        let message = builder.take();
        self.send(message).await;
        if self.is_active() && !builder.add(element) {
            error!(max_size = builder.max_size(), "response element exceeds max message size");
            self.metrics.increase(names::BLOCKS_ERROR, 1);
        }
    }

    async fn send(&self, message: Message) {
        let blocks = message.blocks.len() as u64;
        let presences = message.block_presences.len() as u64;
        let encoded = message.encode(self.version);
        let size = encoded.len();

        match self.connection.send(encoded).await {
            Ok(()) => {
                debug!(blocks, presences, size, "sent response message");
                self.metrics.increase(names::MESSAGES_SENT, 1);
                self.metrics.increase(names::BLOCKS_SENT, blocks);
                self.metrics.increase(names::PRESENCES_SENT, presences);
            }
            Err(e) => {
                error!(error = %e, "failed to send response message");
                self.set_state(RequestState::Error);
            }
        }
    }

    fn set_state(&self, state: RequestState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Count a finished batch and finalize after the last one, whatever
    /// order batches finish in.
    pub async fn complete_batch(&self) {
        let completed = self.completed_batches.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(completed, total = self.total_batches, "batch completed");
        if completed >= self.total_batches {
            self.finalize().await;
        }
    }

    /// Flush what is pending, release the request's gauges and close the
    /// connection. Later calls do nothing.
    pub async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let mut builder = self.builder.lock().await;
            if self.is_active() && !builder.is_empty() {
                let message = builder.take();
                self.send(message).await;
            }
        }

        self.set_state(RequestState::End);
        self.metrics
            .decrease(names::PENDING_ENTRIES, self.entries as u64);
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record(names::REQUEST_DURATION, elapsed);
        debug!(
            entries = self.entries,
            duration_ms = elapsed,
            "request finalized"
        );

        self.connection.close().await;
        self.done.cancel();
    }

    /// Resolves once the request has been finalized.
    pub async fn finished(&self) {
        self.done.cancelled().await;
    }

    pub(crate) fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }
}
