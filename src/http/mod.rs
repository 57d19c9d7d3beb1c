//! Ordered serving of pipelined HTTP requests.
//!
//! Requests arrive on one connection already decoded. Handlers for several of
//! them may run at once, but responses must leave in the order the requests
//! arrived: a slow first request holds back the response to a fast second
//! one. [`PipelineSequencer`] does that bookkeeping and [`serve_pipelined`]
//! drives handlers with a bounded number of requests outstanding.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use ::http::{Request, Response};
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{ConfigError, PipelineConfig};

/// Failures of [`serve_pipelined`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The receiving end of the response channel was dropped.
    #[error("response channel closed")]
    ResponseChannelClosed,
    /// The configured in-flight limit is unusable.
    #[error("invalid pipeline limit: {0}")]
    InvalidLimit(#[from] ConfigError),
}

/// Produces the response to one decoded request.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes>;
}

/// Releases items strictly in sequence order.
///
/// Items completed out of order are parked until every earlier item has
/// been released.
#[derive(Debug)]
pub struct PipelineSequencer<T> {
    next: u64,
    parked: BTreeMap<u64, T>,
}

impl<T> Default for PipelineSequencer<T> {
    fn default() -> Self {
        Self {
            next: 0,
            parked: BTreeMap::new(),
        }
    }
}

impl<T> PipelineSequencer<T> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Sequence number of the next item to be released.
    #[must_use]
    pub fn next_sequence(&self) -> u64 { self.next }

    /// Number of completed items waiting on an earlier one.
    #[must_use]
    pub fn parked(&self) -> usize { self.parked.len() }

    /// Record completion of item `seq` and return every item now releasable,
    /// in order.
    ///
    /// Sequence numbers already released are ignored.
    pub fn complete(&mut self, seq: u64, item: T) -> Vec<T> {
        if seq < self.next {
            warn!("ignoring completion for released sequence: seq={seq}, next={}", self.next);
            return Vec::new();
        }
        self.parked.insert(seq, item);
        let mut ready = Vec::new();
        while let Some(item) = self.parked.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }
}

type Handled = BoxFuture<'static, (u64, Response<Bytes>)>;

/// Serve every request from `requests` with `handler`, sending responses to
/// `responses` in request order.
///
/// At most `config.max_in_flight` requests are outstanding at once, counting
/// both running handlers and responses held back behind an earlier request.
/// Returns the number of requests served once the stream ends and every
/// response has been sent.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidLimit`] for a zero limit and
/// [`PipelineError::ResponseChannelClosed`] if the response receiver is
/// dropped.
pub async fn serve_pipelined<S, H>(
    requests: S,
    handler: Arc<H>,
    responses: mpsc::Sender<Response<Bytes>>,
    config: &PipelineConfig,
) -> Result<u64, PipelineError>
where
    S: Stream<Item = Request<Bytes>>,
    H: RequestHandler + ?Sized,
{
    config.validate()?;
    let mut requests = std::pin::pin!(requests);
    let mut in_flight: FuturesUnordered<Handled> = FuturesUnordered::new();
    let mut sequencer = PipelineSequencer::new();
    let mut received = 0u64;
    let mut exhausted = false;

    loop {
        let has_capacity = in_flight.len() + sequencer.parked() < config.max_in_flight;
        tokio::select! {
            biased;

            Some((seq, response)) = in_flight.next(), if !in_flight.is_empty() => {
                debug!("pipelined request handled: seq={seq}, status={}", response.status());
                for response in sequencer.complete(seq, response) {
                    responses
                        .send(response)
                        .await
                        .map_err(|_| PipelineError::ResponseChannelClosed)?;
                }
            }
            request = requests.next(), if !exhausted && has_capacity => match request {
                Some(request) => {
                    let seq = received;
                    received += 1;
                    debug!(
                        "pipelined request accepted: seq={seq}, method={}, uri={}",
                        request.method(),
                        request.uri()
                    );
                    let handler = Arc::clone(&handler);
                    in_flight.push(async move { (seq, handler.handle(request).await) }.boxed());
                }
                None => exhausted = true,
            },
            else => break,
        }
    }
    Ok(received)
}
