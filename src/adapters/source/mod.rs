//! Source reader abstraction
//!
//! A source hands out observations as a lazy, finite stream, oldest first.
//! Readers fetch one page at a time and never hold more than a page in
//! memory. A failed page fetch ends the stream with a
//! [`crate::domain::EngineError::SourceUnavailable`]; a single malformed item
//! is yielded as a per-item error and the stream carries on.

pub mod factory;

pub use factory::create_source_connector;

use crate::domain::{Result, SourceCursor, SourceObservation, SourcePersonId};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;

/// Stream of observations produced by a source
pub type ObservationStream<'a> = BoxStream<'a, Result<SourceObservation>>;

/// Read-only access to the source EMR's observations
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Test the source connection
    async fn test_connection(&self) -> Result<()>;

    /// Non-voided observations strictly after `since` (all when `None`),
    /// oldest first, fetched `page_size` at a time.
    fn observations(
        &self,
        since: Option<SourceCursor>,
        page_size: usize,
    ) -> ObservationStream<'_>;

    /// Every non-voided observation of one person, oldest first.
    ///
    /// The default walks the whole history and filters; readers that can
    /// filter at the source override it.
    fn person_observations(
        &self,
        person: &SourcePersonId,
        page_size: usize,
    ) -> ObservationStream<'_> {
        let person = person.clone();
        self.observations(None, page_size)
            .try_filter(move |observation| future::ready(observation.person.id == person))
            .boxed()
    }

    /// Human-readable name of the source for logs
    fn describe(&self) -> String;
}

/// Opens a fresh source reader
///
/// Every run connects anew, so a connection that degraded during one run is
/// never reused by the next.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ObservationSource>>;
}

/// Builds an observation stream from a page-fetching closure.
///
/// `fetch` receives the paging state and returns the next page together with
/// the state for the following call, or `None` when the source is exhausted.
pub fn paged<'a, S, F, Fut>(init: S, fetch: F) -> ObservationStream<'a>
where
    S: Send + 'a,
    F: FnMut(S) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Option<(Vec<Result<SourceObservation>>, S)>>> + Send + 'a,
{
    stream::try_unfold(init, fetch)
        .map_ok(stream::iter)
        .try_flatten()
        .boxed()
}
