//! Lazy solution pipelines.
//!
//! Stages consume and produce [`SolutionStream`]s: boxed streams of
//! fallible solution mappings, pulled one element at a time. This
//! module is a pure dispatch surface of free functions; it keeps no
//! state and stages receive their streams explicitly.
//!
//! Errors travel as stream items; the first fatal error reaches the
//! sink, which stops pulling. Dropping a stream cancels the upstream
//! work it owns.

use crate::error::Result;
use futures::future::{self, Future};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use rivulet_core::Bindings;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A lazy sequence of solution mappings.
pub type SolutionStream = BoxStream<'static, Result<Bindings>>;

/// The empty sequence.
pub fn empty() -> SolutionStream {
    stream::empty().boxed()
}

/// A single-mapping sequence.
pub fn of(mapping: Bindings) -> SolutionStream {
    stream::once(future::ready(Ok(mapping))).boxed()
}

/// A sequence over already-materialized mappings.
pub fn from_iter<I>(mappings: I) -> SolutionStream
where
    I: IntoIterator<Item = Bindings>,
    I::IntoIter: Send + 'static,
{
    stream::iter(mappings.into_iter().map(Ok)).boxed()
}

/// A single-error sequence.
pub fn once_err(error: crate::error::QueryError) -> SolutionStream {
    stream::once(future::ready(Err(error))).boxed()
}

/// Defer to a stream produced asynchronously; a failed producer
/// becomes a one-error stream.
pub fn from_async<F>(producer: F) -> SolutionStream
where
    F: Future<Output = Result<SolutionStream>> + Send + 'static,
{
    stream::once(producer)
        .flat_map(|built| match built {
            Ok(inner) => inner,
            Err(e) => once_err(e),
        })
        .boxed()
}

/// Transform each mapping; errors pass through.
pub fn map<F>(source: SolutionStream, mut f: F) -> SolutionStream
where
    F: FnMut(Bindings) -> Bindings + Send + 'static,
{
    source.map(move |item| item.map(&mut f)).boxed()
}

/// Transform each mapping, dropping `None` results; errors pass
/// through.
pub fn filter_map<F>(source: SolutionStream, mut f: F) -> SolutionStream
where
    F: FnMut(Bindings) -> Option<Bindings> + Send + 'static,
{
    source
        .filter_map(move |item| {
            future::ready(match item {
                Ok(mapping) => f(mapping).map(Ok),
                Err(e) => Some(Err(e)),
            })
        })
        .boxed()
}

/// Expand each mapping into a sub-sequence; errors pass through.
pub fn flat_map<F>(source: SolutionStream, mut f: F) -> SolutionStream
where
    F: FnMut(Bindings) -> SolutionStream + Send + 'static,
{
    source
        .flat_map(move |item| match item {
            Ok(mapping) => f(mapping),
            Err(e) => once_err(e),
        })
        .boxed()
}

/// Interleave several sequences. Per-source order is preserved;
/// elements across sources interleave as they become ready.
pub fn merge(mut sources: Vec<SolutionStream>) -> SolutionStream {
    match sources.len() {
        0 => empty(),
        1 => sources.remove(0),
        _ => stream::select_all(sources).boxed(),
    }
}

/// Run the sequences one after another.
pub fn concat(sources: Vec<SolutionStream>) -> SolutionStream {
    stream::iter(sources).flatten().boxed()
}

/// Drop the first `n` mappings.
pub fn skip(source: SolutionStream, n: usize) -> SolutionStream {
    source.skip(n).boxed()
}

/// Stop after `n` mappings.
pub fn limit(source: SolutionStream, n: usize) -> SolutionStream {
    source.take(n).boxed()
}

/// Drain a sequence into a vector, stopping at the first error.
pub async fn collect(mut source: SolutionStream) -> Result<Vec<Bindings>> {
    let mut out = Vec::new();
    while let Some(item) = source.next().await {
        out.push(item?);
    }
    Ok(out)
}

/// Drive a sequence to exhaustion, calling `f` per mapping; stops at
/// the first error.
pub async fn for_each<F>(mut source: SolutionStream, mut f: F) -> Result<()>
where
    F: FnMut(Bindings),
{
    while let Some(item) = source.next().await {
        f(item?);
    }
    Ok(())
}

/// Yield the inner sequence, or the fallback mapping when the inner
/// sequence finishes without producing anything. The OPTIONAL leftover
/// rule.
pub fn or_else_value(source: SolutionStream, fallback: Bindings) -> SolutionStream {
    FallbackStream {
        inner: source,
        fallback: Some(fallback),
        yielded: false,
    }
    .boxed()
}

struct FallbackStream {
    inner: SolutionStream,
    fallback: Option<Bindings>,
    yielded: bool,
}

impl Stream for FallbackStream {
    type Item = Result<Bindings>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(item)) => {
                self.yielded = true;
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                if self.yielded {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(self.fallback.take().map(Ok))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
