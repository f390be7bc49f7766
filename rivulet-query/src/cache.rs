//! Semantic BGP cache.
//!
//! Caches the full result set of evaluating a BGP against a graph,
//! keyed by the canonical (sorted patterns, graph IRI) pair, and
//! serves *subset* hits: a cached BGP whose patterns are a subset of a
//! new BGP answers part of it, leaving only the missing patterns to
//! evaluate.
//!
//! # Write protocol
//!
//! Several queries may race to compute the same BGP. Each obtains a
//! writer id, appends mappings to a writer-private staging buffer with
//! [`BgpCache::update`], and installs the buffer with
//! [`BgpCache::commit`]. The first committer wins; the buffers of late
//! committers are discarded silently, and [`BgpCache::get`] futures
//! taken while the computation was in flight resolve at the first
//! commit. Evicting or deleting a key with only staged state resolves
//! those futures to `None` so readers fall back to local evaluation.

use crate::error::Result;
use crate::pipeline::SolutionStream;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use rivulet_core::{Bindings, TriplePattern};
use rustc_hash::FxHashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Identifies one producer in the write protocol.
pub type WriterId = u64;

/// Canonical cache key: sorted triple patterns plus the graph IRI.
///
/// Two BGPs with the same patterns in different order are equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BgpKey {
    patterns: Vec<TriplePattern>,
    graph: Arc<str>,
}

impl BgpKey {
    pub fn new(patterns: &[TriplePattern], graph: Arc<str>) -> Self {
        let mut patterns = patterns.to_vec();
        patterns.sort_by_cached_key(|p| p.to_string());
        Self { patterns, graph }
    }

    pub fn patterns(&self) -> &[TriplePattern] {
        &self.patterns
    }

    pub fn graph(&self) -> &Arc<str> {
        &self.graph
    }
}

#[derive(Clone)]
enum CommitState {
    Pending,
    Committed(Arc<Vec<Bindings>>),
    Discarded,
}

struct CommittedEntry {
    mappings: Arc<Vec<Bindings>>,
    committed_at: Instant,
    last_used: Instant,
    /// Insertion sequence, the final subset-match tie-break.
    seq: u64,
}

struct StagingEntry {
    buffers: FxHashMap<WriterId, Vec<Bindings>>,
    notify: watch::Sender<CommitState>,
}

struct CacheState {
    committed: FxHashMap<BgpKey, CommittedEntry>,
    staging: FxHashMap<BgpKey, StagingEntry>,
    seq: u64,
}

/// Shared, LRU-evicting BGP result cache.
pub struct BgpCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    max_age: Duration,
    next_writer: AtomicU64,
}

impl Default for BgpCache {
    fn default() -> Self {
        Self::new(500, Duration::from_secs(20 * 60))
    }
}

impl BgpCache {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                committed: FxHashMap::default(),
                staging: FxHashMap::default(),
                seq: 0,
            }),
            max_entries: max_entries.max(1),
            max_age,
            next_writer: AtomicU64::new(0),
        }
    }

    /// Allocate a writer id for one BGP computation.
    pub fn new_writer(&self) -> WriterId {
        self.next_writer.fetch_add(1, Ordering::Relaxed)
    }

    /// Append a mapping to the writer's staging buffer. Dropped when a
    /// committed entry for the key already exists.
    pub fn update(&self, key: &BgpKey, mapping: Bindings, writer: WriterId) {
        let mut state = self.lock();
        if state.committed.contains_key(key) {
            return;
        }
        let entry = state.staging.entry(key.clone()).or_insert_with(|| {
            let (notify, _) = watch::channel(CommitState::Pending);
            StagingEntry {
                buffers: FxHashMap::default(),
                notify,
            }
        });
        entry.buffers.entry(writer).or_default().push(mapping);
    }

    /// Install the writer's staging buffer as the canonical entry.
    ///
    /// Only the first committer wins; returns `false` (and discards the
    /// buffer silently) when the key was already committed.
    pub fn commit(&self, key: &BgpKey, writer: WriterId) -> bool {
        let mut state = self.lock();
        if state.committed.contains_key(key) {
            let emptied = state
                .staging
                .get_mut(key)
                .map(|staging| {
                    staging.buffers.remove(&writer);
                    staging.buffers.is_empty()
                })
                .unwrap_or(false);
            if emptied {
                state.staging.remove(key);
            }
            trace!(writer, "cache commit lost the race; staging discarded");
            return false;
        }
        let staging = state.staging.remove(key);
        let buffer = staging
            .as_ref()
            .and_then(|s| s.buffers.get(&writer).cloned())
            .unwrap_or_default();
        let mappings = Arc::new(buffer);
        if let Some(staging) = staging {
            let _ = staging.notify.send(CommitState::Committed(mappings.clone()));
        }
        state.seq += 1;
        let seq = state.seq;
        let now = Instant::now();
        debug!(cardinality = mappings.len(), "cache commit");
        state.committed.insert(
            key.clone(),
            CommittedEntry {
                mappings,
                committed_at: now,
                last_used: now,
                seq,
            },
        );
        self.evict_locked(&mut state);
        true
    }

    /// Discard a writer's staging buffer (lost race, cancellation).
    /// When the last writer of an uncommitted key aborts, pending
    /// `get` futures resolve to `None`.
    pub fn abort(&self, key: &BgpKey, writer: WriterId) {
        let mut state = self.lock();
        let emptied = state
            .staging
            .get_mut(key)
            .map(|staging| {
                staging.buffers.remove(&writer);
                staging.buffers.is_empty()
            })
            .unwrap_or(false);
        if emptied && !state.committed.contains_key(key) {
            if let Some(staging) = state.staging.remove(key) {
                let _ = staging.notify.send(CommitState::Discarded);
            }
        }
    }

    /// The canonical entry, as a future.
    ///
    /// Resolves immediately for a committed key, resolves at the first
    /// commit for a key some writer is computing, and returns `None`
    /// when no writer has touched the key. The future itself resolves
    /// to `None` when the staged computation is discarded before any
    /// commit.
    pub fn get(&self, key: &BgpKey) -> Option<BoxFuture<'static, Option<Arc<Vec<Bindings>>>>> {
        let mut state = self.lock();
        self.sweep_locked(&mut state);
        if let Some(entry) = state.committed.get_mut(key) {
            entry.last_used = Instant::now();
            let mappings = entry.mappings.clone();
            return Some(async move { Some(mappings) }.boxed());
        }
        let staging = state.staging.get(key)?;
        let mut rx = staging.notify.subscribe();
        Some(
            async move {
                loop {
                    let current = rx.borrow_and_update().clone();
                    match current {
                        CommitState::Committed(mappings) => return Some(mappings),
                        CommitState::Discarded => return None,
                        CommitState::Pending => {
                            if rx.changed().await.is_err() {
                                return None;
                            }
                        }
                    }
                }
            }
            .boxed(),
        )
    }

    /// True when a committed entry exists.
    pub fn has(&self, key: &BgpKey) -> bool {
        let mut state = self.lock();
        self.sweep_locked(&mut state);
        state.committed.contains_key(key)
    }

    /// Number of committed entries.
    pub fn count(&self) -> usize {
        let mut state = self.lock();
        self.sweep_locked(&mut state);
        state.committed.len()
    }

    /// Remove a key: committed entry and any staged state; pending
    /// `get` futures fail to `None`.
    pub fn delete(&self, key: &BgpKey) {
        let mut state = self.lock();
        state.committed.remove(key);
        if let Some(staging) = state.staging.remove(key) {
            let _ = staging.notify.send(CommitState::Discarded);
        }
    }

    /// Largest committed BGP whose pattern set is a subset of `key`'s
    /// (same graph), plus the patterns it does not cover.
    ///
    /// Tie-breaks: pattern count, then cardinality, then insertion
    /// order. `(vec![], all patterns)` when nothing matches.
    pub fn find_subset(&self, key: &BgpKey) -> (Vec<TriplePattern>, Vec<TriplePattern>) {
        let mut state = self.lock();
        self.sweep_locked(&mut state);
        // (key, cardinality, insertion seq) of the best candidate so far
        let mut best: Option<(BgpKey, usize, u64)> = None;
        for (candidate, entry) in &state.committed {
            if candidate.graph != key.graph {
                continue;
            }
            if !candidate.patterns.iter().all(|p| key.patterns.contains(p)) {
                continue;
            }
            let better = match &best {
                None => true,
                Some((best_key, best_card, best_seq)) => candidate
                    .patterns
                    .len()
                    .cmp(&best_key.patterns.len())
                    .then(entry.mappings.len().cmp(best_card))
                    .then(best_seq.cmp(&entry.seq))
                    .is_gt(),
            };
            if better {
                best = Some((candidate.clone(), entry.mappings.len(), entry.seq));
            }
        }
        match best {
            None => (Vec::new(), key.patterns.to_vec()),
            Some((subset_key, _, _)) => {
                let subset = subset_key.patterns.clone();
                let missing = key
                    .patterns
                    .iter()
                    .filter(|p| !subset.contains(p))
                    .cloned()
                    .collect();
                if let Some(entry) = state.committed.get_mut(&subset_key) {
                    entry.last_used = Instant::now();
                }
                (subset, missing)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop committed entries older than `max_age`.
    fn sweep_locked(&self, state: &mut CacheState) {
        let max_age = self.max_age;
        state
            .committed
            .retain(|_, entry| entry.committed_at.elapsed() <= max_age);
    }

    /// Enforce the entry bound, least-recently-used first.
    fn evict_locked(&self, state: &mut CacheState) {
        self.sweep_locked(state);
        while state.committed.len() > self.max_entries {
            let victim = state
                .committed
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    debug!(patterns = key.patterns.len(), "cache eviction");
                    state.committed.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Pass-through stream that stages every produced mapping and commits
/// at exhaustion. Dropping it early (cancellation) or hitting an error
/// aborts the staging buffer instead.
pub struct CacheWriteStream {
    inner: SolutionStream,
    cache: Arc<BgpCache>,
    key: BgpKey,
    writer: WriterId,
    settled: bool,
}

impl CacheWriteStream {
    pub fn new(inner: SolutionStream, cache: Arc<BgpCache>, key: BgpKey) -> Self {
        let writer = cache.new_writer();
        Self {
            inner,
            cache,
            key,
            writer,
            settled: false,
        }
    }
}

impl Stream for CacheWriteStream {
    type Item = Result<Bindings>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.settled {
            return self.inner.poll_next_unpin(cx);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(mapping))) => {
                self.cache.update(&self.key, mapping.clone(), self.writer);
                Poll::Ready(Some(Ok(mapping)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.settled = true;
                self.cache.abort(&self.key, self.writer);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.settled = true;
                self.cache.commit(&self.key, self.writer);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CacheWriteStream {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.abort(&self.key, self.writer);
        }
    }
}
