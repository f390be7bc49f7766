//! Execution context for query stages.
//!
//! One `ExecutionContext` is derived per `build()` call and shared by
//! every stage of that plan. Graph-scope changes (GRAPH clauses) clone
//! the context with a different default-graph selection; the hint map
//! stays shared across clones so hints discovered during BGP
//! preprocessing are visible query-wide.

use crate::cache::BgpCache;
use crate::options::EngineOptions;
use rivulet_core::{Dataset, Term};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

/// Hint predicate IRI → hint value.
pub type HintMap = FxHashMap<Arc<str>, Term>;

/// Which graph(s) BGPs currently evaluate against.
#[derive(Debug, Clone)]
pub enum GraphSelection {
    /// The dataset's default graph.
    Default,
    /// FROM graphs; one entry means that named graph, several mean
    /// their union.
    Iris(Vec<Arc<str>>),
    /// A GRAPH variable, resolved per input mapping by the BGP stage.
    Variable(Arc<str>),
}

/// Per-query state shared by all stages of one plan.
pub struct ExecutionContext {
    dataset: Arc<Dataset>,
    /// Active default-graph selection for BGP evaluation.
    pub default_graphs: GraphSelection,
    /// Active named graphs (FROM NAMED); empty means all of the
    /// dataset's named graphs.
    pub named_graphs: Vec<Arc<str>>,
    /// Prefix declarations of the query.
    pub prefixes: FxHashMap<Arc<str>, Arc<str>>,
    /// BGP cache, when enabled for this query.
    pub cache: Option<Arc<BgpCache>>,
    /// The query carries LIMIT or OFFSET; disables cache read *and*
    /// write, since a cached result must be complete.
    pub has_limit_offset: bool,
    pub options: EngineOptions,
    hints: Arc<Mutex<HintMap>>,
}

impl ExecutionContext {
    pub fn new(dataset: Arc<Dataset>, options: EngineOptions) -> Self {
        Self {
            dataset,
            default_graphs: GraphSelection::Default,
            named_graphs: Vec::new(),
            prefixes: FxHashMap::default(),
            cache: None,
            has_limit_offset: false,
            options,
            hints: Arc::new(Mutex::new(HintMap::default())),
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Clone this context with a different default-graph selection.
    /// Hint state stays shared.
    pub fn with_default_graphs(&self, selection: GraphSelection) -> Self {
        Self {
            dataset: self.dataset.clone(),
            default_graphs: selection,
            named_graphs: self.named_graphs.clone(),
            prefixes: self.prefixes.clone(),
            cache: self.cache.clone(),
            has_limit_offset: self.has_limit_offset,
            options: self.options.clone(),
            hints: self.hints.clone(),
        }
    }

    /// Record a hint discovered in a magic triple.
    pub fn add_hint(&self, predicate: Arc<str>, value: Term) {
        self.hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(predicate, value);
    }

    /// Snapshot of the hint map.
    pub fn hints(&self) -> HintMap {
        self.hints.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Look up one hint.
    pub fn hint(&self, predicate: &str) -> Option<Term> {
        self.hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(predicate)
            .cloned()
    }

    /// Named graphs GRAPH ?g ranges over: FROM NAMED when present,
    /// otherwise every named graph of the dataset.
    pub fn visible_named_graphs(&self) -> Vec<Arc<str>> {
        if self.named_graphs.is_empty() {
            self.dataset.named_graph_iris()
        } else {
            self.named_graphs.clone()
        }
    }
}
