//! # Advisor Sessions, Registry and Pool
//!
//! An `AdvisorSession` is the passive accumulator bound to one connection:
//! it counts statements, attributes cost savings to the virtual indexes the
//! optimizer chose, and flushes ranked results on finalization. It never
//! drives the planner itself; the planner hook calls back into it.
//!
//! The `AdvisorRegistry` owns every session: a key-bound map for active
//! sessions plus a LIFO pool of prepared-but-unbound sessions (created
//! before the client learns its connection id). One mutex guards both.

use crate::error::AdvisorError;
use crate::report::ReportSink;
use idxadv_core::ident::Ident;
use idxadv_core::schema::IndexInfo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Minimum relative cost drop for a statement to contribute.
pub const DEVIATION_THRESHOLD: f64 = 0.01;

/// A virtual index chosen by the optimizer, deep-copied out of the transient
/// shadow schema so it outlives it.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualIndex {
    pub table: Ident,
    pub index: IndexInfo,
}

impl VirtualIndex {
    /// Lowered column names, the identity used for accumulation.
    pub fn column_names(&self) -> Vec<String> {
        self.index
            .columns
            .iter()
            .map(|c| c.name.lowered.clone())
            .collect()
    }
}

/// Accumulator entry: one candidate index and its total benefit.
#[derive(Debug, Clone)]
pub struct CandidateIdx {
    pub index: VirtualIndex,
    pub benefit: f64,
    pub supporting_queries: u64,
}

pub struct AdvisorSession {
    key: Option<String>,
    enabled: bool,
    /// Whether the session variable was acknowledged. Driving a workload
    /// through an unready session is an error.
    ready: bool,
    query_count: u64,
    candidates: HashMap<(String, Vec<String>), CandidateIdx>,
    sink: ReportSink,
}

impl AdvisorSession {
    pub fn new(sink: ReportSink) -> Self {
        Self {
            key: None,
            enabled: false,
            ready: false,
            query_count: 0,
            candidates: HashMap::new(),
            sink,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Turn advisor mode on. Idempotent.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record that the session variable was acknowledged.
    pub fn set_ready(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Record one statement's planning outcome: write the per-query streams,
    /// then attribute the cost saving to every chosen virtual index if the
    /// saving clears the deviation threshold.
    pub fn record_plan_outcome(
        &mut self,
        original_cost: f64,
        virtual_cost: f64,
        chosen: &[VirtualIndex],
    ) -> Result<(), AdvisorError> {
        self.query_count += 1;
        let key = self.key.clone().unwrap_or_default();
        self.sink
            .write_query_outcome(&key, self.query_count, original_cost, virtual_cost, chosen)?;

        let benefit = original_cost - virtual_cost;
        if original_cost <= 0.0 || benefit / original_cost < DEVIATION_THRESHOLD {
            debug!(
                query = self.query_count,
                original_cost, virtual_cost, "no index worth creating"
            );
            return Ok(());
        }

        for index in chosen {
            self.add_candidate(index, benefit)?;
        }
        Ok(())
    }

    fn add_candidate(&mut self, index: &VirtualIndex, benefit: f64) -> Result<(), AdvisorError> {
        let key = (index.table.lowered.clone(), index.column_names());
        match self.candidates.get_mut(&key) {
            Some(existing) => {
                if existing.index.table != index.table
                    || existing.index.column_names() != index.column_names()
                {
                    return Err(AdvisorError::InternalInvariant(format!(
                        "candidate key {key:?} maps to {} and {}",
                        existing.index.index, index.index
                    )));
                }
                existing.benefit += benefit;
                existing.supporting_queries += 1;
            }
            None => {
                self.candidates.insert(
                    key,
                    CandidateIdx {
                        index: index.clone(),
                        benefit,
                        supporting_queries: 1,
                    },
                );
            }
        }
        Ok(())
    }

    /// Ranked candidates: benefit descending, ties broken by table name then
    /// column list for determinism.
    pub fn snapshot(&self) -> Vec<CandidateIdx> {
        let mut ranked: Vec<CandidateIdx> = self.candidates.values().cloned().collect();
        ranked.sort_by(|a, b| {
            b.benefit
                .total_cmp(&a.benefit)
                .then_with(|| a.index.table.lowered.cmp(&b.index.table.lowered))
                .then_with(|| a.index.column_names().cmp(&b.index.column_names()))
        });
        ranked
    }

    /// The ranked candidates as `table: (c1 c2 ...)` entries joined by `,`.
    pub fn recommend_string(&self) -> String {
        self.snapshot()
            .iter()
            .map(|c| {
                let cols: Vec<&str> = c
                    .index
                    .index
                    .columns
                    .iter()
                    .map(|col| col.name.lowered.as_str())
                    .collect();
                format!("{}: ({})", c.index.table.lowered, cols.join(" "))
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Freeze the session and flush the ranked result.
    pub fn finalize(&mut self) -> Result<(), AdvisorError> {
        let ranked = self.snapshot();
        let key = self.key.clone().unwrap_or_default();
        self.sink.write_final_result(&key, &ranked)?;
        self.enabled = false;
        info!(
            key = %key,
            candidates = ranked.len(),
            queries = self.query_count,
            "advisor session finalized"
        );
        Ok(())
    }
}

/// Owner of all advisor sessions. Passed explicitly into the planner hook
/// rather than living in process-global state.
pub struct AdvisorRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    sessions: HashMap<String, Arc<Mutex<AdvisorSession>>>,
    pool: Vec<AdvisorSession>,
}

impl AdvisorRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                pool: Vec::new(),
            }),
        }
    }

    /// Push a prepared but unbound session onto the pool.
    pub fn prepare(&self, session: AdvisorSession) {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .pool
            .push(session);
    }

    /// Bind a pooled session to `key`. Binding an already-bound key is an
    /// error; an empty pool is an error.
    pub fn register(&self, key: &str) -> Result<Arc<Mutex<AdvisorSession>>, AdvisorError> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if inner.sessions.contains_key(key) {
            return Err(AdvisorError::AlreadyRegistered(key.to_string()));
        }
        // LIFO: most recently prepared session first.
        let mut session = inner.pool.pop().ok_or(AdvisorError::PoolExhausted)?;
        session.key = Some(key.to_string());
        session.enable();
        let session = Arc::new(Mutex::new(session));
        inner.sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// The session bound to `key`, binding a pooled one on first use.
    pub fn get_or_register(
        &self,
        key: &str,
    ) -> Result<Arc<Mutex<AdvisorSession>>, AdvisorError> {
        if let Some(session) = self
            .inner
            .lock()
            .expect("registry lock poisoned")
            .sessions
            .get(key)
        {
            return Ok(session.clone());
        }
        self.register(key)
    }

    /// Mark the session bound to `key` ready, binding a pooled one first if
    /// needed. Called once the session variable is acknowledged.
    pub fn mark_ready(&self, key: &str) -> Result<(), AdvisorError> {
        let session = self.get_or_register(key)?;
        session.lock().expect("session lock poisoned").set_ready();
        Ok(())
    }

    pub fn session(&self, key: &str) -> Option<Arc<Mutex<AdvisorSession>>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .sessions
            .get(key)
            .cloned()
    }

    /// Finalize every bound session, flushing ranked results.
    pub fn finalize_all(&self) -> Result<(), AdvisorError> {
        let sessions: Vec<_> = self
            .inner
            .lock()
            .expect("registry lock poisoned")
            .sessions
            .values()
            .cloned()
            .collect();
        for session in sessions {
            session.lock().expect("session lock poisoned").finalize()?;
        }
        Ok(())
    }
}

impl Default for AdvisorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
