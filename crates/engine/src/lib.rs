//! Engine crate
//!
//! Trait seams for the collaborators the coordinator drives: the
//! per-partition plan-fragment execution engine and the delegated SQL
//! backend, plus an in-memory backend implementation of the latter.

pub mod memory;
pub mod testing;

use std::collections::HashMap;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use floe_common::{DependencyId, Result, TxnContext};

pub use memory::{Cell, ColumnType, MemoryBackend};

/// Per-partition execution engine that runs precompiled plan fragments
/// against the partition's data.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Makes the result tables produced for each input dependency available
    /// to the next plan fragment, keyed by dependency id.
    async fn stash_work_unit_dependencies(
        &self,
        deps: &HashMap<DependencyId, Vec<RecordBatch>>,
    );

    /// Runs one serialized plan fragment and returns its result table.
    /// The transaction fields pass through unchanged.
    async fn execute_custom_plan_fragment(
        &self,
        plan: &str,
        output_dep_id: DependencyId,
        input_dep_id: Option<DependencyId>,
        txn: &TxnContext,
    ) -> Result<RecordBatch>;
}

/// Alternate SQL backend executing raw statements instead of plan
/// fragments. Runs at one logical point rather than per partition.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn run_dml(&self, sql: &str) -> Result<RecordBatch>;
}
