//! Fragment executor: submits one statement's fragment batch and extracts
//! the final result table.

use std::collections::HashSet;

use arrow::record_batch::RecordBatch;
use tracing::{debug, warn};

use floe_common::{DependencyId, Error, Result, TxnContext};

use crate::dispatch::Dispatcher;
use crate::fragment::FragmentPlan;

pub struct FragmentExecutor {
    dispatcher: Dispatcher,
}

impl FragmentExecutor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs a fragment batch as one unit tied to the given transaction and
    /// returns the table published under `final_dep_id`.
    pub async fn execute(
        &self,
        plan: &FragmentPlan,
        final_dep_id: DependencyId,
        txn: &TxnContext,
    ) -> Result<RecordBatch> {
        // A dependency id may have at most one producer per batch; a
        // violation is a planner bug and aborts before any dispatch.
        let mut producers = HashSet::new();
        for fragment in &plan.fragments {
            if !producers.insert(fragment.output_dep_id) {
                return Err(Error::DependencyConflict(fragment.output_dep_id));
            }
        }

        let mut results = self.dispatcher.dispatch(plan, txn).await?;

        let mut tables = results
            .remove(&final_dep_id)
            .filter(|tables| !tables.is_empty())
            .ok_or(Error::MissingDependency(final_dep_id))?;

        if tables.len() > 1 {
            warn!(
                dep = %final_dep_id,
                count = tables.len(),
                "final dependency has several results, returning the first"
            );
        }
        debug!(dep = %final_dep_id, "fragment batch completed");

        Ok(tables.swap_remove(0))
    }
}
