//! In-process distribution layer.
//!
//! Fans fragments out to partition sites and enforces the per-dependency
//! producer/consumer barrier: a fragment with input dependencies runs only
//! after every producer of those dependencies has completed, and it is
//! handed the complete mapping from input id to the tables produced for
//! it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use futures::future::try_join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use floe_common::{DependencyId, Error, Result, TxnContext};
use floe_engine::{ExecutionEngine, SqlBackend};

use crate::fragment::{DependencyPair, FragmentPlan, FragmentScope, PlanFragment};
use crate::registry::{FragmentHandlerRegistry, SiteContext};

/// One partition's execution site.
pub struct PartitionSite {
    pub partition_id: u32,
    pub engine: Arc<dyn ExecutionEngine>,
}

/// Owns the partition sites and routes fragments to them. The first site
/// is the coordinator's own partition; the delegated backend, when
/// present, is attached there.
pub struct Dispatcher {
    registry: FragmentHandlerRegistry,
    sites: Vec<PartitionSite>,
    backend: Option<Arc<dyn SqlBackend>>,
}

impl Dispatcher {
    pub fn new(
        registry: FragmentHandlerRegistry,
        sites: Vec<PartitionSite>,
        backend: Option<Arc<dyn SqlBackend>>,
    ) -> Result<Self> {
        if sites.is_empty() {
            return Err(Error::Validation(
                "dispatcher needs at least one partition site".to_string(),
            ));
        }
        Ok(Self {
            registry,
            sites,
            backend,
        })
    }

    pub fn partition_count(&self) -> usize {
        self.sites.len()
    }

    /// Runs one fragment batch to completion and returns every table
    /// published, grouped by output dependency id.
    pub async fn dispatch(
        &self,
        plan: &FragmentPlan,
        txn: &TxnContext,
    ) -> Result<HashMap<DependencyId, Vec<RecordBatch>>> {
        let batch_id = Uuid::new_v4();
        debug!(
            %batch_id,
            fragments = plan.fragments.len(),
            txn_id = txn.txn_id,
            "dispatching fragment batch"
        );

        let mut pending: Vec<&PlanFragment> = plan.fragments.iter().collect();
        let mut completed: HashSet<DependencyId> = HashSet::new();
        let mut results: HashMap<DependencyId, Vec<RecordBatch>> = HashMap::new();

        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|f| f.is_ready(&completed));

            if ready.is_empty() {
                warn!(%batch_id, remaining = blocked.len(), "fragment batch cannot make progress");
                return Err(Error::Execution(
                    "fragment batch has unsatisfiable input dependencies".to_string(),
                ));
            }
            pending = blocked;

            let outcomes = try_join_all(
                ready
                    .iter()
                    .map(|fragment| self.run_one(fragment, &results, txn)),
            )
            .await?;

            for (fragment, pairs) in ready.iter().zip(outcomes) {
                completed.insert(fragment.output_dep_id);
                for pair in pairs {
                    let published = results.entry(pair.dep_id).or_default();
                    if fragment.suppress_duplicates && !published.is_empty() {
                        debug!(%batch_id, dep = %pair.dep_id, "suppressed duplicate result");
                        continue;
                    }
                    published.push(pair.table);
                }
            }
        }

        Ok(results)
    }

    async fn run_one(
        &self,
        fragment: &PlanFragment,
        results: &HashMap<DependencyId, Vec<RecordBatch>>,
        txn: &TxnContext,
    ) -> Result<Vec<DependencyPair>> {
        let handler = self.registry.get(fragment.handler)?;

        // Consumer side: gather every table produced for the declared
        // inputs before the fragment may run.
        let inputs: Option<HashMap<DependencyId, Vec<RecordBatch>>> = if fragment.is_dependent() {
            let mut gathered = HashMap::new();
            for dep in &fragment.input_dep_ids {
                let tables = results
                    .get(dep)
                    .ok_or(Error::MissingDependency(*dep))?;
                gathered.insert(*dep, tables.clone());
            }
            Some(gathered)
        } else {
            None
        };
        let inputs = inputs.as_ref();

        match fragment.scope {
            FragmentScope::AllPartitions => {
                let runs = self.sites.iter().map(|site| async move {
                    let site_ctx = SiteContext {
                        partition_id: site.partition_id,
                        engine: site.engine.as_ref(),
                        backend: None,
                        txn,
                    };
                    handler.run_fragment(fragment, inputs, &site_ctx).await
                });
                try_join_all(runs).await
            }
            FragmentScope::SinglePartition => {
                let site = &self.sites[0];
                let site_ctx = SiteContext {
                    partition_id: site.partition_id,
                    engine: site.engine.as_ref(),
                    backend: self.backend.as_deref(),
                    txn,
                };
                Ok(vec![handler.run_fragment(fragment, inputs, &site_ctx).await?])
            }
        }
    }
}
