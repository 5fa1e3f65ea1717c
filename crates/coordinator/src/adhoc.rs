//! Ad-hoc statement execution: the fragment handler that runs on each
//! partition and the coordinator-side entry point that plans, executes,
//! and corrects one statement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use tracing::{debug, info};

use floe_common::{ClusterTopology, DependencyId, Error, Result, TxnContext, TxnIdGenerator};
use floe_engine::{ExecutionEngine, SqlBackend};

use crate::config::Settings;
use crate::correction::correct_replicated_dml;
use crate::dispatch::{Dispatcher, PartitionSite};
use crate::error::CoordinatorError;
use crate::executor::FragmentExecutor;
use crate::fragment::{DependencyPair, FragmentPayload, PlanFragment, AD_HOC_FRAGMENT};
use crate::planner::plan_statement;
use crate::registry::{FragmentHandler, FragmentHandlerRegistry, SiteContext};

/// Runs one ad-hoc fragment on its owning partition.
pub struct AdHocFragmentHandler;

#[async_trait]
impl FragmentHandler for AdHocFragmentHandler {
    async fn run_fragment(
        &self,
        fragment: &PlanFragment,
        inputs: Option<&HashMap<DependencyId, Vec<RecordBatch>>>,
        site: &SiteContext<'_>,
    ) -> Result<DependencyPair> {
        // At most one input dependency feeds an ad-hoc fragment; its tables
        // are stashed into the site engine before the plan runs.
        let input_dep_id = match inputs {
            Some(deps) if !deps.is_empty() => {
                if deps.len() > 1 {
                    return Err(Error::Execution(format!(
                        "ad-hoc fragment expects at most one input dependency, got {}",
                        deps.len()
                    )));
                }
                site.engine.stash_work_unit_dependencies(deps).await;
                deps.keys().next().copied()
            }
            _ => None,
        };

        let table = match &fragment.payload {
            FragmentPayload::DelegatedSql { sql } => {
                let backend = site.backend.ok_or_else(|| {
                    Error::Execution(
                        "delegated fragment reached a site without a SQL backend".to_string(),
                    )
                })?;
                debug!(partition = site.partition_id, sql, "running delegated statement");
                backend.run_dml(sql).await?
            }
            FragmentPayload::PlanWithSql { plan, sql } => {
                debug!(
                    partition = site.partition_id,
                    sql,
                    output = %fragment.output_dep_id,
                    "running plan fragment"
                );
                site.engine
                    .execute_custom_plan_fragment(
                        plan,
                        fragment.output_dep_id,
                        input_dep_id,
                        site.txn,
                    )
                    .await?
            }
        };

        Ok(DependencyPair::new(fragment.output_dep_id, table))
    }
}

/// Coordinator for ad-hoc statements.
///
/// Owns one execution engine per partition plus, optionally, the delegated
/// SQL backend; when a backend is supplied the delegated path is active
/// and every statement runs through it.
pub struct AdHocCoordinator {
    topology: ClusterTopology,
    executor: FragmentExecutor,
    delegated: bool,
    txn_ids: TxnIdGenerator,
    last_committed: AtomicI64,
    undo_tokens: AtomicI64,
}

impl std::fmt::Debug for AdHocCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdHocCoordinator")
            .field("topology", &self.topology)
            .field("delegated", &self.delegated)
            .field("last_committed", &self.last_committed)
            .field("undo_tokens", &self.undo_tokens)
            .finish_non_exhaustive()
    }
}

impl AdHocCoordinator {
    pub fn new(
        topology: ClusterTopology,
        engines: Vec<Arc<dyn ExecutionEngine>>,
        backend: Option<Arc<dyn SqlBackend>>,
    ) -> Result<Self> {
        if engines.len() != topology.partition_count() {
            return Err(Error::Validation(format!(
                "topology has {} partitions but {} engines were supplied",
                topology.partition_count(),
                engines.len()
            )));
        }

        let delegated = backend.is_some();
        let registry = FragmentHandlerRegistry::builder()
            .register(AD_HOC_FRAGMENT, Arc::new(AdHocFragmentHandler))
            .build();
        let sites = engines
            .into_iter()
            .enumerate()
            .map(|(id, engine)| PartitionSite {
                partition_id: id as u32,
                engine,
            })
            .collect();
        let dispatcher = Dispatcher::new(registry, sites, backend)?;

        Ok(Self {
            topology,
            executor: FragmentExecutor::new(dispatcher),
            delegated,
            txn_ids: TxnIdGenerator::new(),
            last_committed: AtomicI64::new(0),
            undo_tokens: AtomicI64::new(0),
        })
    }

    /// Builds a coordinator from loaded settings, checking them against
    /// the supplied collaborators.
    pub fn from_settings(
        settings: &Settings,
        engines: Vec<Arc<dyn ExecutionEngine>>,
        backend: Option<Arc<dyn SqlBackend>>,
    ) -> std::result::Result<Self, CoordinatorError> {
        if settings.delegated_backend && backend.is_none() {
            return Err(CoordinatorError::Internal(
                "settings enable the delegated backend but none was supplied".to_string(),
            ));
        }
        let topology = settings.topology()?;
        Ok(Self::new(topology, engines, backend)?)
    }

    /// Builds a coordinator from the environment-configured settings.
    pub fn from_env(
        engines: Vec<Arc<dyn ExecutionEngine>>,
        backend: Option<Arc<dyn SqlBackend>>,
    ) -> std::result::Result<Self, CoordinatorError> {
        let settings = Settings::new()?;
        Self::from_settings(&settings, engines, backend)
    }

    /// Runs one ad-hoc statement end to end. This is the sole external
    /// entry point: plan the fragment graph, execute it as one batch, and
    /// correct the count when the statement mutated a replicated table.
    pub async fn run_ad_hoc(
        &self,
        aggregator_plan: &str,
        collector_plan: Option<&str>,
        sql: &str,
        replicated_dml: bool,
    ) -> Result<RecordBatch> {
        let txn = self.begin_txn();
        info!(txn_id = txn.txn_id, sql, replicated_dml, "running ad-hoc statement");

        let plan = plan_statement(sql, collector_plan, aggregator_plan, self.delegated)?;
        let result = self
            .executor
            .execute(&plan, plan.final_dep_id, &txn)
            .await?;
        let result =
            correct_replicated_dml(result, replicated_dml, self.topology.partition_count())?;

        self.last_committed.store(txn.txn_id, Ordering::SeqCst);
        Ok(result)
    }

    fn begin_txn(&self) -> TxnContext {
        TxnContext::new(
            self.txn_ids.next_id(),
            self.last_committed.load(Ordering::SeqCst),
            self.undo_tokens.fetch_add(1, Ordering::SeqCst),
        )
    }
}
