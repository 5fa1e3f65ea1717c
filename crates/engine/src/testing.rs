//! Test doubles for the engine seams.

use std::collections::HashMap;
use std::sync::Mutex;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use floe_common::table::{modified_count_table, sum_scalar_longs};
use floe_common::{DependencyId, Error, Result, TxnContext};

use crate::ExecutionEngine;

/// Scripted execution engine.
///
/// Collector-style plans are served from a canned plan-to-count map;
/// a plan arriving with an input dependency is treated as an aggregation
/// and answered by summing the scalar cells of the tables stashed for that
/// dependency. Every stash and execution is recorded so tests can assert
/// ordering and routing.
#[derive(Default)]
pub struct MockEngine {
    plan_results: HashMap<String, i64>,
    stashed: Mutex<Vec<HashMap<DependencyId, Vec<RecordBatch>>>>,
    executed: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the count a given plan reports on this partition.
    pub fn with_plan_result(mut self, plan: &str, count: i64) -> Self {
        self.plan_results.insert(plan.to_string(), count);
        self
    }

    /// Every dependency mapping stashed so far, in call order.
    pub fn stashed_dependencies(&self) -> Vec<HashMap<DependencyId, Vec<RecordBatch>>> {
        self.stashed.lock().unwrap().clone()
    }

    /// Every plan executed so far, in call order.
    pub fn executed_plans(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn stash_work_unit_dependencies(
        &self,
        deps: &HashMap<DependencyId, Vec<RecordBatch>>,
    ) {
        self.stashed.lock().unwrap().push(deps.clone());
    }

    async fn execute_custom_plan_fragment(
        &self,
        plan: &str,
        _output_dep_id: DependencyId,
        input_dep_id: Option<DependencyId>,
        _txn: &TxnContext,
    ) -> Result<RecordBatch> {
        self.executed.lock().unwrap().push(plan.to_string());

        if let Some(dep) = input_dep_id {
            let stashed = self.stashed.lock().unwrap();
            let latest = stashed.last().ok_or_else(|| {
                Error::Execution(format!(
                    "plan {plan} consumes dependency {dep} but nothing was stashed"
                ))
            })?;
            let tables = latest.get(&dep).ok_or_else(|| {
                Error::Execution(format!("no stashed tables for dependency {dep}"))
            })?;
            return modified_count_table(sum_scalar_longs(tables.iter())?);
        }

        let count = self.plan_results.get(plan).ok_or_else(|| {
            Error::Execution(format!("no scripted result for plan {plan}"))
        })?;
        modified_count_table(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_common::table::as_scalar_long;

    #[tokio::test]
    async fn serves_scripted_plan_results() {
        let engine = MockEngine::new().with_plan_result("COL", 7);
        let txn = TxnContext::new(1, 0, 0);
        let batch = engine
            .execute_custom_plan_fragment("COL", DependencyId::new(2), None, &txn)
            .await
            .unwrap();
        assert_eq!(as_scalar_long(&batch).unwrap(), 7);
        assert_eq!(engine.executed_plans(), vec!["COL".to_string()]);
    }

    #[tokio::test]
    async fn aggregates_stashed_inputs() {
        let engine = MockEngine::new();
        let dep = DependencyId::new(2);
        let tables: Vec<_> = (0..4).map(|_| modified_count_table(7).unwrap()).collect();
        let mut deps = HashMap::new();
        deps.insert(dep, tables);
        engine.stash_work_unit_dependencies(&deps).await;

        let txn = TxnContext::new(1, 0, 0);
        let batch = engine
            .execute_custom_plan_fragment("AGG", DependencyId::new(1), Some(dep), &txn)
            .await
            .unwrap();
        assert_eq!(as_scalar_long(&batch).unwrap(), 28);
    }

    #[tokio::test]
    async fn aggregation_without_stash_fails() {
        let engine = MockEngine::new();
        let txn = TxnContext::new(1, 0, 0);
        let err = engine
            .execute_custom_plan_fragment("AGG", DependencyId::new(1), Some(DependencyId::new(2)), &txn)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }
}
