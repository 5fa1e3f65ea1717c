//! Fragment representation for distributed statement execution

use std::collections::HashSet;

use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use floe_common::{DependencyId, Error, Result};

/// Identifies the registered handler that knows how to run a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentHandlerId(pub u32);

/// Handler slot for ad-hoc statement fragments.
pub const AD_HOC_FRAGMENT: FragmentHandlerId = FragmentHandlerId(1);

/// Where a fragment runs: once on every partition, or once on the
/// coordinator's own partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentScope {
    SinglePartition,
    AllPartitions,
}

/// What a fragment carries to its execution site. Exactly one variant is
/// populated; the choice is made once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentPayload {
    /// Raw SQL for the delegated backend.
    DelegatedSql { sql: String },
    /// Serialized plan for the native engine. The SQL text rides along for
    /// diagnostics and is never reparsed.
    PlanWithSql { plan: String, sql: String },
}

impl FragmentPayload {
    pub fn delegated(sql: &str) -> Result<Self> {
        if sql.trim().is_empty() {
            return Err(Error::Validation("statement text is empty".to_string()));
        }
        Ok(FragmentPayload::DelegatedSql {
            sql: sql.to_string(),
        })
    }

    pub fn with_plan(plan: &str, sql: &str) -> Result<Self> {
        if plan.trim().is_empty() {
            return Err(Error::Validation("plan fragment is empty".to_string()));
        }
        if sql.trim().is_empty() {
            return Err(Error::Validation("statement text is empty".to_string()));
        }
        Ok(FragmentPayload::PlanWithSql {
            plan: plan.to_string(),
            sql: sql.to_string(),
        })
    }

    /// The statement text this payload was planned from.
    pub fn sql(&self) -> &str {
        match self {
            FragmentPayload::DelegatedSql { sql } => sql,
            FragmentPayload::PlanWithSql { sql, .. } => sql,
        }
    }
}

/// An atomic unit of work: runs on its target partitions once its input
/// dependencies are satisfied and publishes one result table under its
/// output dependency id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFragment {
    pub handler: FragmentHandlerId,
    pub output_dep_id: DependencyId,
    pub input_dep_ids: Vec<DependencyId>,
    pub payload: FragmentPayload,
    pub scope: FragmentScope,
    pub suppress_duplicates: bool,
}

impl PlanFragment {
    pub fn is_dependent(&self) -> bool {
        !self.input_dep_ids.is_empty()
    }

    pub fn is_ready(&self, completed: &HashSet<DependencyId>) -> bool {
        self.input_dep_ids.iter().all(|dep| completed.contains(dep))
    }
}

/// One statement's fragment graph, ordered so producers precede their
/// consumers, plus the id of the fragment output that is the statement's
/// final answer.
#[derive(Debug, Clone)]
pub struct FragmentPlan {
    pub fragments: Vec<PlanFragment>,
    pub final_dep_id: DependencyId,
}

/// One fragment invocation's published result.
#[derive(Debug, Clone)]
pub struct DependencyPair {
    pub dep_id: DependencyId,
    pub table: RecordBatch,
}

impl DependencyPair {
    pub fn new(dep_id: DependencyId, table: RecordBatch) -> Self {
        Self { dep_id, table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_empty_sql() {
        assert!(matches!(
            FragmentPayload::delegated("  "),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            FragmentPayload::with_plan("PLAN", ""),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn payload_rejects_empty_plan() {
        assert!(matches!(
            FragmentPayload::with_plan("", "SELECT 1"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn readiness_tracks_inputs() {
        let fragment = PlanFragment {
            handler: AD_HOC_FRAGMENT,
            output_dep_id: DependencyId::new(1),
            input_dep_ids: vec![DependencyId::new(2)],
            payload: FragmentPayload::with_plan("AGG", "SELECT 1").unwrap(),
            scope: FragmentScope::SinglePartition,
            suppress_duplicates: true,
        };

        let mut completed = HashSet::new();
        assert!(!fragment.is_ready(&completed));
        completed.insert(DependencyId::new(2));
        assert!(fragment.is_ready(&completed));
    }
}
