//! Coordination core for ad-hoc SQL statements over a partitioned store.
//!
//! A statement is planned into a small graph of dependency-ordered
//! fragments, fanned out to the partitions that own the data, and its
//! partial results are aggregated into a single answer; mutations against
//! fully replicated tables get their over-reported row count corrected at
//! the end. Parsing, planning, and the per-partition execution engine are
//! collaborators reached through the seams in `floe-engine`.

pub mod adhoc;
pub mod config;
pub mod correction;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod planner;
pub mod registry;

pub use adhoc::{AdHocCoordinator, AdHocFragmentHandler};
pub use correction::correct_replicated_dml;
pub use dispatch::{Dispatcher, PartitionSite};
pub use error::CoordinatorError;
pub use executor::FragmentExecutor;
pub use fragment::{
    DependencyPair, FragmentHandlerId, FragmentPayload, FragmentPlan, FragmentScope, PlanFragment,
    AD_HOC_FRAGMENT,
};
pub use planner::{plan_statement, AGG_DEP_ID, COLLECT_DEP_ID};
pub use registry::{FragmentHandler, FragmentHandlerRegistry, SiteContext};
