//! Typed fragment-handler registry.
//!
//! Handlers are registered once at process start through the builder; the
//! registry never changes afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use floe_common::{DependencyId, Error, Result, TxnContext};
use floe_engine::{ExecutionEngine, SqlBackend};

use crate::fragment::{DependencyPair, FragmentHandlerId, PlanFragment};

/// Partition-local state handed to a handler for one fragment invocation.
pub struct SiteContext<'a> {
    pub partition_id: u32,
    pub engine: &'a dyn ExecutionEngine,
    pub backend: Option<&'a dyn SqlBackend>,
    pub txn: &'a TxnContext,
}

/// Runs one fragment on the partition that owns it.
#[async_trait]
pub trait FragmentHandler: Send + Sync {
    async fn run_fragment(
        &self,
        fragment: &PlanFragment,
        inputs: Option<&HashMap<DependencyId, Vec<RecordBatch>>>,
        site: &SiteContext<'_>,
    ) -> Result<DependencyPair>;
}

pub struct FragmentHandlerRegistryBuilder {
    handlers: HashMap<FragmentHandlerId, Arc<dyn FragmentHandler>>,
}

impl FragmentHandlerRegistryBuilder {
    pub fn register(mut self, id: FragmentHandlerId, handler: Arc<dyn FragmentHandler>) -> Self {
        self.handlers.insert(id, handler);
        self
    }

    pub fn build(self) -> FragmentHandlerRegistry {
        FragmentHandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable map from handler id to handler.
pub struct FragmentHandlerRegistry {
    handlers: HashMap<FragmentHandlerId, Arc<dyn FragmentHandler>>,
}

impl FragmentHandlerRegistry {
    pub fn builder() -> FragmentHandlerRegistryBuilder {
        FragmentHandlerRegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, id: FragmentHandlerId) -> Result<&Arc<dyn FragmentHandler>> {
        self.handlers.get(&id).ok_or_else(|| {
            Error::Execution(format!("no handler registered for fragment type {id:?}"))
        })
    }
}
