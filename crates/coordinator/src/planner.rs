//! Fragment planner: builds the minimal fragment graph answering one
//! ad-hoc statement.

use tracing::debug;

use floe_common::{DependencyId, Error, Result};

use crate::fragment::{
    FragmentPayload, FragmentPlan, FragmentScope, PlanFragment, AD_HOC_FRAGMENT,
};

/// Output id of the aggregation fragment, the statement's final answer.
pub const AGG_DEP_ID: DependencyId = DependencyId::new(1);

/// Output id of the collection fragment, produced once per partition.
pub const COLLECT_DEP_ID: DependencyId = DependencyId::new(2);

/// Plans one statement into a fragment graph.
///
/// With the delegated backend active the whole statement is a single
/// fragment carrying raw SQL. Otherwise the statement becomes an optional
/// collection stage fanned out to every partition, followed by an
/// aggregation stage on the coordinator's partition that consumes it.
pub fn plan_statement(
    sql: &str,
    collector_plan: Option<&str>,
    aggregator_plan: &str,
    delegated: bool,
) -> Result<FragmentPlan> {
    if sql.trim().is_empty() {
        return Err(Error::Validation("statement text is empty".to_string()));
    }

    if delegated {
        // The delegated backend runs at one logical point and only looks at
        // the SQL and the output id.
        let fragment = PlanFragment {
            handler: AD_HOC_FRAGMENT,
            output_dep_id: AGG_DEP_ID,
            input_dep_ids: Vec::new(),
            payload: FragmentPayload::delegated(sql)?,
            scope: FragmentScope::SinglePartition,
            suppress_duplicates: false,
        };
        debug!(sql, "planned delegated single-fragment graph");
        return Ok(FragmentPlan {
            fragments: vec![fragment],
            final_dep_id: AGG_DEP_ID,
        });
    }

    if aggregator_plan.trim().is_empty() {
        return Err(Error::Validation("aggregator plan is empty".to_string()));
    }

    let mut fragments = Vec::with_capacity(2);

    // The collection stage must be ordered before the aggregation stage
    // that consumes it.
    if let Some(collector) = collector_plan {
        fragments.push(PlanFragment {
            handler: AD_HOC_FRAGMENT,
            output_dep_id: COLLECT_DEP_ID,
            input_dep_ids: Vec::new(),
            payload: FragmentPayload::with_plan(collector, sql)?,
            scope: FragmentScope::AllPartitions,
            suppress_duplicates: false,
        });
    }

    fragments.push(PlanFragment {
        handler: AD_HOC_FRAGMENT,
        output_dep_id: AGG_DEP_ID,
        input_dep_ids: if collector_plan.is_some() {
            vec![COLLECT_DEP_ID]
        } else {
            Vec::new()
        },
        payload: FragmentPayload::with_plan(aggregator_plan, sql)?,
        scope: FragmentScope::SinglePartition,
        suppress_duplicates: collector_plan.is_some(),
    });

    debug!(sql, fragments = fragments.len(), "planned collect/aggregate graph");
    Ok(FragmentPlan {
        fragments,
        final_dep_id: AGG_DEP_ID,
    })
}
