use std::sync::Arc;

use floe_common::table::as_scalar_long;
use floe_common::{ClusterTopology, DependencyId, Error, TxnContext};
use floe_coordinator::{
    AdHocCoordinator, AdHocFragmentHandler, Dispatcher, FragmentExecutor, FragmentHandlerRegistry,
    FragmentPayload, FragmentPlan, FragmentScope, PartitionSite, PlanFragment, AD_HOC_FRAGMENT,
    AGG_DEP_ID, COLLECT_DEP_ID,
};
use floe_engine::testing::MockEngine;
use floe_engine::{ColumnType, ExecutionEngine, MemoryBackend};

fn mock_cluster(partitions: usize, collected: i64) -> (Vec<Arc<MockEngine>>, AdHocCoordinator) {
    let mocks: Vec<Arc<MockEngine>> = (0..partitions)
        .map(|_| Arc::new(MockEngine::new().with_plan_result("COL", collected)))
        .collect();
    let engines: Vec<Arc<dyn ExecutionEngine>> = mocks
        .iter()
        .map(|mock| mock.clone() as Arc<dyn ExecutionEngine>)
        .collect();
    let topology = ClusterTopology::new(partitions).unwrap();
    let coordinator = AdHocCoordinator::new(topology, engines, None).unwrap();
    (mocks, coordinator)
}

#[tokio::test]
async fn replicated_update_is_corrected_to_the_true_count() -> Result<(), anyhow::Error> {
    // Four partitions each report 7 updated rows; the aggregate is 28 and
    // the corrected answer is 7.
    let (_mocks, coordinator) = mock_cluster(4, 7);

    let result = coordinator
        .run_ad_hoc("AGG", Some("COL"), "UPDATE T SET x=1", true)
        .await?;

    assert_eq!(as_scalar_long(&result)?, 7);
    Ok(())
}

#[tokio::test]
async fn non_replicated_update_keeps_the_aggregate() -> Result<(), anyhow::Error> {
    let (_mocks, coordinator) = mock_cluster(4, 7);

    let result = coordinator
        .run_ad_hoc("AGG", Some("COL"), "UPDATE T SET x=1", false)
        .await?;

    assert_eq!(as_scalar_long(&result)?, 28);
    Ok(())
}

#[tokio::test]
async fn uneven_replicated_count_is_fatal() {
    // One partition disagrees with the rest, so the aggregate cannot be an
    // even multiple of the partition count.
    let mut mocks = vec![Arc::new(MockEngine::new().with_plan_result("COL", 6))];
    mocks.extend((0..3).map(|_| Arc::new(MockEngine::new().with_plan_result("COL", 7))));
    let engines: Vec<Arc<dyn ExecutionEngine>> = mocks
        .iter()
        .map(|mock| mock.clone() as Arc<dyn ExecutionEngine>)
        .collect();
    let coordinator =
        AdHocCoordinator::new(ClusterTopology::new(4).unwrap(), engines, None).unwrap();

    let err = coordinator
        .run_ad_hoc("AGG", Some("COL"), "UPDATE T SET x=1", true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ReplicationConsistency {
            raw: 27,
            partitions: 4
        }
    ));
}

#[tokio::test]
async fn aggregator_waits_for_every_partition_result() -> Result<(), anyhow::Error> {
    let (mocks, coordinator) = mock_cluster(4, 7);

    coordinator
        .run_ad_hoc("AGG", Some("COL"), "UPDATE T SET x=1", false)
        .await?;

    // The aggregation runs on the coordinator's own site (partition 0) and
    // must have been handed the collection result from all four partitions
    // before it ran.
    let stashes = mocks[0].stashed_dependencies();
    assert_eq!(stashes.len(), 1);
    assert_eq!(stashes[0][&COLLECT_DEP_ID].len(), 4);

    for mock in &mocks {
        assert!(mock.executed_plans().contains(&"COL".to_string()));
    }
    assert!(mocks[0].executed_plans().contains(&"AGG".to_string()));
    Ok(())
}

#[tokio::test]
async fn aggregator_only_statement_runs_once() -> Result<(), anyhow::Error> {
    let mocks: Vec<Arc<MockEngine>> = (0..2)
        .map(|_| Arc::new(MockEngine::new().with_plan_result("AGG", 1)))
        .collect();
    let engines: Vec<Arc<dyn ExecutionEngine>> = mocks
        .iter()
        .map(|mock| mock.clone() as Arc<dyn ExecutionEngine>)
        .collect();
    let coordinator =
        AdHocCoordinator::new(ClusterTopology::new(2).unwrap(), engines, None).unwrap();

    let result = coordinator.run_ad_hoc("AGG", None, "SELECT 1", false).await?;

    assert_eq!(as_scalar_long(&result)?, 1);
    assert_eq!(mocks[0].executed_plans(), vec!["AGG".to_string()]);
    assert!(mocks[1].executed_plans().is_empty());
    Ok(())
}

#[tokio::test]
async fn delegated_statements_run_through_the_backend() -> Result<(), anyhow::Error> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .create_table("t", &[("id", ColumnType::BigInt), ("name", ColumnType::Text)])
        .await;

    let mock = Arc::new(MockEngine::new());
    let coordinator = AdHocCoordinator::new(
        ClusterTopology::new(1).unwrap(),
        vec![mock.clone() as Arc<dyn ExecutionEngine>],
        Some(backend.clone() as Arc<dyn floe_engine::SqlBackend>),
    )
    .unwrap();

    let inserted = coordinator
        .run_ad_hoc("", None, "INSERT INTO t VALUES (1, 'a'), (2, 'b')", false)
        .await?;
    assert_eq!(as_scalar_long(&inserted)?, 2);

    let updated = coordinator
        .run_ad_hoc("", None, "UPDATE t SET name = 'z' WHERE id = 2", false)
        .await?;
    assert_eq!(as_scalar_long(&updated)?, 1);

    // The delegated path never touches the native engine.
    assert!(mock.executed_plans().is_empty());
    assert_eq!(backend.row_count("t").await?, 2);
    Ok(())
}

#[tokio::test]
async fn duplicate_output_ids_abort_before_dispatch() {
    let mock = Arc::new(MockEngine::new().with_plan_result("COL", 7));
    let registry = FragmentHandlerRegistry::builder()
        .register(AD_HOC_FRAGMENT, Arc::new(AdHocFragmentHandler))
        .build();
    let sites = vec![PartitionSite {
        partition_id: 0,
        engine: mock.clone() as Arc<dyn ExecutionEngine>,
    }];
    let executor = FragmentExecutor::new(Dispatcher::new(registry, sites, None).unwrap());

    let fragment = PlanFragment {
        handler: AD_HOC_FRAGMENT,
        output_dep_id: AGG_DEP_ID,
        input_dep_ids: Vec::new(),
        payload: FragmentPayload::with_plan("COL", "SELECT 1").unwrap(),
        scope: FragmentScope::SinglePartition,
        suppress_duplicates: false,
    };
    let plan = FragmentPlan {
        fragments: vec![fragment.clone(), fragment],
        final_dep_id: AGG_DEP_ID,
    };
    let txn = TxnContext::new(1, 0, 0);

    let err = executor.execute(&plan, AGG_DEP_ID, &txn).await.unwrap_err();
    assert!(matches!(err, Error::DependencyConflict(id) if id == AGG_DEP_ID));
    assert!(mock.executed_plans().is_empty());
}

#[tokio::test]
async fn missing_final_dependency_is_fatal() {
    let mock = Arc::new(MockEngine::new().with_plan_result("COL", 7));
    let registry = FragmentHandlerRegistry::builder()
        .register(AD_HOC_FRAGMENT, Arc::new(AdHocFragmentHandler))
        .build();
    let sites = vec![PartitionSite {
        partition_id: 0,
        engine: mock as Arc<dyn ExecutionEngine>,
    }];
    let executor = FragmentExecutor::new(Dispatcher::new(registry, sites, None).unwrap());

    let collect_only = FragmentPlan {
        fragments: vec![PlanFragment {
            handler: AD_HOC_FRAGMENT,
            output_dep_id: COLLECT_DEP_ID,
            input_dep_ids: Vec::new(),
            payload: FragmentPayload::with_plan("COL", "SELECT 1").unwrap(),
            scope: FragmentScope::AllPartitions,
            suppress_duplicates: false,
        }],
        final_dep_id: COLLECT_DEP_ID,
    };
    let txn = TxnContext::new(1, 0, 0);

    let err = executor
        .execute(&collect_only, AGG_DEP_ID, &txn)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingDependency(id) if id == AGG_DEP_ID));
}

#[tokio::test]
async fn engine_count_must_match_topology() {
    let engines: Vec<Arc<dyn ExecutionEngine>> = vec![Arc::new(MockEngine::new())];
    let err = AdHocCoordinator::new(ClusterTopology::new(4).unwrap(), engines, None).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn validation_failures_reach_no_site() {
    let (mocks, coordinator) = mock_cluster(2, 7);

    let err = coordinator
        .run_ad_hoc("", Some("COL"), "UPDATE T SET x=1", false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    for mock in &mocks {
        assert!(mock.executed_plans().is_empty());
    }
}

#[tokio::test]
async fn unknown_dependency_never_resolves() {
    let mock = Arc::new(MockEngine::new());
    let registry = FragmentHandlerRegistry::builder()
        .register(AD_HOC_FRAGMENT, Arc::new(AdHocFragmentHandler))
        .build();
    let sites = vec![PartitionSite {
        partition_id: 0,
        engine: mock as Arc<dyn ExecutionEngine>,
    }];
    let executor = FragmentExecutor::new(Dispatcher::new(registry, sites, None).unwrap());

    let orphan = FragmentPlan {
        fragments: vec![PlanFragment {
            handler: AD_HOC_FRAGMENT,
            output_dep_id: AGG_DEP_ID,
            input_dep_ids: vec![DependencyId::new(42)],
            payload: FragmentPayload::with_plan("AGG", "SELECT 1").unwrap(),
            scope: FragmentScope::SinglePartition,
            suppress_duplicates: true,
        }],
        final_dep_id: AGG_DEP_ID,
    };
    let txn = TxnContext::new(1, 0, 0);

    let err = executor.execute(&orphan, AGG_DEP_ID, &txn).await.unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
}
