use super::{create_test_fleet, create_test_node};
use crate::{
    FleetSync, InMemoryStore, ListingStrategy, Node, NodeAddress, NodeId, NodeStatus, ResourceKind,
    SyncError, SyncTask, TaskStatus, TaskStore, TriggerOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "code": 200,
        "msg": "success",
        "data": data
    }))
}

async fn mount_nat_cache(mock_server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/api/cache/nat"))
        .respond_with(
            ok(serde_json::json!([
                {"hostname": "web1", "external_port": 10022, "internal_port": 22, "protocol": "tcp"}
            ]))
            .set_delay(delay),
        )
        .mount(mock_server)
        .await;
}

/// Polls until the newest task of `kind` on `node_id` has finished.
async fn wait_for_task(fleet: &FleetSync, kind: ResourceKind, node_id: NodeId) -> SyncTask {
    for _ in 0..200 {
        let status = fleet.status(kind, Some(node_id)).await.unwrap();
        if let Some(task) = status[0].last_task.as_ref() {
            if task.status.is_terminal() && !status[0].syncing {
                return task.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} sync on node {} did not finish", kind, node_id);
}

#[tokio::test]
async fn test_second_trigger_is_rejected_while_running() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::from_millis(300)).await;

    let job = fleet
        .trigger_refresh(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();
    assert!(fleet.is_running(ResourceKind::Nat, NodeId(1)));

    let second = fleet
        .trigger_sync(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap();
    assert!(matches!(second, TriggerOutcome::AlreadyRunning));

    // Other kinds have their own slot.
    assert!(!fleet.is_running(ResourceKind::Ipv6, NodeId(1)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        fleet
            .sync_now(ResourceKind::Nat, NodeId(1), ListingStrategy::Bulk)
            .await,
        Err(SyncError::AlreadyRunning {
            kind: ResourceKind::Nat,
            node_id: NodeId(1)
        })
    ));

    let status = fleet
        .status(ResourceKind::Nat, Some(NodeId(1)))
        .await
        .unwrap();
    assert!(status[0].syncing);
    assert_eq!(
        status[0].last_task.as_ref().unwrap().status,
        TaskStatus::Running
    );

    let report = job.wait().await.unwrap();
    assert_eq!(report.task.status, TaskStatus::Completed);
    assert!(!fleet.is_running(ResourceKind::Nat, NodeId(1)));

    // One task recorded: the rejected triggers left no trace.
    let tasks = fleet
        .list_recent_tasks(ResourceKind::Nat, 10)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_cancelled_job_records_failed_task() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::from_secs(5)).await;

    let job = fleet
        .trigger_refresh(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();
    assert_eq!(job.kind(), ResourceKind::Nat);
    assert_eq!(job.node_id(), NodeId(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    job.cancel();
    assert!(matches!(job.wait().await, Err(SyncError::Cancelled)));

    let tasks = fleet
        .list_recent_tasks(ResourceKind::Nat, 10)
        .await
        .unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[0].error_message.as_deref(), Some("cancelled"));
    assert!(tasks[0].finished_at.is_some());
    assert!(!fleet.is_running(ResourceKind::Nat, NodeId(1)));
    assert!(
        fleet
            .cached_rows(ResourceKind::Nat, NodeId(1))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_recent_tasks_are_newest_first() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::ZERO).await;

    for _ in 0..3 {
        fleet
            .sync_now(ResourceKind::Nat, NodeId(1), ListingStrategy::Bulk)
            .await
            .unwrap();
    }

    let tasks = fleet
        .list_recent_tasks(ResourceKind::Nat, 2)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].id > tasks[1].id);
    assert!(
        fleet
            .list_recent_tasks(ResourceKind::Container, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_remove_node_cascades_and_refuses_while_running() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::from_millis(200)).await;

    let job = fleet
        .trigger_refresh(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();
    assert!(matches!(
        fleet.remove_node(NodeId(1)).await,
        Err(SyncError::AlreadyRunning { .. })
    ));
    job.wait().await.unwrap();
    assert_eq!(
        fleet
            .cached_rows(ResourceKind::Nat, NodeId(1))
            .await
            .unwrap()
            .len(),
        1
    );

    fleet.remove_node(NodeId(1)).await.unwrap();

    assert!(
        fleet
            .cached_rows(ResourceKind::Nat, NodeId(1))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        fleet
            .list_recent_tasks(ResourceKind::Nat, 10)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(matches!(
        fleet.trigger_sync(ResourceKind::Nat, NodeId(1)).await,
        Err(SyncError::NodeNotFound(NodeId(1)))
    ));
    assert!(matches!(
        fleet.remove_node(NodeId(1)).await,
        Err(SyncError::NodeNotFound(NodeId(1)))
    ));
}

#[tokio::test]
async fn test_refused_removal_leaves_node_and_slots_untouched() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::ZERO).await;
    fleet
        .sync_now(ResourceKind::Nat, NodeId(1), ListingStrategy::Bulk)
        .await
        .unwrap();

    // Hold the NAT slot of the node with a slow run.
    mock_server.reset().await;
    mount_nat_cache(&mock_server, Duration::from_millis(300)).await;
    let job = fleet
        .trigger_refresh(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();

    assert!(matches!(
        fleet.remove_node(NodeId(1)).await,
        Err(SyncError::AlreadyRunning {
            kind: ResourceKind::Nat,
            node_id: NodeId(1)
        })
    ));

    // Slots taken before the refusal were released.
    for kind in [ResourceKind::Container, ResourceKind::Ipv6, ResourceKind::Proxy] {
        assert!(!fleet.is_running(kind, NodeId(1)), "{} slot left held", kind);
    }
    assert!(fleet.is_running(ResourceKind::Nat, NodeId(1)));

    let report = job.wait().await.unwrap();
    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(
        fleet
            .cached_rows(ResourceKind::Nat, NodeId(1))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        fleet
            .list_recent_tasks(ResourceKind::Nat, 10)
            .await
            .unwrap()
            .len(),
        2
    );
    let status = fleet.status(ResourceKind::Nat, Some(NodeId(1))).await.unwrap();
    assert_eq!(status[0].node_name, "hk-01");
}

#[tokio::test]
async fn test_sync_all_covers_active_nodes_only() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    let offline = MockServer::start().await;
    let fleet = create_test_fleet(&first).await;

    fleet
        .register_node(Node::new(
            2,
            "sg-01",
            NodeAddress::parse(&second.uri()).unwrap(),
        ))
        .await
        .unwrap();
    fleet
        .register_node(
            Node::new(3, "de-01", NodeAddress::parse(&offline.uri()).unwrap())
                .with_status(NodeStatus::Inactive),
        )
        .await
        .unwrap();

    for server in [&first, &second] {
        Mock::given(method("GET"))
            .and(path("/api/list"))
            .respond_with(ok(serde_json::json!([{"hostname": "web1"}])))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .respond_with(ok(serde_json::json!({"status": "Running"})))
            .expect(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .respond_with(ok(serde_json::json!([])))
        .expect(0)
        .mount(&offline)
        .await;

    let started = fleet
        .trigger_sync_all(ResourceKind::Container)
        .await
        .unwrap();
    assert_eq!(started, 2);

    for node_id in [NodeId(1), NodeId(2)] {
        let task = wait_for_task(&fleet, ResourceKind::Container, node_id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.success_count, 1);
    }

    let status = fleet.status(ResourceKind::Container, None).await.unwrap();
    assert_eq!(status.len(), 3);
    assert_eq!(status[2].node_name, "de-01");
    assert!(status[2].last_task.is_none());
}

#[tokio::test]
async fn test_recover_stranded_fails_running_tasks() {
    let store = Arc::new(InMemoryStore::new());
    let mut stranded = SyncTask::pending(ResourceKind::Proxy, NodeId(1), "hk-01");
    stranded.status = TaskStatus::Running;
    store.insert_task(stranded).await.unwrap();

    let fleet = FleetSync::builder()
        .store(store)
        .node(create_test_node("https://hk-01.example.com"))
        .build()
        .await
        .unwrap();

    assert_eq!(fleet.recover_stranded().await.unwrap(), 1);
    assert_eq!(fleet.recover_stranded().await.unwrap(), 0);

    let tasks = fleet
        .list_recent_tasks(ResourceKind::Proxy, 1)
        .await
        .unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(
        tasks[0].error_message.as_deref(),
        Some("interrupted by restart")
    );
}

#[tokio::test]
async fn test_shutdown_cancels_runs_and_blocks_periodic_start() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;
    mount_nat_cache(&mock_server, Duration::from_secs(5)).await;

    assert!(fleet.start_periodic());
    assert!(!fleet.start_periodic());

    let job = fleet
        .trigger_refresh(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();
    fleet.shutdown().await;

    assert!(matches!(job.wait().await, Err(SyncError::Cancelled)));
    assert!(!fleet.start_periodic());
}
