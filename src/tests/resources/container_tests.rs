use super::create_test_fleet;
use crate::{NodeId, ResourceKind, TaskStatus};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "code": 200,
        "msg": "success",
        "data": data
    }))
}

#[tokio::test]
async fn test_container_sync_merges_listing_and_detail() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/list"))
        .and(header("apikey", "k3y"))
        .respond_with(ok(serde_json::json!([
            {"hostname": "web1", "status": "Running", "ipv4": "10.0.0.5"},
            {"hostname": "web2", "status": "Stopped", "image": "alpine/3.20"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("hostname", "web1"))
        .respond_with(ok(serde_json::json!({
            "status": "Running",
            "cpus": 2,
            "memory": 1024,
            "disk": 20480,
            "cpu_percent": 3.5,
            "traffic_usage_raw": 4096
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("hostname", "web2"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let job = fleet
        .trigger_sync(ResourceKind::Container, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap();
    let report = job.wait().await.unwrap();

    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(report.task.total_count, 2);
    assert_eq!(report.task.success_count, 2);
    assert_eq!(report.task.failed_count, 0);

    let rows = fleet
        .cached_rows(ResourceKind::Container, NodeId(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let web1 = rows
        .iter()
        .filter_map(|row| row.as_container())
        .find(|row| row.hostname == "web1")
        .unwrap();
    assert_eq!(web1.ipv4, "10.0.0.5");
    assert_eq!(web1.cpus, 2);
    assert_eq!(web1.memory, "1024MB");
    assert_eq!(web1.memory_total, 1024 * 1024 * 1024);
    assert_eq!(web1.traffic_in, 2048);

    // Detail failed: the listing entry alone is cached.
    let web2 = rows
        .iter()
        .filter_map(|row| row.as_container())
        .find(|row| row.hostname == "web2")
        .unwrap();
    assert_eq!(web2.status, "Stopped");
    assert_eq!(web2.image, "alpine/3.20");
    assert_eq!(web2.cpus, 0);
}

#[tokio::test]
async fn test_container_refresh_reads_node_cache() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ok(serde_json::json!([
            {"hostname": "web1", "status": "Running", "config": {"memory": "2GB", "disk": "40GB"}},
            {"status": "Running"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = fleet
        .trigger_refresh(ResourceKind::Container, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap();

    // The entry without hostname cannot be keyed and counts as failed.
    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(
        (
            report.task.total_count,
            report.task.success_count,
            report.task.failed_count
        ),
        (2, 1, 1)
    );

    let rows = fleet
        .cached_rows(ResourceKind::Container, NodeId(1))
        .await
        .unwrap();
    let web1 = rows[0].as_container().unwrap();
    assert_eq!(web1.memory, "2GB");
    assert_eq!(web1.disk, "40GB");
}

#[tokio::test]
async fn test_container_listing_http_error_purges_cache() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ok(serde_json::json!([{"hostname": "web1"}])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    fleet
        .trigger_refresh(ResourceKind::Container, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(
        fleet
            .cached_rows(ResourceKind::Container, NodeId(1))
            .await
            .unwrap()
            .len(),
        1
    );

    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent down"))
        .mount(&mock_server)
        .await;
    let report = fleet
        .trigger_refresh(ResourceKind::Container, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.task.status, TaskStatus::Failed);
    assert_eq!(report.purged, 1);
    let message = report.task.error_message.unwrap();
    assert!(message.starts_with("failed to fetch listing:"), "{}", message);
    assert!(message.contains("agent down"), "{}", message);
    assert!(
        fleet
            .cached_rows(ResourceKind::Container, NodeId(1))
            .await
            .unwrap()
            .is_empty()
    );
}
