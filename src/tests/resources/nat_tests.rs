use super::create_test_fleet;
use crate::{CacheRecord, FleetSync, NodeId, ResourceKind, TaskStatus};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "code": 200,
        "msg": "success",
        "data": data
    }))
}

async fn mount_containers(mock_server: &MockServer, hostnames: &[&str]) {
    let containers: Vec<_> = hostnames
        .iter()
        .map(|hostname| serde_json::json!({"hostname": hostname, "status": "Running"}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ok(serde_json::Value::Array(containers)))
        .mount(mock_server)
        .await;
}

async fn mount_rules(mock_server: &MockServer, hostname: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/api/natlist"))
        .and(query_param("hostname", hostname))
        .respond_with(response)
        .mount(mock_server)
        .await;
}

async fn sync_nat(fleet: &FleetSync) -> crate::SyncReport {
    fleet
        .trigger_sync(ResourceKind::Nat, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap()
}

fn cached_ports(rows: &[CacheRecord]) -> Vec<(String, u16, String)> {
    let mut ports: Vec<_> = rows
        .iter()
        .filter_map(CacheRecord::as_nat)
        .map(|rule| (rule.hostname.clone(), rule.external_port, rule.protocol.clone()))
        .collect();
    ports.sort();
    ports
}

#[tokio::test]
async fn test_nat_fan_out_collects_rules_per_container() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    mount_containers(&mock_server, &["web1", "web2", "db1"]).await;
    mount_rules(
        &mock_server,
        "web1",
        ok(serde_json::json!([
            {"external_port": 10022, "internal_port": 22, "protocol": "tcp"},
            {"external": 10080, "internal": 80, "protocol": "tcp", "description": "http"}
        ])),
    )
    .await;
    mount_rules(
        &mock_server,
        "web2",
        ok(serde_json::json!([
            {"container_name": "web2", "external_port": 20053, "internal_port": 53, "protocol": "udp"}
        ])),
    )
    .await;
    // No rules: agents send null.
    mount_rules(&mock_server, "db1", ok(serde_json::Value::Null)).await;

    let report = sync_nat(&fleet).await;

    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(
        (
            report.task.total_count,
            report.task.success_count,
            report.task.failed_count
        ),
        (3, 3, 0)
    );

    let rows = fleet.cached_rows(ResourceKind::Nat, NodeId(1)).await.unwrap();
    assert_eq!(
        cached_ports(&rows),
        vec![
            ("web1".to_string(), 10022, "tcp".to_string()),
            ("web1".to_string(), 10080, "tcp".to_string()),
            ("web2".to_string(), 20053, "udp".to_string()),
        ]
    );
    let http = rows
        .iter()
        .filter_map(CacheRecord::as_nat)
        .find(|rule| rule.external_port == 10080)
        .unwrap();
    assert_eq!(http.internal_port, 80);
    assert_eq!(http.description, "http");
    assert_eq!(http.status, "active");
}

#[tokio::test]
async fn test_nat_failed_container_counts_once_and_rules_vanish() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    mount_containers(&mock_server, &["web1", "web2"]).await;
    mount_rules(
        &mock_server,
        "web1",
        ok(serde_json::json!([
            {"external_port": 10022, "internal_port": 22, "protocol": "tcp"}
        ])),
    )
    .await;
    mount_rules(
        &mock_server,
        "web2",
        ResponseTemplate::new(500).set_body_string("lxc exec failed"),
    )
    .await;

    let report = sync_nat(&fleet).await;

    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(
        (
            report.task.total_count,
            report.task.success_count,
            report.task.failed_count
        ),
        (2, 1, 1)
    );
    assert_eq!(report.task.total_count, report.task.success_count + report.task.failed_count);
}

#[tokio::test]
async fn test_nat_resync_evicts_removed_rules() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    mount_containers(&mock_server, &["web1"]).await;
    Mock::given(method("GET"))
        .and(path("/api/natlist"))
        .and(query_param("hostname", "web1"))
        .respond_with(ok(serde_json::json!([
            {"external_port": 10022, "internal_port": 22, "protocol": "tcp"},
            {"external_port": 10080, "internal_port": 80, "protocol": "tcp"}
        ])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_rules(
        &mock_server,
        "web1",
        ok(serde_json::json!([
            {"external_port": 10080, "internal_port": 8080, "protocol": "tcp"}
        ])),
    )
    .await;

    let first = sync_nat(&fleet).await;
    assert_eq!(first.evicted, 0);

    let second = sync_nat(&fleet).await;
    assert_eq!(second.evicted, 1);

    let rows = fleet.cached_rows(ResourceKind::Nat, NodeId(1)).await.unwrap();
    assert_eq!(
        cached_ports(&rows),
        vec![("web1".to_string(), 10080, "tcp".to_string())]
    );
    assert_eq!(rows[0].as_nat().unwrap().internal_port, 8080);
}

#[tokio::test]
async fn test_nat_malformed_listing_fails_task() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ok(serde_json::json!({"web1": {}})))
        .mount(&mock_server)
        .await;

    let report = sync_nat(&fleet).await;

    assert_eq!(report.task.status, TaskStatus::Failed);
    assert_eq!(report.task.total_count, 0);
    assert!(
        report
            .task
            .error_message
            .unwrap()
            .starts_with("malformed listing payload")
    );
}
