use super::create_test_fleet;
use crate::{CacheRecord, NodeId, ResourceKind, TaskStatus};
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

#[tokio::test]
async fn test_ipv6_fan_out_fills_hostname() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/cache/containers"))
        .respond_with(ok(serde_json::json!([{"hostname": "web1"}])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ipv6/list"))
        .and(query_param("hostname", "web1"))
        .respond_with(ok(serde_json::json!([
            {"public_ipv6": "2001:db8::10", "interface": "eth1"},
            {"ipv6_address": "2001:db8::11"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = fleet
        .trigger_sync(ResourceKind::Ipv6, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(report.task.status, TaskStatus::Completed);
    assert_eq!(report.task.success_count, 2);

    let mut bindings: Vec<_> = fleet
        .cached_rows(ResourceKind::Ipv6, NodeId(1))
        .await
        .unwrap()
        .iter()
        .filter_map(CacheRecord::as_ipv6)
        .map(|b| (b.hostname.clone(), b.ipv6_address.clone(), b.interface.clone()))
        .collect();
    bindings.sort();
    assert_eq!(
        bindings,
        vec![
            ("web1".to_string(), "2001:db8::10".to_string(), "eth1".to_string()),
            ("web1".to_string(), "2001:db8::11".to_string(), String::new()),
        ]
    );
}

#[tokio::test]
async fn test_ipv6_refresh_skips_entries_without_address() {
    let mock_server = MockServer::start().await;
    let fleet = create_test_fleet(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/cache/ipv6"))
        .respond_with(ok(serde_json::json!([
            {"container_name": "web1", "ipv6_address": "2001:db8::10", "status": "inactive"},
            {"container_name": "web2", "ipv6_address": ""}
        ])))
        .mount(&mock_server)
        .await;

    let report = fleet
        .trigger_refresh(ResourceKind::Ipv6, NodeId(1))
        .await
        .unwrap()
        .into_job()
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(
        (
            report.task.total_count,
            report.task.success_count,
            report.task.failed_count
        ),
        (2, 1, 1)
    );
    let rows = fleet.cached_rows(ResourceKind::Ipv6, NodeId(1)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].as_ipv6().unwrap().status, "inactive");
}
