//! A report cycle against a stand-in server over every channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use api_types::rpc::AddMetricResponse;
use api_types::rpc::JsonRpcResponse;
use metric_comm::build_delivery;
use metric_comm::Channel;
use metric_comm::ClientConfig;
use metric_comm::Delivery;
use metrics_agent::report::CycleSummary;
use metrics_agent::Collector;
use metrics_agent::ReportLoop;
use serde_json::json;
use test_log::test;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::path_regex;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

async fn mount_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/update/(gauge|counter)/[^/]+/[^/]+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/update/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    let ok = JsonRpcResponse::success(
        json!(1),
        serde_json::to_value(AddMetricResponse::default()).unwrap(),
    );
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&ok))
        .mount(server)
        .await;
}

fn deliveries(config: &ClientConfig, cancel: &CancellationToken) -> Vec<Box<dyn Delivery>> {
    Channel::ALL
        .into_iter()
        .map(|channel| build_delivery(channel, config, cancel.clone()).unwrap())
        .collect()
}

fn polled_collector() -> Arc<Collector> {
    let collector = Arc::new(Collector::new());
    collector.record(BTreeMap::from([("Alloc".to_string(), 1.5)]));
    collector.record(BTreeMap::from([("Alloc".to_string(), 2.5)]));
    collector
}

#[test(tokio::test)]
async fn every_channel_receives_the_snapshot() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let config = ClientConfig::new(server.uri(), server.uri()).with_compression(false);
    let cancel = CancellationToken::new();
    let report = ReportLoop::new(
        polled_collector(),
        deliveries(&config, &cancel),
        3,
        Duration::from_secs(10),
    );

    let summary = report.report_once().await;

    // path, json and rpc push each of the two samples; batch pushes once
    assert_eq!(summary, CycleSummary {
        delivered: 7,
        failed: 0
    });
    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
    assert!(paths.contains(&"/update/gauge/Alloc/2.500000"));
    assert!(paths.contains(&"/update/counter/PollCount/2"));

    let batch = requests
        .iter()
        .find(|r| r.url.path() == "/updates/")
        .expect("batch request");
    let body: serde_json::Value = serde_json::from_slice(&batch.body).unwrap();
    assert_eq!(
        body,
        json!([
            {"id": "Alloc", "type": "gauge", "value": 2.5},
            {"id": "PollCount", "type": "counter", "delta": 2}
        ])
    );
}

#[test(tokio::test)]
async fn unreachable_server_is_contained() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = ClientConfig::new(addr.clone(), addr)
        .with_retry_delays(vec![Duration::from_millis(5); 3]);
    let cancel = CancellationToken::new();
    let report = ReportLoop::new(
        polled_collector(),
        deliveries(&config, &cancel),
        3,
        Duration::from_secs(10),
    );

    let summary = report.report_once().await;

    assert_eq!(summary, CycleSummary {
        delivered: 0,
        failed: 7
    });
}

#[test(tokio::test)]
async fn cancelled_agent_attempts_no_deliveries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let config = ClientConfig::new(server.uri(), server.uri());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = ReportLoop::new(
        polled_collector(),
        deliveries(&config, &cancel),
        3,
        Duration::from_secs(10),
    );

    let summary = report.report_once().await;

    assert_eq!(summary.delivered, 0);
}
