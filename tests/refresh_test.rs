//! Fetch-and-refresh integration tests against a mock state provider

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smart_dashboard::dom::{BoundElement, ElementSpec, VirtualDocument};
use smart_dashboard::poll::RefreshOutcome;
use smart_dashboard::{DashboardError, ProjectionMode, RefresherConfig, SmartDashboard};

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn states_body(entries: &[(&str, &str)]) -> serde_json::Value {
    serde_json::Value::Array(
        entries
            .iter()
            .map(|(id, state)| json!({"entity_id": id, "state": state}))
            .collect(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_fetches_and_projects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[("sensor.t", "21.5")])))
        .expect(1..)
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let element = document.insert(ElementSpec::bound("sensor.t").with_text("--"));
    let dashboard =
        SmartDashboard::new(&format!("{}/", server.uri()), "secret", Arc::clone(&document)).unwrap();
    assert_eq!(dashboard.scheduler().client().base_url(), server.uri());

    dashboard.start(Duration::from_millis(1000));

    assert!(wait_for(|| element.text() == "21.5").await);
    assert_eq!(dashboard.projector().mode(), ProjectionMode::Eager);
    assert!(dashboard.evaluate("state('sensor.t') > 20", None));

    dashboard.stop();
    dashboard.stop();
    assert!(!dashboard.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_prevents_further_ticks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[])))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let dashboard = SmartDashboard::new(&server.uri(), "secret", document).unwrap();

    dashboard.start(Duration::from_millis(50));
    assert!(wait_for(|| dashboard.scheduler().stats().successes() >= 2).await);
    dashboard.stop();

    // let any cycle already in flight settle
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = server.received_requests().await.unwrap_or_default().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = server.received_requests().await.unwrap_or_default().len();
    assert_eq!(settled, later);
}

#[tokio::test]
async fn test_server_error_keeps_previous_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[("light.a", "on")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let element = document.insert(ElementSpec::bound("light.a"));
    let dashboard = SmartDashboard::new(&server.uri(), "secret", Arc::clone(&document)).unwrap();

    assert_eq!(
        dashboard.refresh().await.unwrap(),
        RefreshOutcome::Applied { entities: 1 }
    );
    match dashboard.refresh().await {
        Err(DashboardError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected server error, got {other:?}"),
    }

    assert_eq!(dashboard.cache().lookup("light.a").unwrap().state, "on");
    assert_eq!(element.text(), "on");
    assert_eq!(dashboard.scheduler().stats().failures(), 1);
    assert!(dashboard.scheduler().stats().last_success().is_some());
}

#[tokio::test]
async fn test_malformed_body_keeps_previous_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[("light.a", "on")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"message\": \"not a list\"}"))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let dashboard = SmartDashboard::new(&server.uri(), "secret", document).unwrap();

    dashboard.refresh().await.unwrap();
    let err = dashboard.refresh().await.unwrap_err();
    assert!(matches!(err, DashboardError::InvalidBody(_)));
    assert_eq!(dashboard.cache().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_is_absorbed_by_evaluate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let dashboard = SmartDashboard::new(&server.uri(), "wrong", document).unwrap();

    assert!(matches!(
        dashboard.refresh().await,
        Err(DashboardError::Server { status: 401, .. })
    ));
    assert!(dashboard.cache().is_empty());
    assert!(!dashboard.evaluate("state('light.a') === 'on'", None));
}

#[tokio::test]
async fn test_lazy_projection_for_large_page() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (0..600).map(|i| format!("sensor.s{i}")).collect();
    let body = serde_json::Value::Array(
        ids.iter()
            .map(|id| json!({"entity_id": id, "state": "ok"}))
            .collect(),
    );
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let elements: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| document.insert(ElementSpec::bound(id.as_str()).at(i as f64 * 30.0, 20.0)))
        .collect();
    let dashboard = SmartDashboard::new(&server.uri(), "secret", Arc::clone(&document)).unwrap();

    dashboard.refresh().await.unwrap();

    assert_eq!(dashboard.projector().mode(), ProjectionMode::Lazy);
    assert_eq!(document.observer_count(), 1);
    // tops 0..=900 are on screen or within the 100px margin
    assert!(elements[..31].iter().all(|el| el.text() == "ok"));
    assert!(elements[31..].iter().all(|el| el.text().is_empty()));

    document.scroll_to(2000.0);
    assert_eq!(elements[70].text(), "ok");
    assert_eq!(elements[500].text(), "");

    // second pass keeps the single observer
    dashboard.refresh().await.unwrap();
    assert_eq!(document.observer_count(), 1);
}

#[tokio::test]
async fn test_threshold_page_stays_eager() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[("sensor.s499", "ok")])))
        .mount(&server)
        .await;

    let document = Arc::new(VirtualDocument::new(800.0));
    let elements: Vec<_> = (0..500)
        .map(|i| document.insert(ElementSpec::bound(format!("sensor.s{i}")).at(i as f64 * 30.0, 20.0)))
        .collect();
    let dashboard = SmartDashboard::new(&server.uri(), "secret", Arc::clone(&document)).unwrap();

    dashboard.refresh().await.unwrap();

    assert_eq!(dashboard.projector().mode(), ProjectionMode::Eager);
    assert_eq!(document.observer_count(), 0);
    assert_eq!(elements[499].text(), "ok");
}

async fn out_of_order_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(states_body(&[("sensor.t", "old")]))
                .set_delay(Duration::from_millis(400)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(states_body(&[("sensor.t", "new")])))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_out_of_order_responses_apply_in_completion_order() {
    let server = out_of_order_server().await;
    let document = Arc::new(VirtualDocument::new(800.0));
    let dashboard = SmartDashboard::new(&server.uri(), "secret", document).unwrap();

    let (first, second) = tokio::join!(dashboard.refresh(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dashboard.refresh().await
    });

    assert_eq!(first.unwrap(), RefreshOutcome::Applied { entities: 1 });
    assert_eq!(second.unwrap(), RefreshOutcome::Applied { entities: 1 });
    assert_eq!(dashboard.cache().lookup("sensor.t").unwrap().state, "old");
}

#[tokio::test]
async fn test_stale_responses_discarded_when_enabled() {
    let server = out_of_order_server().await;
    let document = Arc::new(VirtualDocument::new(800.0));
    let element = document.insert(ElementSpec::bound("sensor.t"));
    let mut config = RefresherConfig::new(server.uri(), "secret");
    config.discard_stale_responses = true;
    let dashboard = SmartDashboard::with_config(config, Arc::clone(&document)).unwrap();

    let (first, second) = tokio::join!(dashboard.refresh(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dashboard.refresh().await
    });

    assert_eq!(first.unwrap(), RefreshOutcome::Stale { sequence: 1 });
    assert_eq!(second.unwrap(), RefreshOutcome::Applied { entities: 1 });
    assert_eq!(dashboard.cache().lookup("sensor.t").unwrap().state, "new");
    assert_eq!(element.text(), "new");
    assert_eq!(dashboard.scheduler().stats().stale_dropped(), 1);
}
