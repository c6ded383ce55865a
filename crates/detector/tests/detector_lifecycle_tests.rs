//! 탐지기 생명주기 통합 테스트 -- 시작/정지 상태 전이와 이벤트 흐름 검증

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use esguard_core::pipeline::{HealthStatus, Pipeline};
use esguard_detector::{
    DetectorConfigBuilder, DetectorError, ElasticDetectorBuilder, LoopState, RuleLoader, RuleSet,
};

use common::{MockStore, login_doc, rule};

const RULES_YAML: &str = r#"
ssh_bruteforce:
  query: '{"match": {"event.action": "login_failed"}}'
  fields: "source.ip,user.name"
  plugin_sid: 1001
  data_index: "auth-*"
  src_ip: "{0}"
  username: "{1}"

broken_rule:
  fields: "source.ip"
  plugin_sid: 2
  data_index: "auth-*"
"#;

fn config(sleep_secs: u64) -> esguard_detector::DetectorConfig {
    DetectorConfigBuilder::new()
        .sleep_secs(sleep_secs)
        .build()
        .unwrap()
}

/// 워커가 첫 규칙 조회를 마칠 때까지 양보합니다.
async fn wait_for_first_fetch(store: &MockStore) {
    while store.calls().is_empty() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn stop_before_start_returns_promptly() {
    let (detector, _rx) = ElasticDetectorBuilder::new().build().unwrap();

    let start = std::time::Instant::now();
    detector.request_stop();
    assert!(detector.await_stopped(Duration::from_secs(5)).await);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(detector.state(), LoopState::Idle);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_states_and_health() {
    let store = Arc::new(MockStore::new());
    let rules = RuleSet::new(vec![rule("ssh", "auth-*")]).unwrap();
    let (mut detector, _rx) = ElasticDetectorBuilder::new()
        .config(config(1))
        .rules(rules)
        .build()
        .unwrap();

    assert_eq!(detector.health_check().await, HealthStatus::Unhealthy("not started".to_owned()));

    detector.start_with_store(Arc::clone(&store)).unwrap();
    assert_eq!(detector.state(), LoopState::Running);
    assert!(detector.health_check().await.is_healthy());

    detector.request_stop();
    assert_eq!(detector.state(), LoopState::StopRequested);
    assert!(matches!(detector.health_check().await, HealthStatus::Degraded(_)));

    assert!(detector.await_stopped(Duration::from_secs(60)).await);
    assert_eq!(detector.state(), LoopState::Stopped);
    assert!(detector.health_check().await.is_unhealthy());

    // 정지 요청은 멱등
    detector.request_stop();
    assert_eq!(detector.state(), LoopState::Stopped);
    detector.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn events_flow_to_builder_channel() {
    let store = Arc::new(MockStore::new());
    store.push_batch(
        "auth-*",
        vec![login_doc("10.0.0.1", "root"), login_doc("10.0.0.2", "admin")],
    );
    let rules = RuleSet::new(vec![rule("ssh", "auth-*")]).unwrap();
    let (mut detector, rx) = ElasticDetectorBuilder::new()
        .config(config(1))
        .rules(rules)
        .build()
        .unwrap();
    let mut rx = rx.unwrap();

    detector.start_with_store(Arc::clone(&store)).unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.get("src_ip"), Some("10.0.0.1"));
    assert_eq!(second.get("src_ip"), Some("10.0.0.2"));
    assert_eq!(
        first.to_string(),
        r#"event plugin_id="1830" plugin_sid="1001" src_ip="10.0.0.1" userdata1="10.0.0.1:root" username="root""#
    );

    detector.request_stop();
    assert!(detector.await_stopped(Duration::from_secs(60)).await);
    assert_eq!(store.inserts_for("ssh"), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_at_most_one_cycle() {
    let store = Arc::new(MockStore::new());
    let rules = RuleSet::new(vec![rule("a", "a-*"), rule("b", "b-*")]).unwrap();
    let (mut detector, _rx) = ElasticDetectorBuilder::new()
        .config(config(5))
        .rules(rules)
        .build()
        .unwrap();

    detector.start_with_store(Arc::clone(&store)).unwrap();
    wait_for_first_fetch(&store).await;

    let start = Instant::now();
    detector.request_stop();
    assert!(detector.await_stopped(Duration::from_secs(60)).await);
    assert!(start.elapsed() <= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_worker_sleeping_past_timeout() {
    let store = Arc::new(MockStore::new());
    let rules = RuleSet::new(vec![rule("slow", "slow-*")]).unwrap();
    let (mut detector, _rx) = ElasticDetectorBuilder::new()
        .config(config(100))
        .rules(rules)
        .build()
        .unwrap();

    detector.start_with_store(Arc::clone(&store)).unwrap();
    wait_for_first_fetch(&store).await;
    detector.request_stop();

    assert!(!detector.await_stopped(Duration::from_secs(1)).await);
    assert_eq!(detector.state(), LoopState::StopRequested);

    // 대기 중인 워커는 정지 타임아웃 뒤 중단되고 정지는 성공한다
    let start = Instant::now();
    detector.stop().await.unwrap();
    assert!(start.elapsed() <= Duration::from_secs(2));
    assert_eq!(detector.state(), LoopState::Stopped);
    assert!(detector.health_check().await.is_unhealthy());
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected() {
    let (mut detector, _rx) = ElasticDetectorBuilder::new()
        .config(config(1))
        .build()
        .unwrap();

    detector.start_with_store(Arc::new(MockStore::new())).unwrap();
    let err = detector
        .start_with_store(Arc::new(MockStore::new()))
        .unwrap_err();
    assert!(matches!(err, DetectorError::AlreadyStarted));
    assert!(detector.start().await.is_err());

    detector.request_stop();
    assert!(detector.await_stopped(Duration::from_secs(60)).await);
}

#[tokio::test(start_paused = true)]
async fn rule_file_to_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules.yml");
    tokio::fs::write(&path, RULES_YAML).await.unwrap();

    let outcome = RuleLoader::load_file(&path).await.unwrap();
    assert_eq!(outcome.rules.len(), 1);
    assert_eq!(outcome.rejected.len(), 1);

    let store = Arc::new(MockStore::new());
    store.push_batch("auth-*", vec![login_doc("192.168.1.100", "root")]);

    let (mut detector, rx) = ElasticDetectorBuilder::new()
        .config(config(1))
        .rules(outcome.rules)
        .build()
        .unwrap();
    let mut rx = rx.unwrap();
    detector.start_with_store(Arc::clone(&store)).unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.rule_name, "ssh_bruteforce");
    assert_eq!(event.get("plugin_sid"), Some("1001"));
    assert_eq!(event.get("username"), Some("root"));

    detector.request_stop();
    assert!(detector.await_stopped(Duration::from_secs(60)).await);
}
