//! Integration tests for rudder.
//!
//! These tests exercise selection, exclusion, recovery and load
//! accounting through the public API.

use rudder::config::BalancerConfig;
use rudder::{invoker_fn, BackendTarget, Balancer, BoxError, InvokeError, PolicyKind};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Backend that echoes the request along with its own address.
fn echo_target(address: &str) -> BackendTarget<String, String> {
    let addr = address.to_string();
    BackendTarget::new(
        address,
        invoker_fn(move |req: String| {
            let addr = addr.clone();
            async move { Ok(format!("addr: {addr}, req: {req}")) }
        }),
    )
}

/// Backend that counts hits and fails while `fail` is set.
fn flaky_target(
    address: &str,
    fail: Arc<AtomicBool>,
    hits: Arc<AtomicU32>,
) -> BackendTarget<String, String> {
    let addr = address.to_string();
    BackendTarget::new(
        address,
        invoker_fn(move |req: String| {
            let addr = addr.clone();
            let fail = Arc::clone(&fail);
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                if fail.load(Ordering::SeqCst) {
                    return Err::<String, BoxError>(format!("simulated outage at {addr}").into());
                }
                Ok(format!("addr: {addr}, req: {req}"))
            }
        }),
    )
}

/// Backend that parks every invocation on a semaphore until released.
fn gated_target(address: &str, gate: Arc<Semaphore>) -> BackendTarget<String, String> {
    let addr = address.to_string();
    BackendTarget::new(
        address,
        invoker_fn(move |req: String| {
            let addr = addr.clone();
            let gate = Arc::clone(&gate);
            async move {
                let _permit = gate.acquire().await.expect("gate closed");
                Ok(format!("addr: {addr}, req: {req}"))
            }
        }),
    )
}

/// Poll `condition` every few milliseconds until it holds.
async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_round_robin_cycles_through_all_backends() {
    let balancer = Balancer::new(
        PolicyKind::RoundRobin,
        vec![
            echo_target("app-1:9001"),
            echo_target("app-2:9002"),
            echo_target("app-3:9003"),
        ],
        BalancerConfig::default(),
    );

    let expected = ["app-1:9001", "app-2:9002", "app-3:9003"];
    for i in 0..6 {
        let response = balancer.invoke(format!("req-{i}")).await.expect("invoke");
        assert_eq!(
            response,
            format!("addr: {}, req: req-{i}", expected[i % 3]),
            "request {i} landed on the wrong backend"
        );
    }
}

#[tokio::test]
async fn test_load_tracks_in_flight_invocations() {
    let gate = Arc::new(Semaphore::new(0));
    let balancer = Arc::new(Balancer::new(
        PolicyKind::LoadAware,
        vec![gated_target("app-1:9001", Arc::clone(&gate))],
        BalancerConfig::default(),
    ));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let balancer = Arc::clone(&balancer);
        tasks.push(tokio::spawn(
            async move { balancer.invoke("req".to_string()).await },
        ));
    }

    // Every invocation is parked inside the backend
    wait_until(|| balancer.current_load("app-1:9001") == Some(20)).await;

    gate.add_permits(20);
    for task in tasks {
        task.await.expect("join").expect("invoke");
    }

    assert_eq!(balancer.current_load("app-1:9001"), Some(0));
}

#[tokio::test]
async fn test_exclusion_after_failure_threshold() {
    let fail = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicU32::new(0));
    let balancer = Balancer::new(
        PolicyKind::HealthAware,
        vec![flaky_target("app-1:9001", Arc::clone(&fail), Arc::clone(&hits))],
        BalancerConfig {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
            ..BalancerConfig::default()
        },
    );

    for _ in 0..3 {
        let err = balancer.invoke("req".to_string()).await.unwrap_err();
        assert_eq!(err.backend_address(), Some("app-1:9001"));
    }

    // Excluded now: no backend left, and the backend sees no more traffic
    let err = balancer.invoke("req".to_string()).await.unwrap_err();
    assert!(matches!(err, InvokeError::NoBackendAvailable));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_lazy_recovery_works_without_sweeper() {
    let fail = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicU32::new(0));
    let balancer = Balancer::new(
        PolicyKind::HealthAware,
        vec![flaky_target("app-1:9001", Arc::clone(&fail), hits)],
        BalancerConfig {
            failure_threshold: 1,
            cool_down: Duration::from_millis(100),
            sweep_interval: Duration::from_secs(3600),
        },
    );
    balancer.stop();

    let err = balancer.invoke("req".to_string()).await.unwrap_err();
    assert_eq!(err.backend_address(), Some("app-1:9001"));
    assert!(matches!(
        balancer.invoke("req".to_string()).await.unwrap_err(),
        InvokeError::NoBackendAvailable
    ));

    fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The selection path alone notices the elapsed cool-down
    let response = balancer.invoke("req".to_string()).await.expect("recovered");
    assert!(response.starts_with("addr: app-1:9001"));
}

#[tokio::test]
async fn test_sweeper_readmits_backend_without_traffic() {
    let fail = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicU32::new(0));
    let balancer = Balancer::new(
        PolicyKind::HealthAware,
        vec![flaky_target("app-1:9001", Arc::clone(&fail), Arc::clone(&hits))],
        BalancerConfig {
            failure_threshold: 1,
            cool_down: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(100),
        },
    );

    let _ = balancer.invoke("req".to_string()).await;
    assert!(!balancer.backend_status()[0].healthy);

    // backend_status reads the raw flag, so only the sweeper can flip
    // it back while no invocations run
    wait_until(|| balancer.backend_status()[0].healthy).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mixed_fleet_routes_around_persistent_failure() {
    let always = Arc::new(AtomicBool::new(true));
    let never = Arc::new(AtomicBool::new(false));
    let hits: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();

    let balancer = Balancer::new(
        PolicyKind::HealthAware,
        vec![
            flaky_target("app-1:9001", Arc::clone(&never), Arc::clone(&hits[0])),
            flaky_target("app-2:9002", Arc::clone(&always), Arc::clone(&hits[1])),
            flaky_target("app-3:9003", Arc::clone(&never), Arc::clone(&hits[2])),
        ],
        BalancerConfig {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
            ..BalancerConfig::default()
        },
    );

    let mut succeeded = 0;
    let mut failed = 0;
    for i in 0..30 {
        match balancer.invoke(format!("req-{i}")).await {
            Ok(_) => succeeded += 1,
            Err(_) => failed += 1,
        }
    }

    // app-2 fails three times, gets excluded, and the rest of the
    // traffic splits between the healthy backends
    assert_eq!(succeeded, 27);
    assert_eq!(failed, 3);
    assert_eq!(hits[1].load(Ordering::SeqCst), 3);
    assert_eq!(
        hits[0].load(Ordering::SeqCst) + hits[2].load(Ordering::SeqCst),
        27
    );

    let status = balancer.backend_status();
    assert!(status[0].healthy);
    assert!(!status[1].healthy);
    assert!(status[2].healthy);
}

#[tokio::test]
async fn test_load_aware_prefers_less_loaded_backend() {
    let gate = Arc::new(Semaphore::new(0));
    let balancer = Arc::new(Balancer::new(
        PolicyKind::LoadAware,
        vec![
            gated_target("app-1:9001", Arc::clone(&gate)),
            echo_target("app-2:9002"),
        ],
        BalancerConfig::default(),
    ));

    // Park one invocation on app-1 (idle tie-break picks it first)
    let task = {
        let balancer = Arc::clone(&balancer);
        tokio::spawn(async move { balancer.invoke("held".to_string()).await })
    };
    wait_until(|| balancer.current_load("app-1:9001") == Some(1)).await;

    // The idle backend wins while app-1 is busy
    let response = balancer.invoke("req".to_string()).await.expect("invoke");
    assert!(response.starts_with("addr: app-2:9002"));

    gate.add_permits(1);
    task.await.expect("join").expect("invoke");
}

#[tokio::test]
async fn test_aborted_invocation_releases_load() {
    let gate = Arc::new(Semaphore::new(0));
    let balancer = Arc::new(Balancer::new(
        PolicyKind::RoundRobin,
        vec![gated_target("app-1:9001", Arc::clone(&gate))],
        BalancerConfig::default(),
    ));

    let task = {
        let balancer = Arc::clone(&balancer);
        tokio::spawn(async move { balancer.invoke("req".to_string()).await })
    };

    wait_until(|| balancer.current_load("app-1:9001") == Some(1)).await;
    task.abort();
    let _ = task.await;

    assert_eq!(balancer.current_load("app-1:9001"), Some(0));
}

#[tokio::test]
async fn test_config_file_drives_balancer_construction() {
    use rudder::config::load_config;
    use std::io::Write as IoWrite;
    use tempfile::NamedTempFile;

    let config_content = r#"
policy: health_aware

balancer:
  failure_threshold: 2
  cool_down: 50ms
  sweep_interval: 1s

backends:
  - "app-1:9001"
  - "app-2:9002"
"#;

    let mut temp_file = NamedTempFile::new().expect("failed to create temp file");
    temp_file
        .write_all(config_content.as_bytes())
        .expect("failed to write config");

    let config = load_config(temp_file.path()).expect("failed to load config");
    assert_eq!(config.policy, PolicyKind::HealthAware);

    let targets: Vec<_> = config.backends.iter().map(|a| echo_target(a)).collect();
    let balancer = Balancer::new(config.policy, targets, config.balancer.clone());

    assert_eq!(balancer.policy_kind(), PolicyKind::HealthAware);
    let response = balancer.invoke("req".to_string()).await.expect("invoke");
    assert!(response.starts_with("addr: app-1:9001"));
}

#[tokio::test]
async fn test_metrics_reflect_invocations() {
    let fail = Arc::new(AtomicBool::new(true));
    let hits = Arc::new(AtomicU32::new(0));
    let balancer = Balancer::new(
        PolicyKind::RoundRobin,
        vec![
            echo_target("app-1:9001"),
            flaky_target("app-2:9002", fail, hits),
        ],
        BalancerConfig::default(),
    );

    let _ = balancer.invoke("a".to_string()).await;
    let _ = balancer.invoke("b".to_string()).await;

    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, balancer.metrics().registry()).unwrap();

    assert!(buffer.contains("rudder_requests_total"));
    assert!(buffer.contains("outcome=\"Success\""));
    assert!(buffer.contains("outcome=\"Failure\""));
    assert!(buffer.contains("rudder_request_duration_seconds"));
}
