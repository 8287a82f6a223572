use std::sync::Arc;
use std::time::Duration;

use hls_prefetch_engine::test_utils::{RecordingBackend, init_tracing, request, requests};
use hls_prefetch_engine::{
    EnvironmentMonitor, InterfaceType, NetworkClass, NoopPrefetchBackend, PathSnapshot,
    PrefetchController, PrefetchPolicy, QueueLoad,
};
use url::Url;

fn scenario_policy() -> PrefetchPolicy {
    PrefetchPolicy::new(2)
        .with_max_items(NetworkClass::Wifi, 4)
        .with_max_items(NetworkClass::Cellular, 1)
}

fn spawn_on_wifi(
    policy: PrefetchPolicy,
) -> (PrefetchController, Arc<RecordingBackend>) {
    init_tracing();
    let backend = RecordingBackend::new();
    let (controller, _handle) = PrefetchController::spawn_with_environment(
        backend.clone(),
        policy,
        NetworkClass::Wifi,
        false,
    );
    (controller, backend)
}

#[tokio::test]
async fn wifi_scenario_admits_four_and_keeps_two_running() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let urls = requests(5);

    controller.enqueue(urls.clone());
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.in_flight, urls[..2].to_vec());
    assert_eq!(snap.pending, urls[2..4].to_vec());
    assert_eq!(snap.stats.dropped, 1);

    assert!(backend.finish(&urls[0]));
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.in_flight, vec![urls[1].clone(), urls[2].clone()]);
    assert_eq!(snap.pending, vec![urls[3].clone()]);

    assert!(backend.finish(&urls[1]));
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.load(), QueueLoad { pending: 0, in_flight: 2 });

    backend.finish_all();
    controller.wait_idle().await.expect("controller running");
    // The dropped fifth URL was never started.
    assert!(!backend.started().contains(&urls[4]));
}

#[tokio::test]
async fn wifi_to_cellular_with_three_in_flight_cancels_everything() {
    let policy = PrefetchPolicy::new(3)
        .with_max_items(NetworkClass::Wifi, 4)
        .with_max_items(NetworkClass::Cellular, 1);
    let (controller, backend) = spawn_on_wifi(policy);

    controller.enqueue(requests(4));
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.load(), QueueLoad { pending: 1, in_flight: 3 });

    controller.network_class_changed(NetworkClass::Cellular);
    let snap = controller.snapshot().await.expect("controller running");
    assert!(snap.is_idle());
    assert_eq!(snap.network_class, NetworkClass::Cellular);
    assert_eq!(backend.cancel_all_calls(), 1);
    assert_eq!(backend.cancelled().len(), 3);
}

#[tokio::test]
async fn low_power_without_permission_drains_everything() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    controller.enqueue(requests(4));

    controller.low_power_mode_changed(true);
    controller.wait_idle().await.expect("controller running");

    let snap = controller.snapshot().await.expect("controller running");
    assert!(snap.low_power_mode_enabled);
    assert!(snap.is_idle());
    assert!(backend.active().is_empty());

    controller.enqueue(requests(2));
    let snap = controller.snapshot().await.expect("controller running");
    assert!(snap.is_idle());
}

#[tokio::test]
async fn zero_budget_drops_everything() {
    let policy = scenario_policy().with_max_items(NetworkClass::Wifi, 0);
    let (controller, backend) = spawn_on_wifi(policy);

    controller.enqueue(requests(3));
    let snap = controller.snapshot().await.expect("controller running");
    assert!(snap.is_idle());
    assert_eq!(snap.stats.dropped, 3);
    assert!(backend.started().is_empty());
}

#[tokio::test]
async fn reapplying_the_same_policy_changes_nothing() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    controller.enqueue(requests(4));

    let policy = scenario_policy().with_max_items(NetworkClass::Wifi, 3);
    controller.set_policy(policy.clone());
    let first = controller.snapshot().await.expect("controller running");
    let cancels = backend.cancel_all_calls();

    controller.set_policy(policy);
    let second = controller.snapshot().await.expect("controller running");

    assert_eq!(first, second);
    assert_eq!(backend.cancel_all_calls(), cancels);
    assert_eq!(backend.started().len(), 2);
}

#[tokio::test]
async fn re_enqueueing_never_starts_a_url_twice() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let urls = requests(3);

    for _ in 0..5 {
        controller.enqueue(urls.clone());
    }
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.load(), QueueLoad { pending: 1, in_flight: 2 });
    assert!(backend.start_counts().values().all(|count| *count == 1));
}

#[tokio::test]
async fn cancelled_url_can_be_prefetched_again() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let url = request("https://cdn.example.com/replay/index.m3u8");

    controller.enqueue([url.clone()]);
    controller.cancel_all();
    controller.enqueue([url.clone()]);

    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.in_flight, vec![url.clone()]);
    assert_eq!(backend.start_counts().get(&url), Some(&2));

    // The completion of the cancelled start arrives late and is ignored.
    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.in_flight, vec![url.clone()]);
    assert_eq!(snap.stats.stale_completions, 1);

    assert!(backend.finish(&url));
    controller.wait_idle().await.expect("controller running");
}

#[tokio::test]
async fn prefetch_filters_to_remote_playlists() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let urls = [
        "file:///var/mobile/cache/local.m3u8",
        "https://cdn.example.com/a/index.m3u8",
        "https://cdn.example.com/a/poster.jpg",
        "https://cdn.example.com/b/index.m3u8",
        "https://cdn.example.com/c/index.m3u8",
    ]
    .into_iter()
    .map(|s| Url::parse(s).expect("valid url"));

    controller.prefetch(urls, 2);
    let snap = controller.snapshot().await.expect("controller running");

    let started: Vec<String> = backend
        .started()
        .iter()
        .map(|r| r.url().to_string())
        .collect();
    assert_eq!(
        started,
        vec![
            "https://cdn.example.com/a/index.m3u8",
            "https://cdn.example.com/b/index.m3u8",
        ]
    );
    assert!(snap.pending.is_empty());

    controller.prefetch(
        [Url::parse("https://cdn.example.com/d/index.m3u8").expect("valid url")],
        0,
    );
    controller.cancel_prefetch();
    let snap = controller.snapshot().await.expect("controller running");
    assert!(snap.is_idle());
    assert_eq!(snap.stats.admitted, 2);
}

#[tokio::test]
async fn noop_backend_drains_the_queue() {
    init_tracing();
    let (controller, _handle) = PrefetchController::spawn_with_environment(
        Arc::new(NoopPrefetchBackend),
        scenario_policy(),
        NetworkClass::Wifi,
        false,
    );

    controller.enqueue(requests(4));
    tokio::time::timeout(Duration::from_secs(5), controller.wait_idle())
        .await
        .expect("queue drains")
        .expect("controller running");

    let stats = controller.stats().snapshot();
    assert_eq!(stats.started, 4);
    assert_eq!(stats.finished, 4);
}

#[tokio::test]
async fn environment_monitor_forwards_only_changes() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let (monitor, _monitor_handle) =
        EnvironmentMonitor::spawn(controller.clone(), NetworkClass::Wifi, false);

    controller.enqueue(requests(3));
    let before = controller.snapshot().await.expect("controller running");
    assert_eq!(before.load(), QueueLoad { pending: 1, in_flight: 2 });

    // Same class again: nothing happens.
    monitor.path_updated(PathSnapshot::satisfied(vec![InterfaceType::Wifi]));
    monitor.path_updated(PathSnapshot::satisfied(vec![InterfaceType::Cellular]));

    let mut load = controller.subscribe_load();
    tokio::time::timeout(Duration::from_secs(5), load.wait_for(QueueLoad::is_idle))
        .await
        .expect("cellular downgrade applied")
        .expect("controller running");

    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.network_class, NetworkClass::Cellular);
    assert_eq!(backend.cancel_all_calls(), 1);

    monitor.low_power_mode_updated(true);
    monitor.low_power_mode_updated(true);
    monitor.stop();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_work() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    controller.enqueue(requests(2));
    controller.snapshot().await.expect("controller running");

    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.is_running() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("worker stops");

    assert_eq!(backend.cancel_all_calls(), 1);
    assert!(controller.snapshot().await.is_err());
}

#[tokio::test]
async fn readings_after_monitor_stop_are_dropped() {
    let (controller, backend) = spawn_on_wifi(scenario_policy());
    let (monitor, monitor_handle) =
        EnvironmentMonitor::spawn(controller.clone(), NetworkClass::Wifi, false);
    controller.enqueue(requests(2));

    monitor.stop();
    monitor_handle.await.expect("monitor task exits cleanly");
    assert!(!monitor.is_running());

    monitor.path_updated(PathSnapshot::unsatisfied());
    monitor.low_power_mode_updated(true);

    let snap = controller.snapshot().await.expect("controller running");
    assert_eq!(snap.network_class, NetworkClass::Wifi);
    assert!(!snap.low_power_mode_enabled);
    assert_eq!(snap.load(), QueueLoad { pending: 0, in_flight: 2 });
    assert_eq!(backend.cancel_all_calls(), 0);
}
