//! End-to-end behaviour of the change watcher against the simulated driver

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use vci_device::simulated::{sample_device, SimulatedPlatform};
use vci_device::{DeviceError, HostPlatform, ObjectId, Version};
use vci_watcher::{
    channel, dispatch_queue, ChangeWatcher, Snapshot, SnapshotConsumer, WatchError, WatchEvent,
    WatcherBuilder, WatcherConfig, WatcherState,
};

const TIMEOUT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(150);

fn platform_with(count: u64) -> SimulatedPlatform {
    SimulatedPlatform::with_devices(Version::new(4, 0, 1), (0..count).map(sample_device))
}

fn ids(snapshot: &Snapshot) -> Vec<u64> {
    snapshot.iter().map(|d| d.id.as_u64()).collect()
}

#[test]
fn test_initial_snapshot_without_any_change() {
    let platform = platform_with(2);
    let (consumer, events) = channel();

    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    let snapshot = events.next_snapshot(TIMEOUT).expect("initial snapshot");
    assert_eq!(snapshot.sequence(), 1);
    assert_eq!(ids(&snapshot), vec![1000, 1001]);

    thread::sleep(QUIET);
    assert!(events.try_recv().is_none());

    watcher.join().unwrap();
}

#[test]
fn test_empty_directory_still_publishes() {
    let platform = platform_with(0);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    let snapshot = events.next_snapshot(TIMEOUT).expect("initial snapshot");
    assert!(snapshot.is_empty());
    assert!(snapshot.is_complete());

    watcher.join().unwrap();
}

#[test]
fn test_no_initial_scan_waits_for_a_change() {
    let platform = platform_with(1);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .config(WatcherConfig::without_initial_scan())
        .start(consumer)
        .unwrap();

    assert!(events.recv_timeout(QUIET).is_none());
    assert_eq!(platform.enumerations(), 0);

    platform.attach(sample_device(1));
    let snapshot = events.next_snapshot(TIMEOUT).expect("snapshot after attach");
    assert_eq!(ids(&snapshot), vec![1000, 1001]);

    watcher.join().unwrap();
}

#[test]
fn test_each_sequential_change_yields_one_snapshot() {
    let platform = platform_with(0);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    let initial = events.next_snapshot(TIMEOUT).expect("initial snapshot");
    assert!(initial.is_empty());

    for n in 1..=5u64 {
        platform.attach(sample_device(n));
        let snapshot = events.next_snapshot(TIMEOUT).expect("snapshot per change");
        assert_eq!(snapshot.sequence(), n + 1);
        assert_eq!(snapshot.len() as u64, n);
    }

    thread::sleep(QUIET);
    assert!(events.try_recv().is_none());
    assert_eq!(watcher.stats().published, 6);

    watcher.join().unwrap();
}

#[test]
fn test_detach_replaces_the_whole_list() {
    let platform = platform_with(3);
    let (consumer, events) = channel();
    let watcher =
        ChangeWatcher::start(platform.open_device_directory().unwrap(), consumer).unwrap();

    events.next_snapshot(TIMEOUT).expect("initial snapshot");
    platform.detach(ObjectId::new(1001));

    let snapshot = events.next_snapshot(TIMEOUT).expect("snapshot after detach");
    assert_eq!(ids(&snapshot), vec![1000, 1002]);

    watcher.join().unwrap();
}

#[test]
fn test_no_delivery_after_stop() {
    let platform = platform_with(1);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    events.next_snapshot(TIMEOUT).expect("initial snapshot");

    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert!(!watcher.request_rescan());

    platform.attach(sample_device(5));
    thread::sleep(QUIET);
    assert!(events.try_recv().is_none());

    watcher.stop();
    watcher.join().unwrap();
    assert_eq!(platform.open_directories(), 0);
}

#[test]
fn test_enumeration_failure_is_reported_and_watching_continues() {
    let platform = platform_with(1);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    events.next_snapshot(TIMEOUT).expect("initial snapshot");

    platform.fail_next_enumeration(DeviceError::Driver("controller reset".to_string()));
    platform.notify_change();

    match events.recv_timeout(TIMEOUT) {
        Some(WatchEvent::Error(WatchError::Enumeration(DeviceError::Driver(msg)))) => {
            assert_eq!(msg, "controller reset");
        }
        other => panic!("expected enumeration error, got {:?}", other),
    }

    platform.attach(sample_device(1));
    let snapshot = events.next_snapshot(TIMEOUT).expect("watcher keeps running");
    assert_eq!(snapshot.len(), 2);
    assert_eq!(watcher.stats().enumeration_failures, 1);

    watcher.join().unwrap();
}

#[test]
fn test_faulty_device_is_skipped_and_every_handle_released() {
    let platform = platform_with(3);
    platform.set_faulty(ObjectId::new(1001), true);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    let snapshot = events.next_snapshot(TIMEOUT).expect("initial snapshot");
    assert_eq!(ids(&snapshot), vec![1000, 1002]);
    assert_eq!(snapshot.failures().len(), 1);
    assert_eq!(snapshot.failures()[0].position, 1);

    watcher.join().unwrap();
    assert_eq!(platform.handles_acquired(), 3);
    assert_eq!(platform.outstanding_handles(), 0);
}

#[test]
fn test_signal_registration_failure_fails_start() {
    let platform = platform_with(1);
    platform.reject_signal_assignment(true);
    let (consumer, events) = channel();

    let result = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer);

    assert!(matches!(result, Err(WatchError::SignalRegistration(_))));
    assert_eq!(platform.open_directories(), 0);
    assert!(events.recv().is_none());
}

#[test]
fn test_invalid_config_fails_start() {
    let platform = platform_with(0);
    let (consumer, _events) = channel();
    let config = WatcherConfig {
        wait_timeout: Some(Duration::ZERO),
        ..Default::default()
    };

    let result = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .config(config)
        .start(consumer);

    assert!(matches!(result, Err(WatchError::InvalidConfig(_))));
}

#[test]
fn test_timeouts_never_enumerate() {
    let platform = platform_with(2);
    let (consumer, events) = channel();
    let config = WatcherConfig {
        initial_scan: false,
        ..WatcherConfig::with_heartbeat(Duration::from_millis(10))
    };
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .config(config)
        .start(consumer)
        .unwrap();

    thread::sleep(QUIET);

    let stats = watcher.stats();
    assert!(stats.timeouts > 0);
    assert_eq!(stats.cycles, 0);
    assert_eq!(platform.enumerations(), 0);
    assert!(events.try_recv().is_none());

    watcher.join().unwrap();
}

#[test]
fn test_runtime_version_is_surfaced() {
    let platform = SimulatedPlatform::new(Version::new(4, 0, 1));
    let (consumer, _events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    assert_eq!(watcher.runtime_version(), Some(Version::new(4, 0, 1)));
    watcher.join().unwrap();

    let (consumer, _events) = channel();
    let watcher =
        ChangeWatcher::start(platform.open_device_directory().unwrap(), consumer).unwrap();
    assert_eq!(watcher.runtime_version(), None);
}

#[test]
fn test_manual_rescan_request() {
    let platform = platform_with(1);
    let (consumer, events) = channel();
    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .start(consumer)
        .unwrap();

    events.next_snapshot(TIMEOUT).expect("initial snapshot");

    watcher.request_rescan();
    let again = events.next_snapshot(TIMEOUT).expect("rescan snapshot");
    assert_eq!(again.sequence(), 2);
    assert_eq!(again.len(), 1);

    watcher.join().unwrap();
}

#[test]
fn test_delivery_on_dispatch_queue_thread() {
    let platform = platform_with(1);
    let (consumer, events) = channel();
    let (dispatcher, queue) = dispatch_queue();

    let watcher = WatcherBuilder::from_platform(&platform)
        .unwrap()
        .context(dispatcher)
        .start(consumer)
        .unwrap();

    // Nothing arrives until the consumer thread pumps
    thread::sleep(Duration::from_millis(50));
    assert!(events.try_recv().is_none());

    assert!(queue.pump_timeout(TIMEOUT));
    let first = events.next_snapshot(TIMEOUT).expect("initial snapshot");
    assert_eq!(first.sequence(), 1);

    platform.attach(sample_device(1));
    assert!(queue.pump_timeout(TIMEOUT));
    let second = events.next_snapshot(TIMEOUT).expect("second snapshot");
    assert_eq!(second.sequence(), 2);

    watcher.stop();
    drop(queue);
    watcher.join().unwrap();
}

#[test]
fn test_stop_from_inside_callback() {
    struct StopOnFirst {
        watcher: Mutex<Option<Arc<ChangeWatcher>>>,
        seen: Mutex<Vec<u64>>,
    }

    impl SnapshotConsumer for StopOnFirst {
        fn on_snapshot(&self, snapshot: Snapshot) {
            self.seen.lock().push(snapshot.sequence());
            if let Some(watcher) = self.watcher.lock().take() {
                watcher.stop();
            }
        }

        fn on_enumeration_error(&self, _error: WatchError) {}
    }

    let platform = platform_with(1);
    let consumer = Arc::new(StopOnFirst {
        watcher: Mutex::new(None),
        seen: Mutex::new(Vec::new()),
    });

    let watcher = Arc::new(
        WatcherBuilder::from_platform(&platform)
            .unwrap()
            .config(WatcherConfig::without_initial_scan())
            .start(Arc::clone(&consumer))
            .unwrap(),
    );
    *consumer.watcher.lock() = Some(Arc::clone(&watcher));
    watcher.request_rescan();

    let deadline = std::time::Instant::now() + TIMEOUT;
    while watcher.is_running() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    platform.attach(sample_device(1));
    thread::sleep(QUIET);

    assert_eq!(*consumer.seen.lock(), vec![1]);
    assert_eq!(watcher.state(), WatcherState::Stopped);
}
