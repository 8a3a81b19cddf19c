//! Device List - live table of attached interfaces
//!
//! Mirrors a desktop device list: the runtime version is shown once, then the
//! table is redrawn on the main thread every time the device list changes.
//! A background thread plugs simulated interfaces in and out.
//!
//! Run with: cargo run -p vci-enumerator-watcher --example device_list
//! Pass `--json` to print each snapshot as JSON instead of a table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use vci_device::simulated::{sample_device, SimulatedPlatform};
use vci_device::{ObjectId, Version};
use vci_watcher::logging::init_logging_from_env;
use vci_watcher::{
    dispatch_queue, Snapshot, SnapshotConsumer, SnapshotDiff, WatchError, WatcherBuilder,
};

const HEADERS: [&str; 7] = [
    "VCIID",
    "Driver Version",
    "Hardware Version",
    "Device Class",
    "Hardware ID",
    "Description",
    "Manufacturer",
];

struct DeviceTable {
    json: bool,
    previous: Mutex<Option<Snapshot>>,
}

impl DeviceTable {
    fn render(&self, snapshot: &Snapshot) {
        let rows: Vec<[String; 7]> = snapshot
            .iter()
            .map(|d| {
                [
                    d.id.to_string(),
                    d.driver_version.to_string(),
                    d.hardware_version.to_string(),
                    d.device_class.to_string(),
                    d.hardware_id.to_string(),
                    d.description.clone(),
                    d.manufacturer.clone(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let line = |cells: &[&str]| {
            cells
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("  ")
        };

        println!("\n--- snapshot #{} ({} devices) ---", snapshot.sequence(), snapshot.len());
        println!("{}", line(&HEADERS));
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            println!("{}", line(&cells));
        }
        for failure in snapshot.failures() {
            println!("  (skipped device at position {}: {})", failure.position, failure.error);
        }
    }
}

impl SnapshotConsumer for DeviceTable {
    fn on_snapshot(&self, snapshot: Snapshot) {
        if self.json {
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to serialize snapshot: {}", e),
            }
        } else {
            if let Some(previous) = self.previous.lock().as_ref() {
                let diff = SnapshotDiff::between(previous, &snapshot);
                for device in &diff.added {
                    println!("+ {} {}", device.id, device.description);
                }
                for device in &diff.removed {
                    println!("- {} {}", device.id, device.description);
                }
            }
            self.render(&snapshot);
        }

        *self.previous.lock() = Some(snapshot);
    }

    fn on_enumeration_error(&self, error: WatchError) {
        eprintln!("Device list could not be refreshed: {}", error);
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let json = std::env::args().any(|arg| arg == "--json");
    let platform =
        SimulatedPlatform::with_devices(Version::new(4, 0, 1), (0..2).map(sample_device));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

    // Deliveries are marshaled onto this thread through the queue
    let (dispatcher, queue) = dispatch_queue();
    let watcher = WatcherBuilder::from_platform(&platform)?
        .context(dispatcher)
        .start(DeviceTable {
            json,
            previous: Mutex::new(None),
        })?;

    match watcher.runtime_version() {
        Some(version) => println!("VCI runtime version: {}", version),
        None => println!("VCI runtime version: unknown"),
    }

    let hotplug = {
        let platform = platform.clone();
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut next = 2u64;
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(2));
                if next % 3 == 0 {
                    platform.detach(ObjectId::new(1000 + next / 2));
                } else {
                    platform.attach(sample_device(next));
                }
                next += 1;
            }
        })
    };

    println!("Watching for device changes, press Ctrl+C to exit");
    while running.load(Ordering::SeqCst) {
        queue.pump_timeout(Duration::from_millis(200));
    }

    watcher.stop();
    drop(queue);
    let stats = watcher.stats();
    watcher.join()?;
    let _ = hotplug.join();

    println!(
        "\nStopped after {} snapshots ({} enumeration failures)",
        stats.published, stats.enumeration_failures
    );
    Ok(())
}
