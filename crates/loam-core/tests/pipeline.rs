//! End-to-end scenarios through acquisition, aggregation, storage and upload

mod common;

use common::{ListSensor, NOON, ScriptedCollector, SlowLink, StepClock};
use embassy_futures::block_on;
use embassy_time::Duration;
use loam_core::app_state::SystemStatus;
use loam_core::network::{LinkCell, Upload};
use loam_core::pipeline::{Acquisition, Aggregation, PipelineQueues, TickOutcome};
use loam_core::records::Measurement;
use loam_core::storage::manager::StoreLock;
use loam_core::storage::{HEADER, MemoryStore, StorageManager};

const SEND_TIMEOUT: Duration = Duration::from_millis(20);
const NETWORK_TIMEOUT: Duration = Duration::from_millis(200);

fn probe(values: &[Option<f32>]) -> (ListSensor,) {
    (ListSensor::new(
        "ds18b20",
        &[Measurement::ProbeTemperature],
        values,
    ),)
}

#[test]
fn test_three_samples_reach_file_and_collector() {
    let queues = PipelineQueues::new();
    let status = SystemStatus::new();
    let store = StoreLock::new(MemoryStore::new());
    let link = LinkCell::new(SlowLink::default());

    let mut acquisition = Acquisition::new(
        StepClock { next: NOON },
        probe(&[Some(20.0), Some(22.0), None]),
        queues.raw.sender(),
        &status,
    );
    let mut aggregation = Aggregation::new(
        queues.raw.receiver(),
        queues.storage.sender(),
        Some(&queues.upload),
        SEND_TIMEOUT,
        &status,
    );
    let storage = StorageManager::new(
        &store,
        queues.storage.receiver(),
        &status,
        Duration::from_secs(1),
    );
    let mut upload = Upload::new(
        &link,
        ScriptedCollector::default(),
        &queues.upload,
        &status,
        "loam-test",
        NETWORK_TIMEOUT,
        Duration::from_millis(1),
    );

    for _ in 0..3 {
        assert_eq!(block_on(acquisition.tick()), TickOutcome::Queued);
    }

    let record = block_on(aggregation.tick()).expect("window has samples");
    assert_eq!(record.sample_count, 3, "a NaN reading still counts as a sample");
    let temps = record.channel(Measurement::ProbeTemperature);
    assert_eq!((temps.mean, temps.min, temps.max), (21.0, 20.0, 22.0));
    assert!(record.channel(Measurement::AirHumidity).mean.is_nan());

    block_on(storage.init());
    let stored = queues.storage.try_receive().expect("record handed to storage");
    block_on(storage.process_record(&stored)).expect("row written");

    {
        let store = block_on(store.lock());
        let file = store.file("20251016.CSV").expect("daily file");
        assert_eq!(file.lines[0], HEADER);
        assert_eq!(file.lines[1], "1760616000,1760616002,3,21.00,20.00,22.00,,,,,,,,,");
    }

    let report = block_on(upload.cycle()).expect("upload cycle");
    assert_eq!(report.published, 1);
    assert!(upload.collector().delivered[0].contains(
        "\"start\":1760616000,\"end\":1760616002,\"samples\":3,\"ds18b20\":{\"avg\":21.00,\"min\":20.00,\"max\":22.00}"
    ));

    let snapshot = status.snapshot();
    assert_eq!(snapshot.total_readings, 3);
    assert_eq!(snapshot.records_emitted, 1);
    assert_eq!(snapshot.rows_written, 1);
    assert_eq!(snapshot.uploads_ok, 1);
    assert!(snapshot.sd_card_ok);
}

#[test]
fn test_second_publish_failure_requeues_second_record() {
    let queues = PipelineQueues::new();
    let status = SystemStatus::new();
    let link = LinkCell::new(SlowLink::default());

    let mut acquisition = Acquisition::new(
        StepClock { next: NOON },
        probe(&[Some(18.0), Some(19.0)]),
        queues.raw.sender(),
        &status,
    );
    let mut aggregation = Aggregation::new(
        queues.raw.receiver(),
        queues.storage.sender(),
        Some(&queues.upload),
        SEND_TIMEOUT,
        &status,
    );

    // Two windows of one sample each
    for _ in 0..2 {
        block_on(acquisition.tick());
        block_on(aggregation.tick()).expect("record emitted");
    }
    assert_eq!(queues.upload.len(), 2);

    let collector = ScriptedCollector {
        outcomes: [true, false].into(),
        ..ScriptedCollector::default()
    };
    let mut upload = Upload::new(
        &link,
        collector,
        &queues.upload,
        &status,
        "loam-test",
        NETWORK_TIMEOUT,
        Duration::from_millis(1),
    );

    let report = block_on(upload.cycle()).expect("cycle reached the collector");
    assert!(report.interrupted);
    assert_eq!(queues.upload.len(), 1);
    assert_eq!(
        queues.upload.front().map(|r| r.window_start),
        Some(NOON + 1),
        "failed record is back at the front"
    );
    assert_eq!(status.uploads_ok(), 1);
    assert_eq!(status.upload_errors(), 1);
    assert!(!link.try_lock().expect("link released").up);
}

#[test]
fn test_storage_outage_does_not_affect_upload_backlog() {
    let queues = PipelineQueues::new();
    let status = SystemStatus::new();
    let mut card = MemoryStore::new();
    card.fail_mount = true;
    let store = StoreLock::new(card);

    let mut acquisition = Acquisition::new(
        StepClock { next: NOON },
        probe(&[Some(18.0)]),
        queues.raw.sender(),
        &status,
    );
    let mut aggregation = Aggregation::new(
        queues.raw.receiver(),
        queues.storage.sender(),
        Some(&queues.upload),
        SEND_TIMEOUT,
        &status,
    );
    let storage = StorageManager::new(
        &store,
        queues.storage.receiver(),
        &status,
        Duration::from_secs(1),
    );

    block_on(acquisition.tick());
    block_on(aggregation.tick()).unwrap();

    let stored = queues.storage.try_receive().unwrap();
    assert!(block_on(storage.process_record(&stored)).is_err());

    assert_eq!(status.sd_write_errors(), 1);
    assert!(!status.sd_card_ok());
    assert_eq!(queues.upload.len(), 1, "upload keeps its own copy");
}

#[test]
fn test_offline_cycle_keeps_backlog() {
    let queues = PipelineQueues::new();
    let status = SystemStatus::new();
    let link = LinkCell::new(SlowLink {
        offline: true,
        ..SlowLink::default()
    });

    let mut acquisition = Acquisition::new(
        StepClock { next: NOON },
        probe(&[Some(18.0)]),
        queues.raw.sender(),
        &status,
    );
    let mut aggregation = Aggregation::new(
        queues.raw.receiver(),
        queues.storage.sender(),
        Some(&queues.upload),
        SEND_TIMEOUT,
        &status,
    );
    let mut upload = Upload::new(
        &link,
        ScriptedCollector::default(),
        &queues.upload,
        &status,
        "loam-test",
        NETWORK_TIMEOUT,
        Duration::from_millis(1),
    );

    block_on(acquisition.tick());
    block_on(aggregation.tick()).unwrap();

    assert!(block_on(upload.cycle()).is_err());
    assert_eq!(queues.upload.len(), 1);
    assert!(upload.collector().delivered.is_empty());
    assert_eq!(status.upload_errors(), 1);
    assert!(!status.wifi_connected());
}
