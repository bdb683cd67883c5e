mod common;

use common::{Harness, BASE_EPOCH};
use embassy_futures::block_on;
use hal_abstractions::{NetworkError, SensorError};
use meter_core::config::{CONTROL_TOPIC, READINGS_TOPIC};
use meter_core::network::{ConnectionStage, OutboundRecord};
use meter_core::{
    CycleOutcome, Device, DeviceConfig, DeviceParts, Error, LoggingControlHandler, Operation,
    RetryPolicy,
};

fn decode(payload: &[u8]) -> OutboundRecord {
    let (record, _) = serde_json_core::from_slice::<OutboundRecord>(payload).unwrap();
    record
}

fn started(harness: &Harness) -> common::TestDevice {
    let mut device = harness.device(DeviceConfig::default());
    block_on(device.start()).unwrap();
    device
}

#[test]
fn test_end_to_end_reading() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    let outcome = block_on(device.run_cycle()).unwrap();
    let CycleOutcome::Published(reading) = outcome else {
        panic!("expected a published reading, got {outcome:?}");
    };

    // 200 counts * 3.3 V / 1024 = 0.6445 Vpp
    assert!((reading.rms_current_amps - 2.2434).abs() < 1e-3);
    assert_eq!(reading.power_watts, 538);
    assert_eq!(reading.energy_watt_hours, 0);
    assert_eq!(reading.timestamp, BASE_EPOCH + 1);

    let published = harness.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, READINGS_TOPIC);

    let record = decode(&published[0].1);
    assert_eq!(record.time, BASE_EPOCH + 1);
    assert!((record.rms_current - 2.2434).abs() < 1e-3);
    assert_eq!(record.power, 538);
    assert_eq!(record.watt_hours, 0);
}

#[test]
fn test_energy_accumulates_across_cycles() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    // Window 1000 ms + cycle pause 500 ms: 538 * 1500 / 216000 = 3 per cycle
    let mut totals = Vec::new();
    for _ in 0..4 {
        match block_on(device.run_cycle()).unwrap() {
            CycleOutcome::Published(reading) => totals.push(reading.energy_watt_hours),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(totals, [0, 3, 6, 9]);
    assert_eq!(device.energy_watt_hours(), 9);
}

#[test]
fn test_dead_probe_reports_offset_only() {
    let harness = Harness::new();
    harness.set_samples(&[512]);
    let mut device = started(&harness);

    block_on(device.run_cycle()).unwrap();
    let outcome = block_on(device.run_cycle()).unwrap();
    let CycleOutcome::Published(reading) = outcome else {
        panic!("expected a published reading, got {outcome:?}");
    };

    assert!((reading.rms_current_amps + 0.035).abs() < 1e-6);
    assert_eq!(reading.power_watts, -8);
    // -8 * 1500 / 216000 truncates to 0
    assert_eq!(reading.energy_watt_hours, 0);
}

#[test]
fn test_failed_conversions_are_skipped() {
    let harness = Harness::new();
    *harness.samples.borrow_mut() = vec![Ok(400), Err(SensorError::ConversionFailed), Ok(600)];
    let mut device = started(&harness);

    let CycleOutcome::Published(reading) = block_on(device.run_cycle()).unwrap() else {
        panic!("expected a published reading");
    };
    assert_eq!(reading.power_watts, 538);
}

#[test]
fn test_start_runs_full_sequence() {
    let harness = Harness::new();
    harness.link.borrow_mut().checks_until_joined = 3;
    harness.session.borrow_mut().connect_failures = 2;
    let device = started(&harness);

    assert_eq!(device.connection_state().stage(), ConnectionStage::Ready);
    assert_eq!(device.connection_state().sequences_completed(), 1);
    assert!(device.time_base().is_synced());

    assert_eq!(harness.link.borrow().join_requests, 1);
    assert_eq!(harness.time.borrow().requests, 1);

    let session = harness.session.borrow();
    assert_eq!(session.credentials_installed, 1);
    assert_eq!(session.installed_trust_anchor, b"trust-anchor");
    assert_eq!(session.connect_calls, 3);
    assert_eq!(
        session.last_endpoint,
        Some(("iot.example.com".into(), 8883, "energy-meter".into()))
    );
    assert_eq!(session.subscriptions, [CONTROL_TOPIC]);
}

#[test]
fn test_start_waits_for_plausible_time() {
    let harness = Harness::new();
    harness
        .time
        .borrow_mut()
        .scripted
        .extend([Ok(0), Ok(1_000), Err(NetworkError::Timeout)]);
    let device = started(&harness);

    assert_eq!(harness.time.borrow().requests, 4);
    assert!(device.time_base().is_synced());
    // Three failed requests, 500 ms apart
    assert_eq!(device.time_base().now(&harness.clock).unwrap(), BASE_EPOCH + 1);
}

#[test]
fn test_start_is_idempotent() {
    let harness = Harness::new();
    let mut device = started(&harness);

    block_on(device.start()).unwrap();
    assert_eq!(harness.session.borrow().connect_calls, 1);
    assert_eq!(harness.time.borrow().requests, 1);
    assert_eq!(device.connection_state().sequences_completed(), 1);
}

#[test]
fn test_session_loss_resequences_and_drops_reading() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    block_on(device.run_cycle()).unwrap();
    harness.session.borrow_mut().connected = false;

    let outcome = block_on(device.run_cycle()).unwrap();
    assert_eq!(outcome, CycleOutcome::Resequenced);
    assert_eq!(harness.published().len(), 1);

    let state = *device.connection_state();
    assert_eq!(state.stage(), ConnectionStage::Ready);
    assert_eq!(state.losses(), 1);
    assert_eq!(state.sequences_completed(), 2);

    // Time is re-synchronized as part of every sequence
    assert_eq!(harness.time.borrow().requests, 2);
    assert_eq!(harness.session.borrow().connect_calls, 2);
    assert_eq!(harness.session.borrow().credentials_installed, 2);
    // Link was still up, no new join request
    assert_eq!(harness.link.borrow().join_requests, 1);

    // The dropped cycle still counted towards the energy total
    let CycleOutcome::Published(reading) = block_on(device.run_cycle()).unwrap() else {
        panic!("expected a published reading");
    };
    assert_eq!(reading.energy_watt_hours, 6);
}

#[test]
fn test_poll_failure_resequences() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    harness.session.borrow_mut().fail_poll = true;
    let outcome = block_on(device.run_cycle());
    // Poll keeps failing, but a fresh connect succeeds
    assert_eq!(outcome, Ok(CycleOutcome::Resequenced));
    assert_eq!(device.connection_state().losses(), 1);
    assert!(harness.published().is_empty());
}

#[test]
fn test_link_loss_rejoins_network() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    harness.link.borrow_mut().joined = false;
    assert_eq!(block_on(device.run_cycle()), Ok(CycleOutcome::Resequenced));
    assert_eq!(harness.link.borrow().join_requests, 2);
    assert_eq!(device.connection_state().stage(), ConnectionStage::Ready);

    assert!(matches!(
        block_on(device.run_cycle()),
        Ok(CycleOutcome::Published(_))
    ));
}

#[test]
fn test_publish_failure_is_dropped() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    harness.session.borrow_mut().fail_publish = true;
    let outcome = block_on(device.run_cycle()).unwrap();
    assert!(matches!(
        outcome,
        CycleOutcome::PublishFailed {
            error: Error::Network(_),
            ..
        }
    ));
    assert!(harness.published().is_empty());
    assert_eq!(device.connection_state().stage(), ConnectionStage::Ready);

    harness.session.borrow_mut().fail_publish = false;
    let CycleOutcome::Published(reading) = block_on(device.run_cycle()).unwrap() else {
        panic!("expected a published reading");
    };
    // No retransmission: only the new reading goes out
    assert_eq!(harness.published().len(), 1);
    assert_eq!(decode(&harness.published()[0].1).time, reading.timestamp);
}

#[test]
fn test_control_message_reaches_handler() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    harness
        .session
        .borrow_mut()
        .inbound
        .push_back((CONTROL_TOPIC.into(), br#"{"message":"reboot"}"#.to_vec()));
    block_on(device.run_cycle()).unwrap();
    assert_eq!(device.control_handler().received(), 1);
    assert_eq!(device.control_handler().malformed(), 0);

    harness
        .session
        .borrow_mut()
        .inbound
        .push_back((CONTROL_TOPIC.into(), b"not json".to_vec()));
    let outcome = block_on(device.run_cycle()).unwrap();
    assert!(matches!(outcome, CycleOutcome::Published(_)));
    assert_eq!(device.control_handler().received(), 2);
    assert_eq!(device.control_handler().malformed(), 1);
}

#[test]
fn test_cycle_before_start_connects_first() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = harness.device(DeviceConfig::default());

    assert_eq!(block_on(device.run_cycle()), Ok(CycleOutcome::Resequenced));
    assert!(harness.published().is_empty());
    assert_eq!(device.connection_state().stage(), ConnectionStage::Ready);
    // Not Ready before, so not counted as a loss
    assert_eq!(device.connection_state().losses(), 0);
}

#[test]
fn test_bounded_time_sync_gives_up() {
    let harness = Harness::new();
    harness.time.borrow_mut().fixed = Some(42);
    let mut config = DeviceConfig::default();
    config.time.retry = RetryPolicy::bounded(100, 3);
    let mut device = harness.device(config);

    assert_eq!(
        block_on(device.start()),
        Err(Error::RetriesExhausted(Operation::TimeSync))
    );
    assert_eq!(harness.time.borrow().requests, 3);
    assert_eq!(device.connection_state().stage(), ConnectionStage::Disconnected);
    assert_eq!(harness.session.borrow().connect_calls, 0);
}

#[test]
fn test_utc_offset_applied_to_timestamps() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut config = DeviceConfig::default();
    config.time.utc_offset_secs = 3 * 3600;
    let mut device = harness.device(config);
    block_on(device.start()).unwrap();

    let CycleOutcome::Published(reading) = block_on(device.run_cycle()).unwrap() else {
        panic!("expected a published reading");
    };
    assert_eq!(reading.timestamp, BASE_EPOCH + 1 + 3 * 3600);
}

fn published_timestamp(device: &mut common::TestDevice) -> u64 {
    match block_on(device.run_cycle()).unwrap() {
        CycleOutcome::Published(reading) => reading.timestamp,
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn test_time_base_refreshed_every_interval() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);
    assert_eq!(harness.time.borrow().requests, 1);

    // Server moves 1000 s ahead of the running anchor
    harness.time.borrow_mut().fixed = Some(BASE_EPOCH + 1000);

    // Cycles start every 1500 ms; the 40 before the 60 s mark keep the anchor
    for cycle in 0..40u64 {
        let expected = BASE_EPOCH + (cycle * 1500 + 1000) / 1000;
        assert_eq!(published_timestamp(&mut device), expected);
    }
    assert_eq!(harness.time.borrow().requests, 1);

    // Cycle 40 starts at 60 s: re-anchored to the server's answer
    assert_eq!(published_timestamp(&mut device), BASE_EPOCH + 1001);
    assert_eq!(harness.time.borrow().requests, 2);

    // Server steps back; the next refresh follows it
    harness.time.borrow_mut().fixed = Some(BASE_EPOCH + 500);
    for _ in 41..80 {
        published_timestamp(&mut device);
    }
    assert_eq!(harness.time.borrow().requests, 2);

    assert_eq!(published_timestamp(&mut device), BASE_EPOCH + 501);
    assert_eq!(harness.time.borrow().requests, 3);
}

#[test]
fn test_failed_refresh_keeps_anchor() {
    let harness = Harness::new();
    harness.set_samples(&[400, 600]);
    let mut device = started(&harness);

    for _ in 0..40 {
        published_timestamp(&mut device);
    }
    harness
        .time
        .borrow_mut()
        .scripted
        .push_back(Err(NetworkError::Timeout));

    // 61 s after the anchor, still counted from the original sync
    assert_eq!(published_timestamp(&mut device), BASE_EPOCH + 61);
    assert_eq!(harness.time.borrow().requests, 2);
    assert_eq!(device.connection_state().stage(), ConnectionStage::Ready);
}

#[test]
fn test_invalid_config_rejected() {
    let harness = Harness::new();
    let mut config = DeviceConfig::default();
    config.calibration.window_ms = 0;

    let parts = DeviceParts {
        adc: harness.adc(),
        clock: harness.clock.clone(),
        delay: harness.delay(),
        link: harness.link(),
        time_source: harness.time_source(),
        session: harness.session(),
        control: LoggingControlHandler::new(),
        credentials: common::CREDENTIALS,
    };
    assert!(matches!(Device::new(parts, config), Err(Error::InvalidConfig(_))));
}
