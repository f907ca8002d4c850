//! End-to-end tests of the PIB control loop on simulated hardware.

use chrono::{TimeZone, Utc};
use strato_pib::actions::FLAG_STALE;
use strato_pib::hardware::capabilities::{Pin, Severity, Slot};
use strato_pib::hardware::mock::{
    ManualClock, MockDeviceLink, MockGpio, MockProfiler, MockScheduler, MockTelemetry,
};
use strato_pib::params::{MemoryStore, PibParams, TIME_TRIGGER_DISARMED};
use strato_pib::telemetry::{MOTION_SYNC, MOTION_TM_SIZE, PIB_EEPROM_LABEL};
use strato_pib::{Action, Collaborators, MotionType, Pib};

struct Harness {
    pib: Pib,
    mcb: MockDeviceLink,
    profiler: MockProfiler,
    scheduler: MockScheduler,
    telemetry: MockTelemetry,
    gpio: MockGpio,
    clock: ManualClock,
}

fn harness(params: PibParams) -> Harness {
    let mcb = MockDeviceLink::new();
    let profiler = MockProfiler::new();
    let scheduler = MockScheduler::new();
    let telemetry = MockTelemetry::new();
    let gpio = MockGpio::new();
    // 12:03 keeps the status cadence quiet until a test moves the clock
    let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 6, 1, 12, 3, 0).unwrap());

    let mut pib = Pib::new(Collaborators {
        mcb: Box::new(mcb.clone()),
        profiler: Box::new(profiler.clone()),
        scheduler: Box::new(scheduler.clone()),
        telemetry: Box::new(telemetry.clone()),
        gpio: Box::new(gpio.clone()),
        clock: Box::new(clock.clone()),
        store: Box::new(MemoryStore::new(params)),
    });
    pib.setup().unwrap();

    Harness {
        pib,
        mcb,
        profiler,
        scheduler,
        telemetry,
        gpio,
        clock,
    }
}

fn record(seed: u8) -> Vec<u8> {
    vec![seed; MOTION_TM_SIZE]
}

#[test]
fn test_setup_pin_levels() {
    let h = harness(PibParams::default());
    assert_eq!(h.gpio.level(Pin::ForceOff232), Some(true));
    assert_eq!(h.gpio.level(Pin::ForceOn232), Some(true));
    assert_eq!(h.gpio.level(Pin::SafePin), Some(false));
    assert_eq!(h.gpio.level(Pin::PuPowerEnable), Some(false));
}

#[test]
fn test_raised_deploy_starts_on_next_iteration() {
    let mut h = harness(PibParams::default());
    assert!(h.pib.raise_action(Action::ReelOut.index()));
    h.pib.run_iteration();

    assert_eq!(h.pib.motion().current(), MotionType::ReelOut);
    assert_eq!(h.mcb.commands().len(), 1);
    assert!(!h.pib.store().params().pu_docked);
    assert_eq!(h.gpio.level(Pin::PuPowerEnable), Some(false));
    assert!(!h.pib.flags().is_set(Action::ReelOut.index()));
}

#[test]
fn test_out_of_range_raise_is_rejected() {
    let mut h = harness(PibParams::default());
    assert!(!h.pib.raise_action(200));
    h.pib.run_iteration();
    assert!(h.mcb.commands().is_empty());
    assert!(h.telemetry.sent().is_empty());
}

#[test]
fn test_motion_command_expires_while_busy() {
    let mut h = harness(PibParams::default());
    h.pib.raise(Action::ReelIn);
    h.pib.run_iteration();
    assert_eq!(h.pib.motion().current(), MotionType::ReelIn);

    h.pib.raise(Action::Dock);
    for _ in 0..FLAG_STALE {
        h.pib.run_iteration();
    }
    assert!(!h.pib.flags().is_set(Action::Dock.index()));

    h.pib.motion_complete();
    h.pib.run_iteration();
    assert_eq!(h.pib.motion().current(), MotionType::None);
    assert_eq!(h.mcb.commands().len(), 1);
}

#[test]
fn test_buffered_motion_session_end_to_end() {
    let mut h = harness(PibParams::default());
    h.pib.raise(Action::ReelIn);
    h.pib.run_iteration();

    h.clock.advance_millis(1_500);
    assert!(h.pib.add_motion_data(&record(1)));
    h.clock.advance_millis(1_000);
    assert!(h.pib.add_motion_data(&record(2)));
    assert!(h.pib.send_motion_packet(Severity::Fine, "Finished retracting"));
    h.pib.motion_complete();

    let sent = h.telemetry.sent();
    assert_eq!(sent.len(), 1);
    let payload = &sent[0].payload;
    let epoch = Utc
        .with_ymd_and_hms(2024, 6, 1, 12, 3, 0)
        .unwrap()
        .timestamp() as u32;
    assert_eq!(&payload[..4], &epoch.to_be_bytes());
    assert_eq!(payload[4], MOTION_SYNC);
    assert_eq!(&payload[5..7], &15u16.to_be_bytes());
    assert_eq!(payload.len(), 7 + 2 * MOTION_TM_SIZE);
    assert_eq!(sent[0].severity(Slot::Second), Some(Severity::NoMessage));
    assert_eq!(sent[0].severity(Slot::Third), Some(Severity::NoMessage));
    assert!(!sent[0].ack_required);
}

#[test]
fn test_real_time_motion_session_end_to_end() {
    let mut h = harness(PibParams {
        real_time_mcb: true,
        ..PibParams::default()
    });
    h.pib.raise(Action::Dock);
    h.pib.run_iteration();
    assert!(h.pib.motion().is_dock_ongoing());

    for seed in 0..4 {
        assert!(h.pib.add_motion_data(&record(seed)));
    }
    let sent = h.telemetry.sent();
    assert_eq!(sent.len(), 4);
    for (i, packet) in sent.iter().enumerate() {
        assert_eq!(packet.payload.len(), MOTION_TM_SIZE);
        assert_eq!(
            packet.annotation(Slot::First),
            Some(format!("MCB TM Packet {}", i + 1).as_str())
        );
    }
}

#[test]
fn test_schedule_then_begin_profile_deploys() {
    let mut h = harness(PibParams {
        num_profiles: 2,
        profile_period: 1800,
        time_trigger: 42,
        ..PibParams::default()
    });
    h.pib.raise(Action::ScheduleProfiles);
    h.pib.run_iteration();
    assert_eq!(
        h.scheduler.entries(),
        vec![(Action::BeginProfile, 5), (Action::BeginProfile, 1805)]
    );
    assert_eq!(h.pib.store().params().time_trigger, TIME_TRIGGER_DISARMED);

    // the scheduler fires the first profile
    h.pib.raise(Action::BeginProfile);
    h.pib.run_iteration();
    assert_eq!(h.profiler.requests().len(), 1);
    assert_eq!(h.pib.motion().current(), MotionType::None);
    assert!(h.pib.flags().is_set(Action::ReelOut.index()));

    h.pib.run_iteration();
    assert_eq!(h.pib.motion().current(), MotionType::ReelOut);
}

#[test]
fn test_status_cadence_sends_tsen() {
    let mut h = harness(PibParams::default());
    h.pib.update_pu_status(strato_pib::telemetry::PuStatus {
        time: 99,
        v_battery: 16.5,
        i_charge: 0.25,
        therm1: 10.0,
        therm2: 11.0,
        heater_stat: 0,
    });

    h.pib.run_iteration();
    assert!(!h.pib.flags().is_set(Action::SendStatus.index()));

    // 12:10 is due; the flag is raised this pass and handled on the next
    h.clock.advance_secs(7 * 60);
    h.pib.run_iteration();
    assert!(h.pib.flags().is_set(Action::SendStatus.index()));
    assert!(h.telemetry.sent().is_empty());

    h.pib.run_iteration();
    let packet = h.telemetry.last_sent().unwrap();
    assert_eq!(
        packet.annotation(Slot::First),
        Some("PU TSEN: 99, 16.50, 0.25, 10.00, 11.00, 0")
    );
}

#[test]
fn test_pib_eeprom_dump() {
    let mut h = harness(PibParams::default());
    h.pib.raise(Action::SendPibEeprom);
    h.pib.run_iteration();

    let packet = h.telemetry.last_sent().unwrap();
    assert_eq!(packet.annotation(Slot::First), Some(PIB_EEPROM_LABEL));
    assert!(!packet.payload.is_empty());
}

#[test]
fn test_command_motion_with_bad_code() {
    let mut h = harness(PibParams::default());
    assert!(!h.pib.command_motion(9));
    assert_eq!(h.pib.motion().current(), MotionType::None);
    assert!(h.pib.command_motion(MotionType::ReelIn as u8));
    assert!(!h.pib.command_motion(MotionType::Dock as u8));
}

#[test]
fn test_dock_undock_entry_points() {
    let mut h = harness(PibParams::default());
    h.pib.undock();
    assert_eq!(h.gpio.level(Pin::PuPowerEnable), Some(false));
    h.pib.dock();
    assert_eq!(h.gpio.level(Pin::PuPowerEnable), Some(true));
    assert!(h.pib.store().params().pu_docked);
}

#[test]
fn test_status_during_buffered_motion_keeps_framing() {
    let mut h = harness(PibParams::default());
    h.pib.raise(Action::ReelIn);
    h.pib.run_iteration();
    assert!(h.pib.add_motion_data(&record(1)));

    // 12:10 raises SendStatus, handled on the following pass
    h.clock.advance_secs(7 * 60);
    h.pib.run_iteration();
    h.pib.run_iteration();
    let status = h.telemetry.last_sent().unwrap();
    assert!(status.annotation(Slot::First).unwrap().starts_with("PU TSEN"));
    assert!(status.payload.is_empty());

    assert!(h.pib.add_motion_data(&record(2)));
    assert!(h.pib.send_motion_packet(Severity::Fine, "Finished retracting"));
    let sent = h.telemetry.sent();
    assert_eq!(sent.len(), 2);
    let payload = &sent[1].payload;
    let epoch = Utc
        .with_ymd_and_hms(2024, 6, 1, 12, 3, 0)
        .unwrap()
        .timestamp() as u32;
    assert_eq!(&payload[..4], &epoch.to_be_bytes());
    assert_eq!(payload[4], MOTION_SYNC);
    assert_eq!(&payload[7..7 + MOTION_TM_SIZE], &record(1)[..]);
    assert_eq!(payload.len(), 7 + 2 * MOTION_TM_SIZE);
}

#[test]
fn test_bad_motion_code_while_running_keeps_motion() {
    let mut h = harness(PibParams::default());
    h.pib.raise(Action::ReelIn);
    h.pib.run_iteration();
    assert!(h.pib.motion().is_motion_ongoing());

    assert!(!h.pib.command_motion(42));
    assert_eq!(h.pib.motion().current(), MotionType::ReelIn);
    assert_eq!(
        h.pib.motion().session().map(|s| s.motion),
        Some(MotionType::ReelIn)
    );
    assert!(h.pib.motion().is_motion_ongoing());
    assert_eq!(h.mcb.commands().len(), 1);
}
