//! Telemetry packet assembly.
//!
//! Every packet leaving the PIB carries a payload and three state slots. Slot 1 describes
//! the packet; slots 2 and 3 are always marked [`Severity::NoMessage`]. Packets are
//! fire-and-forget: acknowledgment tracking is switched off for every send.
//!
//! # Modes
//!
//! - **Buffered motion**: MCB motion records are staged in the assembler behind a
//!   4-byte epoch-seconds header written at session start. The first record after each
//!   packet boundary is preceded by a sync byte (`0xA5`) and a big-endian `u16` of
//!   deciseconds since the session started. The caller picks the packet boundary with
//!   [`TelemetryAssembler::send_motion_packet`].
//! - **Real-time motion**: each record goes out immediately in its own packet labelled
//!   `MCB TM Packet n`.
//! - **Status/record**: a formatted summary in slot 1. Text that would not fit is replaced
//!   with a fixed fallback and the severity drops to [`Severity::Warn`]; the packet is
//!   still sent.
//! - **Raw dump**: a memory image attached verbatim with a label.
//!
//! When the buffer fills, the bytes that fit are kept and the packet still goes out.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::annotation;
use crate::error::PibError;
use crate::hardware::capabilities::{Severity, Slot, TelemetryLink};

/// Size of one MCB motion record, bytes.
pub const MOTION_TM_SIZE: usize = 26;

/// Marks the start of framed motion data.
pub const MOTION_SYNC: u8 = 0xA5;

/// Sync byte plus the 16-bit elapsed-time field.
const MOTION_FRAME_SIZE: usize = 3;

/// Label for a winch controller EEPROM dump.
pub const MCB_EEPROM_LABEL: &str = "MCB EEPROM Contents";

/// Label for a PIB parameter dump.
pub const PIB_EEPROM_LABEL: &str = "PIB EEPROM Contents";

const TSEN_FALLBACK: &str = "PU TSEN: unable to add status info";
const PROFILE_RECORD_FALLBACK: &str = "PU Profile Record: unable to add status info";

/// Last status reported by the profiling unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PuStatus {
    /// PU clock, seconds.
    pub time: u32,
    /// Battery voltage, volts.
    pub v_battery: f32,
    /// Charge current, amps.
    pub i_charge: f32,
    /// Thermistor 1, degrees C.
    pub therm1: f32,
    /// Thermistor 2, degrees C.
    pub therm2: f32,
    /// Heater state bits.
    pub heater_stat: u8,
}

/// Builds and sends telemetry packets.
///
/// Buffered motion data is staged here rather than in the link, so status, record and dump
/// packets sent mid-session never carry or discard it. The staging area holds as many
/// bytes as the link had free at construction.
pub struct TelemetryAssembler {
    link: Box<dyn TelemetryLink>,
    motion: BytesMut,
    motion_capacity: usize,
    session_start_ms: u64,
    needs_framing: bool,
    packet_count: u32,
}

impl TelemetryAssembler {
    /// Wrap `link`, sizing the motion staging area to its free space.
    pub fn new(link: Box<dyn TelemetryLink>) -> Self {
        let motion_capacity = link.remaining();
        Self {
            link,
            motion: BytesMut::with_capacity(motion_capacity),
            motion_capacity,
            session_start_ms: 0,
            needs_framing: true,
            packet_count: 0,
        }
    }

    /// Real-time packets sent this session.
    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    /// Buffered motion bytes not yet sent.
    pub fn pending_motion(&self) -> &[u8] {
        &self.motion
    }

    /// Reset for a new motion session. Buffered sessions start with the epoch header.
    pub fn begin_session(&mut self, start_ms: u64, epoch_secs: u32, real_time: bool) {
        self.session_start_ms = start_ms;
        self.needs_framing = true;
        self.packet_count = 0;
        self.motion.clear();
        if !real_time && !self.stage(&epoch_secs.to_be_bytes()) {
            self.log_capacity(4, self.motion_remaining());
        }
    }

    // =========================================================================
    // Motion data
    // =========================================================================

    /// Add one MCB motion record.
    ///
    /// In real-time mode the record is sent at once. Otherwise it is staged and false
    /// means it did not fit; a record that does not fit leaves no framing behind.
    pub fn add_motion_record(&mut self, record: &[u8], now_ms: u64, real_time: bool) -> bool {
        if record.len() != MOTION_TM_SIZE {
            error!(
                len = record.len(),
                expected = MOTION_TM_SIZE,
                "Unexpected MCB motion record size"
            );
            return false;
        }

        if real_time {
            self.link.clear();
            self.append_fitting(record);
            self.packet_count += 1;
            let text = annotation!("MCB TM Packet {}", self.packet_count)
                .unwrap_or_else(|_| "MCB TM Packet".to_string());
            return self.send_annotated(Severity::Fine, &text);
        }

        let framing = if self.needs_framing { MOTION_FRAME_SIZE } else { 0 };
        if framing + record.len() > self.motion_remaining() {
            self.log_capacity(framing + record.len(), self.motion_remaining());
            return false;
        }

        if self.needs_framing {
            let elapsed_ds = (now_ms.saturating_sub(self.session_start_ms) / 100) as u16;
            self.motion.put_u8(MOTION_SYNC);
            self.motion.put_u16(elapsed_ds);
            self.needs_framing = false;
        }
        self.motion.extend_from_slice(record);
        true
    }

    fn stage(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.motion_remaining() {
            return false;
        }
        self.motion.extend_from_slice(bytes);
        true
    }

    fn motion_remaining(&self) -> usize {
        self.motion_capacity.saturating_sub(self.motion.len())
    }

    /// Send the buffered motion data with `message` in slot 1.
    pub fn send_motion_packet(&mut self, severity: Severity, message: &str) -> bool {
        self.link.clear();
        let staged = self.motion.split();
        self.append_fitting(&staged);
        self.needs_framing = true;
        self.send_annotated(severity, message)
    }

    // =========================================================================
    // Status and records
    // =========================================================================

    /// Periodic PU status.
    pub fn send_status(&mut self, status: &PuStatus) -> bool {
        self.link.clear();
        let text = annotation!(
            "PU TSEN: {}, {:.2}, {:.2}, {:.2}, {:.2}, {}",
            status.time,
            status.v_battery,
            status.i_charge,
            status.therm1,
            status.therm2,
            status.heater_stat
        );
        self.send_summary(text, TSEN_FALLBACK)
    }

    /// A profile record forwarded from the PU, with its payload.
    pub fn send_profile_record(&mut self, number: u16, status: &PuStatus, record: &[u8]) -> bool {
        self.link.clear();
        self.append_fitting(record);
        let text = annotation!(
            "PU Profile Record {}: {}, {:.2}, {:.2}, {:.2}, {:.2}, {}",
            number,
            status.time,
            status.v_battery,
            status.i_charge,
            status.therm1,
            status.therm2,
            status.heater_stat
        );
        self.send_summary(text, PROFILE_RECORD_FALLBACK)
    }

    fn send_summary(&mut self, text: Result<String, PibError>, fallback: &str) -> bool {
        match text {
            Ok(text) => self.send_annotated(Severity::Fine, &text),
            Err(err) => {
                warn!(error = %err, "Status summary too long, sending fallback");
                self.send_annotated(Severity::Warn, fallback)
            }
        }
    }

    // =========================================================================
    // Raw dumps
    // =========================================================================

    /// Attach `contents` verbatim, as much as fits, labelled `label`.
    pub fn send_raw_dump(&mut self, label: &str, contents: &[u8]) -> bool {
        self.link.clear();
        self.append_fitting(contents);
        self.send_annotated(Severity::Fine, label)
    }

    // =========================================================================
    // Shared send path
    // =========================================================================

    fn send_annotated(&mut self, severity: Severity, text: &str) -> bool {
        self.link.set_annotation(Slot::First, text);
        self.link.set_severity(Slot::First, severity);
        self.link.set_severity(Slot::Second, Severity::NoMessage);
        self.link.set_severity(Slot::Third, Severity::NoMessage);
        self.link.set_ack_required(false);
        let sent = self.link.send();
        if sent {
            debug!(?severity, text, "Telemetry sent");
        } else {
            error!(text, "Telemetry send failed");
        }
        sent
    }

    /// Append the prefix of `bytes` that fits.
    fn append_fitting(&mut self, bytes: &[u8]) -> usize {
        let fit = bytes.len().min(self.link.remaining());
        if fit < bytes.len() {
            self.log_capacity(bytes.len(), self.link.remaining());
        }
        if fit > 0 && !self.link.append(&bytes[..fit]) {
            self.log_capacity(fit, self.link.remaining());
            return 0;
        }
        fit
    }

    fn log_capacity(&self, requested: usize, remaining: usize) {
        let err = PibError::BufferCapacity {
            requested,
            remaining,
        };
        error!(error = %err, "Telemetry buffer overflow");
    }
}
