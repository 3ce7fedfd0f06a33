//! Test utilities for building MAVLink frames and payloads
//!
//! Shared by unit tests and the decoder benchmark (behind the `benchmark`
//! feature). Payload builders lay fields out in MAVLink wire order.

#![cfg(any(test, feature = "benchmark"))]

use crate::protocol::crc::frame_checksum;
use crate::protocol::frame::{MAGIC_V1, MAGIC_V2};
use crate::protocol::message::{STATUS_TEXT_LEN, spec_for};

/// Builder for well-formed MAVLink frames.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    v2: bool,
    sequence: u8,
    system_id: u8,
    component_id: u8,
    signed: bool,
    truncate: bool,
}

impl FrameBuilder {
    pub fn v1() -> Self {
        Self {
            v2: false,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            signed: false,
            truncate: false,
        }
    }

    /// MAVLink 2 builder; strips trailing zero payload bytes like real senders.
    pub fn v2() -> Self {
        Self { v2: true, truncate: true, ..Self::v1() }
    }

    pub fn sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn system(mut self, system_id: u8, component_id: u8) -> Self {
        self.system_id = system_id;
        self.component_id = component_id;
        self
    }

    /// Append a (dummy) 13-byte signature and set the signed incompat flag.
    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Keep trailing zero bytes in MAVLink 2 payloads.
    pub fn untruncated(mut self) -> Self {
        self.truncate = false;
        self
    }

    /// Encode one frame. Unknown ids get a `CRC_EXTRA` of zero.
    pub fn build(&self, msg_id: u32, payload: &[u8]) -> Vec<u8> {
        let crc_extra = spec_for(msg_id).map(|spec| spec.crc_extra).unwrap_or(0);

        let mut payload = payload;
        if self.v2 && self.truncate {
            while payload.len() > 1 && payload.last() == Some(&0) {
                payload = &payload[..payload.len() - 1];
            }
        }

        let mut frame = Vec::with_capacity(payload.len() + 25);
        if self.v2 {
            frame.push(MAGIC_V2);
            frame.push(payload.len() as u8);
            frame.push(if self.signed { 0x01 } else { 0x00 });
            frame.push(0x00);
            frame.push(self.sequence);
            frame.push(self.system_id);
            frame.push(self.component_id);
            frame.extend_from_slice(&msg_id.to_le_bytes()[..3]);
        } else {
            frame.push(MAGIC_V1);
            frame.push(payload.len() as u8);
            frame.push(self.sequence);
            frame.push(self.system_id);
            frame.push(self.component_id);
            frame.push(msg_id as u8);
        }
        frame.extend_from_slice(payload);

        let crc = frame_checksum(&frame[1..], crc_extra);
        frame.extend_from_slice(&crc.to_le_bytes());

        if self.v2 && self.signed {
            frame.push(0x00);
            frame.extend_from_slice(&[0x10, 0x27, 0, 0, 0, 0]);
            frame.extend_from_slice(&[0xA5; 6]);
        }
        frame
    }
}

/// Payload builders for the recognized messages.
pub mod payloads {
    use super::STATUS_TEXT_LEN;

    /// HEARTBEAT from an ArduCopter quad in MAV_STATE_ACTIVE.
    pub fn heartbeat(custom_mode: u32, base_mode: u8) -> Vec<u8> {
        let mut p = Vec::with_capacity(9);
        p.extend_from_slice(&custom_mode.to_le_bytes());
        p.push(2); // MAV_TYPE_QUADROTOR
        p.push(3); // MAV_AUTOPILOT_ARDUPILOTMEGA
        p.push(base_mode);
        p.push(4);
        p.push(3);
        p
    }

    /// GLOBAL_POSITION_INT with raw wire units (degE7, mm, cdeg).
    pub fn global_position(
        lat: i32,
        lon: i32,
        alt_mm: i32,
        relative_alt_mm: i32,
        hdg: u16,
    ) -> Vec<u8> {
        let mut p = Vec::with_capacity(28);
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&lat.to_le_bytes());
        p.extend_from_slice(&lon.to_le_bytes());
        p.extend_from_slice(&alt_mm.to_le_bytes());
        p.extend_from_slice(&relative_alt_mm.to_le_bytes());
        p.extend_from_slice(&[0u8; 6]);
        p.extend_from_slice(&hdg.to_le_bytes());
        p
    }

    /// Convenience wrapper taking degrees and meters.
    pub fn position_degrees(
        lat: f64,
        lon: f64,
        alt_m: f64,
        relative_alt_m: f64,
        heading: f64,
    ) -> Vec<u8> {
        global_position(
            (lat * 1e7).round() as i32,
            (lon * 1e7).round() as i32,
            (alt_m * 1000.0).round() as i32,
            (relative_alt_m * 1000.0).round() as i32,
            (heading * 100.0).round() as u16,
        )
    }

    pub fn attitude(roll: f32, pitch: f32, yaw: f32) -> Vec<u8> {
        let mut p = Vec::with_capacity(28);
        p.extend_from_slice(&0u32.to_le_bytes());
        for value in [roll, pitch, yaw, 0.0, 0.0, 0.0] {
            p.extend_from_slice(&value.to_le_bytes());
        }
        p
    }

    pub fn sys_status(
        voltage_mv: u16,
        current_ca: i16,
        remaining: i8,
        sensors_health: u32,
    ) -> Vec<u8> {
        let mut p = vec![0u8; 31];
        p[0..4].copy_from_slice(&sensors_health.to_le_bytes());
        p[4..8].copy_from_slice(&sensors_health.to_le_bytes());
        p[8..12].copy_from_slice(&sensors_health.to_le_bytes());
        p[14..16].copy_from_slice(&voltage_mv.to_le_bytes());
        p[16..18].copy_from_slice(&current_ca.to_le_bytes());
        p[30] = remaining as u8;
        p
    }

    pub fn gps_raw(fix_type: u8, satellites: u8) -> Vec<u8> {
        let mut p = vec![0u8; 30];
        p[28] = fix_type;
        p[29] = satellites;
        p
    }

    pub fn vfr_hud(
        airspeed: f32,
        groundspeed: f32,
        alt: f32,
        climb: f32,
        heading: i16,
        throttle: u16,
    ) -> Vec<u8> {
        let mut p = Vec::with_capacity(20);
        for value in [airspeed, groundspeed, alt, climb] {
            p.extend_from_slice(&value.to_le_bytes());
        }
        p.extend_from_slice(&heading.to_le_bytes());
        p.extend_from_slice(&throttle.to_le_bytes());
        p
    }

    /// STATUSTEXT; text longer than 50 bytes is cut off.
    pub fn status_text(severity: u8, text: &str) -> Vec<u8> {
        let mut p = vec![0u8; 1 + STATUS_TEXT_LEN];
        p[0] = severity;
        let bytes = text.as_bytes();
        let n = bytes.len().min(STATUS_TEXT_LEN);
        p[1..1 + n].copy_from_slice(&bytes[..n]);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ids;

    #[test]
    fn v2_frames_strip_trailing_zeros() {
        let payload = payloads::gps_raw(0, 0);
        let frame = FrameBuilder::v2().build(ids::GPS_RAW_INT, &payload);
        assert_eq!(frame[1], 1);

        let full = FrameBuilder::v2().untruncated().build(ids::GPS_RAW_INT, &payload);
        assert_eq!(full[1], 30);
    }

    #[test]
    fn signed_frames_carry_signature() {
        let payload = payloads::heartbeat(0, 0);
        let plain = FrameBuilder::v2().build(ids::HEARTBEAT, &payload);
        let signed = FrameBuilder::v2().signed().build(ids::HEARTBEAT, &payload);
        assert_eq!(signed.len(), plain.len() + 13);
        assert_eq!(signed[2], 0x01);
    }
}
