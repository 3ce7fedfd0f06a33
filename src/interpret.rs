//! Message interpretation: raw MAVLink fields to unit-correct partial updates.
//!
//! [`interpret`] is a pure function. It never touches session state; the
//! aggregator decides what an update means for the session.

use crate::protocol::message::DecodedMessage;
use crate::session::GpsFixType;

/// Base-mode bit signalling that motors are armed.
pub const MAV_MODE_FLAG_SAFETY_ARMED: u8 = 0x80;

/// Sentinel for "current not measured" in SYS_STATUS.
const CURRENT_NOT_MEASURED: i16 = -1;

/// Sentinel for "heading unknown" in GLOBAL_POSITION_INT.
const HEADING_UNKNOWN: u16 = u16::MAX;

/// Unit-correct fields extracted from one message.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialUpdate {
    Heartbeat {
        flight_mode_code: u32,
        armed: bool,
        system_status: u8,
    },
    /// Degrees, meters and degrees. `heading` is `None` when the vehicle
    /// reports it as unknown.
    Position {
        latitude: f64,
        longitude: f64,
        altitude_msl: f64,
        relative_altitude: f64,
        heading: Option<f64>,
    },
    /// Radians.
    Attitude { roll: f32, pitch: f32, yaw: f32 },
    Battery {
        voltage: f64,
        remaining_percent: i8,
        current: f64,
        sensors_health: u32,
    },
    Gps { fix_type: GpsFixType, satellite_count: u8 },
    Hud {
        airspeed: f32,
        groundspeed: f32,
        heading: f64,
        throttle_percent: u16,
        altitude_msl: f64,
        climb_rate: f32,
    },
    StatusText { severity: u8, text: String },
}

impl PartialUpdate {
    /// Whether applying this update always changes published telemetry.
    ///
    /// Heartbeats only matter when mode or arm state actually change, and
    /// status text becomes a log event instead of a snapshot change.
    pub fn telemetry_changed(&self) -> bool {
        !matches!(self, PartialUpdate::Heartbeat { .. } | PartialUpdate::StatusText { .. })
    }
}

/// Convert a decoded message into a partial update.
///
/// Returns `None` for a status text that is empty once null padding is removed.
pub fn interpret(message: &DecodedMessage) -> Option<PartialUpdate> {
    let update = match message {
        DecodedMessage::Heartbeat(hb) => PartialUpdate::Heartbeat {
            flight_mode_code: hb.custom_mode,
            armed: hb.base_mode & MAV_MODE_FLAG_SAFETY_ARMED != 0,
            system_status: hb.system_status,
        },
        DecodedMessage::GlobalPosition(pos) => PartialUpdate::Position {
            latitude: pos.lat as f64 / 1e7,
            longitude: pos.lon as f64 / 1e7,
            altitude_msl: pos.alt as f64 / 1000.0,
            relative_altitude: pos.relative_alt as f64 / 1000.0,
            heading: (pos.hdg != HEADING_UNKNOWN).then(|| pos.hdg as f64 / 100.0),
        },
        DecodedMessage::Attitude(att) => {
            PartialUpdate::Attitude { roll: att.roll, pitch: att.pitch, yaw: att.yaw }
        }
        DecodedMessage::SystemStatus(status) => {
            let current = match status.current_battery {
                CURRENT_NOT_MEASURED => 0.0,
                centiamps => centiamps as f64 / 100.0,
            };
            PartialUpdate::Battery {
                voltage: status.voltage_battery as f64 / 1000.0,
                remaining_percent: status.battery_remaining,
                current,
                sensors_health: status.sensors_health,
            }
        }
        DecodedMessage::GpsRaw(gps) => PartialUpdate::Gps {
            fix_type: GpsFixType::from(gps.fix_type),
            satellite_count: gps.satellites_visible,
        },
        DecodedMessage::VfrHud(hud) => PartialUpdate::Hud {
            airspeed: hud.airspeed,
            groundspeed: hud.groundspeed,
            heading: hud.heading as f64,
            throttle_percent: hud.throttle,
            altitude_msl: hud.alt as f64,
            climb_rate: hud.climb,
        },
        DecodedMessage::StatusText(st) => {
            let bytes: Vec<u8> = st.text.iter().copied().filter(|&b| b != 0).collect();
            let text = String::from_utf8_lossy(&bytes).trim_end().to_string();
            if text.is_empty() {
                return None;
            }
            PartialUpdate::StatusText { severity: st.severity, text }
        }
    };
    Some(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ids;
    use crate::test_utils::payloads;
    use proptest::prelude::*;

    fn parse(id: u32, payload: &[u8]) -> DecodedMessage {
        DecodedMessage::parse(id, payload).expect("recognized message")
    }

    #[test]
    fn heartbeat_reports_mode_and_arm_bit() {
        let update = interpret(&parse(ids::HEARTBEAT, &payloads::heartbeat(4, 128))).unwrap();
        assert_eq!(
            update,
            PartialUpdate::Heartbeat { flight_mode_code: 4, armed: true, system_status: 4 }
        );
        assert!(!update.telemetry_changed());
    }

    #[test]
    fn global_position_is_scaled() {
        let payload = payloads::global_position(-353632610, 1491652300, 100000, 50000, 9000);
        let update = interpret(&parse(ids::GLOBAL_POSITION_INT, &payload)).unwrap();
        let PartialUpdate::Position {
            latitude,
            longitude,
            altitude_msl,
            relative_altitude,
            heading,
        } = update
        else {
            panic!("expected position update")
        };
        assert!((latitude - -35.363261).abs() < 1e-9);
        assert!((longitude - 149.16523).abs() < 1e-9);
        assert_eq!(altitude_msl, 100.0);
        assert_eq!(relative_altitude, 50.0);
        assert_eq!(heading, Some(90.0));
    }

    #[test]
    fn unknown_heading_is_not_scaled() {
        let payload = payloads::global_position(-353632610, 1491652300, 0, 0, u16::MAX);
        let update = interpret(&parse(ids::GLOBAL_POSITION_INT, &payload)).unwrap();
        assert!(matches!(update, PartialUpdate::Position { heading: None, .. }));
    }

    #[test]
    fn battery_current_defaults_to_zero_when_not_measured() {
        let update = interpret(&parse(ids::SYS_STATUS, &payloads::sys_status(12_600, -1, 76, 0x1F)))
            .unwrap();
        assert_eq!(
            update,
            PartialUpdate::Battery {
                voltage: 12.6,
                remaining_percent: 76,
                current: 0.0,
                sensors_health: 0x1F
            }
        );
    }

    #[test]
    fn battery_current_is_converted_to_amps() {
        let update =
            interpret(&parse(ids::SYS_STATUS, &payloads::sys_status(11_100, 1_550, 40, 0)))
                .unwrap();
        assert!(matches!(
            update,
            PartialUpdate::Battery { current, .. } if (current - 15.5).abs() < 1e-9
        ));
    }

    #[test]
    fn gps_fix_keeps_unknown_values() {
        let update = interpret(&parse(ids::GPS_RAW_INT, &payloads::gps_raw(9, 14))).unwrap();
        let expected = PartialUpdate::Gps { fix_type: GpsFixType::Other(9), satellite_count: 14 };
        assert_eq!(update, expected);
    }

    #[test]
    fn hud_fields_pass_through() {
        let payload = payloads::vfr_hud(12.5, 11.0, 102.5, -0.5, 270, 55);
        let update = interpret(&parse(ids::VFR_HUD, &payload)).unwrap();
        assert_eq!(
            update,
            PartialUpdate::Hud {
                airspeed: 12.5,
                groundspeed: 11.0,
                heading: 270.0,
                throttle_percent: 55,
                altitude_msl: 102.5,
                climb_rate: -0.5
            }
        );
        assert!(update.telemetry_changed());
    }

    #[test]
    fn status_text_strips_null_padding() {
        let update =
            interpret(&parse(ids::STATUSTEXT, &payloads::status_text(2, "LOW BATTERY"))).unwrap();
        assert_eq!(update, PartialUpdate::StatusText { severity: 2, text: "LOW BATTERY".into() });
        assert!(!update.telemetry_changed());
    }

    #[test]
    fn full_width_status_text_is_kept_whole() {
        let text = "A".repeat(50);
        let update = interpret(&parse(ids::STATUSTEXT, &payloads::status_text(6, &text))).unwrap();
        assert!(matches!(update, PartialUpdate::StatusText { text: t, .. } if t.len() == 50));
    }

    #[test]
    fn empty_status_text_yields_nothing() {
        assert!(interpret(&parse(ids::STATUSTEXT, &payloads::status_text(6, ""))).is_none());
    }

    proptest! {
        #[test]
        fn only_bit_seven_controls_arming(base_mode in any::<u8>()) {
            let message = parse(ids::HEARTBEAT, &payloads::heartbeat(0, base_mode));
            let update = interpret(&message).unwrap();
            let PartialUpdate::Heartbeat { armed, .. } = update else { unreachable!() };
            prop_assert_eq!(armed, base_mode >= 128);
        }
    }
}
