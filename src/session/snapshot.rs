//! Published session state.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use super::flight_mode::UNKNOWN_MODE;
use super::geo::GeoPoint;

/// GPS fix quality from GPS_RAW_INT.
///
/// Serialized as the raw MAVLink `GPS_FIX_TYPE` number so dashboards can keep
/// their own labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpsFixType {
    #[default]
    NoGps,
    NoFix,
    Fix2d,
    Fix3d,
    Dgps,
    RtkFloat,
    RtkFixed,
    /// Values past RTK_FIXED (static, PPP) kept as transmitted
    Other(u8),
}

impl GpsFixType {
    pub fn code(self) -> u8 {
        match self {
            GpsFixType::NoGps => 0,
            GpsFixType::NoFix => 1,
            GpsFixType::Fix2d => 2,
            GpsFixType::Fix3d => 3,
            GpsFixType::Dgps => 4,
            GpsFixType::RtkFloat => 5,
            GpsFixType::RtkFixed => 6,
            GpsFixType::Other(code) => code,
        }
    }

    /// True for a 3D fix or better.
    pub fn has_3d_fix(self) -> bool {
        self.code() >= 3
    }
}

impl From<u8> for GpsFixType {
    fn from(code: u8) -> Self {
        match code {
            0 => GpsFixType::NoGps,
            1 => GpsFixType::NoFix,
            2 => GpsFixType::Fix2d,
            3 => GpsFixType::Fix3d,
            4 => GpsFixType::Dgps,
            5 => GpsFixType::RtkFloat,
            6 => GpsFixType::RtkFixed,
            other => GpsFixType::Other(other),
        }
    }
}

impl Serialize for GpsFixType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Whole seconds spent armed, displayed as `MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FlightTime(pub u64);

impl FlightTime {
    pub fn seconds(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FlightTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for FlightTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Vehicle orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Complete derived telemetry state for the session.
///
/// Subscribers receive immutable copies behind an `Arc`; the aggregator is the
/// only writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Degrees, 0 until the first valid fix
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above mean sea level
    pub altitude_msl: f64,
    /// Meters above home
    pub relative_altitude: f64,
    /// Degrees [0, 360); an unknown heading report keeps the previous value
    pub heading: f64,
    pub attitude: Attitude,

    /// Volts
    pub battery_voltage: f64,
    /// 0-100, -1 when the vehicle does not report it
    pub battery_remaining_percent: i8,
    /// Amperes
    pub battery_current: f64,
    /// `MAV_SYS_STATUS_SENSOR` health bitmask
    pub sensors_health: u32,

    pub gps_fix_type: GpsFixType,
    pub satellite_count: u8,

    /// m/s
    pub airspeed: f32,
    /// m/s
    pub groundspeed: f32,
    /// m/s, positive up
    pub climb_rate: f32,
    pub throttle_percent: u16,

    pub flight_mode_code: u32,
    pub flight_mode: String,
    pub armed: bool,
    /// `MAV_STATE` from the last heartbeat
    pub system_status: u8,

    pub home_position: Option<GeoPoint>,
    pub distance_travelled_meters: f64,
    /// Initial bearing from the vehicle back to home
    pub bearing_to_home_degrees: Option<f64>,
    /// Initial bearing from home out to the vehicle
    pub bearing_from_home_degrees: Option<f64>,

    pub flight_started_at: Option<DateTime<Utc>>,
    pub flight_time: FlightTime,

    pub connected: bool,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude_msl: 0.0,
            relative_altitude: 0.0,
            heading: 0.0,
            attitude: Attitude::default(),
            battery_voltage: 0.0,
            battery_remaining_percent: -1,
            battery_current: 0.0,
            sensors_health: 0,
            gps_fix_type: GpsFixType::default(),
            satellite_count: 0,
            airspeed: 0.0,
            groundspeed: 0.0,
            climb_rate: 0.0,
            throttle_percent: 0,
            flight_mode_code: 0,
            flight_mode: UNKNOWN_MODE.to_string(),
            armed: false,
            system_status: 0,
            home_position: None,
            distance_travelled_meters: 0.0,
            bearing_to_home_degrees: None,
            bearing_from_home_degrees: None,
            flight_started_at: None,
            flight_time: FlightTime::default(),
            connected: false,
        }
    }
}
