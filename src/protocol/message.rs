//! Typed MAVLink messages recognized by the relay.
//!
//! Only the seven message kinds the ground station displays are decoded. Every
//! variant carries the fields exactly as transmitted; unit conversion belongs to
//! [`crate::interpret`].
//!
//! Payload offsets follow MAVLink's wire ordering, where fields are sorted by
//! descending type size rather than declaration order.

/// Message ids from the MAVLink common/minimal dialects.
pub mod ids {
    pub const HEARTBEAT: u32 = 0;
    pub const SYS_STATUS: u32 = 1;
    pub const GPS_RAW_INT: u32 = 24;
    pub const ATTITUDE: u32 = 30;
    pub const GLOBAL_POSITION_INT: u32 = 33;
    pub const VFR_HUD: u32 = 74;
    pub const STATUSTEXT: u32 = 253;
}

/// Length of the STATUSTEXT text field.
pub const STATUS_TEXT_LEN: usize = 50;

/// Wire description of a recognized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpec {
    pub id: u32,
    pub name: &'static str,
    /// Seed folded into the frame checksum.
    pub crc_extra: u8,
    /// Base payload length (without MAVLink 2 extension fields).
    pub base_len: usize,
}

const SPECS: &[MessageSpec] = &[
    MessageSpec { id: ids::HEARTBEAT, name: "HEARTBEAT", crc_extra: 50, base_len: 9 },
    MessageSpec { id: ids::SYS_STATUS, name: "SYS_STATUS", crc_extra: 124, base_len: 31 },
    MessageSpec { id: ids::GPS_RAW_INT, name: "GPS_RAW_INT", crc_extra: 24, base_len: 30 },
    MessageSpec { id: ids::ATTITUDE, name: "ATTITUDE", crc_extra: 39, base_len: 28 },
    MessageSpec {
        id: ids::GLOBAL_POSITION_INT,
        name: "GLOBAL_POSITION_INT",
        crc_extra: 104,
        base_len: 28,
    },
    MessageSpec { id: ids::VFR_HUD, name: "VFR_HUD", crc_extra: 20, base_len: 20 },
    MessageSpec { id: ids::STATUSTEXT, name: "STATUSTEXT", crc_extra: 83, base_len: 51 },
];

/// Look up the wire description for a message id.
pub fn spec_for(id: u32) -> Option<&'static MessageSpec> {
    SPECS.iter().find(|spec| spec.id == id)
}

/// HEARTBEAT (#0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub vehicle_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

/// GLOBAL_POSITION_INT (#33)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPosition {
    pub time_boot_ms: u32,
    /// Degrees × 1e7
    pub lat: i32,
    /// Degrees × 1e7
    pub lon: i32,
    /// Millimeters above MSL
    pub alt: i32,
    /// Millimeters above home
    pub relative_alt: i32,
    pub vx: i16,
    pub vy: i16,
    pub vz: i16,
    /// Centidegrees, `u16::MAX` when unknown
    pub hdg: u16,
}

/// ATTITUDE (#30)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

/// SYS_STATUS (#1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStatus {
    pub sensors_present: u32,
    pub sensors_enabled: u32,
    pub sensors_health: u32,
    pub load: u16,
    /// Millivolts
    pub voltage_battery: u16,
    /// Centiamperes, -1 when not measured
    pub current_battery: i16,
    pub drop_rate_comm: u16,
    /// Percent, -1 when not measured
    pub battery_remaining: i8,
}

/// GPS_RAW_INT (#24)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsRaw {
    pub time_usec: u64,
    pub lat: i32,
    pub lon: i32,
    pub alt: i32,
    pub fix_type: u8,
    pub satellites_visible: u8,
}

/// VFR_HUD (#74)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VfrHud {
    pub airspeed: f32,
    pub groundspeed: f32,
    pub alt: f32,
    pub climb: f32,
    pub heading: i16,
    pub throttle: u16,
}

/// STATUSTEXT (#253)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusText {
    pub severity: u8,
    /// Null-padded text as transmitted
    pub text: [u8; STATUS_TEXT_LEN],
}

/// A recognized MAVLink message with raw field values.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Heartbeat(Heartbeat),
    GlobalPosition(GlobalPosition),
    Attitude(Attitude),
    SystemStatus(SystemStatus),
    GpsRaw(GpsRaw),
    VfrHud(VfrHud),
    StatusText(StatusText),
}

impl DecodedMessage {
    /// Parse a payload for a recognized message id.
    ///
    /// MAVLink 2 strips trailing zero bytes from payloads, so the payload is
    /// zero-extended to the base length first. Bytes past the base length are
    /// extension fields and are ignored. Returns `None` for ids outside the
    /// recognized set.
    pub fn parse(msg_id: u32, payload: &[u8]) -> Option<Self> {
        let spec = spec_for(msg_id)?;
        let mut buf = [0u8; 256];
        let n = payload.len().min(spec.base_len);
        buf[..n].copy_from_slice(&payload[..n]);
        let p = &buf[..spec.base_len];

        let message = match msg_id {
            ids::HEARTBEAT => DecodedMessage::Heartbeat(Heartbeat {
                custom_mode: u32_at(p, 0),
                vehicle_type: p[4],
                autopilot: p[5],
                base_mode: p[6],
                system_status: p[7],
                mavlink_version: p[8],
            }),
            ids::SYS_STATUS => DecodedMessage::SystemStatus(SystemStatus {
                sensors_present: u32_at(p, 0),
                sensors_enabled: u32_at(p, 4),
                sensors_health: u32_at(p, 8),
                load: u16_at(p, 12),
                voltage_battery: u16_at(p, 14),
                current_battery: i16_at(p, 16),
                drop_rate_comm: u16_at(p, 18),
                battery_remaining: p[30] as i8,
            }),
            ids::GPS_RAW_INT => DecodedMessage::GpsRaw(GpsRaw {
                time_usec: u64_at(p, 0),
                lat: i32_at(p, 8),
                lon: i32_at(p, 12),
                alt: i32_at(p, 16),
                fix_type: p[28],
                satellites_visible: p[29],
            }),
            ids::ATTITUDE => DecodedMessage::Attitude(Attitude {
                time_boot_ms: u32_at(p, 0),
                roll: f32_at(p, 4),
                pitch: f32_at(p, 8),
                yaw: f32_at(p, 12),
                rollspeed: f32_at(p, 16),
                pitchspeed: f32_at(p, 20),
                yawspeed: f32_at(p, 24),
            }),
            ids::GLOBAL_POSITION_INT => DecodedMessage::GlobalPosition(GlobalPosition {
                time_boot_ms: u32_at(p, 0),
                lat: i32_at(p, 4),
                lon: i32_at(p, 8),
                alt: i32_at(p, 12),
                relative_alt: i32_at(p, 16),
                vx: i16_at(p, 20),
                vy: i16_at(p, 22),
                vz: i16_at(p, 24),
                hdg: u16_at(p, 26),
            }),
            ids::VFR_HUD => DecodedMessage::VfrHud(VfrHud {
                airspeed: f32_at(p, 0),
                groundspeed: f32_at(p, 4),
                alt: f32_at(p, 8),
                climb: f32_at(p, 12),
                heading: i16_at(p, 16),
                throttle: u16_at(p, 18),
            }),
            ids::STATUSTEXT => {
                let mut text = [0u8; STATUS_TEXT_LEN];
                text.copy_from_slice(&p[1..1 + STATUS_TEXT_LEN]);
                DecodedMessage::StatusText(StatusText { severity: p[0], text })
            }
            _ => return None,
        };
        Some(message)
    }

    /// MAVLink message id of this variant.
    pub fn id(&self) -> u32 {
        match self {
            DecodedMessage::Heartbeat(_) => ids::HEARTBEAT,
            DecodedMessage::GlobalPosition(_) => ids::GLOBAL_POSITION_INT,
            DecodedMessage::Attitude(_) => ids::ATTITUDE,
            DecodedMessage::SystemStatus(_) => ids::SYS_STATUS,
            DecodedMessage::GpsRaw(_) => ids::GPS_RAW_INT,
            DecodedMessage::VfrHud(_) => ids::VFR_HUD,
            DecodedMessage::StatusText(_) => ids::STATUSTEXT,
        }
    }

    pub fn name(&self) -> &'static str {
        spec_for(self.id()).map(|spec| spec.name).unwrap_or("UNKNOWN")
    }
}

fn u16_at(p: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([p[offset], p[offset + 1]])
}

fn i16_at(p: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([p[offset], p[offset + 1]])
}

fn u32_at(p: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([p[offset], p[offset + 1], p[offset + 2], p[offset + 3]])
}

fn i32_at(p: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([p[offset], p[offset + 1], p[offset + 2], p[offset + 3]])
}

fn f32_at(p: &[u8], offset: usize) -> f32 {
    f32::from_bits(u32_at(p, offset))
}

fn u64_at(p: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&p[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
